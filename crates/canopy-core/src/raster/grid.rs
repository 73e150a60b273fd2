use serde::{Deserialize, Serialize};

use crate::geometry::{BBox, LonLat, METRES_PER_DEGREE};

/// Geographic placement of a row-major grid. Row 0 is the southernmost row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridFrame {
    pub width: usize,
    pub height: usize,
    pub bounds: BBox,
}

impl GridFrame {
    pub fn new(width: usize, height: usize, bounds: BBox) -> Self {
        Self { width, height, bounds }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell size in degrees as (lon, lat).
    pub fn cell_deg(&self) -> (f64, f64) {
        (
            (self.bounds.max_lon - self.bounds.min_lon) / self.width as f64,
            (self.bounds.max_lat - self.bounds.min_lat) / self.height as f64,
        )
    }

    /// Centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> LonLat {
        let (dlon, dlat) = self.cell_deg();
        LonLat::new(
            self.bounds.min_lon + (col as f64 + 0.5) * dlon,
            self.bounds.min_lat + (row as f64 + 0.5) * dlat,
        )
    }

    /// Cell containing `p`, or None outside the frame.
    pub fn locate(&self, p: LonLat) -> Option<(usize, usize)> {
        if !self.bounds.contains_point(p) {
            return None;
        }
        let (dlon, dlat) = self.cell_deg();
        let col = (((p.lon - self.bounds.min_lon) / dlon).floor() as usize).min(self.width - 1);
        let row = (((p.lat - self.bounds.min_lat) / dlat).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Ground area of one cell in `row`, m².
    pub fn cell_area_m2(&self, row: usize) -> f64 {
        let (dlon, dlat) = self.cell_deg();
        let lat = self.cell_center(row, 0).lat;
        (dlat * METRES_PER_DEGREE) * (dlon * METRES_PER_DEGREE * lat.to_radians().cos())
    }
}

/// A single-band raster stored as f32, row-major. NaN marks masked cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    pub frame: GridFrame,
    /// Row-major cell values.
    pub data: Vec<f32>,
}

impl Grid {
    /// Create a new Grid filled with the given value.
    pub fn filled(frame: GridFrame, fill: f32) -> Self {
        Self {
            data: vec![fill; frame.len()],
            frame,
        }
    }

    pub fn from_fn(frame: GridFrame, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(frame.len());
        for r in 0..frame.height {
            for c in 0..frame.width {
                data.push(f(r, c));
            }
        }
        Self { frame, data }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.frame.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.frame.width + col] = val;
    }

    /// Nearest-cell value at `p`. None outside the frame or on a masked cell.
    pub fn sample(&self, p: LonLat) -> Option<f32> {
        let (r, c) = self.frame.locate(p)?;
        let v = self.get(r, c);
        if v.is_nan() { None } else { Some(v) }
    }

    /// Cell-wise combination of two grids on the same frame.
    pub fn zip_with(&self, other: &Grid, f: impl Fn(f32, f32) -> f32) -> Grid {
        Grid {
            frame: self.frame,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect(),
        }
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Grid {
        Grid {
            frame: self.frame,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}
