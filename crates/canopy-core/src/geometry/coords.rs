//! Geographic coordinate types and bounding boxes.
//! All coordinate math uses f64 (WGS84 degrees).

use geo::{Coord, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Metres per degree of latitude (and of longitude at the equator).
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// A point in geographic coordinates, longitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Approximate circle of `radius_m` metres around this point, as a polygon
    /// with `segments` vertices. Degrees-per-metre is taken at this latitude.
    pub fn buffer(self, radius_m: f64, segments: usize) -> Polygon<f64> {
        let segments = segments.max(8);
        let dlat = radius_m / METRES_PER_DEGREE;
        let dlon = radius_m / (METRES_PER_DEGREE * self.lat.to_radians().cos().max(1e-6));
        let mut ring: Vec<Coord<f64>> = (0..segments)
            .map(|i| {
                let theta = i as f64 / segments as f64 * std::f64::consts::TAU;
                Coord {
                    x: self.lon + dlon * theta.cos(),
                    y: self.lat + dlat * theta.sin(),
                }
            })
            .collect();
        ring.push(ring[0]);
        Polygon::new(LineString::new(ring), vec![])
    }
}

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BBox {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self { min_lon, max_lon, min_lat, max_lat }
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.max().x, rect.min().y, rect.max().y)
    }

    /// Smallest box enclosing both boxes.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_lon.min(other.min_lon),
            self.max_lon.max(other.max_lon),
            self.min_lat.min(other.min_lat),
            self.max_lat.max(other.max_lat),
        )
    }

    /// True when `other` lies entirely inside (or on the edge of) this box.
    pub fn covers(&self, other: &BBox) -> bool {
        self.min_lon <= other.min_lon
            && self.max_lon >= other.max_lon
            && self.min_lat <= other.min_lat
            && self.max_lat >= other.max_lat
    }

    pub fn contains_point(&self, p: LonLat) -> bool {
        p.lon >= self.min_lon && p.lon <= self.max_lon && p.lat >= self.min_lat && p.lat <= self.max_lat
    }

    pub fn center(&self) -> LonLat {
        LonLat::new((self.min_lon + self.max_lon) / 2.0, (self.min_lat + self.max_lat) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Centroid};

    #[test]
    fn union_then_covers() {
        let a = BBox::new(-62.0, -61.0, -10.0, -9.0);
        let b = BBox::new(-62.0, -61.0, -9.0, -8.0);
        let region = BBox::new(-61.8, -61.2, -9.5, -8.5);
        assert!(!a.covers(&region));
        assert!(!b.covers(&region));
        assert!(a.union(&b).covers(&region));
    }

    #[test]
    fn buffer_is_centred_and_sized() {
        let p = LonLat::new(-62.0, -9.0);
        let poly = p.buffer(30.0, 32);
        let c = poly.centroid().unwrap();
        assert!((c.x() - p.lon).abs() < 1e-9);
        assert!((c.y() - p.lat).abs() < 1e-9);

        // Area in m² using the same local scale; a 32-gon is within 1% of πr².
        let m_per_deg_lon = METRES_PER_DEGREE * p.lat.to_radians().cos();
        let area_m2 = poly.unsigned_area() * METRES_PER_DEGREE * m_per_deg_lon;
        let circle = std::f64::consts::PI * 30.0 * 30.0;
        assert!((area_m2 - circle).abs() / circle < 0.01, "area {area_m2:.1} vs {circle:.1}");
    }
}
