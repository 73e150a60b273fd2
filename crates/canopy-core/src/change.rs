//! Reduction of two classifications into one canonical change raster.
//!
//! Each period is first collapsed to a coarse state (forest, water, or
//! consolidated for every other class). The change value starts at FF and
//! is overwritten by each rule of [`TRANSITIONS`] in order, so a later rule
//! wins where two would match.

use std::fmt;

use geo::MultiPolygon;
use serde::Serialize;

use crate::classify::ClassifiedRaster;
use crate::error::Result;
use crate::geometry::ProviderGeometry;
use crate::provider::{EarthObservationProvider, ImageHandle, RasterExpr, VisParams};
use crate::samples::ClassLabel;

/// Value of unmatched pixels and of the remap default.
const REMAP_DEFAULT: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CoarseState {
    Forest,
    Consolidated,
    Water,
}

impl CoarseState {
    pub const ALL: [CoarseState; 3] = [CoarseState::Forest, CoarseState::Consolidated, CoarseState::Water];

    pub fn code(self) -> i32 {
        match self {
            CoarseState::Forest => 1,
            CoarseState::Consolidated => 2,
            CoarseState::Water => 3,
        }
    }

    pub fn of(label: ClassLabel) -> Self {
        match label {
            ClassLabel::Forest => CoarseState::Forest,
            ClassLabel::Water => CoarseState::Water,
            _ => CoarseState::Consolidated,
        }
    }
}

/// Canonical change classes. The discriminant is the raster value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ChangeClass {
    /// Forest maintained.
    Ff = 1,
    /// Consolidated area.
    Ac = 2,
    /// Water body.
    Ch = 3,
    /// Deforestation.
    Di = 4,
    /// Regeneration.
    Fr = 5,
}

impl ChangeClass {
    pub const ALL: [ChangeClass; 5] = [
        ChangeClass::Ff,
        ChangeClass::Ac,
        ChangeClass::Ch,
        ChangeClass::Di,
        ChangeClass::Fr,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            ChangeClass::Ff => "FF",
            ChangeClass::Ac => "AC",
            ChangeClass::Ch => "CH",
            ChangeClass::Di => "DI",
            ChangeClass::Fr => "FR",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChangeClass::Ff => "Floresta Mantida",
            ChangeClass::Ac => "Área Consolidada",
            ChangeClass::Ch => "Corpo Hídrico",
            ChangeClass::Di => "Desmatamento",
            ChangeClass::Fr => "Regeneração",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ChangeClass::Ff => "#228B22",
            ChangeClass::Ac => "#F5DEB3",
            ChangeClass::Ch => "#4169E1",
            ChangeClass::Di => "#FF0000",
            ChangeClass::Fr => "#90EE90",
        }
    }
}

impl fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Ordered overwrite rules: (prior, posterior) → change class.
pub const TRANSITIONS: [(CoarseState, CoarseState, ChangeClass); 9] = {
    use ChangeClass::*;
    use CoarseState::{Consolidated as C, Forest as F, Water as W};
    [
        (F, F, Ff),
        (F, C, Di),
        (F, W, Di),
        (C, C, Ac),
        (C, F, Fr),
        (C, W, Ch),
        (W, W, Ch),
        (W, F, Fr),
        (W, C, Ac),
    ]
};

/// Change class of one pixel, applying the rules exactly as the raster does.
pub fn transition(prior: CoarseState, posterior: CoarseState) -> ChangeClass {
    TRANSITIONS
        .iter()
        .fold(ChangeClass::Ff, |acc, &(a, b, class)| {
            if a == prior && b == posterior {
                class
            } else {
                acc
            }
        })
}

/// `(from, to)` lists collapsing class ordinals to coarse codes.
pub fn coarse_remap() -> (Vec<i32>, Vec<i32>) {
    ClassLabel::ALL
        .iter()
        .map(|&l| (l.ordinal() as i32, CoarseState::of(l).code()))
        .unzip()
}

/// Raster expression of the change model over two classified rasters.
pub fn change_expression(prior: &ImageHandle, posterior: &ImageHandle, region: &MultiPolygon<f64>) -> RasterExpr {
    let (from, to) = coarse_remap();
    let a = RasterExpr::source(prior).remap(from.clone(), to.clone(), REMAP_DEFAULT);
    let b = RasterExpr::source(posterior).remap(from, to, REMAP_DEFAULT);

    TRANSITIONS
        .iter()
        .fold(RasterExpr::Constant(ChangeClass::Ff.code()), |acc, &(pa, pb, class)| {
            let condition = a.clone().eq_value(pa.code()).and(b.clone().eq_value(pb.code()));
            acc.overwrite_where(condition, class.code())
        })
        .clip(region.clone())
}

/// A change raster with values 1..=5, clipped to the region.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRaster {
    pub handle: ImageHandle,
}

pub fn reduce<P>(
    provider: &P,
    prior: &ClassifiedRaster,
    posterior: &ClassifiedRaster,
    region: &ProviderGeometry,
) -> Result<ChangeRaster>
where
    P: EarthObservationProvider + ?Sized,
{
    let expr = change_expression(&prior.handle, &posterior.handle, region.polygons());
    let handle = provider.evaluate_raster(&expr)?;
    tracing::debug!(%handle, "change raster evaluated");
    Ok(ChangeRaster { handle })
}

pub fn change_vis() -> VisParams {
    let palette: Vec<&str> = ChangeClass::ALL.iter().map(|c| c.color()).collect();
    VisParams::categorical(1, 5, &palette)
}

/// Deforested hectares per year over the interval. None for a non-positive
/// interval.
pub fn annual_deforestation_rate(deforested_ha: f64, interval_days: i64) -> Option<f64> {
    if interval_days <= 0 {
        return None;
    }
    Some(deforested_ha / (interval_days as f64 / 365.25))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    use crate::geometry::BBox;
    use crate::provider::{
        BandExpr, BandStackSpec, Catalog, CatalogScene, LocalProvider, SceneMetadata, SceneSource,
    };
    use crate::raster::GridFrame;

    #[test]
    fn all_nine_pairs() {
        use ChangeClass::*;
        use CoarseState::*;
        let expected = [
            ((Forest, Forest), Ff),
            ((Forest, Consolidated), Di),
            ((Forest, Water), Di),
            ((Consolidated, Consolidated), Ac),
            ((Consolidated, Forest), Fr),
            ((Consolidated, Water), Ch),
            ((Water, Water), Ch),
            ((Water, Forest), Fr),
            ((Water, Consolidated), Ac),
        ];
        for ((a, b), class) in expected {
            assert_eq!(transition(a, b), class, "{a:?} -> {b:?}");
        }
        for a in CoarseState::ALL {
            for b in CoarseState::ALL {
                assert_eq!(TRANSITIONS.iter().filter(|(x, y, _)| *x == a && *y == b).count(), 1);
            }
        }
    }

    #[test]
    fn remap_lists() {
        let (from, to) = coarse_remap();
        assert_eq!(from, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(to, vec![1, 2, 3, 2, 2, 2, 2]);
    }

    #[test]
    fn codes_and_palette() {
        assert_eq!(ChangeClass::Di.code(), 4);
        assert_eq!(ChangeClass::from_code(5), Some(ChangeClass::Fr));
        assert_eq!(ChangeClass::from_code(0), None);
        assert_eq!(change_vis().palette, vec!["#228B22", "#F5DEB3", "#4169E1", "#FF0000", "#90EE90"]);
    }

    #[test]
    fn annual_rate() {
        assert_relative_eq!(annual_deforestation_rate(365.25, 730).unwrap(), 182.625, epsilon = 1e-9);
        assert!(annual_deforestation_rate(10.0, 0).is_none());
    }

    /// Every (prior, posterior) label pair evaluated by a provider matches
    /// the pure transition function.
    #[test]
    fn raster_matches_pure_transition() {
        let bounds = BBox::new(-62.0, -61.993, -9.007, -9.0);
        let frame = GridFrame::new(7, 7, bounds);
        let n = frame.len();
        let prior: Vec<f32> = (0..n).map(|i| (i % 7) as f32).collect();
        let posterior: Vec<f32> = (0..n).map(|i| (i / 7) as f32).collect();
        let ring = vec![
            [bounds.min_lon, bounds.min_lat],
            [bounds.max_lon, bounds.min_lat],
            [bounds.max_lon, bounds.max_lat],
            [bounds.min_lon, bounds.max_lat],
            [bounds.min_lon, bounds.min_lat],
        ];
        let mut catalog = Catalog::new(frame);
        catalog.push(CatalogScene {
            metadata: SceneMetadata {
                id: "labels".into(),
                collection: "test".into(),
                acquired: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                spacecraft: "test".into(),
                cloud_cover: 0.0,
                wrs_path: 1,
                wrs_row: 1,
            },
            footprint: vec![ring.clone()],
            bands: [("A".to_string(), prior), ("B".to_string(), posterior)].into_iter().collect(),
        });
        let provider = LocalProvider::new(catalog).unwrap();
        let image = |band: &str| {
            let mut spec = BandStackSpec::default();
            spec.push("classification", BandExpr::band(band));
            provider
                .evaluate_band_algebra(&SceneSource::Single("labels".into()), &spec)
                .unwrap()
        };
        let (a, b) = (image("A"), image("B"));
        let region = crate::geometry::sanitize(&geo::Geometry::Polygon(
            crate::geometry::polygon_from_rings(&[ring]).unwrap(),
        ))
        .unwrap();

        let change = provider
            .evaluate_raster(&change_expression(&a, &b, region.polygons()))
            .unwrap();
        let grid = provider.image_band(&change, 0).unwrap();
        for row in 0..7 {
            for col in 0..7 {
                let pa = CoarseState::of(ClassLabel::from_ordinal(col as u8).unwrap());
                let pb = CoarseState::of(ClassLabel::from_ordinal(row as u8).unwrap());
                assert_eq!(grid.get(row, col) as i32, transition(pa, pb).code());
            }
        }
    }
}
