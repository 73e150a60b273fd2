//! Scenes, sensor generations and the scene search.

mod selector;

pub use selector::{SceneSelector, SearchState};

use std::fmt;

use chrono::{Datelike, NaiveDate};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::provider::{SceneMetadata, SceneSource};

/// Landsat sensor generations in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorGeneration {
    /// Landsat 5 Thematic Mapper.
    Tm,
    /// Landsat 7 Enhanced Thematic Mapper Plus.
    Etm,
    /// Landsat 8 Operational Land Imager.
    Oli,
    /// Landsat 9 OLI-2.
    Oli2,
}

impl SensorGeneration {
    pub fn collection_id(self) -> &'static str {
        match self {
            SensorGeneration::Tm => "LANDSAT/LT05/C02/T1_L2",
            SensorGeneration::Etm => "LANDSAT/LE07/C02/T1_L2",
            SensorGeneration::Oli => "LANDSAT/LC08/C02/T1_L2",
            SensorGeneration::Oli2 => "LANDSAT/LC09/C02/T1_L2",
        }
    }

    pub fn from_collection(id: &str) -> Option<Self> {
        [Self::Tm, Self::Etm, Self::Oli, Self::Oli2]
            .into_iter()
            .find(|s| s.collection_id() == id)
    }

    /// TM and ETM+ share the legacy band numbering (blue = SR_B1).
    pub fn is_legacy(self) -> bool {
        matches!(self, SensorGeneration::Tm | SensorGeneration::Etm)
    }

    /// Collections to search for a target year, most preferred first.
    pub fn preference_for_year(year: i32) -> &'static [SensorGeneration] {
        use SensorGeneration::*;
        match year {
            i32::MIN..=2011 => &[Tm],
            2012..=2013 => &[Etm, Tm],
            2014..=2021 => &[Oli, Etm],
            _ => &[Oli2, Oli],
        }
    }

    pub fn preference_for(date: NaiveDate) -> &'static [SensorGeneration] {
        Self::preference_for_year(date.year())
    }
}

impl fmt::Display for SensorGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SensorGeneration::Tm => "Landsat 5 TM",
            SensorGeneration::Etm => "Landsat 7 ETM+",
            SensorGeneration::Oli => "Landsat 8 OLI",
            SensorGeneration::Oli2 => "Landsat 9 OLI-2",
        })
    }
}

/// A selected scene, or a mosaic of two adjacent scenes from one overpass.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub acquired: NaiveDate,
    pub sensor: SensorGeneration,
    pub spacecraft: String,
    pub cloud_cover: f64,
    pub collection: String,
    /// Known for mosaics; single scenes found by the primary pass only carry
    /// their id.
    pub footprint: Option<MultiPolygon<f64>>,
    pub source: SceneSource,
}

impl Scene {
    pub fn single(metadata: &SceneMetadata, sensor: SensorGeneration) -> Self {
        Self {
            id: metadata.id.clone(),
            acquired: metadata.acquired,
            sensor,
            spacecraft: metadata.spacecraft.clone(),
            cloud_cover: metadata.cloud_cover,
            collection: metadata.collection.clone(),
            footprint: None,
            source: SceneSource::Single(metadata.id.clone()),
        }
    }

    pub fn is_mosaic(&self) -> bool {
        matches!(self.source, SceneSource::Mosaic { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_preferences() {
        use SensorGeneration::*;
        assert_eq!(SensorGeneration::preference_for_year(2008), &[Tm]);
        assert_eq!(SensorGeneration::preference_for_year(2011), &[Tm]);
        assert_eq!(SensorGeneration::preference_for_year(2012), &[Etm, Tm]);
        assert_eq!(SensorGeneration::preference_for_year(2013), &[Etm, Tm]);
        assert_eq!(SensorGeneration::preference_for_year(2014), &[Oli, Etm]);
        assert_eq!(SensorGeneration::preference_for_year(2021), &[Oli, Etm]);
        assert_eq!(SensorGeneration::preference_for_year(2022), &[Oli2, Oli]);
        assert_eq!(SensorGeneration::preference_for_year(2025), &[Oli2, Oli]);
    }

    #[test]
    fn collection_ids_round_trip() {
        for s in [SensorGeneration::Tm, SensorGeneration::Etm, SensorGeneration::Oli, SensorGeneration::Oli2] {
            assert_eq!(SensorGeneration::from_collection(s.collection_id()), Some(s));
        }
        assert_eq!(SensorGeneration::from_collection("COPERNICUS/S2"), None);
    }

    #[test]
    fn legacy_numbering() {
        assert!(SensorGeneration::Tm.is_legacy());
        assert!(SensorGeneration::Etm.is_legacy());
        assert!(!SensorGeneration::Oli.is_legacy());
        assert!(!SensorGeneration::Oli2.is_legacy());
    }
}
