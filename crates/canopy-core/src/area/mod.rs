//! Area statistics: global per-class totals and the per-parcel report.
//!
//! All areas are in hectares. Pixel areas come from the provider's
//! reductions; a parcel's own area is planar, in the UTM zone of the centroid
//! of all parcels.

pub mod export;

use std::collections::BTreeMap;

use geo::{Centroid, Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};

use crate::change::{ChangeClass, ChangeRaster};
use crate::classify::ClassifiedRaster;
use crate::error::{CanopyError, Result};
use crate::geometry::{planar_area_m2, sanitize, ProviderGeometry, UtmZone};
use crate::provider::{EarthObservationProvider, ImageHandle, Reducer, RegionFeature};
use crate::samples::ClassLabel;

const M2_PER_HA: f64 = 10_000.0;

/// Per-parcel areas at or below this many hectares are reported as zero.
pub const NOISE_FLOOR_HA: f64 = 0.05;

/// Attribute columns searched for a parcel name, in order.
pub const NAME_COLUMNS: [&str; 13] = [
    "NOM_LOT", "nom_lot", "NUM_LOTE", "num_lote", "Lote", "lote", "LOTE", "PARCELA", "parcela", "Name",
    "name", "ID_LOTE", "id_lote",
];

/// A sub-parcel polygon with its attribute table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub geometry: Geometry<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// First non-empty known name column, else `Lote_<index + 1>`.
pub fn parcel_name(attributes: &BTreeMap<String, String>, index: usize) -> String {
    NAME_COLUMNS
        .iter()
        .filter_map(|col| attributes.get(*col))
        .map(|v| v.trim())
        .find(|v| !v.is_empty() && *v != "nan" && *v != "None")
        .map(str::to_string)
        .unwrap_or_else(|| format!("Lote_{}", index + 1))
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Round to 2 decimals, or zero when at or below [`NOISE_FLOOR_HA`].
pub fn suppress_noise(ha: f64) -> f64 {
    if ha > NOISE_FLOOR_HA {
        round2(ha)
    } else {
        0.0
    }
}

// ── Global areas ──────────────────────────────────────────────────────────

/// Hectares per raster value inside the region.
pub fn global_areas<P>(provider: &P, raster: &ImageHandle, region: &ProviderGeometry, scale_m: f64) -> Result<BTreeMap<i32, f64>>
where
    P: EarthObservationProvider + ?Sized,
{
    let areas = provider.reduce_region(raster, region, Reducer::AreaByClass, scale_m)?;
    Ok(areas.into_iter().map(|(k, m2)| (k, m2 / M2_PER_HA)).collect())
}

/// Hectares per change class; values outside 1..=5 are dropped.
pub fn global_change_areas<P>(
    provider: &P,
    change: &ChangeRaster,
    region: &ProviderGeometry,
    scale_m: f64,
) -> Result<BTreeMap<ChangeClass, f64>>
where
    P: EarthObservationProvider + ?Sized,
{
    let areas = global_areas(provider, &change.handle, region, scale_m)?;
    let by_class: BTreeMap<ChangeClass, f64> = areas
        .into_iter()
        .filter_map(|(k, ha)| ChangeClass::from_code(k).map(|c| (c, ha)))
        .collect();
    tracing::info!(?by_class, "global change areas");
    Ok(by_class)
}

/// Hectares per land-cover label of one classification.
pub fn global_class_areas<P>(
    provider: &P,
    classified: &ClassifiedRaster,
    region: &ProviderGeometry,
    scale_m: f64,
) -> Result<BTreeMap<ClassLabel, f64>>
where
    P: EarthObservationProvider + ?Sized,
{
    let areas = global_areas(provider, &classified.handle, region, scale_m)?;
    Ok(areas
        .into_iter()
        .filter_map(|(k, ha)| {
            let ordinal = u8::try_from(k).ok()?;
            ClassLabel::from_ordinal(ordinal).map(|l| (l, ha))
        })
        .collect())
}

// ── Per-parcel report ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelAreaReport {
    /// Position of the parcel in the input list.
    pub index: usize,
    pub name: String,
    pub total_ha: f64,
    /// Prior-period land cover, every label present.
    pub class_ha: BTreeMap<ClassLabel, f64>,
    /// Every change class present.
    pub change_ha: BTreeMap<ChangeClass, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelReport {
    /// One row per usable parcel, in input order.
    pub rows: Vec<ParcelAreaReport>,
    /// Indices of parcels with no usable polygon.
    pub skipped: Vec<usize>,
    pub utm_epsg: u32,
    /// Reductions that failed; their cells are zero.
    pub failed_columns: Vec<String>,
}

/// One batched reduction: a single class over every parcel.
#[derive(Debug, Clone, Copy)]
enum Column {
    Class(ClassLabel),
    Change(ChangeClass),
}

impl Column {
    fn label(self) -> String {
        match self {
            Column::Class(l) => l.name().to_string(),
            Column::Change(c) => c.abbreviation().to_string(),
        }
    }
}

/// Per-parcel true area, prior-period class areas and change areas.
pub fn parcel_report<P>(
    provider: &P,
    classified: &ClassifiedRaster,
    change: &ChangeRaster,
    parcels: &[Parcel],
    scale_m: f64,
) -> Result<ParcelReport>
where
    P: EarthObservationProvider + ?Sized,
{
    let mut features = Vec::new();
    let mut skipped = Vec::new();
    for (index, parcel) in parcels.iter().enumerate() {
        match sanitize(&parcel.geometry) {
            Ok(clean) => features.push(RegionFeature {
                index,
                geometry: clean.into_inner(),
            }),
            Err(err) => {
                tracing::warn!(index, %err, "parcel skipped");
                skipped.push(index);
            }
        }
    }
    if features.is_empty() {
        return Err(CanopyError::InvalidGeometry("no parcel has a usable polygon".into()));
    }

    let all = MultiPolygon::new(features.iter().flat_map(|f| f.geometry.0.iter().cloned()).collect());
    let centre = all
        .centroid()
        .ok_or_else(|| CanopyError::InvalidGeometry("parcels have no centroid".into()))?;
    let zone = UtmZone::for_lon_lat(centre.x(), centre.y());

    let columns: Vec<Column> = ClassLabel::ALL
        .iter()
        .map(|&l| Column::Class(l))
        .chain(ChangeClass::ALL.iter().map(|&c| Column::Change(c)))
        .collect();

    let run = |column: &Column| -> (Column, Result<BTreeMap<usize, f64>>) {
        let (raster, value) = match *column {
            Column::Class(l) => (&classified.handle, l.ordinal() as i32),
            Column::Change(c) => (&change.handle, c.code()),
        };
        let result = provider
            .reduce_regions(raster, &features, Reducer::AreaOfClass(value), scale_m)
            .map(|reductions| {
                reductions
                    .into_iter()
                    .map(|r| {
                        let m2 = r.areas.get(&value).copied().unwrap_or(0.0);
                        (r.index, suppress_noise(m2 / M2_PER_HA))
                    })
                    .collect()
            });
        (*column, result)
    };

    #[cfg(feature = "threading")]
    let results: Vec<_> = {
        use rayon::prelude::*;
        columns.par_iter().map(run).collect()
    };
    #[cfg(not(feature = "threading"))]
    let results: Vec<_> = columns.iter().map(run).collect();

    let mut class_ha: BTreeMap<ClassLabel, BTreeMap<usize, f64>> = BTreeMap::new();
    let mut change_ha: BTreeMap<ChangeClass, BTreeMap<usize, f64>> = BTreeMap::new();
    let mut failed_columns = Vec::new();
    for (column, result) in results {
        let values = match result {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(column = %column.label(), %err, "area reduction failed, column left empty");
                failed_columns.push(column.label());
                BTreeMap::new()
            }
        };
        match column {
            Column::Class(l) => {
                class_ha.insert(l, values);
            }
            Column::Change(c) => {
                change_ha.insert(c, values);
            }
        }
    }

    let rows: Vec<ParcelAreaReport> = features
        .iter()
        .map(|f| ParcelAreaReport {
            index: f.index,
            name: parcel_name(&parcels[f.index].attributes, f.index),
            total_ha: round2(planar_area_m2(&f.geometry, zone) / M2_PER_HA),
            class_ha: ClassLabel::ALL
                .iter()
                .map(|&l| (l, lookup(&class_ha, &l, f.index)))
                .collect(),
            change_ha: ChangeClass::ALL
                .iter()
                .map(|&c| (c, lookup(&change_ha, &c, f.index)))
                .collect(),
        })
        .collect();

    tracing::info!(
        parcels = rows.len(),
        skipped = skipped.len(),
        epsg = zone.epsg(),
        failed = failed_columns.len(),
        "parcel report built"
    );

    Ok(ParcelReport {
        rows,
        skipped,
        utm_epsg: zone.epsg(),
        failed_columns,
    })
}

fn lookup<K: Ord>(table: &BTreeMap<K, BTreeMap<usize, f64>>, key: &K, index: usize) -> f64 {
    table.get(key).and_then(|m| m.get(&index)).copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn name_from_first_known_column() {
        let a = attrs(&[("lote", "12"), ("NOM_LOT", "Sítio Boa Vista")]);
        assert_eq!(parcel_name(&a, 0), "Sítio Boa Vista");
    }

    #[test]
    fn placeholder_values_are_skipped() {
        let a = attrs(&[("NOM_LOT", "nan"), ("NUM_LOTE", "None"), ("Lote", "  "), ("name", " L-07 ")]);
        assert_eq!(parcel_name(&a, 0), "L-07");
    }

    #[test]
    fn fallback_name_is_one_based() {
        assert_eq!(parcel_name(&attrs(&[("area", "3.2")]), 4), "Lote_5");
    }

    #[test]
    fn noise_floor() {
        assert_eq!(suppress_noise(0.03), 0.0);
        assert_eq!(suppress_noise(0.05), 0.0);
        assert_eq!(suppress_noise(0.051), 0.05);
        assert_eq!(suppress_noise(12.345_6), 12.35);
    }
}
