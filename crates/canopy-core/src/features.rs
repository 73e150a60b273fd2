//! Sensor-appropriate spectral feature stacks.
//!
//! Output bands, in order: the six surface-reflectance bands of the sensor
//! (scaled to reflectance), then NDVI, SAVI, NBR and MNDWI computed from the
//! scaled bands.

use crate::error::Result;
use crate::provider::{BandExpr, BandStackSpec, EarthObservationProvider, ImageHandle, VisParams};
use crate::scene::{Scene, SensorGeneration};

/// Collection 2 surface-reflectance scale factor.
pub const REFLECTANCE_SCALE: f64 = 0.0000275;
pub const REFLECTANCE_OFFSET: f64 = -0.2;

/// SAVI soil brightness factor.
const SAVI_L: f64 = 0.5;

/// Which archive bands play which spectral role for a sensor generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandRoles {
    pub reflectance: [&'static str; 6],
    pub nir: &'static str,
    pub red: &'static str,
    pub green: &'static str,
    pub swir1: &'static str,
    pub swir2: &'static str,
    /// Red, green, blue.
    pub true_color: [&'static str; 3],
}

const LEGACY: BandRoles = BandRoles {
    reflectance: ["SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B7"],
    nir: "SR_B4",
    red: "SR_B3",
    green: "SR_B2",
    swir1: "SR_B5",
    swir2: "SR_B7",
    true_color: ["SR_B3", "SR_B2", "SR_B1"],
};

const MODERN: BandRoles = BandRoles {
    reflectance: ["SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7"],
    nir: "SR_B5",
    red: "SR_B4",
    green: "SR_B3",
    swir1: "SR_B6",
    swir2: "SR_B7",
    true_color: ["SR_B4", "SR_B3", "SR_B2"],
};

impl BandRoles {
    pub fn for_sensor(sensor: SensorGeneration) -> &'static BandRoles {
        if sensor.is_legacy() {
            &LEGACY
        } else {
            &MODERN
        }
    }
}

/// A feature stack evaluated by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BandStack {
    pub handle: ImageHandle,
    pub band_names: Vec<String>,
    pub sensor: SensorGeneration,
}

fn scaled(band: &str) -> BandExpr {
    BandExpr::band(band) * REFLECTANCE_SCALE + REFLECTANCE_OFFSET
}

/// Expression graph for the feature stack of `sensor`.
pub fn stack_spec(sensor: SensorGeneration) -> BandStackSpec {
    let roles = BandRoles::for_sensor(sensor);
    let mut spec = BandStackSpec::default();
    for band in roles.reflectance {
        spec.push(band, scaled(band));
    }

    let (nir, red) = (scaled(roles.nir), scaled(roles.red));
    spec.push("NDVI", BandExpr::normalized_difference(nir.clone(), red.clone()));
    spec.push(
        "SAVI",
        (nir.clone() - red.clone()) / (nir.clone() + red + SAVI_L) * (1.0 + SAVI_L),
    );
    spec.push("NBR", BandExpr::normalized_difference(nir, scaled(roles.swir2)));
    spec.push(
        "MNDWI",
        BandExpr::normalized_difference(scaled(roles.green), scaled(roles.swir1)),
    );
    spec
}

pub fn build_features<P>(provider: &P, scene: &Scene) -> Result<BandStack>
where
    P: EarthObservationProvider + ?Sized,
{
    let spec = stack_spec(scene.sensor);
    let handle = provider.evaluate_band_algebra(&scene.source, &spec)?;
    tracing::debug!(scene = %scene.id, sensor = %scene.sensor, bands = spec.bands.len(), "feature stack built");
    Ok(BandStack {
        handle,
        band_names: spec.names(),
        sensor: scene.sensor,
    })
}

/// True-colour rendering for the scaled reflectance bands.
pub fn true_color_vis(sensor: SensorGeneration) -> VisParams {
    VisParams {
        bands: BandRoles::for_sensor(sensor).true_color.iter().map(|b| b.to_string()).collect(),
        min: 0.02,
        max: 0.35,
        gamma: Some(1.3),
        palette: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(spec: &BandStackSpec, name: &str, raw: &[(&str, f64)]) -> f64 {
        let band = spec.bands.iter().find(|b| b.name == name).unwrap();
        band.expr
            .eval(&|n| raw.iter().find(|(k, _)| *k == n).map(|(_, v)| *v))
            .unwrap()
    }

    /// Raw DN for a target reflectance.
    fn dn(reflectance: f64) -> f64 {
        (reflectance - REFLECTANCE_OFFSET) / REFLECTANCE_SCALE
    }

    #[test]
    fn ten_bands_in_order() {
        let names = stack_spec(SensorGeneration::Oli).names();
        assert_eq!(
            names,
            vec!["SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7", "NDVI", "SAVI", "NBR", "MNDWI"]
        );
        let legacy = stack_spec(SensorGeneration::Tm).names();
        assert_eq!(&legacy[..6], &["SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B7"]);
    }

    #[test]
    fn reflectance_is_scaled() {
        let spec = stack_spec(SensorGeneration::Oli);
        assert_relative_eq!(eval(&spec, "SR_B4", &[("SR_B4", 10_000.0)]), 0.075, epsilon = 1e-12);
    }

    #[test]
    fn modern_indices_use_modern_roles() {
        let spec = stack_spec(SensorGeneration::Oli2);
        let raw = [
            ("SR_B3", dn(0.08)),
            ("SR_B4", dn(0.05)),
            ("SR_B5", dn(0.35)),
            ("SR_B6", dn(0.15)),
            ("SR_B7", dn(0.10)),
        ];
        assert_relative_eq!(eval(&spec, "NDVI", &raw), 0.30 / 0.40, epsilon = 1e-9);
        assert_relative_eq!(eval(&spec, "SAVI", &raw), 0.30 / 0.90 * 1.5, epsilon = 1e-9);
        assert_relative_eq!(eval(&spec, "NBR", &raw), 0.25 / 0.45, epsilon = 1e-9);
        assert_relative_eq!(eval(&spec, "MNDWI", &raw), -0.07 / 0.23, epsilon = 1e-9);
    }

    #[test]
    fn legacy_indices_use_legacy_roles() {
        let spec = stack_spec(SensorGeneration::Etm);
        let raw = [
            ("SR_B2", dn(0.08)),
            ("SR_B3", dn(0.05)),
            ("SR_B4", dn(0.35)),
            ("SR_B5", dn(0.15)),
            ("SR_B7", dn(0.10)),
        ];
        assert_relative_eq!(eval(&spec, "NDVI", &raw), 0.30 / 0.40, epsilon = 1e-9);
        assert_relative_eq!(eval(&spec, "MNDWI", &raw), -0.07 / 0.23, epsilon = 1e-9);
    }

    #[test]
    fn true_color_bands_per_generation() {
        assert_eq!(true_color_vis(SensorGeneration::Tm).bands, vec!["SR_B3", "SR_B2", "SR_B1"]);
        assert_eq!(true_color_vis(SensorGeneration::Oli).bands, vec!["SR_B4", "SR_B3", "SR_B2"]);
        assert_eq!(true_color_vis(SensorGeneration::Oli).gamma, Some(1.3));
    }
}
