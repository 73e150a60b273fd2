//! Explicit per-analysis state.
//!
//! The session owns the region, the parcels and one sample collection per
//! period. Samples change only through the methods here; nothing in the
//! pipeline mutates them.

use geo::Geometry;

use crate::area::Parcel;
use crate::error::{CanopyError, Result};
use crate::geometry::{region_from_parcels, sanitize, LonLat, ProviderGeometry};
use crate::samples::{import_samples, ClassLabel, ImportBounds, ImportSummary, Period, SampleCollection};

/// Populated classes with fewer points than this draw a warning.
pub const SPARSE_CLASS_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct AnalysisSession {
    region: Option<ProviderGeometry>,
    parcels: Vec<Parcel>,
    anterior: SampleCollection,
    posterior: SampleCollection,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize and store the region of interest.
    pub fn set_region(&mut self, geometry: &Geometry<f64>) -> Result<()> {
        self.region = Some(sanitize(geometry)?);
        Ok(())
    }

    pub fn set_parcels(&mut self, parcels: Vec<Parcel>) {
        self.parcels = parcels;
    }

    pub fn parcels(&self) -> &[Parcel] {
        &self.parcels
    }

    /// The explicit region, else the outline of the parcels.
    pub fn region(&self) -> Result<ProviderGeometry> {
        if let Some(region) = &self.region {
            return Ok(region.clone());
        }
        if self.parcels.is_empty() {
            return Err(CanopyError::MissingRegion);
        }
        region_from_parcels(self.parcels.iter().map(|p| &p.geometry))
    }

    pub fn samples(&self, period: Period) -> &SampleCollection {
        match period {
            Period::Anterior => &self.anterior,
            Period::Posterior => &self.posterior,
        }
    }

    fn samples_mut(&mut self, period: Period) -> &mut SampleCollection {
        match period {
            Period::Anterior => &mut self.anterior,
            Period::Posterior => &mut self.posterior,
        }
    }

    pub fn add_sample(&mut self, period: Period, label: ClassLabel, point: LonLat) {
        self.samples_mut(period).add(label, point);
    }

    /// Append points parsed from `text`; existing points are kept.
    pub fn import_samples(&mut self, period: Period, text: &str, bounds: &ImportBounds) -> ImportSummary {
        import_samples(self.samples_mut(period), text, bounds)
    }

    pub fn reset_samples(&mut self, period: Period) {
        tracing::info!(%period, "samples cleared");
        self.samples_mut(period).clear();
    }

    pub fn reset_all_samples(&mut self) {
        for period in Period::BOTH {
            self.reset_samples(period);
        }
    }

    /// Populated classes below [`SPARSE_CLASS_THRESHOLD`], per period.
    pub fn sparse_classes(&self) -> Vec<(Period, ClassLabel, usize)> {
        Period::BOTH
            .iter()
            .flat_map(|&p| {
                self.samples(p)
                    .sparse_classes(SPARSE_CLASS_THRESHOLD)
                    .into_iter()
                    .map(move |(label, n)| (p, label, n))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    #[test]
    fn periods_are_independent() {
        let mut s = AnalysisSession::new();
        s.add_sample(Period::Anterior, ClassLabel::Forest, LonLat::new(-62.0, -9.0));
        assert_eq!(s.samples(Period::Anterior).total(), 1);
        assert_eq!(s.samples(Period::Posterior).total(), 0);
        s.reset_samples(Period::Anterior);
        assert_eq!(s.samples(Period::Anterior).total(), 0);
    }

    #[test]
    fn import_appends_to_manual_points() {
        let mut s = AnalysisSession::new();
        s.add_sample(Period::Posterior, ClassLabel::Forest, LonLat::new(-62.0, -9.0));
        let summary = s.import_samples(Period::Posterior, "Floresta\n-62.0, -9.0\n", &ImportBounds::default());
        assert_eq!(summary.total(), 1);
        assert_eq!(s.samples(Period::Posterior).count(ClassLabel::Forest), 2);
    }

    #[test]
    fn missing_region_without_parcels() {
        assert!(matches!(AnalysisSession::new().region(), Err(CanopyError::MissingRegion)));
    }

    #[test]
    fn region_falls_back_to_parcel_outline() {
        let mut s = AnalysisSession::new();
        s.set_parcels(vec![Parcel {
            geometry: Geometry::Polygon(polygon![
                (x: -62.0, y: -9.0), (x: -61.99, y: -9.0), (x: -61.99, y: -8.99), (x: -62.0, y: -8.99), (x: -62.0, y: -9.0)
            ]),
            attributes: Default::default(),
        }]);
        let region = s.region().unwrap();
        assert!((region.polygons().unsigned_area() - 1e-4).abs() < 1e-9);
    }

    #[test]
    fn sparse_classes_reported_per_period() {
        let mut s = AnalysisSession::new();
        for i in 0..3 {
            s.add_sample(Period::Posterior, ClassLabel::Water, LonLat::new(-62.0, -9.0 + i as f64 * 1e-3));
        }
        for i in 0..8 {
            s.add_sample(Period::Posterior, ClassLabel::Forest, LonLat::new(-62.0, -9.0 + i as f64 * 1e-3));
        }
        assert_eq!(s.sparse_classes(), vec![(Period::Posterior, ClassLabel::Water, 3)]);
    }
}
