//! Per-period supervised classification and accuracy assessment.

mod accuracy;

pub use accuracy::{AccuracyReport, ConfusionMatrix, KappaQuality};

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::RandomForestParams;
use crate::error::{CanopyError, Result};
use crate::features::BandStack;
use crate::geometry::ProviderGeometry;
use crate::provider::{EarthObservationProvider, ImageHandle, VisParams};
use crate::samples::{ClassLabel, Period, SampleSets, ValidationSet};

/// Predicted class ordinals for one period, clipped to the region.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRaster {
    pub period: Period,
    pub handle: ImageHandle,
    /// Labels that had samples when the classifier was trained.
    pub class_names: BTreeMap<u8, ClassLabel>,
    pub training_pixels: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnavailableReason {
    /// The split policy kept every point for training.
    NoValidationSet,
    /// Every validation point fell on a masked pixel.
    NoValidationPixels,
}

/// Accuracy of a classification. `Unavailable` is not a zero score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Accuracy {
    Measured(AccuracyReport),
    Unavailable(UnavailableReason),
}

impl Accuracy {
    pub fn report(&self) -> Option<&AccuracyReport> {
        match self {
            Accuracy::Measured(r) => Some(r),
            Accuracy::Unavailable(_) => None,
        }
    }
}

/// Extract training pixels, fit a random forest and classify the stack.
pub fn train<P>(
    provider: &P,
    sets: &SampleSets,
    stack: &BandStack,
    region: &ProviderGeometry,
    params: &RandomForestParams,
    scale_m: f64,
) -> Result<ClassifiedRaster>
where
    P: EarthObservationProvider + ?Sized,
{
    let period = sets.period;
    let regions = sets.training.regions();
    let table = provider.sample_regions(&stack.handle, &regions, scale_m)?;
    if table.is_empty() {
        return Err(CanopyError::NoTrainingPixels { period });
    }
    let classes = table.classes();
    if classes.len() < 2 {
        return Err(CanopyError::InsufficientClasses {
            period,
            populated: classes.len(),
        });
    }

    let model = provider.train_classifier(&table, params)?;
    let handle = provider.classify(&model, &stack.handle, region)?;
    tracing::info!(
        %period,
        points = regions.len(),
        pixels = table.rows.len(),
        classes = classes.len(),
        trees = params.n_trees,
        "classifier trained"
    );

    Ok(ClassifiedRaster {
        period,
        handle,
        class_names: sets.class_names.clone(),
        training_pixels: table.rows.len(),
    })
}

/// Compare the classification against held-out points.
pub fn validate<P>(
    provider: &P,
    raster: &ClassifiedRaster,
    validation: Option<&ValidationSet>,
    scale_m: f64,
) -> Result<Accuracy>
where
    P: EarthObservationProvider + ?Sized,
{
    let Some(validation) = validation else {
        tracing::info!(period = %raster.period, "no validation set, accuracy unavailable");
        return Ok(Accuracy::Unavailable(UnavailableReason::NoValidationSet));
    };
    let pairs = provider.sample_classes(&raster.handle, &validation.features, scale_m)?;
    let Some(matrix) = ConfusionMatrix::from_pairs(&pairs, &raster.class_names) else {
        tracing::warn!(period = %raster.period, "no validation point fell on a classified pixel");
        return Ok(Accuracy::Unavailable(UnavailableReason::NoValidationPixels));
    };
    let report = AccuracyReport::from_matrix(matrix);
    tracing::info!(
        period = %raster.period,
        samples = report.samples,
        overall = report.overall_accuracy,
        kappa = report.kappa,
        quality = %report.quality,
        "accuracy assessed"
    );
    Ok(Accuracy::Measured(report))
}

/// Palette rendering of a classified raster, one colour per ordinal.
pub fn classification_vis() -> VisParams {
    let palette: Vec<&str> = ClassLabel::ALL.iter().map(|l| l.color()).collect();
    VisParams::categorical(0, ClassLabel::ALL.len() as i32 - 1, &palette)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_has_no_report() {
        let a = Accuracy::Unavailable(UnavailableReason::NoValidationSet);
        assert!(a.report().is_none());
    }

    #[test]
    fn classification_palette_covers_all_labels() {
        let vis = classification_vis();
        assert_eq!(vis.palette.len(), 7);
        assert_eq!(vis.min, 0.0);
        assert_eq!(vis.max, 6.0);
        assert_eq!(vis.palette[0], ClassLabel::Forest.color());
    }
}
