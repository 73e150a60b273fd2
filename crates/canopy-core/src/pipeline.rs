//! End-to-end analysis: both periods, then the change and area stages.
//!
//! The periods are independent until the change model joins them. A failure
//! in one period is kept in its slot of [`AnalysisOutcome`] and never stops
//! the other; join stages run only when both inputs succeeded.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::area::{self, ParcelReport};
use crate::change::{self, ChangeClass, ChangeRaster};
use crate::classify::{self, classification_vis, Accuracy, ClassifiedRaster};
use crate::config::AnalysisConfig;
use crate::error::{CanopyError, Result};
use crate::features::{build_features, true_color_vis};
use crate::geometry::ProviderGeometry;
use crate::provider::{DownloadRequest, EarthObservationProvider};
use crate::samples::{build_sample_sets, ClassLabel, Period, SampleCollection, SplitPolicy};
use crate::scene::{Scene, SceneSelector};
use crate::session::{AnalysisSession, SPARSE_CLASS_THRESHOLD};

/// Scenes closer together than this many days draw a warning.
pub const SHORT_INTERVAL_DAYS: i64 = 30;

/// Conditions worth surfacing that do not stop the analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AnalysisWarning {
    SparseClass {
        period: Period,
        label: ClassLabel,
        count: usize,
    },
    ShortInterval {
        days: i64,
    },
}

/// Everything produced for one period.
#[derive(Debug, Clone)]
pub struct PeriodResult {
    pub period: Period,
    pub scene: Scene,
    pub policy: SplitPolicy,
    pub training_points: usize,
    pub validation_points: usize,
    pub classified: ClassifiedRaster,
    pub accuracy: Accuracy,
    pub class_areas_ha: BTreeMap<ClassLabel, f64>,
    pub true_color_url: String,
    pub classification_url: String,
    pub download_url: String,
}

#[derive(Debug, Clone)]
pub struct ChangeSummary {
    pub raster: ChangeRaster,
    pub areas_ha: BTreeMap<ChangeClass, f64>,
    /// Days between the two target dates.
    pub interval_days: i64,
    pub annual_deforestation_ha: Option<f64>,
    pub thumbnail_url: String,
    pub download_url: String,
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub anterior: Result<PeriodResult>,
    pub posterior: Result<PeriodResult>,
    /// None unless both periods succeeded.
    pub change: Option<Result<ChangeSummary>>,
    /// None unless the change stage succeeded and parcels were supplied.
    pub parcels: Option<Result<ParcelReport>>,
    pub warnings: Vec<AnalysisWarning>,
}

impl AnalysisOutcome {
    pub fn period(&self, period: Period) -> &Result<PeriodResult> {
        match period {
            Period::Anterior => &self.anterior,
            Period::Posterior => &self.posterior,
        }
    }
}

/// Scene search through accuracy assessment for one period.
pub fn run_period<P>(
    provider: &P,
    config: &AnalysisConfig,
    region: &ProviderGeometry,
    samples: &SampleCollection,
    period: Period,
) -> Result<PeriodResult>
where
    P: EarthObservationProvider + ?Sized,
{
    let target = match period {
        Period::Anterior => config.anterior_date,
        Period::Posterior => config.posterior_date,
    };
    let span = tracing::info_span!("period", %period, %target);
    let _enter = span.enter();

    let scene = SceneSelector::new(provider, &config.search).select(target, region, config.max_cloud_percent)?;
    let stack = build_features(provider, &scene)?;
    let sets = build_sample_sets(samples, period)?;
    let classified = classify::train(provider, &sets, &stack, region, &config.random_forest, config.scale_m)?;
    let accuracy = classify::validate(provider, &classified, sets.validation.as_ref(), config.scale_m)?;
    let class_areas_ha = area::global_class_areas(provider, &classified, region, config.scale_m)?;

    let true_color_url = provider.thumbnail_url(&stack.handle, &true_color_vis(stack.sensor))?;
    let classification_url = provider.thumbnail_url(&classified.handle, &classification_vis())?;
    let download_url = provider.download_url(
        &classified.handle,
        &DownloadRequest {
            name: format!("classificacao_{period}_{}", scene.acquired),
            region: region.polygons().clone(),
            scale_m: config.scale_m,
            crs: config.export.crs.clone(),
        },
    )?;

    Ok(PeriodResult {
        period,
        policy: sets.policy,
        training_points: sets.training.features.len(),
        validation_points: sets.validation.as_ref().map_or(0, |v| v.features.len()),
        scene,
        classified,
        accuracy,
        class_areas_ha,
        true_color_url,
        classification_url,
        download_url,
    })
}

fn run_change<P>(
    provider: &P,
    config: &AnalysisConfig,
    region: &ProviderGeometry,
    prior: &PeriodResult,
    posterior: &PeriodResult,
    warnings: &mut Vec<AnalysisWarning>,
) -> Result<ChangeSummary>
where
    P: EarthObservationProvider + ?Sized,
{
    let (a, b) = (prior.scene.acquired, posterior.scene.acquired);
    if a == b {
        return Err(CanopyError::IdenticalAcquisitionDates { date: a });
    }
    let days = (b - a).num_days().abs();
    if days < SHORT_INTERVAL_DAYS {
        tracing::warn!(days, "scenes are less than {SHORT_INTERVAL_DAYS} days apart, change may be minimal");
        warnings.push(AnalysisWarning::ShortInterval { days });
    }

    let raster = change::reduce(provider, &prior.classified, &posterior.classified, region)?;
    let areas_ha = area::global_change_areas(provider, &raster, region, config.scale_m)?;
    let interval_days = config.interval_days();
    let deforested = areas_ha.get(&ChangeClass::Di).copied().unwrap_or(0.0);
    let annual_deforestation_ha = change::annual_deforestation_rate(deforested, interval_days);

    let thumbnail_url = provider.thumbnail_url(&raster.handle, &change::change_vis())?;
    let download_url = provider.download_url(
        &raster.handle,
        &DownloadRequest {
            name: format!("mudanca_{a}_{b}"),
            region: region.polygons().clone(),
            scale_m: config.scale_m,
            crs: config.export.crs.clone(),
        },
    )?;

    Ok(ChangeSummary {
        raster,
        areas_ha,
        interval_days,
        annual_deforestation_ha,
        thumbnail_url,
        download_url,
    })
}

/// Run the whole analysis for a session.
///
/// Returns `Err` only when the analysis cannot start (bad config, no
/// region). Stage failures are reported inside the outcome.
pub fn run_analysis<P>(provider: &P, session: &AnalysisSession, config: &AnalysisConfig) -> Result<AnalysisOutcome>
where
    P: EarthObservationProvider + ?Sized,
{
    config.validate()?;
    let region = session.region()?;

    let mut warnings: Vec<AnalysisWarning> = session
        .sparse_classes()
        .into_iter()
        .map(|(period, label, count)| {
            tracing::warn!(%period, %label, count, "class has fewer than {SPARSE_CLASS_THRESHOLD} samples");
            AnalysisWarning::SparseClass { period, label, count }
        })
        .collect();

    let anterior_samples = session.samples(Period::Anterior);
    let posterior_samples = session.samples(Period::Posterior);

    #[cfg(feature = "threading")]
    let (anterior, posterior) = rayon::join(
        || run_period(provider, config, &region, anterior_samples, Period::Anterior),
        || run_period(provider, config, &region, posterior_samples, Period::Posterior),
    );
    #[cfg(not(feature = "threading"))]
    let (anterior, posterior) = (
        run_period(provider, config, &region, anterior_samples, Period::Anterior),
        run_period(provider, config, &region, posterior_samples, Period::Posterior),
    );

    for (period, result) in [(Period::Anterior, &anterior), (Period::Posterior, &posterior)] {
        if let Err(err) = result {
            tracing::error!(%period, %err, "period failed");
        }
    }

    let change = match (&anterior, &posterior) {
        (Ok(a), Ok(b)) => Some(run_change(provider, config, &region, a, b, &mut warnings)),
        _ => None,
    };

    let parcels = match (&anterior, &change) {
        (Ok(a), Some(Ok(c))) if !session.parcels().is_empty() => Some(area::parcel_report(
            provider,
            &a.classified,
            &c.raster,
            session.parcels(),
            config.scale_m,
        )),
        _ => None,
    };

    Ok(AnalysisOutcome {
        anterior,
        posterior,
        change,
        parcels,
        warnings,
    })
}
