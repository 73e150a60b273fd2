//! Adaptive train/validation split of a period's sample points.
//!
//! Split policy from the smallest populated class:
//!   < 6   → no split, every point trains, no validation set
//!   6..10 → 80 % train / 20 % validation
//!   ≥ 10  → 70 % train / 30 % validation
//!
//! Each point draws one uniform value in [0, 1) from a generator seeded per
//! period and goes to training when the value is below the train fraction.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::collection::SampleCollection;
use super::label::{ClassLabel, Period};
use crate::error::{CanopyError, Result};
use crate::geometry::LonLat;
use crate::provider::LabeledRegion;

/// Training points are widened to this radius before pixel extraction.
pub const TRAINING_BUFFER_M: f64 = 30.0;
const BUFFER_SEGMENTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SplitPolicy {
    /// All points train; accuracy cannot be measured.
    NoSplit,
    /// Fraction of points assigned to training.
    Holdout(f64),
}

impl SplitPolicy {
    pub fn for_min_class_size(min_class_size: usize) -> Self {
        if min_class_size < 6 {
            SplitPolicy::NoSplit
        } else if min_class_size < 10 {
            SplitPolicy::Holdout(0.8)
        } else {
            SplitPolicy::Holdout(0.7)
        }
    }

    pub fn train_fraction(&self) -> Option<f64> {
        match *self {
            SplitPolicy::NoSplit => None,
            SplitPolicy::Holdout(f) => Some(f),
        }
    }
}

/// A labelled sample point carrying its class ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointFeature {
    pub location: LonLat,
    pub class: u8,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub features: Vec<PointFeature>,
}

impl TrainingSet {
    /// Points widened to [`TRAINING_BUFFER_M`] circles for pixel extraction.
    pub fn regions(&self) -> Vec<LabeledRegion> {
        self.features
            .iter()
            .map(|f| LabeledRegion {
                geometry: f.location.buffer(TRAINING_BUFFER_M, BUFFER_SEGMENTS),
                class: f.class,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationSet {
    pub features: Vec<PointFeature>,
}

/// Output of [`build_sample_sets`].
#[derive(Debug, Clone)]
pub struct SampleSets {
    pub period: Period,
    pub policy: SplitPolicy,
    pub training: TrainingSet,
    /// Absent when the policy is [`SplitPolicy::NoSplit`].
    pub validation: Option<ValidationSet>,
    /// Ordinal → label, only for labels with at least one sample.
    pub class_names: BTreeMap<u8, ClassLabel>,
}

/// Build the training/validation sets for `period` with its fixed seed.
pub fn build_sample_sets(collection: &SampleCollection, period: Period) -> Result<SampleSets> {
    let mut rng = StdRng::seed_from_u64(period.split_seed());
    build_sample_sets_with(collection, period, &mut rng)
}

/// As [`build_sample_sets`], drawing split values from `rng`.
pub fn build_sample_sets_with<R: Rng>(
    collection: &SampleCollection,
    period: Period,
    rng: &mut R,
) -> Result<SampleSets> {
    let populated = collection.populated();
    if populated.len() < 2 {
        return Err(CanopyError::InsufficientClasses {
            period,
            populated: populated.len(),
        });
    }

    let class_names: BTreeMap<u8, ClassLabel> =
        populated.iter().map(|&l| (l.ordinal(), l)).collect();

    let features: Vec<PointFeature> = collection
        .iter()
        .map(|(label, location)| PointFeature {
            location,
            class: label.ordinal(),
        })
        .collect();

    let min_class_size = collection.min_class_size();
    let policy = SplitPolicy::for_min_class_size(min_class_size);

    let (training, validation) = match policy.train_fraction() {
        None => {
            tracing::warn!(
                %period,
                min_class_size,
                "fewer than 6 samples in some class, training on all points without validation"
            );
            (TrainingSet { features }, None)
        }
        Some(fraction) => {
            let mut train = Vec::new();
            let mut validate = Vec::new();
            for f in features {
                if rng.gen::<f64>() < fraction {
                    train.push(f);
                } else {
                    validate.push(f);
                }
            }
            if validate.is_empty() {
                return Err(CanopyError::EmptyValidation { period });
            }
            (
                TrainingSet { features: train },
                Some(ValidationSet { features: validate }),
            )
        }
    };

    tracing::info!(
        %period,
        ?policy,
        training = training.features.len(),
        validation = validation.as_ref().map_or(0, |v| v.features.len()),
        "sample sets built"
    );

    Ok(SampleSets {
        period,
        policy,
        training,
        validation,
        class_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn collection(counts: &[(ClassLabel, usize)]) -> SampleCollection {
        let mut c = SampleCollection::new();
        for &(label, n) in counts {
            for i in 0..n {
                c.add(label, LonLat::new(-62.0 + i as f64 * 1e-3, -9.0 - label.ordinal() as f64 * 1e-3));
            }
        }
        c
    }

    #[test]
    fn split_thresholds() {
        assert_eq!(SplitPolicy::for_min_class_size(4), SplitPolicy::NoSplit);
        assert_eq!(SplitPolicy::for_min_class_size(5), SplitPolicy::NoSplit);
        assert_eq!(SplitPolicy::for_min_class_size(6), SplitPolicy::Holdout(0.8));
        assert_eq!(SplitPolicy::for_min_class_size(9), SplitPolicy::Holdout(0.8));
        assert_eq!(SplitPolicy::for_min_class_size(10), SplitPolicy::Holdout(0.7));
        assert_eq!(SplitPolicy::for_min_class_size(250), SplitPolicy::Holdout(0.7));
    }

    #[test]
    fn only_forest_is_insufficient() {
        let c = collection(&[(ClassLabel::Forest, 20)]);
        let err = build_sample_sets(&c, Period::Anterior).unwrap_err();
        assert!(matches!(
            err,
            CanopyError::InsufficientClasses { populated: 1, .. }
        ));
    }

    #[test]
    fn small_classes_train_on_everything() {
        let c = collection(&[(ClassLabel::Forest, 4), (ClassLabel::Pasture, 12)]);
        let sets = build_sample_sets(&c, Period::Anterior).unwrap();
        assert_eq!(sets.policy, SplitPolicy::NoSplit);
        assert!(sets.validation.is_none());
        assert_eq!(sets.training.features.len(), 16);
    }

    #[test]
    fn split_is_disjoint_and_complete() {
        let c = collection(&[(ClassLabel::Forest, 30), (ClassLabel::Water, 25)]);
        let sets = build_sample_sets(&c, Period::Posterior).unwrap();
        let validation = sets.validation.as_ref().unwrap();
        assert_eq!(sets.policy, SplitPolicy::Holdout(0.7));
        assert_eq!(sets.training.features.len() + validation.features.len(), 55);
        for v in &validation.features {
            assert!(!sets.training.features.contains(v));
        }
    }

    #[test]
    fn split_is_reproducible_per_period() {
        let c = collection(&[(ClassLabel::Forest, 30), (ClassLabel::Pasture, 30)]);
        let a = build_sample_sets(&c, Period::Anterior).unwrap();
        let b = build_sample_sets(&c, Period::Anterior).unwrap();
        assert_eq!(a.training.features, b.training.features);
    }

    #[test]
    fn all_points_drawn_below_fraction_is_empty_validation() {
        let c = collection(&[(ClassLabel::Forest, 8), (ClassLabel::Pasture, 8)]);
        // StepRng(0, 0) always yields 0 → every draw is 0.0 → all train.
        let mut rng = StepRng::new(0, 0);
        let err = build_sample_sets_with(&c, Period::Anterior, &mut rng).unwrap_err();
        assert!(matches!(err, CanopyError::EmptyValidation { period: Period::Anterior }));
    }

    #[test]
    fn ordinals_stable_across_collections() {
        let a = collection(&[(ClassLabel::Forest, 3), (ClassLabel::Water, 3)]);
        let b = collection(&[(ClassLabel::Water, 3), (ClassLabel::Agriculture, 3)]);
        let sa = build_sample_sets(&a, Period::Anterior).unwrap();
        let sb = build_sample_sets(&b, Period::Posterior).unwrap();
        let water = ClassLabel::Water.ordinal();
        assert_eq!(sa.class_names.get(&water), Some(&ClassLabel::Water));
        assert_eq!(sb.class_names.get(&water), Some(&ClassLabel::Water));
        assert!(!sa.class_names.contains_key(&ClassLabel::Agriculture.ordinal()));
        assert!(sb.training.features.iter().any(|f| f.class == 6));
    }

    #[test]
    fn training_regions_are_buffered() {
        let c = collection(&[(ClassLabel::Forest, 2), (ClassLabel::Pasture, 2)]);
        let sets = build_sample_sets(&c, Period::Anterior).unwrap();
        let regions = sets.training.regions();
        assert_eq!(regions.len(), 4);
        assert_eq!(regions[0].geometry.exterior().0.len(), BUFFER_SEGMENTS + 1);
    }
}
