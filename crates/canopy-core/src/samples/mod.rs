pub mod collection;
pub mod import;
pub mod label;
pub mod split;

pub use collection::SampleCollection;
pub use import::{import_samples, ImportBounds, ImportIssue, ImportSummary};
pub use label::{ClassLabel, Period};
pub use split::{
    build_sample_sets, build_sample_sets_with, PointFeature, SampleSets, SplitPolicy,
    TrainingSet, ValidationSet, TRAINING_BUFFER_M,
};
