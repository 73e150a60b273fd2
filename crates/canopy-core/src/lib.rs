//! Land-cover change analysis core.
//!
//! Pipeline:
//!   geometry::sanitize → scene::SceneSelector → features::build_features →
//!   samples::build_sample_sets → classify::{train, validate} (one per period) →
//!   change::reduce → area::{global_areas, parcel_report}.
//!
//! All pixel work is delegated to an [`provider::EarthObservationProvider`];
//! `provider::local` ships an in-memory backend used by tests and the CLI.

pub mod area;
pub mod change;
pub mod classify;
pub mod config;
pub mod error;
pub mod features;
pub mod geometry;
pub mod pipeline;
pub mod provider;
pub mod raster;
pub mod samples;
pub mod scene;
pub mod session;

pub use config::AnalysisConfig;
pub use error::{CanopyError, Result};
pub use pipeline::{run_analysis, AnalysisOutcome};
pub use session::AnalysisSession;
