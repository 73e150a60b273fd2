use chrono::NaiveDate;
use thiserror::Error;

use crate::samples::Period;

/// Every failure the analysis core can surface.
///
/// Degraded-but-valid states (no validation set, no accuracy) are not errors;
/// see [`crate::classify::Accuracy`].
#[derive(Debug, Error)]
pub enum CanopyError {
    #[error("no scene or mosaic covers the region for {target} (searched {collections:?})")]
    NoCoverageFound {
        target: NaiveDate,
        collections: Vec<String>,
    },

    #[error("{period}: {populated} populated class(es), at least 2 are required")]
    InsufficientClasses { period: Period, populated: usize },

    #[error("{period}: the train/validation split left the validation set empty, collect more samples")]
    EmptyValidation { period: Period },

    #[error("{period}: no training pixels could be extracted, samples fall outside the imagery")]
    NoTrainingPixels { period: Period },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("provider call `{operation}` failed: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },

    #[error("anterior date {anterior} must be earlier than posterior date {posterior}")]
    InvalidDateRange {
        anterior: NaiveDate,
        posterior: NaiveDate,
    },

    #[error("both periods resolved to scenes acquired on {date}, pick different target dates")]
    IdenticalAcquisitionDates { date: NaiveDate },

    #[error("no region of interest has been set for this session")]
    MissingRegion,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl CanopyError {
    /// Shorthand used by provider implementations.
    pub fn provider(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            operation,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CanopyError>;
