//! Analysis configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Loaded from JSON.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CanopyError, Result};
use crate::samples::ImportBounds;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub anterior_date: NaiveDate,
    pub posterior_date: NaiveDate,
    /// Scenes at or above this cloud percentage are never considered.
    pub max_cloud_percent: f64,
    /// Sampling and reduction scale, metres.
    pub scale_m: f64,
    pub search: SearchConfig,
    pub random_forest: RandomForestParams,
    pub export: ExportConfig,
    pub import_bounds: ImportBounds,
    pub provider: ProviderConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            anterior_date: NaiveDate::from_ymd_opt(2008, 7, 1).unwrap_or_default(),
            posterior_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap_or_default(),
            max_cloud_percent: 50.0,
            scale_m: 30.0,
            search: SearchConfig::default(),
            random_forest: RandomForestParams::default(),
            export: ExportConfig::default(),
            import_bounds: ImportBounds::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.anterior_date >= self.posterior_date {
            return Err(CanopyError::InvalidDateRange {
                anterior: self.anterior_date,
                posterior: self.posterior_date,
            });
        }
        if !(self.max_cloud_percent > 0.0 && self.max_cloud_percent <= 100.0) {
            return Err(CanopyError::Config(format!(
                "max_cloud_percent must be in (0, 100], got {}",
                self.max_cloud_percent
            )));
        }
        if !(self.scale_m > 0.0) {
            return Err(CanopyError::Config(format!("scale_m must be positive, got {}", self.scale_m)));
        }
        self.search.validate()?;
        self.random_forest.validate()?;
        if self.provider.request_timeout_secs == 0 {
            return Err(CanopyError::Config("provider.request_timeout_secs must be non-zero".into()));
        }
        Ok(())
    }

    /// Days between the two target dates.
    pub fn interval_days(&self) -> i64 {
        (self.posterior_date - self.anterior_date).num_days()
    }
}

/// Scene search window and candidate limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub months_before: u32,
    pub months_after: u32,
    pub primary_candidates: usize,
    pub fallback_candidates: usize,
    /// Footprint containment tolerance, metres.
    pub max_error_m: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            months_before: 6,
            months_after: 12,
            primary_candidates: 10,
            fallback_candidates: 20,
            max_error_m: 100.0,
        }
    }
}

impl SearchConfig {
    fn validate(&self) -> Result<()> {
        if self.primary_candidates == 0 || self.fallback_candidates == 0 {
            return Err(CanopyError::Config("search candidate limits must be non-zero".into()));
        }
        if self.max_error_m < 0.0 {
            return Err(CanopyError::Config("search.max_error_m must not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    pub n_trees: usize,
    pub min_leaf_population: usize,
    pub bag_fraction: f64,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            min_leaf_population: 5,
            bag_fraction: 0.5,
            seed: 0,
        }
    }
}

impl RandomForestParams {
    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(CanopyError::Config("random_forest.n_trees must be non-zero".into()));
        }
        if !(self.bag_fraction > 0.0 && self.bag_fraction <= 1.0) {
            return Err(CanopyError::Config(format!(
                "random_forest.bag_fraction must be in (0, 1], got {}",
                self.bag_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub crs: String,
    /// Period tag in the per-class column headers, e.g. `Floresta_2008_ha`.
    pub class_column_tag: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            crs: "EPSG:4674".into(),
            class_column_tag: "2008".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { request_timeout_secs: 300 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = AnalysisConfig::default();
        c.validate().unwrap();
        assert_eq!(c.max_cloud_percent, 50.0);
        assert_eq!(c.random_forest.n_trees, 50);
        assert_eq!(c.search.primary_candidates, 10);
        assert_eq!(c.export.crs, "EPSG:4674");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = AnalysisConfig::from_json_str(
            r#"{"anterior_date": "2010-01-15", "search": {"max_error_m": 250.0}}"#,
        )
        .unwrap();
        assert_eq!(c.anterior_date, NaiveDate::from_ymd_opt(2010, 1, 15).unwrap());
        assert_eq!(c.search.max_error_m, 250.0);
        assert_eq!(c.search.fallback_candidates, 20);
        assert_eq!(c.scale_m, 30.0);
    }

    #[test]
    fn reversed_dates_rejected() {
        let err = AnalysisConfig::from_json_str(
            r#"{"anterior_date": "2020-01-01", "posterior_date": "2019-01-01"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CanopyError::InvalidDateRange { .. }));
    }

    #[test]
    fn bad_bag_fraction_rejected() {
        let err = AnalysisConfig::from_json_str(r#"{"random_forest": {"bag_fraction": 0.0}}"#)
            .unwrap_err();
        assert!(matches!(err, CanopyError::Config(_)));
    }

    #[test]
    fn interval_days_between_defaults() {
        let c = AnalysisConfig::default();
        assert_eq!(c.interval_days(), 6240);
    }
}
