//! Run configuration
//!
//! Every engine call receives an explicit [`RunConfig`] instead of relying
//! on caller-specific literals: the before/after comparison windows, the
//! change thresholds, and the ensemble branch factor are all declared in
//! one place and validated up front, so the engines can assume disjoint,
//! non-empty windows.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Explicit configuration for one comparison campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Calendar years of the pre-intervention window (ordered set).
    #[serde(default = "default_before_years")]
    pub before_years: Vec<i32>,

    /// Calendar years of the post-branch comparison window (ordered set).
    #[serde(default = "default_after_years")]
    pub after_years: Vec<i32>,

    /// Change thresholds (days/year) for crossing fractions, ordered.
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<f64>,

    /// Ratio of intervention-ensemble size to the control realizations it
    /// branched from (2 in the default campaign: 10 feedback from 5).
    #[serde(default = "default_branch_factor")]
    pub branch_factor: usize,

    /// Optional display ordering of realizations in example artifacts.
    /// Defaults to interleaving branches with their parents.
    #[serde(default)]
    pub realization_order: Option<Vec<i64>>,
}

fn default_before_years() -> Vec<i32> {
    (2025..2035).collect()
}

fn default_after_years() -> Vec<i32> {
    (2035..2045).collect()
}

fn default_thresholds() -> Vec<f64> {
    vec![1.0, 15.0, 30.0]
}

fn default_branch_factor() -> usize {
    2
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            before_years: default_before_years(),
            after_years: default_after_years(),
            thresholds: default_thresholds(),
            branch_factor: default_branch_factor(),
            realization_order: None,
        }
    }
}

impl RunConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run config: {:?}", path))?;
        let config: RunConfig =
            serde_json::from_str(&contents).with_context(|| "Failed to parse run config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field invariants the engines rely on.
    ///
    /// - both year windows are non-empty, strictly increasing sets
    /// - the windows do not overlap
    /// - thresholds are strictly increasing and non-empty
    /// - branch factor is positive
    pub fn validate(&self) -> Result<()> {
        validate_year_window("before_years", &self.before_years)?;
        validate_year_window("after_years", &self.after_years)?;
        if let Some(overlap) = self
            .before_years
            .iter()
            .find(|y| self.after_years.contains(y))
        {
            bail!(
                "before_years and after_years overlap at {}; comparison windows must be disjoint",
                overlap
            );
        }
        if self.thresholds.is_empty() {
            bail!("thresholds must not be empty");
        }
        if self.thresholds.windows(2).any(|w| w[1] <= w[0]) {
            bail!("thresholds must be strictly increasing: {:?}", self.thresholds);
        }
        if self.branch_factor == 0 {
            bail!("branch_factor must be positive");
        }
        Ok(())
    }
}

fn validate_year_window(name: &str, years: &[i32]) -> Result<()> {
    if years.is_empty() {
        bail!("{} must not be empty", name);
    }
    if years.windows(2).any(|w| w[1] <= w[0]) {
        bail!("{} must be a strictly increasing year set: {:?}", name, years);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_campaign() {
        let config = RunConfig::default();
        assert_eq!(config.before_years, (2025..2035).collect::<Vec<_>>());
        assert_eq!(config.after_years, (2035..2045).collect::<Vec<_>>());
        assert_eq!(config.thresholds, vec![1.0, 15.0, 30.0]);
        assert_eq!(config.branch_factor, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlapping_windows_rejected() {
        let config = RunConfig {
            before_years: vec![2025, 2026, 2035],
            ..RunConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("overlap"));
    }

    #[test]
    fn test_unsorted_thresholds_rejected() {
        let config = RunConfig {
            thresholds: vec![15.0, 1.0],
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_json_fills_defaults() {
        let config: RunConfig = serde_json::from_str(r#"{"branch_factor": 3}"#).unwrap();
        assert_eq!(config.branch_factor, 3);
        assert_eq!(config.thresholds, vec![1.0, 15.0, 30.0]);
    }
}
