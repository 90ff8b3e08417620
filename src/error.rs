//! Engine error taxonomy
//!
//! All engine-level failures are local, non-recoverable validation errors:
//! the engine fails fast with the identity of the offending dataset rather
//! than substituting sentinel values or silently narrowing an ensemble.

use thiserror::Error;

/// Validation failures raised by the ensemble engine.
///
/// Every variant carries the dataset name so a caller can tell which stage
/// of a multi-dataset pipeline failed. I/O and lower-level Polars errors
/// propagate separately through `anyhow` with context strings.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A realization or time axis does not match an assumed invariant
    /// (e.g. the matcher was handed a control slice with the wrong
    /// realization set, or two fields failed exact alignment).
    #[error("shape mismatch in dataset '{dataset}': {detail}")]
    ShapeMismatch { dataset: String, detail: String },

    /// A year-range or location filter matched zero timestamps/points.
    #[error("empty selection in dataset '{dataset}': {detail}")]
    EmptySelection { dataset: String, detail: String },

    /// A trend regression had fewer than 2 distinct predictor points.
    #[error("degenerate trend fit in dataset '{dataset}': {detail}")]
    DegenerateFit { dataset: String, detail: String },

    /// An expected variable is absent from an input dataset.
    #[error("missing field '{field}' in dataset '{dataset}'")]
    MissingField { dataset: String, field: String },
}

impl EngineError {
    pub fn shape_mismatch(dataset: &str, detail: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            dataset: dataset.to_string(),
            detail: detail.into(),
        }
    }

    pub fn empty_selection(dataset: &str, detail: impl Into<String>) -> Self {
        Self::EmptySelection {
            dataset: dataset.to_string(),
            detail: detail.into(),
        }
    }

    pub fn degenerate_fit(dataset: &str, detail: impl Into<String>) -> Self {
        Self::DegenerateFit {
            dataset: dataset.to_string(),
            detail: detail.into(),
        }
    }

    pub fn missing_field(dataset: &str, field: impl Into<String>) -> Self {
        Self::MissingField {
            dataset: dataset.to_string(),
            field: field.into(),
        }
    }
}
