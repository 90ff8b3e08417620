//! Ensemble comparison engine
//!
//! Aligns control and intervention climate-epidemiology ensembles and
//! reduces them to the statistical summary artifacts the presentation
//! layer consumes:
//! - `dataset`: the long-format ensemble container and selection ops
//! - `matcher`: branched-realization matching of before/after windows
//! - `compare`: window means, scenario differences, threshold fractions
//! - `trend`: per-realization linear trend fits over time
//! - `export`: persisted summary artifacts (Parquet + attrs manifest)
//! - `pipeline`: the named figure-data artifact builders
//!
//! `io`, `model` and `synthetic` supply the edges: chunked input
//! loading, the suitability-model seam and deterministic test data.

pub mod compare;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod io;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod synthetic;
pub mod trend;
pub mod utils;

// Re-export commonly used types
pub use config::RunConfig;
pub use dataset::{EnsembleDataset, NamedLocation, FIELD_SUITABILITY};
pub use error::EngineError;
pub use export::{ArtifactAttrs, SummaryArtifact};
pub use matcher::BranchMapping;
pub use pipeline::FigureData;
