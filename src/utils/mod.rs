//! Utility modules for the ensemble engine
//!
//! Contains shared functionality used across the engine modules:
//! - Frame helpers: Safe LazyFrame materialization and masked filtering
//!   with column validation
//! - Time helpers: proleptic-Gregorian conversions between epoch days and
//!   calendar years (the engine stores `time` as days since 1970-01-01)

pub mod frame;
pub mod time;

// Re-export commonly used helpers
pub use frame::{filter_by_i64_set, filter_by_str_set, materialize_with_columns};
pub use time::{epoch_day, year_of_epoch_day};
