//! Comparison engine
//!
//! Scalar-per-location (or per-realization-per-location) statistics
//! between temporal windows and scenarios: window means, aligned
//! differences, threshold-crossing fractions, and the shared symmetric
//! range used when related difference panels are rendered on one
//! diverging scale. Every operation takes datasets/fields in and returns
//! a new frame; inputs are never mutated.

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::dataset::{align_exact, EnsembleDataset, COL_REALIZATION};
use crate::error::EngineError;

/// Output column of [`threshold_fraction`].
pub const FIELD_PERCENT_INCREASING: &str = "percent_realizations_increasing";
pub const COL_THRESHOLD: &str = "threshold";

/// Which axes a temporal-window mean reduces over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowReduction {
    /// Mean over `time` only: one value per (realization, location).
    PerRealization,
    /// Mean over `time` and `realization`: one value per location.
    PooledRealizations,
}

/// Mean of `field` over the timestamps whose calendar year is in `years`.
///
/// Returns a frame keyed by the surviving coordinate columns (spatial
/// axes, plus `realization` for [`WindowReduction::PerRealization`]),
/// sorted by key for deterministic output. An empty year intersection
/// fails inside `select_years` with `EmptySelection`.
pub fn window_mean(
    dataset: &EnsembleDataset,
    field: &str,
    years: &[i32],
    reduction: WindowReduction,
) -> Result<DataFrame> {
    dataset.require_field(field)?;
    let window = dataset.select_years(years)?;

    let mut keys: Vec<String> = Vec::new();
    if reduction == WindowReduction::PerRealization {
        keys.push(COL_REALIZATION.to_string());
    }
    keys.extend(window.spatial_cols().iter().cloned());

    grouped_mean(window.frame(), field, &keys, dataset.name())
}

/// Group mean of one value column over explicit keys. Keys may be empty
/// (full reduction to a single row).
fn grouped_mean(frame: &DataFrame, field: &str, keys: &[String], dataset: &str) -> Result<DataFrame> {
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(k.as_str())).collect();
    let lazy = frame.clone().lazy();
    let reduced = if key_exprs.is_empty() {
        lazy.select(&[col(field).mean().alias(field)]).collect()
    } else {
        lazy.group_by(&key_exprs)
            .agg([col(field).mean().alias(field)])
            .sort_by_exprs(&key_exprs, Default::default())
            .collect()
    }
    .with_context(|| format!("{}: window mean of '{}'", dataset, field))?;
    Ok(reduced)
}

/// Pointwise `minuend - subtrahend` of two window-mean fields.
///
/// Both frames must carry `value_col` plus exactly the columns in `keys`;
/// alignment is an explicit inner join on `keys` that fails with
/// `ShapeMismatch` on partial coordinate overlap (no implicit label
/// broadcasting). The result holds `keys` plus a column named `out_name`.
/// Antisymmetric by construction: swapping the operands negates it.
pub fn window_difference(
    minuend: &DataFrame,
    subtrahend: &DataFrame,
    keys: &[String],
    value_col: &str,
    out_name: &str,
    dataset: &str,
) -> Result<DataFrame> {
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(k.as_str())).collect();

    let mut lhs_exprs = key_exprs.clone();
    lhs_exprs.push(col(value_col).alias("__minuend"));
    let lhs = minuend.clone().lazy().select(&lhs_exprs).collect()?;

    let mut rhs_exprs = key_exprs.clone();
    rhs_exprs.push(col(value_col).alias("__subtrahend"));
    let rhs = subtrahend.clone().lazy().select(&rhs_exprs).collect()?;

    let mut out_exprs = key_exprs.clone();
    out_exprs.push((col("__minuend") - col("__subtrahend")).alias(out_name));

    let diff = align_exact(&lhs, &rhs, keys, dataset)?
        .lazy()
        .select(&out_exprs)
        .sort_by_exprs(&key_exprs, Default::default())
        .collect()
        .with_context(|| format!("{}: window difference '{}'", dataset, out_name))?;
    Ok(diff)
}

/// Percentage of realizations whose change meets or exceeds each
/// threshold (inclusive `>=`), per location and threshold.
///
/// `change` must carry a `realization` column plus `value_col`
/// (`MissingField` otherwise); `spatial_keys` names the location axes.
/// Output is keyed by (spatial axes..., `threshold`) and is monotonically
/// non-increasing in the threshold for a fixed location.
pub fn threshold_fraction(
    change: &DataFrame,
    spatial_keys: &[String],
    value_col: &str,
    thresholds: &[f64],
    dataset: &str,
) -> Result<DataFrame> {
    if change.column(COL_REALIZATION).is_err() {
        return Err(EngineError::missing_field(dataset, COL_REALIZATION).into());
    }
    if change.column(value_col).is_err() {
        return Err(EngineError::missing_field(dataset, value_col).into());
    }
    if change.height() == 0 {
        return Err(EngineError::empty_selection(dataset, "no change values").into());
    }

    let key_exprs: Vec<Expr> = spatial_keys.iter().map(|k| col(k.as_str())).collect();
    let mut per_threshold: Option<DataFrame> = None;

    for &threshold in thresholds {
        let crossing = (col(value_col).gt_eq(lit(threshold)))
            .cast(DataType::Float64)
            .mean()
            * lit(100.0);
        let lazy = change.clone().lazy();
        let fraction = if key_exprs.is_empty() {
            lazy.select(&[crossing.alias(FIELD_PERCENT_INCREASING)])
        } else {
            lazy.group_by(&key_exprs)
                .agg([crossing.alias(FIELD_PERCENT_INCREASING)])
                .sort_by_exprs(&key_exprs, Default::default())
        }
        .with_column(lit(threshold).alias(COL_THRESHOLD))
        .collect()
        .with_context(|| format!("{}: threshold fraction at {}", dataset, threshold))?;

        per_threshold = Some(match per_threshold {
            Some(acc) => acc.vstack(&fraction)?,
            None => fraction,
        });
    }

    per_threshold
        .ok_or_else(|| EngineError::empty_selection(dataset, "no thresholds requested").into())
}

/// Maximum absolute value across a set of difference fields.
///
/// Related difference panels rendered with a diverging color scale must
/// share one symmetric value range; this computes that range across all
/// of them. Nulls are ignored; an all-null input fails with
/// `EmptySelection`.
pub fn symmetric_range(fields: &[(&DataFrame, &str)], dataset: &str) -> Result<f64> {
    let mut max_abs: Option<f64> = None;
    for (frame, column) in fields {
        let values = frame
            .column(column)
            .map_err(|_| EngineError::missing_field(dataset, *column))?
            .f64()
            .with_context(|| format!("{}: field '{}' is not Float64", dataset, column))?;
        for value in values.into_iter().flatten() {
            let abs = value.abs();
            if max_abs.map_or(true, |m| abs > m) {
                max_abs = Some(abs);
            }
        }
    }
    max_abs.ok_or_else(|| {
        EngineError::empty_selection(dataset, "no values in difference fields").into()
    })
}
