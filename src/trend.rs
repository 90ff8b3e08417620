//! Trend engine
//!
//! Extracts a smooth representative trajectory from a noisy ensemble by
//! ordinary least squares: a degree-1 fit of the value field against time,
//! computed independently for each (realization, location) group (or with
//! realizations pooled). The fitted line evaluated on the input's own time
//! axis is the smoothed curve (the polynomial estimate of the mean
//! response), and the **trend change** is its value at the last time step
//! minus its value at the first, i.e. `slope * (t_last - t_first)`.
//!
//! Numeric policy: plain OLS, no regularization. A fit group with fewer
//! than 2 distinct time values fails with `DegenerateFit` instead of
//! producing a degenerate line, because downstream comparisons apply
//! inclusive threshold tests to the resulting scalar.

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::dataset::{EnsembleDataset, COL_REALIZATION, COL_TIME};
use crate::error::EngineError;

pub const FIELD_TREND_CHANGE: &str = "trend_change";

/// How fit groups are formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendGrouping {
    /// One fit per (realization, location): each member keeps its own line.
    PerRealization,
    /// One fit per location with all realizations pooled as responses.
    Pooled,
}

/// A completed degree-1 fit: the smoothed curve plus its coefficients.
#[derive(Debug, Clone)]
pub struct TrendFit {
    dataset: String,
    field: String,
    keys: Vec<String>,
    /// Fit coefficients per group: keys + `slope`, `intercept`,
    /// `t_first`, `t_last`.
    coeffs: DataFrame,
    /// The input coordinates with the value field replaced by the fitted
    /// line (same time axis as the input).
    curve: DataFrame,
}

impl TrendFit {
    /// Group key columns of this fit (realization and/or spatial axes).
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn coeffs(&self) -> &DataFrame {
        &self.coeffs
    }

    /// Smoothed trajectory: one fitted value per input coordinate row.
    pub fn curve(&self) -> &DataFrame {
        &self.curve
    }

    /// Endpoint-to-endpoint change of the smoothed curve per fit group:
    /// `slope * (t_last - t_first)`, exactly the fitted last-minus-first
    /// value.
    pub fn trend_change(&self) -> Result<DataFrame> {
        let key_exprs: Vec<Expr> = self.keys.iter().map(|k| col(k.as_str())).collect();
        let mut exprs = key_exprs.clone();
        exprs.push(
            (col("slope") * (col("t_last") - col("t_first"))).alias(FIELD_TREND_CHANGE),
        );
        let change = self
            .coeffs
            .clone()
            .lazy()
            .select(&exprs)
            .sort_by_exprs(&key_exprs, Default::default())
            .collect()
            .with_context(|| format!("{}: trend change", self.dataset))?;
        Ok(change)
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

/// Fit `field ~ time` (degree 1, OLS) over each group of `dataset`.
pub fn fit_trend(
    dataset: &EnsembleDataset,
    field: &str,
    grouping: TrendGrouping,
) -> Result<TrendFit> {
    dataset.require_field(field)?;

    let mut keys: Vec<String> = Vec::new();
    if grouping == TrendGrouping::PerRealization {
        keys.push(COL_REALIZATION.to_string());
    }
    keys.extend(dataset.spatial_cols().iter().cloned());
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(k.as_str())).collect();

    let t = col(COL_TIME).cast(DataType::Float64);
    let y = col(field);
    let moments = [
        t.clone().mean().alias("t_mean"),
        y.clone().mean().alias("y_mean"),
        (t.clone() * y.clone()).mean().alias("ty_mean"),
        (t.clone() * t.clone()).mean().alias("tt_mean"),
        t.clone().min().alias("t_first"),
        t.clone().max().alias("t_last"),
        col(COL_TIME).n_unique().cast(DataType::Int64).alias("n_times"),
    ];

    let lazy = dataset.frame().clone().lazy();
    // Materialize before the degeneracy predicate below
    let moments_df = if key_exprs.is_empty() {
        lazy.select(&moments).collect()
    } else {
        lazy.group_by(&key_exprs).agg(moments.to_vec()).collect()
    }
    .with_context(|| format!("{}: trend fit moments for '{}'", dataset.name(), field))?;

    // Degree-1 fit needs at least 2 distinct predictor values in every group
    let n_times = moments_df.column("n_times")?.i64()?;
    if let Some(bad) = n_times.into_iter().flatten().find(|&n| n < 2) {
        return Err(EngineError::degenerate_fit(
            dataset.name(),
            format!("a fit group has {} distinct time value(s); need at least 2", bad),
        )
        .into());
    }

    let coeffs = moments_df
        .lazy()
        .with_column(
            ((col("ty_mean") - col("t_mean") * col("y_mean"))
                / (col("tt_mean") - col("t_mean") * col("t_mean")))
            .alias("slope"),
        )
        .with_column((col("y_mean") - col("slope") * col("t_mean")).alias("intercept"))
        .select(&{
            let mut exprs = key_exprs.clone();
            exprs.extend([col("slope"), col("intercept"), col("t_first"), col("t_last")]);
            exprs
        })
        .collect()
        .with_context(|| format!("{}: trend fit coefficients", dataset.name()))?;

    // Evaluate the fitted line on the input's own coordinates
    let curve = if keys.is_empty() {
        let slope = coeffs
            .column("slope")?
            .f64()?
            .get(0)
            .ok_or_else(|| EngineError::degenerate_fit(dataset.name(), "empty fit result"))?;
        let intercept = coeffs
            .column("intercept")?
            .f64()?
            .get(0)
            .ok_or_else(|| EngineError::degenerate_fit(dataset.name(), "empty fit result"))?;
        dataset
            .frame()
            .clone()
            .lazy()
            .with_column(
                (lit(intercept) + lit(slope) * col(COL_TIME).cast(DataType::Float64))
                    .alias(field),
            )
            .collect()?
    } else {
        dataset
            .frame()
            .join(
                &coeffs,
                keys.iter().map(|s| s.as_str()),
                keys.iter().map(|s| s.as_str()),
                JoinArgs::new(JoinType::Left),
                None,
            )?
            .lazy()
            .with_column(
                (col("intercept") + col("slope") * col(COL_TIME).cast(DataType::Float64))
                    .alias(field),
            )
            .drop(["slope", "intercept", "t_first", "t_last"])
            .collect()
            .with_context(|| format!("{}: evaluating fitted curve", dataset.name()))?
    };

    Ok(TrendFit {
        dataset: dataset.name().to_string(),
        field: field.to_string(),
        keys,
        coeffs,
        curve,
    })
}
