//! Frame materialization and filter helpers with column validation
//!
//! Provides safe, explicit patterns for working with Polars frames so that
//! missing-column bugs surface as errors naming the dataset and column,
//! never as silently empty selections.

use ahash::AHashSet;
use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use std::collections::HashSet;

/// Materialize a LazyFrame with an explicit column list and validation.
///
/// # Errors
/// Returns an error if materialization fails or any required column is
/// missing from the result. `context` names the dataset/stage for the
/// error message (e.g. `"arise_control chunks"`).
pub fn materialize_with_columns(
    lazy: &LazyFrame,
    columns: &[&str],
    context: &str,
) -> Result<DataFrame> {
    let col_exprs: Vec<Expr> = columns.iter().map(|&name| col(name)).collect();

    let df = lazy
        .clone()
        .select(&col_exprs)
        .collect()
        .with_context(|| format!("{}: Failed to materialize columns {:?}", context, columns))?;

    // VALIDATE: Check all expected columns present
    let actual_cols: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    for &expected in columns {
        if !actual_cols.contains(expected) {
            return Err(anyhow!(
                "{}: Missing expected column '{}'. Available columns: {:?}",
                context,
                expected,
                actual_cols
            ));
        }
    }

    Ok(df)
}

/// Keep rows whose integer column value is in `values`.
///
/// Used for realization-set and year-set selection. The caller decides
/// whether an empty result is an error (`EmptySelection`); this helper
/// only validates the column.
pub fn filter_by_i64_set(
    df: &DataFrame,
    col_name: &str,
    values: &[i64],
    context: &str,
) -> Result<DataFrame> {
    let target = df
        .column(col_name)
        .with_context(|| format!("{}: Missing {} column", context, col_name))?
        .i64()
        .with_context(|| format!("{}: Column '{}' is not Int64", context, col_name))?;

    let value_set: AHashSet<i64> = values.iter().copied().collect();
    let mask: BooleanChunked = target
        .into_iter()
        .map(|opt| opt.map_or(false, |v| value_set.contains(&v)))
        .collect();

    df.filter(&mask)
        .with_context(|| format!("{}: Failed to filter on column '{}'", context, col_name))
}

/// Keep rows whose string column value is in `values`.
///
/// Used for named-location selection after spatial reduction.
pub fn filter_by_str_set(
    df: &DataFrame,
    col_name: &str,
    values: &[&str],
    context: &str,
) -> Result<DataFrame> {
    let target = df
        .column(col_name)
        .with_context(|| format!("{}: Missing {} column", context, col_name))?
        .str()
        .with_context(|| format!("{}: Column '{}' is not String", context, col_name))?;

    let value_set: AHashSet<&str> = values.iter().copied().collect();
    let mask: BooleanChunked = target
        .into_iter()
        .map(|opt| opt.map_or(false, |s| value_set.contains(s)))
        .collect();

    df.filter(&mask)
        .with_context(|| format!("{}: Failed to filter on column '{}'", context, col_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_with_columns_success() {
        let df = df![
            "realization" => &[0i64, 1],
            "portion_suitable" => &[10.0, 12.0],
            "extra_col" => &["a", "b"],
        ]
        .unwrap();

        let lazy = df.lazy();
        let result = materialize_with_columns(&lazy, &["realization", "portion_suitable"], "test");

        assert!(result.is_ok());
        let materialized = result.unwrap();
        assert_eq!(materialized.width(), 2);
        assert_eq!(materialized.height(), 2);
    }

    #[test]
    fn test_materialize_with_columns_missing() {
        let df = df!["realization" => &[0i64]].unwrap();
        let lazy = df.lazy();

        let result = materialize_with_columns(&lazy, &["member_id"], "test");

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("member_id") || err_msg.contains("not found"));
    }

    #[test]
    fn test_filter_by_i64_set() {
        let df = df![
            "realization" => &[0i64, 1, 2, 3],
            "portion_suitable" => &[1.0, 2.0, 3.0, 4.0],
        ]
        .unwrap();

        let filtered = filter_by_i64_set(&df, "realization", &[0, 2], "test").unwrap();
        assert_eq!(filtered.height(), 2);

        // Missing column is an error, not an empty result
        let result = filter_by_i64_set(&df, "year", &[2025], "test");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("year"));
    }

    #[test]
    fn test_filter_by_str_set() {
        let df = df![
            "location" => &["Miami", "Lagos", "Singapore"],
            "portion_suitable" => &[120.0, 200.0, 310.0],
        ]
        .unwrap();

        let filtered = filter_by_str_set(&df, "location", &["Lagos"], "test").unwrap();
        assert_eq!(filtered.height(), 1);

        let empty = filter_by_str_set(&df, "location", &["Oslo"], "test").unwrap();
        assert_eq!(empty.height(), 0);
    }
}
