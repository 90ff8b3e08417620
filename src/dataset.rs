//! Ensemble dataset representation
//!
//! An [`EnsembleDataset`] is the shared in-memory representation every
//! engine component operates on: a long-format Polars frame with one row
//! per (time, realization, location) coordinate combination plus one or
//! more scalar value fields (principally `portion_suitable`). All
//! transformations are pure: selection and relabeling return new
//! datasets and never mutate their input.
//!
//! Column conventions:
//! - `time`: Int64, days since 1970-01-01, strictly increasing axis labels
//! - `year`: Int32, calendar year of `time` (derived at load)
//! - `realization`: Int64, 0-based unique ensemble-member identifiers
//! - spatial axes: either a grid (`lat`/`lon`, Float64) or a named-point
//!   column (`location`, String) after spatial selection
//!
//! `member_id` display labels live in a side map keyed by realization and
//! are never used for indexing logic.

use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::utils::{filter_by_i64_set, filter_by_str_set};

pub const COL_TIME: &str = "time";
pub const COL_YEAR: &str = "year";
pub const COL_REALIZATION: &str = "realization";
pub const COL_LAT: &str = "lat";
pub const COL_LON: &str = "lon";
pub const COL_LOCATION: &str = "location";

/// Primary value field: days per year climatically suitable for transmission.
pub const FIELD_SUITABILITY: &str = "portion_suitable";

/// A named geographic point used for spatial selection on gridded data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Labeled long-format ensemble data plus member-id provenance labels.
#[derive(Debug, Clone)]
pub struct EnsembleDataset {
    name: String,
    frame: DataFrame,
    spatial_cols: SmallVec<[String; 2]>,
    member_ids: FxHashMap<i64, String>,
}

impl EnsembleDataset {
    /// Wrap a long-format frame, validating the axis invariants.
    ///
    /// Requires `time`, `year` and `realization` columns plus at least one
    /// value field (`MissingField` otherwise), and a dense coordinate
    /// grid: row count must equal
    /// `n_realizations × n_times × n_locations` (`ShapeMismatch`
    /// otherwise; a missing or duplicated coordinate combination would
    /// silently skew every downstream mean).
    pub fn new(
        name: impl Into<String>,
        frame: DataFrame,
        member_ids: FxHashMap<i64, String>,
    ) -> Result<Self> {
        let name = name.into();

        for required in [COL_TIME, COL_YEAR, COL_REALIZATION] {
            if frame.column(required).is_err() {
                return Err(EngineError::missing_field(&name, required).into());
            }
        }

        let spatial_cols = Self::detect_spatial_cols(&frame);

        let ds = Self {
            name,
            frame,
            spatial_cols,
            member_ids,
        };

        if ds.value_cols().is_empty() {
            return Err(EngineError::missing_field(&ds.name, "any value field").into());
        }
        ds.validate_dense_grid()?;

        Ok(ds)
    }

    fn detect_spatial_cols(frame: &DataFrame) -> SmallVec<[String; 2]> {
        if frame.column(COL_LOCATION).is_ok() {
            SmallVec::from_vec(vec![COL_LOCATION.to_string()])
        } else if frame.column(COL_LAT).is_ok() && frame.column(COL_LON).is_ok() {
            SmallVec::from_vec(vec![COL_LAT.to_string(), COL_LON.to_string()])
        } else {
            SmallVec::new()
        }
    }

    fn validate_dense_grid(&self) -> Result<()> {
        let n_realizations = self.realizations()?.len();
        let n_times = self.times()?.len();
        let n_locations = self.n_locations()?;
        let expected = n_realizations * n_times * n_locations;
        if self.frame.height() != expected {
            return Err(EngineError::shape_mismatch(
                &self.name,
                format!(
                    "{} rows but {} realizations x {} times x {} locations = {} expected",
                    self.frame.height(),
                    n_realizations,
                    n_times,
                    n_locations,
                    expected
                ),
            )
            .into());
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Spatial coordinate column names (`lat`/`lon`, or `location`, or
    /// empty once space has been reduced away).
    pub fn spatial_cols(&self) -> &[String] {
        &self.spatial_cols
    }

    /// Value field column names (everything that is not a coordinate).
    pub fn value_cols(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .filter(|c| {
                c != COL_TIME
                    && c != COL_YEAR
                    && c != COL_REALIZATION
                    && !self.spatial_cols.iter().any(|s| s == c)
            })
            .collect()
    }

    /// Fail with `MissingField` unless `field` is a value column.
    pub fn require_field(&self, field: &str) -> Result<()> {
        if self.value_cols().iter().any(|c| c == field) {
            Ok(())
        } else {
            Err(EngineError::missing_field(&self.name, field).into())
        }
    }

    /// Sorted unique realization identifiers.
    pub fn realizations(&self) -> Result<Vec<i64>> {
        let ca = self
            .frame
            .column(COL_REALIZATION)
            .with_context(|| format!("{}: realization column", self.name))?
            .i64()?;
        let mut values: Vec<i64> = ca.into_iter().flatten().collect();
        values.sort_unstable();
        values.dedup();
        Ok(values)
    }

    /// Sorted unique time-axis labels (epoch days).
    pub fn times(&self) -> Result<Vec<i64>> {
        let ca = self
            .frame
            .column(COL_TIME)
            .with_context(|| format!("{}: time column", self.name))?
            .i64()?;
        let mut values: Vec<i64> = ca.into_iter().flatten().collect();
        values.sort_unstable();
        values.dedup();
        Ok(values)
    }

    /// Sorted unique calendar years present on the time axis.
    pub fn years(&self) -> Result<Vec<i32>> {
        let ca = self
            .frame
            .column(COL_YEAR)
            .with_context(|| format!("{}: year column", self.name))?
            .i32()?;
        let mut values: Vec<i32> = ca.into_iter().flatten().collect();
        values.sort_unstable();
        values.dedup();
        Ok(values)
    }

    /// Number of distinct spatial points (1 once space is reduced away).
    pub fn n_locations(&self) -> Result<usize> {
        if self.spatial_cols.is_empty() {
            return Ok(1);
        }
        let exprs: Vec<Expr> = self.spatial_cols.iter().map(|c| col(c.as_str())).collect();
        // group_by with an empty aggregation yields one row per distinct key
        let unique = self
            .frame
            .clone()
            .lazy()
            .group_by(&exprs)
            .agg(Vec::<Expr>::new())
            .collect()
            .with_context(|| format!("{}: counting spatial points", self.name))?;
        Ok(unique.height())
    }

    /// Display label for a realization (`member_id` coordinate if known,
    /// the index itself otherwise). Provenance only, never indexing.
    pub fn member_id(&self, realization: i64) -> String {
        self.member_ids
            .get(&realization)
            .cloned()
            .unwrap_or_else(|| realization.to_string())
    }

    pub fn member_ids(&self) -> &FxHashMap<i64, String> {
        &self.member_ids
    }

    /// Keep timestamps whose calendar year is in `years`.
    ///
    /// Fails with `EmptySelection` when no timestamp matches; an engine
    /// reduction over an empty window must never become a silent NaN.
    pub fn select_years(&self, years: &[i32]) -> Result<Self> {
        let years_i64: Vec<i64> = years.iter().map(|&y| i64::from(y)).collect();
        // The year column is Int32; filter through a cast view.
        let cast_frame = self
            .frame
            .clone()
            .lazy()
            .with_column(col(COL_YEAR).cast(DataType::Int64).alias("__year64"))
            .collect()?;
        let filtered = filter_by_i64_set(&cast_frame, "__year64", &years_i64, &self.name)?
            .drop("__year64")?;
        if filtered.height() == 0 {
            return Err(EngineError::empty_selection(
                &self.name,
                format!("no timestamps in years {:?}", year_span(years)),
            )
            .into());
        }
        Self::new(self.name.clone(), filtered, self.member_ids.clone())
    }

    /// Keep the given realizations. Every requested identifier must be
    /// present (`ShapeMismatch` otherwise; a silently narrowed ensemble
    /// would bias every downstream fraction).
    pub fn select_realizations(&self, realizations: &[i64]) -> Result<Self> {
        let available = self.realizations()?;
        let missing: Vec<i64> = realizations
            .iter()
            .copied()
            .filter(|r| !available.contains(r))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::shape_mismatch(
                &self.name,
                format!(
                    "requested realizations {:?} not present (available {:?})",
                    missing, available
                ),
            )
            .into());
        }
        let filtered = filter_by_i64_set(&self.frame, COL_REALIZATION, realizations, &self.name)?;
        let mut member_ids = FxHashMap::default();
        for &r in realizations {
            if let Some(label) = self.member_ids.get(&r) {
                member_ids.insert(r, label.clone());
            }
        }
        Self::new(self.name.clone(), filtered, member_ids)
    }

    /// Keep named locations (requires a `location` column). A requested
    /// name with no matching point fails with `EmptySelection`.
    pub fn select_locations(&self, names: &[&str]) -> Result<Self> {
        if self.frame.column(COL_LOCATION).is_err() {
            return Err(EngineError::missing_field(&self.name, COL_LOCATION).into());
        }
        let filtered = filter_by_str_set(&self.frame, COL_LOCATION, names, &self.name)?;
        if filtered.height() == 0 {
            return Err(EngineError::empty_selection(
                &self.name,
                format!("no points match locations {:?}", names),
            )
            .into());
        }
        // Each requested name must actually resolve
        let present = filtered.column(COL_LOCATION)?.str()?;
        for &name in names {
            if !present.into_iter().any(|opt| opt == Some(name)) {
                return Err(EngineError::empty_selection(
                    &self.name,
                    format!("location '{}' not present", name),
                )
                .into());
            }
        }
        Self::new(self.name.clone(), filtered, self.member_ids.clone())
    }

    /// Reduce a gridded dataset to named points by nearest great-circle
    /// grid cell. Output carries a `location` column instead of `lat`/`lon`.
    pub fn sel_geo(&self, locations: &[NamedLocation]) -> Result<Self> {
        if self.frame.column(COL_LAT).is_err() || self.frame.column(COL_LON).is_err() {
            return Err(EngineError::missing_field(&self.name, "lat/lon grid").into());
        }
        if locations.is_empty() {
            return Err(
                EngineError::empty_selection(&self.name, "no locations requested").into(),
            );
        }

        // Unique grid points
        let grid = self
            .frame
            .clone()
            .lazy()
            .group_by([col(COL_LAT), col(COL_LON)])
            .agg(Vec::<Expr>::new())
            .collect()?;
        let lats = grid.column(COL_LAT)?.f64()?;
        let lons = grid.column(COL_LON)?.f64()?;

        let mut selected: Option<DataFrame> = None;
        for target in locations {
            let mut best: Option<(f64, f64, f64)> = None;
            for idx in 0..grid.height() {
                if let (Some(lat), Some(lon)) = (lats.get(idx), lons.get(idx)) {
                    let d = great_circle_distance(target.lat, target.lon, lat, lon);
                    if best.map_or(true, |(bd, _, _)| d < bd) {
                        best = Some((d, lat, lon));
                    }
                }
            }
            let (_, lat, lon) = best.ok_or_else(|| {
                EngineError::empty_selection(&self.name, "dataset has no grid points")
            })?;

            let lat_ca = self.frame.column(COL_LAT)?.f64()?;
            let lon_ca = self.frame.column(COL_LON)?.f64()?;
            let mask: BooleanChunked = lat_ca
                .into_iter()
                .zip(lon_ca)
                .map(|(la, lo)| la == Some(lat) && lo == Some(lon))
                .collect();
            let mut point = self.frame.filter(&mask)?;
            point.drop_in_place(COL_LAT)?;
            point.drop_in_place(COL_LON)?;
            let labels = Series::new(
                COL_LOCATION.into(),
                vec![target.name.clone(); point.height()],
            );
            point.with_column(labels)?;

            selected = Some(match selected {
                Some(acc) => acc.vstack(&point)?,
                None => point,
            });
        }

        let frame = selected.ok_or_else(|| {
            EngineError::empty_selection(&self.name, "no locations requested")
        })?;
        Self::new(self.name.clone(), frame, self.member_ids.clone())
    }

    /// Relabel the realization axis by a constant offset, producing a new
    /// dataset. Values are untouched; member-id labels follow their rows.
    pub fn offset_realizations(&self, offset: i64) -> Result<Self> {
        let frame = self
            .frame
            .clone()
            .lazy()
            .with_column((col(COL_REALIZATION) + lit(offset)).alias(COL_REALIZATION))
            .collect()
            .with_context(|| format!("{}: relabeling realizations", self.name))?;
        let member_ids = self
            .member_ids
            .iter()
            .map(|(&r, label)| (r + offset, label.clone()))
            .collect();
        Self::new(self.name.clone(), frame, member_ids)
    }

    /// Concatenate along the realization axis. The realization sets must
    /// be disjoint and the time/location axes identical (`ShapeMismatch`
    /// otherwise).
    pub fn concat_realizations(&self, other: &Self) -> Result<Self> {
        let ours = self.realizations()?;
        let theirs = other.realizations()?;
        if let Some(dup) = theirs.iter().find(|r| ours.contains(r)) {
            return Err(EngineError::shape_mismatch(
                &self.name,
                format!("realization {} present in both concat operands", dup),
            )
            .into());
        }
        if self.times()? != other.times()? {
            return Err(EngineError::shape_mismatch(
                &self.name,
                format!("time axes differ between '{}' and '{}'", self.name, other.name),
            )
            .into());
        }
        let frame = self.frame.vstack(other.frame())?;
        let mut member_ids = self.member_ids.clone();
        member_ids.extend(other.member_ids.iter().map(|(&r, l)| (r, l.clone())));
        Self::new(self.name.clone(), frame, member_ids)
    }

    /// Rename the dataset (used when a transformation changes meaning,
    /// e.g. a matched-before alignment).
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Explicit exact alignment of two derived fields before a binary
/// operation: inner join on `keys`, failing with `ShapeMismatch` on any
/// partial overlap. Label-based auto-broadcasting is deliberately not
/// supported.
pub fn align_exact(
    lhs: &DataFrame,
    rhs: &DataFrame,
    keys: &[String],
    dataset: &str,
) -> Result<DataFrame> {
    if lhs.height() != rhs.height() {
        return Err(EngineError::shape_mismatch(
            dataset,
            format!(
                "cannot align {} rows with {} rows on {:?}",
                lhs.height(),
                rhs.height(),
                keys
            ),
        )
        .into());
    }
    let joined = lhs.join(
        rhs,
        keys.iter().map(|s| s.as_str()),
        keys.iter().map(|s| s.as_str()),
        JoinArgs::new(JoinType::Inner),
        None,
    )?;
    if joined.height() != lhs.height() {
        return Err(EngineError::shape_mismatch(
            dataset,
            format!(
                "partial coordinate overlap on {:?}: {} of {} rows aligned",
                keys,
                joined.height(),
                lhs.height()
            ),
        )
        .into());
    }
    Ok(joined)
}

/// Great-circle distance in kilometres (spherical Earth).
fn great_circle_distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let to_rad = std::f64::consts::PI / 180.0;
    let (phi_a, phi_b) = (lat_a * to_rad, lat_b * to_rad);
    let d_phi = (lat_b - lat_a) * to_rad;
    let d_lambda = (lon_b - lon_a) * to_rad;
    let a = libm::sin(d_phi / 2.0) * libm::sin(d_phi / 2.0)
        + libm::cos(phi_a) * libm::cos(phi_b) * libm::sin(d_lambda / 2.0) * libm::sin(d_lambda / 2.0);
    2.0 * EARTH_RADIUS_KM * libm::atan2(libm::sqrt(a), libm::sqrt(1.0 - a))
}

fn year_span(years: &[i32]) -> String {
    match (years.iter().min(), years.iter().max()) {
        (Some(first), Some(last)) => format!("{}-{}", first, last),
        _ => "(none)".to_string(),
    }
}
