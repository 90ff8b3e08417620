//! Figure-data pipeline
//!
//! Coordinates the engines into the named summary artifacts the
//! presentation layer consumes. Each builder is a pure function from the
//! input ensembles plus the run configuration to a [`SummaryArtifact`];
//! `run_all` fans the independent builders out with Rayon and writes the
//! results. Output field names are the wire format; consumers key on
//! them exactly.

use anyhow::{Context, Result};
use polars::prelude::*;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::compare::{
    symmetric_range, threshold_fraction, window_difference, window_mean, WindowReduction,
};
use crate::config::RunConfig;
use crate::dataset::{
    align_exact, EnsembleDataset, NamedLocation, COL_LOCATION, COL_REALIZATION, COL_TIME,
    COL_YEAR, FIELD_SUITABILITY,
};
use crate::error::EngineError;
use crate::export::{year_range_attr, ArtifactAttrs, ArtifactTable, SummaryArtifact};
use crate::matcher::{matched_before, BranchMapping};
use crate::trend::{fit_trend, TrendGrouping, FIELD_TREND_CHANGE};

// Output field names relied on by exact name downstream
pub const FIELD_BEFORE: &str = "before";
pub const FIELD_WITHOUT_MINUS_BEFORE: &str = "without_intervention_minus_before";
pub const FIELD_WITH_MINUS_BEFORE: &str = "with_intervention_minus_before";
pub const FIELD_WITH_MINUS_WITHOUT: &str = "with_minus_without_intervention";
pub const FIELD_MEAN_CHANGE: &str = "mean_change";

pub const ARTIFACT_MEAN_SUMMARY: &str = "mean_summary";
pub const ARTIFACT_CHANGE_EXAMPLE: &str = "change_example";
pub const ARTIFACT_CHANGE_SUMMARY: &str = "change_summary";
pub const ARTIFACT_TREND_EXAMPLE: &str = "trend_example";
pub const ARTIFACT_TREND_SUMMARY: &str = "trend_summary";
pub const ARTIFACT_LOCATION_SERIES: &str = "location_series";

const COL_MEMBER_ID: &str = "member_id";

/// One comparison campaign: a control/feedback ensemble pair plus the
/// explicit run configuration.
#[derive(Debug)]
pub struct FigureData {
    control: EnsembleDataset,
    feedback: EnsembleDataset,
    config: RunConfig,
    mapping: BranchMapping,
}

impl FigureData {
    pub fn new(
        control: EnsembleDataset,
        feedback: EnsembleDataset,
        config: RunConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mapping = BranchMapping::infer(
            feedback.realizations()?.len(),
            config.branch_factor,
            feedback.name(),
        )?;
        if control.spatial_cols() != feedback.spatial_cols() {
            return Err(EngineError::shape_mismatch(
                control.name(),
                format!(
                    "spatial axes differ: control {:?} vs feedback {:?}",
                    control.spatial_cols(),
                    feedback.spatial_cols()
                ),
            )
            .into());
        }
        Ok(Self {
            control,
            feedback,
            config,
            mapping,
        })
    }

    pub fn mapping(&self) -> &BranchMapping {
        &self.mapping
    }

    fn spatial_keys(&self) -> Vec<String> {
        self.control.spatial_cols().to_vec()
    }

    fn base_attrs(&self) -> Result<ArtifactAttrs> {
        Ok(ArtifactAttrs {
            before_year_range: Some(year_range_attr(&self.config.before_years)?),
            after_year_range: Some(year_range_attr(&self.config.after_years)?),
            ..ArtifactAttrs::default()
        })
    }

    /// Per-location means and scenario differences: `before`,
    /// `without_intervention_minus_before`,
    /// `with_intervention_minus_before`,
    /// `with_minus_without_intervention`; the three difference fields
    /// share one recorded symmetric range for diverging-scale panels.
    pub fn mean_summary(&self) -> Result<SummaryArtifact> {
        let keys = self.spatial_keys();
        let pooled = WindowReduction::PooledRealizations;

        let before = window_mean(
            &self.control,
            FIELD_SUITABILITY,
            &self.config.before_years,
            pooled,
        )?;
        let control_after = window_mean(
            &self.control,
            FIELD_SUITABILITY,
            &self.config.after_years,
            pooled,
        )?;
        let feedback_after = window_mean(
            &self.feedback,
            FIELD_SUITABILITY,
            &self.config.after_years,
            pooled,
        )?;

        let without = window_difference(
            &control_after,
            &before,
            &keys,
            FIELD_SUITABILITY,
            FIELD_WITHOUT_MINUS_BEFORE,
            self.control.name(),
        )?;
        let with_ = window_difference(
            &feedback_after,
            &before,
            &keys,
            FIELD_SUITABILITY,
            FIELD_WITH_MINUS_BEFORE,
            self.feedback.name(),
        )?;
        let with_minus_without = window_difference(
            &feedback_after,
            &control_after,
            &keys,
            FIELD_SUITABILITY,
            FIELD_WITH_MINUS_WITHOUT,
            self.feedback.name(),
        )?;

        let mut fields = rename_value(&before, &keys, FIELD_SUITABILITY, FIELD_BEFORE)?;
        for diff in [&without, &with_, &with_minus_without] {
            fields = align_exact(&fields, diff, &keys, ARTIFACT_MEAN_SUMMARY)?;
        }

        // All related difference panels share one symmetric color range
        let range = symmetric_range(
            &[
                (&without, FIELD_WITHOUT_MINUS_BEFORE),
                (&with_, FIELD_WITH_MINUS_BEFORE),
                (&with_minus_without, FIELD_WITH_MINUS_WITHOUT),
            ],
            ARTIFACT_MEAN_SUMMARY,
        )?;

        let mut attrs = self.base_attrs()?;
        attrs.symmetric_range = Some(range);
        Ok(SummaryArtifact::single(ARTIFACT_MEAN_SUMMARY, attrs, fields))
    }

    /// Per-realization mean change of the feedback scenario against its
    /// matched before window.
    fn matched_mean_change(&self) -> Result<DataFrame> {
        let parents: Vec<i64> = (0..self.mapping.parent_count as i64).collect();
        let before = self
            .control
            .select_years(&self.config.before_years)?
            .select_realizations(&parents)?;
        let matched = matched_before(&before, &self.mapping)?;

        let per_real = WindowReduction::PerRealization;
        let before_mean = window_mean(
            &matched,
            FIELD_SUITABILITY,
            &self.config.before_years,
            per_real,
        )?;
        let after_mean = window_mean(
            &self.feedback,
            FIELD_SUITABILITY,
            &self.config.after_years,
            per_real,
        )?;

        let mut keys = vec![COL_REALIZATION.to_string()];
        keys.extend(self.spatial_keys());
        window_difference(
            &after_mean,
            &before_mean,
            &keys,
            FIELD_SUITABILITY,
            FIELD_MEAN_CHANGE,
            self.feedback.name(),
        )
    }

    /// `mean_change` per realization and location, with member-id labels
    /// and a display ordering that keeps branch pairs adjacent.
    pub fn change_example(&self) -> Result<SummaryArtifact> {
        let change = self.matched_mean_change()?;
        let change = with_member_ids(&change, &self.feedback)?;

        let mut attrs = self.base_attrs()?;
        attrs.realization_order = Some(
            self.config
                .realization_order
                .clone()
                .unwrap_or_else(|| self.mapping.interleaved_order()),
        );
        Ok(SummaryArtifact::single(
            ARTIFACT_CHANGE_EXAMPLE,
            attrs,
            change,
        ))
    }

    /// `percent_realizations_increasing` per location and threshold from
    /// the matched mean change.
    pub fn change_summary(&self) -> Result<SummaryArtifact> {
        let change = self.matched_mean_change()?;
        let fractions = threshold_fraction(
            &change,
            &self.spatial_keys(),
            FIELD_MEAN_CHANGE,
            &self.config.thresholds,
            ARTIFACT_CHANGE_SUMMARY,
        )?;

        let mut attrs = self.base_attrs()?;
        attrs.thresholds = Some(self.config.thresholds.clone());
        Ok(SummaryArtifact::single(
            ARTIFACT_CHANGE_SUMMARY,
            attrs,
            fractions,
        ))
    }

    /// Per-realization endpoint trend change of the feedback after
    /// window.
    fn feedback_trend_change(&self) -> Result<DataFrame> {
        let after = self.feedback.select_years(&self.config.after_years)?;
        let fit = fit_trend(&after, FIELD_SUITABILITY, TrendGrouping::PerRealization)?;
        fit.trend_change()
    }

    /// `trend_change` per realization and location.
    pub fn trend_example(&self) -> Result<SummaryArtifact> {
        let change = self.feedback_trend_change()?;
        let change = with_member_ids(&change, &self.feedback)?;

        let attrs = ArtifactAttrs {
            after_year_range: Some(year_range_attr(&self.config.after_years)?),
            realization_order: Some(
                self.config
                    .realization_order
                    .clone()
                    .unwrap_or_else(|| self.mapping.interleaved_order()),
            ),
            ..ArtifactAttrs::default()
        };
        Ok(SummaryArtifact::single(
            ARTIFACT_TREND_EXAMPLE,
            attrs,
            change,
        ))
    }

    /// `percent_realizations_increasing` per location and threshold from
    /// per-realization trend changes.
    pub fn trend_summary(&self) -> Result<SummaryArtifact> {
        let change = self.feedback_trend_change()?;
        let fractions = threshold_fraction(
            &change,
            &self.spatial_keys(),
            FIELD_TREND_CHANGE,
            &self.config.thresholds,
            ARTIFACT_TREND_SUMMARY,
        )?;

        let attrs = ArtifactAttrs {
            after_year_range: Some(year_range_attr(&self.config.after_years)?),
            thresholds: Some(self.config.thresholds.clone()),
            ..ArtifactAttrs::default()
        };
        Ok(SummaryArtifact::single(
            ARTIFACT_TREND_SUMMARY,
            attrs,
            fractions,
        ))
    }

    /// Named-point time series for line plotting: `before`/`before_trend`
    /// (parent realizations only) and `after`/`after_trend` tables.
    pub fn location_series(&self, locations: &[NamedLocation]) -> Result<SummaryArtifact> {
        let parents: Vec<i64> = (0..self.mapping.parent_count as i64).collect();
        let before = self
            .control
            .select_years(&self.config.before_years)?
            .select_realizations(&parents)?;
        let before = self.at_locations(&before, locations)?;

        let after = self.feedback.select_years(&self.config.after_years)?;
        let after = self.at_locations(&after, locations)?;

        let before_table = series_with_trend(&before, FIELD_BEFORE, "before_trend")?;
        let after_table = series_with_trend(&after, "after", "after_trend")?;

        Ok(SummaryArtifact {
            name: ARTIFACT_LOCATION_SERIES.to_string(),
            attrs: self.base_attrs()?,
            tables: vec![
                ArtifactTable {
                    name: FIELD_BEFORE.to_string(),
                    frame: before_table,
                },
                ArtifactTable {
                    name: "after".to_string(),
                    frame: after_table,
                },
            ],
        })
    }

    fn at_locations(
        &self,
        dataset: &EnsembleDataset,
        locations: &[NamedLocation],
    ) -> Result<EnsembleDataset> {
        if dataset.spatial_cols() == [COL_LOCATION.to_string()] {
            let names: Vec<&str> = locations.iter().map(|l| l.name.as_str()).collect();
            dataset.select_locations(&names)
        } else {
            dataset.sel_geo(locations)
        }
    }

    /// Build every artifact for this campaign and write them under
    /// `out_dir`. Builders are independent pure transformations, so they
    /// run in parallel.
    pub fn run_all(
        &self,
        out_dir: &Path,
        locations: Option<&[NamedLocation]>,
    ) -> Result<Vec<PathBuf>> {
        let mut builders: Vec<&str> = vec![
            ARTIFACT_MEAN_SUMMARY,
            ARTIFACT_CHANGE_EXAMPLE,
            ARTIFACT_CHANGE_SUMMARY,
            ARTIFACT_TREND_EXAMPLE,
            ARTIFACT_TREND_SUMMARY,
        ];
        if locations.is_some() {
            builders.push(ARTIFACT_LOCATION_SERIES);
        }

        let artifacts: Result<Vec<SummaryArtifact>> = builders
            .par_iter()
            .map(|&name| {
                self.build(name, locations)
                    .with_context(|| format!("Failed to build artifact '{}'", name))
            })
            .collect();

        let mut written = Vec::new();
        for artifact in artifacts? {
            let path = artifact.write(out_dir)?;
            println!("  Wrote {:?}", path);
            written.push(path);
        }
        Ok(written)
    }

    fn build(&self, name: &str, locations: Option<&[NamedLocation]>) -> Result<SummaryArtifact> {
        match name {
            ARTIFACT_MEAN_SUMMARY => self.mean_summary(),
            ARTIFACT_CHANGE_EXAMPLE => self.change_example(),
            ARTIFACT_CHANGE_SUMMARY => self.change_summary(),
            ARTIFACT_TREND_EXAMPLE => self.trend_example(),
            ARTIFACT_TREND_SUMMARY => self.trend_summary(),
            ARTIFACT_LOCATION_SERIES => {
                let locations = locations.with_context(|| {
                    "location_series requires a named-location list".to_string()
                })?;
                self.location_series(locations)
            }
            other => anyhow::bail!("unknown artifact '{}'", other),
        }
    }
}

/// Select keys plus one value column under a new name.
fn rename_value(
    frame: &DataFrame,
    keys: &[String],
    from: &str,
    to: &str,
) -> Result<DataFrame> {
    let mut exprs: Vec<Expr> = keys.iter().map(|k| col(k.as_str())).collect();
    exprs.push(col(from).alias(to));
    Ok(frame.clone().lazy().select(&exprs).collect()?)
}

/// Attach member-id display labels keyed by the realization column.
fn with_member_ids(frame: &DataFrame, dataset: &EnsembleDataset) -> Result<DataFrame> {
    let realizations = frame
        .column(COL_REALIZATION)
        .with_context(|| format!("{}: realization column for member ids", dataset.name()))?
        .i64()?;
    let labels: Vec<Option<String>> = realizations
        .into_iter()
        .map(|opt| opt.map(|r| dataset.member_id(r)))
        .collect();
    let mut out = frame.clone();
    out.with_column(Series::new(COL_MEMBER_ID.into(), labels))?;
    Ok(out)
}

/// One table holding the raw ensemble series and its fitted trend curve,
/// keyed by (time, year, realization, location).
fn series_with_trend(
    dataset: &EnsembleDataset,
    value_name: &str,
    trend_name: &str,
) -> Result<DataFrame> {
    let fit = fit_trend(dataset, FIELD_SUITABILITY, TrendGrouping::PerRealization)?;

    let keys = vec![
        COL_TIME.to_string(),
        COL_REALIZATION.to_string(),
        COL_LOCATION.to_string(),
    ];

    let raw = dataset
        .frame()
        .clone()
        .lazy()
        .select(&[
            col(COL_TIME),
            col(COL_YEAR),
            col(COL_REALIZATION),
            col(COL_LOCATION),
            col(FIELD_SUITABILITY).alias(value_name),
        ])
        .collect()?;
    let curve = fit
        .curve()
        .clone()
        .lazy()
        .select(&[
            col(COL_TIME),
            col(COL_REALIZATION),
            col(COL_LOCATION),
            col(FIELD_SUITABILITY).alias(trend_name),
        ])
        .collect()?;

    let sort_exprs = [col(COL_REALIZATION), col(COL_LOCATION), col(COL_TIME)];
    let table = align_exact(&raw, &curve, &keys, dataset.name())?
        .lazy()
        .sort_by_exprs(&sort_exprs, Default::default())
        .collect()?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{COL_LAT, COL_LON};
    use crate::synthetic::{suitability_pair, SyntheticSpec};
    use approx::assert_relative_eq;
    use rustc_hash::FxHashMap;

    /// Single-realization, single-location pair with exactly the
    /// reference window means: before 10.0, control after 12.0,
    /// feedback after 15.0.
    fn reference_scenario() -> FigureData {
        fn yearly(name: &str, years: std::ops::Range<i32>, value_of: impl Fn(i32) -> f64) -> EnsembleDataset {
            let mut time = Vec::new();
            let mut year = Vec::new();
            let mut realization = Vec::new();
            let mut lat = Vec::new();
            let mut lon = Vec::new();
            let mut value = Vec::new();
            for y in years {
                time.push(i64::from(y));
                year.push(y);
                realization.push(0i64);
                lat.push(10.0);
                lon.push(100.0);
                value.push(value_of(y));
            }
            let frame = df![
                COL_TIME => &time,
                COL_YEAR => &year,
                COL_REALIZATION => &realization,
                COL_LAT => &lat,
                COL_LON => &lon,
                FIELD_SUITABILITY => &value,
            ]
            .unwrap();
            EnsembleDataset::new(name, frame, FxHashMap::default()).unwrap()
        }

        let control = yearly("control", 2025..2045, |y| if y < 2035 { 10.0 } else { 12.0 });
        let feedback = yearly("feedback", 2035..2045, |_| 15.0);
        let config = RunConfig {
            branch_factor: 1,
            ..RunConfig::default()
        };
        FigureData::new(control, feedback, config).unwrap()
    }

    fn field_value(frame: &DataFrame, field: &str) -> f64 {
        frame.column(field).unwrap().f64().unwrap().get(0).unwrap()
    }

    #[test]
    fn test_mean_summary_reference_values() {
        let pipeline = reference_scenario();
        let artifact = pipeline.mean_summary().unwrap();
        let fields = artifact.fields().unwrap();

        assert_eq!(fields.height(), 1);
        assert_relative_eq!(field_value(fields, FIELD_BEFORE), 10.0);
        assert_relative_eq!(field_value(fields, FIELD_WITHOUT_MINUS_BEFORE), 2.0);
        assert_relative_eq!(field_value(fields, FIELD_WITH_MINUS_BEFORE), 5.0);
        assert_relative_eq!(field_value(fields, FIELD_WITH_MINUS_WITHOUT), 3.0);

        assert_eq!(artifact.attrs.before_year_range.as_deref(), Some("2025-2034"));
        assert_eq!(artifact.attrs.after_year_range.as_deref(), Some("2035-2044"));
        // Largest |difference| across the three panels
        assert_relative_eq!(artifact.attrs.symmetric_range.unwrap(), 5.0);
    }

    #[test]
    fn test_change_example_matches_branching() {
        let spec = SyntheticSpec::default();
        let (control, feedback) = suitability_pair(&spec).unwrap();
        let pipeline = FigureData::new(control, feedback, RunConfig::default()).unwrap();

        let artifact = pipeline.change_example().unwrap();
        let fields = artifact.fields().unwrap();

        // 10 realizations x 2 locations
        assert_eq!(fields.height(), 20);
        assert!(fields.column(FIELD_MEAN_CHANGE).is_ok());
        assert!(fields.column(COL_MEMBER_ID).is_ok());
        assert_eq!(
            artifact.attrs.realization_order.as_deref(),
            Some(&[0, 5, 1, 6, 2, 7, 3, 8, 4, 9][..])
        );
    }

    #[test]
    fn test_change_and_trend_summaries_have_threshold_axis() {
        let spec = SyntheticSpec::default();
        let (control, feedback) = suitability_pair(&spec).unwrap();
        let pipeline = FigureData::new(control, feedback, RunConfig::default()).unwrap();

        let change = pipeline.change_summary().unwrap();
        let fields = change.fields().unwrap();
        // 2 locations x 3 thresholds
        assert_eq!(fields.height(), 6);
        assert_eq!(change.attrs.thresholds.as_deref(), Some(&[1.0, 15.0, 30.0][..]));

        let trend = pipeline.trend_summary().unwrap();
        assert_eq!(trend.fields().unwrap().height(), 6);
        assert!(trend.attrs.before_year_range.is_none());
        assert_eq!(trend.attrs.after_year_range.as_deref(), Some("2035-2044"));
    }

    #[test]
    fn test_trend_example_reflects_damped_trend() {
        let spec = SyntheticSpec::default(); // noise-free
        let (control, feedback) = suitability_pair(&spec).unwrap();
        let pipeline = FigureData::new(control, feedback, RunConfig::default()).unwrap();

        let artifact = pipeline.trend_example().unwrap();
        let fields = artifact.fields().unwrap();
        let changes = fields.column(FIELD_TREND_CHANGE).unwrap().f64().unwrap();

        // Damped but still positive warming trend over the after window
        for change in changes.into_iter().flatten() {
            assert!(change > 0.0);
            assert!(change < spec.trend_per_day * 10.0 * 366.0);
        }
    }

    #[test]
    fn test_location_series_tables() {
        let spec = SyntheticSpec::default();
        let (control, feedback) = suitability_pair(&spec).unwrap();
        let pipeline = FigureData::new(control, feedback, RunConfig::default()).unwrap();

        let locations = vec![NamedLocation {
            name: "point_a".to_string(),
            lat: 10.0,
            lon: 100.0,
        }];
        let artifact = pipeline.location_series(&locations).unwrap();

        let before = artifact.table(FIELD_BEFORE).unwrap();
        let after = artifact.table("after").unwrap();
        // before: 5 parents x 10 years x 12 samples; after: 10 x 10 x 12
        assert_eq!(before.height(), 5 * 10 * 12);
        assert_eq!(after.height(), 10 * 10 * 12);
        assert!(before.column("before_trend").is_ok());
        assert!(after.column("after_trend").is_ok());
    }

    #[test]
    fn test_branch_factor_mismatch_rejected() {
        let spec = SyntheticSpec::default();
        let (control, feedback) = suitability_pair(&spec).unwrap();
        let config = RunConfig {
            branch_factor: 3, // 10 realizations cannot split into 3 branches
            ..RunConfig::default()
        };
        let err = FigureData::new(control, feedback, config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ShapeMismatch { .. })
        ));
    }
}
