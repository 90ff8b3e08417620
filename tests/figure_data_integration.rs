//! End-to-end test: synthetic ensembles through every artifact builder,
//! persisted and read back.

use ensemble_compare_rust::export::SummaryArtifact;
use ensemble_compare_rust::pipeline::{
    ARTIFACT_CHANGE_EXAMPLE, ARTIFACT_CHANGE_SUMMARY, ARTIFACT_LOCATION_SERIES,
    ARTIFACT_MEAN_SUMMARY, ARTIFACT_TREND_EXAMPLE, ARTIFACT_TREND_SUMMARY, FIELD_BEFORE,
    FIELD_MEAN_CHANGE, FIELD_WITH_MINUS_BEFORE, FIELD_WITH_MINUS_WITHOUT,
    FIELD_WITHOUT_MINUS_BEFORE,
};
use ensemble_compare_rust::synthetic::{suitability_pair, SyntheticSpec};
use ensemble_compare_rust::trend::FIELD_TREND_CHANGE;
use ensemble_compare_rust::{FigureData, NamedLocation, RunConfig};

fn synthetic_pipeline(noise: f64) -> FigureData {
    let spec = SyntheticSpec {
        noise,
        ..SyntheticSpec::default()
    };
    let (control, feedback) = suitability_pair(&spec).unwrap();
    FigureData::new(control, feedback, RunConfig::default()).unwrap()
}

fn grid_locations() -> Vec<NamedLocation> {
    vec![
        NamedLocation {
            name: "site_tropics".to_string(),
            lat: 10.0,
            lon: 100.0,
        },
        NamedLocation {
            name: "site_subtropics".to_string(),
            lat: 25.0,
            lon: -80.0,
        },
    ]
}

#[test]
fn test_run_all_writes_and_reads_back_every_artifact() {
    let pipeline = synthetic_pipeline(2.0);
    let dir = tempfile::tempdir().unwrap();
    let locations = grid_locations();

    let written = pipeline.run_all(dir.path(), Some(&locations)).unwrap();
    assert_eq!(written.len(), 6);

    for name in [
        ARTIFACT_MEAN_SUMMARY,
        ARTIFACT_CHANGE_EXAMPLE,
        ARTIFACT_CHANGE_SUMMARY,
        ARTIFACT_TREND_EXAMPLE,
        ARTIFACT_TREND_SUMMARY,
        ARTIFACT_LOCATION_SERIES,
    ] {
        let artifact = SummaryArtifact::read(dir.path(), name).unwrap();
        assert!(!artifact.tables.is_empty(), "{} has no tables", name);
    }
}

#[test]
fn test_persisted_mean_summary_round_trips_exactly() {
    let pipeline = synthetic_pipeline(2.0);
    let dir = tempfile::tempdir().unwrap();

    let built = pipeline.mean_summary().unwrap();
    built.write(dir.path()).unwrap();
    let restored = SummaryArtifact::read(dir.path(), ARTIFACT_MEAN_SUMMARY).unwrap();

    assert_eq!(restored.attrs, built.attrs);
    assert!(restored
        .fields()
        .unwrap()
        .equals(built.fields().unwrap()));
    for field in [
        FIELD_BEFORE,
        FIELD_WITHOUT_MINUS_BEFORE,
        FIELD_WITH_MINUS_BEFORE,
        FIELD_WITH_MINUS_WITHOUT,
    ] {
        assert!(restored.fields().unwrap().column(field).is_ok());
    }
    assert_eq!(restored.attrs.before_year_range.as_deref(), Some("2025-2034"));
    assert_eq!(restored.attrs.after_year_range.as_deref(), Some("2035-2044"));
    assert!(restored.attrs.symmetric_range.is_some());
}

#[test]
fn test_intervention_reduces_change_on_noise_free_data() {
    // With a damped feedback trend and no noise, the intervention must
    // come out below the control everywhere.
    let pipeline = synthetic_pipeline(0.0);

    let fields_artifact = pipeline.mean_summary().unwrap();
    let fields = fields_artifact.fields().unwrap();
    let with_minus_without = fields
        .column(FIELD_WITH_MINUS_WITHOUT)
        .unwrap()
        .f64()
        .unwrap();
    for value in with_minus_without.into_iter().flatten() {
        assert!(value < 0.0, "intervention did not reduce suitability");
    }

    // Warming still pushes the feedback scenario above its before window
    let change_artifact = pipeline.change_example().unwrap();
    let mean_change = change_artifact
        .fields()
        .unwrap()
        .column(FIELD_MEAN_CHANGE)
        .unwrap()
        .f64()
        .unwrap();
    for value in mean_change.into_iter().flatten() {
        assert!(value > 0.0);
    }
}

#[test]
fn test_summary_artifacts_report_full_agreement_without_noise() {
    let pipeline = synthetic_pipeline(0.0);

    // Every noise-free realization trends upward, so the smallest
    // threshold must report 100% agreement at every location.
    let trend_summary = pipeline.trend_summary().unwrap();
    let fields = trend_summary.fields().unwrap();
    let mask = fields
        .column("threshold")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .map(|t| t == Some(1.0))
        .collect::<Vec<_>>();
    let percents = fields
        .column("percent_realizations_increasing")
        .unwrap()
        .f64()
        .unwrap();
    let mut checked = 0;
    for (idx, keep) in mask.iter().enumerate() {
        if *keep {
            assert_eq!(percents.get(idx), Some(100.0));
            checked += 1;
        }
    }
    assert_eq!(checked, 2); // one row per location

    let trend_example = pipeline.trend_example().unwrap();
    let changes = trend_example
        .fields()
        .unwrap()
        .column(FIELD_TREND_CHANGE)
        .unwrap()
        .f64()
        .unwrap();
    for value in changes.into_iter().flatten() {
        assert!(value > 1.0);
    }
}

#[test]
fn test_location_series_trend_tracks_noise_free_values() {
    let pipeline = synthetic_pipeline(0.0);
    let artifact = pipeline.location_series(&grid_locations()).unwrap();

    // Synthetic data is exactly linear in time, so the fitted curve
    // reproduces the raw series.
    let after = artifact.table("after").unwrap();
    let raw = after.column("after").unwrap().f64().unwrap();
    let fitted = after.column("after_trend").unwrap().f64().unwrap();
    for idx in 0..after.height() {
        let (Some(r), Some(f)) = (raw.get(idx), fitted.get(idx)) else {
            panic!("unexpected null in location series");
        };
        assert!((r - f).abs() < 1e-6, "row {}: raw {} vs fitted {}", idx, r, f);
    }
}
