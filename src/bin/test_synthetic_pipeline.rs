//! End-to-end smoke run on synthetic data
//!
//! Generates a deterministic control/feedback pair (plus a
//! temperature-forcing demo of the model seam), runs every artifact
//! builder and prints the headline numbers.
//!
//! Run with: cargo run --release --bin test_synthetic_pipeline -- [out_dir]

use anyhow::Result;
use polars::prelude::ChunkAgg;
use std::path::PathBuf;
use std::time::Instant;

use ensemble_compare_rust::model::{GaussianNicheModel, SuitabilityModel};
use ensemble_compare_rust::pipeline::{FIELD_MEAN_CHANGE, FIELD_WITH_MINUS_WITHOUT};
use ensemble_compare_rust::synthetic::{climate_ensemble, suitability_pair, SyntheticSpec};
use ensemble_compare_rust::{FigureData, NamedLocation, RunConfig};

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("figure_data_synthetic"));

    println!("{}", "=".repeat(70));
    println!("SYNTHETIC PIPELINE SMOKE TEST");
    println!("{}", "=".repeat(70));

    let spec = SyntheticSpec {
        noise: 5.0,
        ..SyntheticSpec::default()
    };
    let (control, feedback) = suitability_pair(&spec)?;
    println!(
        "Generated pair: {} realizations, {} timestamps, {} locations",
        control.realizations()?.len(),
        control.times()?.len(),
        control.n_locations()?
    );

    // Model seam demo: derive suitability from a forcing ensemble
    let forcing = climate_ensemble(&spec)?;
    let model = GaussianNicheModel::default();
    let derived = model.run(&forcing)?;
    println!(
        "Model '{}' derived '{}' for {} rows",
        model.name(),
        ensemble_compare_rust::FIELD_SUITABILITY,
        derived.frame().height()
    );

    let locations: Vec<NamedLocation> = spec
        .grid
        .iter()
        .enumerate()
        .map(|(idx, &(lat, lon, _))| NamedLocation {
            name: format!("site_{}", idx + 1),
            lat,
            lon,
        })
        .collect();

    let pipeline = FigureData::new(control, feedback, RunConfig::default())?;

    let start = Instant::now();
    let written = pipeline.run_all(&out_dir, Some(&locations))?;
    println!(
        "\nBuilt {} artifacts in {:.2?}",
        written.len(),
        start.elapsed()
    );

    let mean_summary = pipeline.mean_summary()?;
    let diffs = mean_summary
        .fields()?
        .column(FIELD_WITH_MINUS_WITHOUT)?
        .f64()?;
    println!(
        "with_minus_without_intervention: min {:.3}, max {:.3}",
        diffs.min().unwrap_or(f64::NAN),
        diffs.max().unwrap_or(f64::NAN)
    );

    let change = pipeline.change_example()?;
    let mean_change = change.fields()?.column(FIELD_MEAN_CHANGE)?.f64()?;
    println!(
        "mean_change across realizations: min {:.3}, max {:.3}",
        mean_change.min().unwrap_or(f64::NAN),
        mean_change.max().unwrap_or(f64::NAN)
    );

    println!("\nAll artifacts written under {:?}", out_dir);
    Ok(())
}
