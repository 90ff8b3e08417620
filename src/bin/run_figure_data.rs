//! Figure-data production run
//!
//! Loads the control and intervention ensembles from their Parquet chunk
//! directories and writes every summary artifact.
//!
//! Run with: cargo run --release --bin run_figure_data -- \
//!     <control_dir> <feedback_dir> <out_dir> [config.json] [locations.csv]

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Instant;

use ensemble_compare_rust::io::{load_ensemble, load_location_list};
use ensemble_compare_rust::{FigureData, RunConfig};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        bail!(
            "usage: {} <control_dir> <feedback_dir> <out_dir> [config.json] [locations.csv]",
            args[0]
        );
    }
    let control_dir = PathBuf::from(&args[1]);
    let feedback_dir = PathBuf::from(&args[2]);
    let out_dir = PathBuf::from(&args[3]);

    let config = match args.get(4) {
        Some(path) => RunConfig::load(PathBuf::from(path).as_path())
            .with_context(|| format!("Failed to load run config from {}", path))?,
        None => RunConfig::default(),
    };
    let locations = match args.get(5) {
        Some(path) => Some(load_location_list(PathBuf::from(path).as_path())?),
        None => None,
    };

    println!("{}", "=".repeat(70));
    println!("ENSEMBLE COMPARISON: figure data run");
    println!("{}", "=".repeat(70));

    let load_start = Instant::now();
    let control = load_ensemble(&control_dir, "control")?;
    let feedback = load_ensemble(&feedback_dir, "feedback")?;
    println!("Loaded ensembles in {:.2?}\n", load_start.elapsed());

    let pipeline = FigureData::new(control, feedback, config)?;
    println!(
        "Branch mapping: {} parents x {} branches",
        pipeline.mapping().parent_count,
        pipeline.mapping().branch_factor
    );

    let build_start = Instant::now();
    println!("Building artifacts under {:?}...", out_dir);
    let written = pipeline.run_all(&out_dir, locations.as_deref())?;
    println!(
        "\nWrote {} artifacts in {:.2?}",
        written.len(),
        build_start.elapsed()
    );

    Ok(())
}
