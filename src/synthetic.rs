//! Synthetic ensemble generation
//!
//! Builds deterministic control/feedback ensemble pairs for the demo
//! binary, benchmarks and integration tests: a linear warming trend plus
//! per-realization offsets and seeded uniform noise, with the feedback
//! scenario branching from the first `parent_count` control trajectories
//! at the start of the after window and damping the trend thereafter.

use anyhow::Result;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::dataset::{
    EnsembleDataset, COL_LAT, COL_LON, COL_REALIZATION, COL_TIME, COL_YEAR, FIELD_SUITABILITY,
};
use crate::matcher::BranchMapping;
use crate::utils::time::epoch_day;

/// Parameters of a synthetic campaign.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    /// Control years (the feedback scenario only covers `branch_year..`).
    pub years: Vec<i32>,
    /// First year of the feedback scenario.
    pub branch_year: i32,
    /// Time samples per year (daily simulation output is thinned for
    /// tests; 12 approximates monthly means).
    pub samples_per_year: usize,
    pub mapping: BranchMapping,
    /// Grid points as (lat, lon, baseline suitability).
    pub grid: Vec<(f64, f64, f64)>,
    /// Suitability trend per day under the control scenario.
    pub trend_per_day: f64,
    /// Fraction of the control trend remaining under the intervention.
    pub feedback_trend_fraction: f64,
    /// Half-width of the uniform noise term.
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            years: (2025..2045).collect(),
            branch_year: 2035,
            samples_per_year: 12,
            mapping: BranchMapping {
                parent_count: 5,
                branch_factor: 2,
            },
            grid: vec![(10.0, 100.0, 120.0), (25.0, -80.0, 60.0)],
            trend_per_day: 0.002,
            feedback_trend_fraction: 0.25,
            noise: 0.0,
            seed: 42,
        }
    }
}

impl SyntheticSpec {
    fn sample_times(&self, years: &[i32]) -> Vec<(i64, i32)> {
        let mut times = Vec::new();
        for &year in years {
            let start = epoch_day(year, 1, 1);
            let span = epoch_day(year + 1, 1, 1) - start;
            for sample in 0..self.samples_per_year {
                let offset = (span * sample as i64) / self.samples_per_year as i64;
                times.push((start + offset, year));
            }
        }
        times
    }
}

/// Generate a (control, feedback) suitability ensemble pair.
///
/// Both ensembles carry `branched_count` realizations; feedback
/// realization `r` shares the per-trajectory offset of its parent
/// `r mod parent_count`, so branch pairs stay correlated the way the
/// physical initialization makes them.
pub fn suitability_pair(spec: &SyntheticSpec) -> Result<(EnsembleDataset, EnsembleDataset)> {
    let n_realizations = spec.mapping.branched_count() as i64;
    let branch_day = epoch_day(spec.branch_year, 1, 1);

    let control_times = spec.sample_times(&spec.years);
    let feedback_years: Vec<i32> = spec
        .years
        .iter()
        .copied()
        .filter(|&y| y >= spec.branch_year)
        .collect();
    let feedback_times = spec.sample_times(&feedback_years);

    let mut rng = StdRng::seed_from_u64(spec.seed);

    let control = build_ensemble(
        "synthetic_control",
        spec,
        &control_times,
        n_realizations,
        |_, t| spec.trend_per_day * t as f64,
        &mut rng,
    )?;
    let feedback = build_ensemble(
        "synthetic_feedback",
        spec,
        &feedback_times,
        n_realizations,
        |_, t| {
            // Full trend up to the branch, damped trend afterwards
            spec.trend_per_day * branch_day as f64
                + spec.feedback_trend_fraction * spec.trend_per_day * (t - branch_day) as f64
        },
        &mut rng,
    )?;

    Ok((control, feedback))
}

/// Generate a temperature-forcing ensemble for the model seam demo.
pub fn climate_ensemble(spec: &SyntheticSpec) -> Result<EnsembleDataset> {
    let times = spec.sample_times(&spec.years);
    let n_realizations = spec.mapping.branched_count() as i64;
    let mut rng = StdRng::seed_from_u64(spec.seed.wrapping_add(1));

    let mut time = Vec::new();
    let mut year = Vec::new();
    let mut realization = Vec::new();
    let mut lat = Vec::new();
    let mut lon = Vec::new();
    let mut temperature = Vec::new();
    let mut member_ids = FxHashMap::default();

    for r in 0..n_realizations {
        member_ids.insert(r, format!("{:03}", r + 1));
        let offset = 0.2 * (spec.mapping.parent_of(r) as f64);
        for &(t, y) in &times {
            for &(la, lo, _) in &spec.grid {
                time.push(t);
                year.push(y);
                realization.push(r);
                lat.push(la);
                lon.push(lo);
                let warming = 1.5e-4 * t as f64;
                let noise = if spec.noise > 0.0 {
                    rng.gen_range(-spec.noise..spec.noise)
                } else {
                    0.0
                };
                temperature.push(24.0 + offset + warming + noise);
            }
        }
    }

    let frame = df![
        COL_TIME => &time,
        COL_YEAR => &year,
        COL_REALIZATION => &realization,
        COL_LAT => &lat,
        COL_LON => &lon,
        "temperature" => &temperature,
    ]?;
    EnsembleDataset::new("synthetic_forcing", frame, member_ids)
}

fn build_ensemble(
    name: &str,
    spec: &SyntheticSpec,
    times: &[(i64, i32)],
    n_realizations: i64,
    trend: impl Fn(i64, i64) -> f64,
    rng: &mut StdRng,
) -> Result<EnsembleDataset> {
    let mut time = Vec::new();
    let mut year = Vec::new();
    let mut realization = Vec::new();
    let mut lat = Vec::new();
    let mut lon = Vec::new();
    let mut value = Vec::new();
    let mut member_ids = FxHashMap::default();

    for r in 0..n_realizations {
        member_ids.insert(r, format!("{:03}", r + 1));
        // Branch pairs share their parent's internal-variability offset
        let offset = 1.5 * (spec.mapping.parent_of(r) as f64);
        for &(t, y) in times {
            for &(la, lo, base) in &spec.grid {
                time.push(t);
                year.push(y);
                realization.push(r);
                lat.push(la);
                lon.push(lo);
                let noise = if spec.noise > 0.0 {
                    rng.gen_range(-spec.noise..spec.noise)
                } else {
                    0.0
                };
                value.push(base + offset + trend(r, t) + noise);
            }
        }
    }

    let frame = df![
        COL_TIME => &time,
        COL_YEAR => &year,
        COL_REALIZATION => &realization,
        COL_LAT => &lat,
        COL_LON => &lon,
        FIELD_SUITABILITY => &value,
    ]?;
    EnsembleDataset::new(name, frame, member_ids)
}
