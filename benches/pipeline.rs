//! Benchmarks for the artifact builders on a synthetic campaign.

use criterion::{criterion_group, criterion_main, Criterion};

use ensemble_compare_rust::synthetic::{suitability_pair, SyntheticSpec};
use ensemble_compare_rust::{FigureData, RunConfig};

fn pipeline_fixture() -> FigureData {
    let spec = SyntheticSpec {
        // Denser grid than the test default to make the reductions non-trivial
        grid: (0..40)
            .map(|i| (-60.0 + 3.0 * i as f64, 10.0 * (i % 12) as f64, 80.0))
            .collect(),
        noise: 5.0,
        ..SyntheticSpec::default()
    };
    let (control, feedback) = suitability_pair(&spec).expect("synthetic pair");
    FigureData::new(control, feedback, RunConfig::default()).expect("pipeline")
}

fn bench_builders(c: &mut Criterion) {
    let pipeline = pipeline_fixture();

    c.bench_function("mean_summary", |b| {
        b.iter(|| pipeline.mean_summary().expect("mean_summary"))
    });
    c.bench_function("change_example", |b| {
        b.iter(|| pipeline.change_example().expect("change_example"))
    });
    c.bench_function("change_summary", |b| {
        b.iter(|| pipeline.change_summary().expect("change_summary"))
    });
    c.bench_function("trend_summary", |b| {
        b.iter(|| pipeline.trend_summary().expect("trend_summary"))
    });
}

criterion_group!(benches, bench_builders);
criterion_main!(benches);
