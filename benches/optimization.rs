use criterion::{criterion_group, criterion_main, Criterion};
use eyre::Result;
use fmcore::prelude::*;
use fmcore::routines::dataset::{SigmoidResponse, Synthetic};
use std::hint::black_box;

fn setup() -> Result<(BoundsTable, SigmoidResponse)> {
    let bounds = BoundsTable::from_entries([
        ("water", 0.30, 0.70),
        ("ethanol", 0.05, 0.25),
        ("glycerol", 0.00, 0.15),
        ("polymer", 0.10, 0.40),
        ("salt", 0.00, 0.02),
    ])?;
    let dataset = Synthetic::new(
        vec!["temperature".to_string()],
        bounds.clone(),
        vec!["viscosity".to_string(), "stability".to_string()],
    )
    .generate(10, 347)?;
    let response = dataset.response(&[0.5])?;
    Ok((bounds, response))
}

fn objective(p: &[f64]) -> Result<f64> {
    Ok((p[0] - 0.6).powi(2) - p[1])
}

/// Benchmark a single chain of 10 000 iterations against a synthetic response
fn benchmark_metropolis(c: &mut Criterion) {
    let (bounds, response) = setup().unwrap();
    let optimizer = FormulationOptimizer::new(bounds, response, objective, 0.1)
        .unwrap()
        .with_predictions(false);

    c.bench_function("metropolis", |b| {
        b.iter(|| optimizer.optimize(None, black_box(10_000), 0))
    });
}

/// Benchmark four parallel chains of 10 000 iterations
fn benchmark_multistart(c: &mut Criterion) {
    let (bounds, response) = setup().unwrap();
    let optimizer = FormulationOptimizer::new(bounds, response, objective, 0.1)
        .unwrap()
        .with_predictions(false);

    c.bench_function("multistart", |b| {
        b.iter(|| multistart::run(&optimizer, black_box(4), None, black_box(10_000), 0))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = benchmark_metropolis, benchmark_multistart
}
criterion_main!(benches);
