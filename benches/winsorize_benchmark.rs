//! Benchmark of per-implicate winsorization
//!
//! Run with: cargo bench --bench winsorize_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::SeedableRng;

use finlit::pipeline::{percentile, winsorize_grouped};

/// Right-skewed wealth-like values spread over five implicates, with some nulls
fn generate_values(n_rows: usize, seed: u64) -> (Vec<Option<f64>>, Vec<Option<i64>>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let values = (0..n_rows)
        .map(|_| {
            if rng.gen::<f64>() < 0.02 {
                None
            } else {
                let v = rng.gen::<f64>();
                Some(v * v * v * 5_000_000.0 - 50_000.0)
            }
        })
        .collect();
    let groups = (0..n_rows).map(|i| Some((i % 5) as i64 + 1)).collect();
    (values, groups)
}

fn benchmark_winsorize_grouped(c: &mut Criterion) {
    let mut group = c.benchmark_group("winsorize_grouped");

    for n_rows in [10_000, 100_000, 1_000_000] {
        let (values, groups) = generate_values(n_rows, 42);
        group.throughput(Throughput::Elements(n_rows as u64));

        group.bench_with_input(
            BenchmarkId::new("p5_p95", n_rows),
            &(values, groups),
            |b, (values, groups)| {
                b.iter(|| {
                    let _ = winsorize_grouped(
                        black_box(values),
                        black_box(groups),
                        black_box(5.0),
                        black_box(95.0),
                    );
                });
            },
        );
    }

    group.finish();
}

fn benchmark_percentile(c: &mut Criterion) {
    let mut group = c.benchmark_group("percentile");

    for n_rows in [10_000, 1_000_000] {
        let (values, _) = generate_values(n_rows, 7);
        let values: Vec<f64> = values.into_iter().flatten().collect();

        group.bench_with_input(BenchmarkId::new("p95", n_rows), &values, |b, values| {
            b.iter(|| {
                let _ = percentile(black_box(values), black_box(95.0));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_winsorize_grouped, benchmark_percentile);
criterion_main!(benches);
