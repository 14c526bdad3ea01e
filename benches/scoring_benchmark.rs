//! Benchmarks for bin fitting, scoring and the gains table
//!
//! Run with: cargo bench --bench scoring_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use indicatif::ProgressBar;
use polars::prelude::*;
use rand::prelude::*;
use rand::SeedableRng;

use scorephi::pipeline::gains::{build_gains_table, pooled_buckets, ScoredDataset};
use scorephi::pipeline::{
    prepare_datasets, BinDefinition, BinningMethod, BinningSpec, BucketType, DatasetInput,
    GreedyBinningEngine, IrlsLogistic, PrepareOptions, PreparedDatasets, RegressionEngine,
    ScalingConfig, ScoreCard,
};

/// Synthetic labeled table: numeric features with a shared risk signal
fn generate_credit_table(n_rows: usize, n_features: usize, seed: u64) -> DataFrame {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let risk: Vec<f64> = (0..n_rows).map(|_| rng.gen::<f64>()).collect();
    let bad: Vec<i32> = risk
        .iter()
        .map(|&r| i32::from(rng.gen::<f64>() < 0.05 + 0.3 * r))
        .collect();

    let mut columns: Vec<Column> = vec![Column::new("bad".into(), bad)];
    for i in 0..n_features {
        let weight = (i % 4) as f64 * 0.25;
        let values: Vec<f64> = risk
            .iter()
            .map(|&r| weight * r * 100.0 + rng.gen::<f64>() * 50.0)
            .collect();
        columns.push(Column::new(format!("feature_{}", i).into(), values));
    }

    DataFrame::new(columns).expect("Failed to create DataFrame")
}

fn prepared(n_rows: usize, n_features: usize) -> PreparedDatasets {
    let df = generate_credit_table(n_rows, n_features, 42);
    let mut opts = PrepareOptions::new("bad");
    opts.seed = Some(7);
    prepare_datasets(DatasetInput::Single(df), &opts).expect("prepare")
}

fn fit_bins(data: &PreparedDatasets, method: BinningMethod) -> BinDefinition {
    let engine = GreedyBinningEngine {
        method,
        ..GreedyBinningEngine::default()
    };
    BinDefinition::fit(
        data.reference(),
        &data.features,
        &BinningSpec::default(),
        &engine,
        &ProgressBar::hidden(),
    )
    .expect("fit bins")
}

/// Bin fitting on the reference set for both pre-binning methods
fn benchmark_bin_fitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("bin_fitting");
    group.sample_size(10);

    for &n_rows in &[10_000usize, 50_000] {
        let data = prepared(n_rows, 20);
        group.throughput(Throughput::Elements(n_rows as u64));

        for method in [BinningMethod::Quantile, BinningMethod::Cart] {
            group.bench_with_input(
                BenchmarkId::new(method.to_string(), n_rows),
                &data,
                |b, data| b.iter(|| fit_bins(black_box(data), method)),
            );
        }
    }
    group.finish();
}

/// Scoring every dataset with a frozen card
fn benchmark_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");
    group.sample_size(10);

    for &n_rows in &[10_000usize, 100_000] {
        let data = prepared(n_rows, 20);
        let definition = Arc::new(fit_bins(&data, BinningMethod::Cart));
        let encoded = definition.apply(data.reference()).expect("apply");
        let model = IrlsLogistic::default().fit(&encoded).expect("fit model");
        let card =
            ScoreCard::fit(Arc::clone(&definition), &model, ScalingConfig::default()).expect("card");

        group.throughput(Throughput::Elements(n_rows as u64));
        group.bench_with_input(BenchmarkId::new("score", n_rows), &data, |b, data| {
            b.iter(|| {
                for ds in &data.datasets {
                    black_box(card.score(ds).expect("score"));
                }
            })
        });
    }
    group.finish();
}

/// Pooled buckets plus gains rows for two scored datasets
fn benchmark_gains(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let scored: Vec<ScoredDataset> = ["train", "test"]
        .iter()
        .map(|name| ScoredDataset {
            dataset: name.to_string(),
            scores: (0..100_000).map(|_| rng.gen_range(300..850)).collect(),
            labels: (0..100_000).map(|_| u8::from(rng.gen::<f64>() < 0.1)).collect(),
        })
        .collect();

    c.bench_function("gains_table", |b| {
        b.iter(|| {
            let buckets = pooled_buckets(black_box(&scored), 10, BucketType::Freq).expect("buckets");
            black_box(build_gains_table(&scored, &buckets))
        })
    });
}

criterion_group!(benches, benchmark_bin_fitting, benchmark_scoring, benchmark_gains);
criterion_main!(benches);
