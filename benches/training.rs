use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use superwrangler_ml::config::SessionConfig;
use superwrangler_ml::preprocessing::{DatasetPreparer, RawDataset};
use superwrangler_ml::training::{AlgorithmRegistry, TrainEngine, CATALOG};

fn create_classification_data(n_rows: usize, n_features: usize) -> RawDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let regions = ["north", "south", "east", "west"];

    let rows: Vec<Value> = (0..n_rows)
        .map(|_| {
            let mut row = serde_json::Map::new();
            let mut sum = 0.0;
            for j in 0..n_features {
                let v: f64 = rng.gen::<f64>() * 10.0;
                sum += v;
                row.insert(format!("feature_{}", j), json!(v));
            }
            row.insert("region".to_string(), json!(regions[rng.gen_range(0..regions.len())]));
            let label = if sum + rng.gen::<f64>() > 5.0 * n_features as f64 { "high" } else { "low" };
            row.insert("label".to_string(), json!(label));
            Value::Object(row)
        })
        .collect();

    RawDataset::from_json(Value::Array(rows)).unwrap()
}

fn bench_preparation(c: &mut Criterion) {
    let mut group = c.benchmark_group("preparation");
    let preparer = DatasetPreparer::new(&SessionConfig::default());

    for n_rows in [1000, 5000].iter() {
        let dataset = create_classification_data(*n_rows, 10);
        group.bench_with_input(BenchmarkId::new("prepare", n_rows), &dataset, |b, dataset| {
            b.iter(|| preparer.prepare(black_box(dataset), "label").unwrap())
        });
    }

    group.finish();
}

fn bench_estimators(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimators");
    group.sample_size(10);

    let dataset = create_classification_data(1000, 10);
    let split = DatasetPreparer::new(&SessionConfig::default())
        .prepare(&dataset, "label")
        .unwrap();

    for spec in CATALOG.iter().filter(|s| {
        matches!(s.name, "Logistic Regression" | "Decision Tree" | "Random Forest" | "K-Nearest Neighbors")
    }) {
        group.bench_function(BenchmarkId::new("fit", spec.name), |b| {
            b.iter(|| {
                let mut model = spec.build(42);
                model.fit(black_box(&split.x_train), black_box(&split.y_train)).unwrap();
                model
            })
        });
    }

    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");
    group.sample_size(10);

    let registry = AlgorithmRegistry::with_specs(
        CATALOG
            .iter()
            .filter(|s| matches!(s.name, "Logistic Regression" | "Decision Tree" | "Gaussian Naive Bayes"))
            .copied()
            .collect(),
    );
    let engine = TrainEngine::with_registry(SessionConfig::default(), registry);
    let dataset = create_classification_data(500, 8);

    group.bench_function("run_batch", |b| {
        b.iter(|| engine.run_batch(black_box(&dataset), "label").unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_preparation, bench_estimators, bench_session);
criterion_main!(benches);
