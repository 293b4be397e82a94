//! Integration test: Dataset preparation

use serde_json::{json, Value};
use superwrangler_ml::config::SessionConfig;
use superwrangler_ml::error::WranglerError;
use superwrangler_ml::preprocessing::{DatasetPreparer, RawDataset};

fn dataset(rows: Value) -> RawDataset {
    RawDataset::from_json(rows).unwrap()
}

fn binary_rows(n: usize) -> Value {
    Value::Array(
        (0..n)
            .map(|i| {
                json!({
                    "f1": i as f64,
                    "f2": (n - i) as f64 * 0.5,
                    "f3": (i % 3) as f64,
                    "target": if i < n / 2 { 0 } else { 1 },
                })
            })
            .collect(),
    )
}

fn prepare(rows: Value, target: &str) -> superwrangler_ml::Result<superwrangler_ml::preprocessing::PreparedSplit> {
    DatasetPreparer::new(&SessionConfig::default()).prepare(&dataset(rows), target)
}

#[test]
fn test_stratified_twenty_rows() {
    let split = prepare(binary_rows(20), "target").unwrap();

    assert!(split.stratified);
    assert_eq!(split.info.samples, 20);
    assert_eq!(split.info.features, 3);
    assert_eq!(split.info.features_after_encoding, 3);
    assert_eq!(split.info.classes, 2);
    assert_eq!(split.info.train_size, 16);
    assert_eq!(split.info.test_size, 4);
    assert_eq!(split.x_train.nrows(), 16);
    assert_eq!(split.x_test.nrows(), 4);

    let test_ones = split.y_test.iter().filter(|&&y| y == 1).count();
    assert_eq!(test_ones, 2, "both classes keep their share of the test set");
}

#[test]
fn test_missing_target_column() {
    let err = prepare(binary_rows(20), "label").unwrap_err();
    assert!(matches!(err, WranglerError::SchemaError(_)));
    assert!(err.is_client_error());
}

#[test]
fn test_schema_checked_before_size() {
    let err = prepare(binary_rows(3), "label").unwrap_err();
    assert!(matches!(err, WranglerError::SchemaError(_)));
}

#[test]
fn test_too_few_samples() {
    let rows = Value::Array(
        (0..9)
            .map(|i| json!({"x": i, "y": i % 3}))
            .collect(),
    );
    let err = prepare(rows, "y").unwrap_err();
    assert!(matches!(err, WranglerError::InsufficientDataError { samples: 9, required: 10 }));
}

#[test]
fn test_single_class() {
    let rows = Value::Array((0..10).map(|i| json!({"x": i, "y": "same"})).collect());
    let err = prepare(rows, "y").unwrap_err();
    assert!(matches!(err, WranglerError::InsufficientClassesError { found: 1, .. }));
}

#[test]
fn test_rows_with_missing_target_are_dropped() {
    let mut rows: Vec<Value> = (0..12).map(|i| json!({"x": i, "y": i % 2})).collect();
    rows.push(json!({"x": 99}));
    rows.push(json!({"x": 98, "y": null}));

    let split = prepare(Value::Array(rows), "y").unwrap();
    assert_eq!(split.info.samples, 14);
    assert_eq!(split.info.train_size + split.info.test_size, 12);
}

#[test]
fn test_too_few_labelled_rows() {
    let mut rows: Vec<Value> = (0..8).map(|i| json!({"x": i, "y": i % 2})).collect();
    rows.extend((0..4).map(|i| json!({"x": i})));

    let err = prepare(Value::Array(rows), "y").unwrap_err();
    assert!(matches!(err, WranglerError::InsufficientDataError { samples: 8, .. }));
}

#[test]
fn test_categorical_features_drop_first() {
    let colors = ["red", "green", "blue"];
    let rows = Value::Array(
        (0..15)
            .map(|i| {
                json!({
                    "size": i as f64,
                    "color": colors[i % 3],
                    "flag": i % 2 == 0,
                    "y": if i % 2 == 0 { "yes" } else { "no" },
                })
            })
            .collect(),
    );

    let split = prepare(rows, "y").unwrap();
    assert_eq!(split.info.features, 3);
    // size, flag, color_green, color_red ("blue" sorts first and is dropped)
    assert_eq!(split.info.features_after_encoding, 4);
    assert_eq!(split.feature_names, vec!["size", "flag", "color_green", "color_red"]);
    assert_eq!(split.class_labels, vec!["no", "yes"]);
}

#[test]
fn test_features_are_standardized_on_all_rows() {
    let split = prepare(binary_rows(20), "target").unwrap();

    for j in 0..split.n_features() {
        let column: Vec<f64> = split
            .x_train
            .column(j)
            .iter()
            .chain(split.x_test.column(j).iter())
            .copied()
            .collect();
        let mean = column.iter().sum::<f64>() / column.len() as f64;
        let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / column.len() as f64;
        assert!(mean.abs() < 1e-9, "column {} mean {}", j, mean);
        assert!((var - 1.0).abs() < 1e-9, "column {} variance {}", j, var);
    }
}

#[test]
fn test_singleton_class_uses_random_split() {
    let mut rows: Vec<Value> = (0..11).map(|i| json!({"x": i, "y": i % 2})).collect();
    rows.push(json!({"x": 50, "y": 2}));

    let split = prepare(Value::Array(rows), "y").unwrap();
    assert!(!split.stratified);
    assert_eq!(split.info.classes, 3);
    assert_eq!(split.info.test_size, 3);
    assert_eq!(split.info.train_size, 9);
}

#[test]
fn test_preparation_is_deterministic() {
    let a = prepare(binary_rows(30), "target").unwrap();
    let b = prepare(binary_rows(30), "target").unwrap();
    assert_eq!(a.info, b.info);
    assert_eq!(a.y_test, b.y_test);
    assert_eq!(a.x_train, b.x_train);
}

#[test]
fn test_nested_values_rejected() {
    let err = RawDataset::from_json(json!([{"x": [1, 2], "y": 0}])).unwrap_err();
    assert!(matches!(err, WranglerError::DataError(_)));
}
