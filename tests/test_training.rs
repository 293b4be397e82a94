//! Integration test: Training sessions end-to-end

use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array1, Array2};
use serde_json::{json, Value};
use superwrangler_ml::config::{RegistryProfile, SessionConfig};
use superwrangler_ml::error::{Result, WranglerError};
use superwrangler_ml::preprocessing::RawDataset;
use superwrangler_ml::training::{
    select_best, AlgorithmRegistry, AlgorithmSpec, Classifier, EvaluationResult, EvaluationStatus,
    Hyperparameters, ProgressEvent, SessionSummary, TrainEngine, CATALOG,
};

fn classification_rows() -> RawDataset {
    let f1 = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0,
              1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5, 8.5, 9.5, 10.5];
    let f2 = [10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0,
              9.5, 8.5, 7.5, 6.5, 5.5, 4.5, 3.5, 2.5, 1.5, 0.5];
    let f3 = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0,
              0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85, 0.95, 1.05];
    let target = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1,
                  0, 0, 0, 0, 0, 1, 1, 1, 1, 1];

    let rows: Vec<Value> = (0..20)
        .map(|i| json!({"f1": f1[i], "f2": f2[i], "f3": f3[i], "target": target[i]}))
        .collect();
    RawDataset::from_json(Value::Array(rows)).unwrap()
}

fn multiclass_rows() -> RawDataset {
    let species = ["setosa", "versicolor", "virginica"];
    let rows: Vec<Value> = (0..45)
        .map(|i| {
            let class = i % 3;
            let jitter = (i / 3) as f64 * 0.05;
            json!({
                "petal_length": class as f64 * 2.0 + 1.0 + jitter,
                "petal_width": class as f64 * 0.8 + 0.2 + jitter * 0.5,
                "habitat": if i % 2 == 0 { "meadow" } else { "forest" },
                "species": species[class],
            })
        })
        .collect();
    RawDataset::from_json(Value::Array(rows)).unwrap()
}

fn registry_of(names: &[&str]) -> AlgorithmRegistry {
    AlgorithmRegistry::with_specs(
        names
            .iter()
            .map(|name| *CATALOG.iter().find(|s| s.name == *name).unwrap())
            .collect(),
    )
}

fn fast_registry() -> AlgorithmRegistry {
    registry_of(&[
        "Logistic Regression",
        "Decision Tree",
        "Random Forest",
        "K-Nearest Neighbors",
        "Gaussian Naive Bayes",
    ])
}

/// Always fails to fit
struct AlwaysFails;

impl Classifier for AlwaysFails {
    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<usize>) -> Result<()> {
        Err(WranglerError::TrainingError("configured to fail".to_string()))
    }

    fn predict(&self, _x: &Array2<f64>) -> Result<Array1<usize>> {
        Err(WranglerError::ModelNotFitted)
    }

    fn classes(&self) -> &[usize] {
        &[]
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::new()
    }
}

fn always_fails(_seed: u64) -> Box<dyn Classifier> {
    Box::new(AlwaysFails)
}

static SCHEMA_BUILDS: AtomicUsize = AtomicUsize::new(0);
static CLASSES_BUILDS: AtomicUsize = AtomicUsize::new(0);

fn counted_for_schema(_seed: u64) -> Box<dyn Classifier> {
    SCHEMA_BUILDS.fetch_add(1, Ordering::SeqCst);
    Box::new(AlwaysFails)
}

fn counted_for_classes(_seed: u64) -> Box<dyn Classifier> {
    CLASSES_BUILDS.fetch_add(1, Ordering::SeqCst);
    Box::new(AlwaysFails)
}

static LIVE_ESTIMATORS: AtomicUsize = AtomicUsize::new(0);
static PEAK_ESTIMATORS: AtomicUsize = AtomicUsize::new(0);
static TRACKED_BUILDS: AtomicUsize = AtomicUsize::new(0);

/// Majority-class predictor that counts its live instances
struct Tracked {
    classes: Vec<usize>,
    majority: usize,
}

impl Tracked {
    fn new() -> Self {
        TRACKED_BUILDS.fetch_add(1, Ordering::SeqCst);
        let live = LIVE_ESTIMATORS.fetch_add(1, Ordering::SeqCst) + 1;
        PEAK_ESTIMATORS.fetch_max(live, Ordering::SeqCst);
        Self {
            classes: Vec::new(),
            majority: 0,
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        LIVE_ESTIMATORS.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Classifier for Tracked {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        let mut counts = std::collections::BTreeMap::new();
        for &label in y {
            *counts.entry(label).or_insert(0usize) += 1;
        }
        self.classes = counts.keys().copied().collect();
        self.majority = counts
            .iter()
            .max_by_key(|&(_, count)| *count)
            .map(|(&label, _)| label)
            .unwrap_or(0);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        Ok(Array1::from_elem(x.nrows(), self.majority))
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::new()
    }
}

fn tracked(_seed: u64) -> Box<dyn Classifier> {
    Box::new(Tracked::new())
}

/// Fields that must match between runs; timings are excluded.
fn comparable(result: &EvaluationResult) -> (String, EvaluationStatus, Vec<Vec<u64>>, Hyperparameters) {
    (
        result.algorithm.clone(),
        result.status,
        result.confusion_matrix.clone(),
        result.hyperparameters.clone(),
    )
}

fn assert_same_summary(a: &SessionSummary, b: &SessionSummary) {
    assert_eq!(a.dataset_info, b.dataset_info);
    assert_eq!(a.success_count, b.success_count);
    assert_eq!(a.failure_count, b.failure_count);
    assert_eq!(a.best_model.algorithm, b.best_model.algorithm);
    assert_eq!(a.results.len(), b.results.len());
    for (x, y) in a.results.iter().zip(&b.results) {
        assert_eq!(comparable(x), comparable(y));
        assert!((x.f1_score - y.f1_score).abs() < 1e-9, "{} F1 differs", x.algorithm);
        assert!((x.cv_f1_mean - y.cv_f1_mean).abs() < 1e-9, "{} CV F1 differs", x.algorithm);
    }
}

#[test]
fn test_twenty_row_binary_session() {
    let engine = TrainEngine::new(SessionConfig::default());
    let summary = engine.run_batch(&classification_rows(), "target").unwrap();

    assert_eq!(summary.results.len(), 22);
    assert_eq!(summary.dataset_info.samples, 20);
    assert_eq!(summary.dataset_info.train_size, 16);
    assert_eq!(summary.dataset_info.test_size, 4);
    assert_eq!(summary.success_count + summary.failure_count, 22);
    assert!(summary.success_count > 0);

    let names: Vec<&str> = summary.results.iter().map(|r| r.algorithm.as_str()).collect();
    assert_eq!(names, AlgorithmRegistry::for_profile(RegistryProfile::Full).names());

    // First successful result with the maximal F1
    let max_f1 = summary
        .results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.f1_score)
        .fold(f64::NEG_INFINITY, f64::max);
    let first_best = summary
        .results
        .iter()
        .find(|r| r.is_success() && r.f1_score == max_f1)
        .unwrap();
    assert_eq!(summary.best_model.algorithm, first_best.algorithm);
    assert_eq!(select_best(&summary.results).unwrap().algorithm, first_best.algorithm);

    for result in summary.results.iter().filter(|r| r.is_success()) {
        assert!((0.0..=1.0).contains(&result.f1_score));
        let total: u64 = result.confusion_matrix.iter().flatten().sum();
        assert_eq!(total, 4, "{} confusion matrix", result.algorithm);
        assert!(result.hyperparameters.keys().all(|k| !k.starts_with('_')));
    }
}

#[test]
fn test_probability_models_report_roc_auc() {
    let engine = TrainEngine::with_registry(SessionConfig::default(), fast_registry());
    let summary = engine.run_batch(&classification_rows(), "target").unwrap();

    let by_name = |name: &str| summary.results.iter().find(|r| r.algorithm == name).unwrap();
    assert!(by_name("Logistic Regression").roc_auc.is_some());
    assert!(by_name("Gaussian Naive Bayes").roc_auc.is_some());

    let ridge = TrainEngine::with_registry(SessionConfig::default(), registry_of(&["Ridge Classifier"]))
        .run_batch(&classification_rows(), "target")
        .unwrap();
    assert!(ridge.results[0].roc_auc.is_none());
}

#[test]
fn test_missing_target_runs_nothing() {
    let registry = AlgorithmRegistry::with_specs(vec![AlgorithmSpec::new("Counted", counted_for_schema)]);
    let engine = TrainEngine::with_registry(SessionConfig::default(), registry);

    let err = engine.run_batch(&classification_rows(), "label").unwrap_err();
    assert!(matches!(err, WranglerError::SchemaError(_)));
    assert!(engine.run_streaming(&classification_rows(), "label").is_err());
    assert_eq!(SCHEMA_BUILDS.load(Ordering::SeqCst), 0);
}

#[test]
fn test_single_class_runs_nothing() {
    let rows: Vec<Value> = (0..10).map(|i| json!({"x": i, "y": 1})).collect();
    let dataset = RawDataset::from_json(Value::Array(rows)).unwrap();
    let registry = AlgorithmRegistry::with_specs(vec![AlgorithmSpec::new("Counted", counted_for_classes)]);
    let engine = TrainEngine::with_registry(SessionConfig::default(), registry);

    let err = engine.run_batch(&dataset, "y").unwrap_err();
    assert!(matches!(err, WranglerError::InsufficientClassesError { found: 1, .. }));
    assert_eq!(CLASSES_BUILDS.load(Ordering::SeqCst), 0);
}

#[test]
fn test_small_dataset_rejected_regardless_of_classes() {
    let rows: Vec<Value> = (0..6).map(|i| json!({"x": i, "y": i})).collect();
    let dataset = RawDataset::from_json(Value::Array(rows)).unwrap();
    let engine = TrainEngine::with_registry(SessionConfig::default(), fast_registry());

    let err = engine.run_batch(&dataset, "y").unwrap_err();
    assert!(matches!(err, WranglerError::InsufficientDataError { samples: 6, .. }));
}

#[test]
fn test_failing_algorithm_is_contained() {
    let registry = AlgorithmRegistry::with_specs(vec![
        AlgorithmSpec::new("Always Fails", always_fails),
        *CATALOG.iter().find(|s| s.name == "Gaussian Naive Bayes").unwrap(),
        *CATALOG.iter().find(|s| s.name == "Decision Tree").unwrap(),
    ]);
    let engine = TrainEngine::with_registry(SessionConfig::default(), registry);
    let summary = engine.run_batch(&classification_rows(), "target").unwrap();

    let failed = &summary.results[0];
    assert_eq!(failed.status, EvaluationStatus::Failed);
    assert_eq!(failed.accuracy, 0.0);
    assert_eq!(failed.f1_score, 0.0);
    assert_eq!(failed.confusion_matrix, vec![vec![0]]);
    assert!(failed.error.as_deref().unwrap().contains("configured to fail"));

    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.success_count, 2);
    assert_ne!(summary.best_model.algorithm, "Always Fails");
    assert!(summary.best_model.is_success());
}

#[test]
fn test_all_failed_session() {
    let registry = AlgorithmRegistry::with_specs(vec![
        AlgorithmSpec::new("Fails A", always_fails),
        AlgorithmSpec::new("Fails B", always_fails),
    ]);
    let engine = TrainEngine::with_registry(SessionConfig::default(), registry);

    let err = engine.run_batch(&classification_rows(), "target").unwrap_err();
    assert!(matches!(err, WranglerError::AllModelsFailedError));

    let events: Vec<ProgressEvent> = engine.run_streaming(&classification_rows(), "target").unwrap().collect();
    assert_eq!(events.len(), 4);
    assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Complete(_))));
}

#[test]
fn test_event_ordering() {
    let engine = TrainEngine::with_registry(SessionConfig::default(), fast_registry());
    let events: Vec<ProgressEvent> = engine.run_streaming(&classification_rows(), "target").unwrap().collect();

    let n = engine.registry().len();
    assert_eq!(events.len(), n + 2);
    match &events[0] {
        ProgressEvent::Start { dataset_info, total } => {
            assert_eq!(*total, n);
            assert_eq!(dataset_info.samples, 20);
        }
        other => panic!("expected start, got {:?}", other),
    }
    for (i, event) in events[1..=n].iter().enumerate() {
        match event {
            ProgressEvent::ModelComplete { index, total, result } => {
                assert_eq!(*index, i + 1);
                assert_eq!(*total, n);
                assert_eq!(result.algorithm, engine.registry().names()[i]);
            }
            other => panic!("expected model_complete, got {:?}", other),
        }
    }
    assert!(events[n + 1].is_terminal());
    assert!(events[..=n].iter().all(|e| !e.is_terminal()));
}

#[test]
fn test_streaming_matches_batch() {
    let engine = TrainEngine::with_registry(SessionConfig::default(), fast_registry());
    let batch = engine.run_batch(&classification_rows(), "target").unwrap();

    let terminal = engine
        .run_streaming(&classification_rows(), "target")
        .unwrap()
        .last()
        .unwrap();
    let ProgressEvent::Complete(streamed) = terminal else {
        panic!("expected complete event");
    };
    assert_same_summary(&batch, &streamed);
}

#[test]
fn test_repeated_sessions_are_identical() {
    let registry = registry_of(&[
        "Logistic Regression",
        "SGD Classifier",
        "Random Forest",
        "Extra Trees Ensemble",
        "XGBoost",
        "Multi-Layer Perceptron",
    ]);
    let engine = TrainEngine::with_registry(SessionConfig::default(), registry);

    let first = engine.run_batch(&multiclass_rows(), "species").unwrap();
    let second = engine.run_batch(&multiclass_rows(), "species").unwrap();
    assert_same_summary(&first, &second);
}

#[test]
fn test_multiclass_with_categorical_feature() {
    let engine = TrainEngine::with_registry(SessionConfig::default(), fast_registry());
    let summary = engine.run_batch(&multiclass_rows(), "species").unwrap();

    assert_eq!(summary.dataset_info.classes, 3);
    assert_eq!(summary.dataset_info.features, 3);
    assert_eq!(summary.dataset_info.features_after_encoding, 3);
    assert_eq!(summary.dataset_info.test_size, 9);
    for result in summary.results.iter().filter(|r| r.is_success()) {
        assert_eq!(result.confusion_matrix.iter().flatten().sum::<u64>(), 9);
    }
    assert!(summary.best_model.f1_score > 0.8);
}

#[test]
fn test_advanced_profile_session() {
    let config = SessionConfig::default().with_profile(RegistryProfile::AdvancedOnly);
    let engine = TrainEngine::new(config);
    assert_eq!(engine.registry().len(), 15);
    assert!(engine.registry().get("Random Forest").is_none());
}

#[test]
fn test_summary_json_shape() {
    let engine = TrainEngine::with_registry(SessionConfig::default(), fast_registry());
    let summary = engine.run_batch(&classification_rows(), "target").unwrap();
    let json = serde_json::to_value(&summary).unwrap();

    for key in ["results", "bestModel", "totalTime", "successCount", "failureCount", "datasetInfo"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    let result = &json["results"][0];
    for key in [
        "algorithm", "accuracy", "precision", "recall", "f1Score", "rocAuc", "cvF1Mean", "cvF1Std",
        "trainingTime", "predictionTime", "trainScore", "testScore", "confusionMatrix",
        "hyperparameters", "status",
    ] {
        assert!(result.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(json["datasetInfo"]["featuresAfterEncoding"], 3);
}

#[test]
fn test_each_estimator_released_before_the_next() {
    let registry = AlgorithmRegistry::with_specs(vec![
        AlgorithmSpec::new("Tracked A", tracked),
        AlgorithmSpec::new("Tracked B", tracked),
        AlgorithmSpec::new("Tracked C", tracked),
    ]);
    let engine = TrainEngine::with_registry(SessionConfig::default(), registry);

    let summary = engine.run_batch(&classification_rows(), "target").unwrap();
    assert_eq!(summary.success_count, 3);

    // One fitted model plus one per CV fold for every entry
    assert_eq!(TRACKED_BUILDS.load(Ordering::SeqCst), 3 * (1 + 5));
    assert_eq!(PEAK_ESTIMATORS.load(Ordering::SeqCst), 1);
    assert_eq!(LIVE_ESTIMATORS.load(Ordering::SeqCst), 0);
}
