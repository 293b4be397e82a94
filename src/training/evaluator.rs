//! Per-algorithm fit, predict and scoring
//!
//! [`Evaluator::evaluate`] never returns an error. Fit or predict failures,
//! including panics inside an estimator, become a `failed` result; ROC-AUC
//! and cross-validation have their own local fallbacks.

use crate::config::SessionConfig;
use crate::error::Result;
use crate::preprocessing::PreparedSplit;
use crate::training::cross_validation::cross_val_f1;
use crate::training::metrics;
use crate::training::models::Hyperparameters;
use crate::training::registry::AlgorithmSpec;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of one algorithm's evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Success,
    Failed,
}

/// Metrics for one algorithm. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub algorithm: String,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: Option<f64>,
    pub cv_f1_mean: f64,
    pub cv_f1_std: f64,
    pub training_time: f64,
    pub prediction_time: f64,
    pub train_score: f64,
    pub test_score: f64,
    pub confusion_matrix: Vec<Vec<u64>>,
    pub hyperparameters: Hyperparameters,
    pub status: EvaluationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    /// Zeroed metrics carrying the failure message
    pub fn failed(algorithm: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            roc_auc: None,
            cv_f1_mean: 0.0,
            cv_f1_std: 0.0,
            training_time: 0.0,
            prediction_time: 0.0,
            train_score: 0.0,
            test_score: 0.0,
            confusion_matrix: vec![vec![0]],
            hyperparameters: Hyperparameters::new(),
            status: EvaluationStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EvaluationStatus::Success
    }
}

/// Trains and scores one algorithm against a prepared split
#[derive(Debug, Clone)]
pub struct Evaluator {
    seed: u64,
    cv_fold_cap: usize,
}

impl Evaluator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            seed: config.random_seed,
            cv_fold_cap: config.cv_fold_cap,
        }
    }

    /// Number of CV folds for a training set of `train_size` rows.
    pub fn cv_folds(&self, train_size: usize) -> usize {
        self.cv_fold_cap.min(train_size / 2)
    }

    pub fn evaluate(&self, spec: &AlgorithmSpec, split: &PreparedSplit) -> EvaluationResult {
        debug!(algorithm = spec.name, "Evaluating");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_evaluate(spec, split)));
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => EvaluationResult::failed(spec.name, e.to_string()),
            Err(payload) => EvaluationResult::failed(spec.name, panic_message(payload.as_ref())),
        }
    }

    /// The estimator lives only for the duration of this call.
    fn try_evaluate(&self, spec: &AlgorithmSpec, split: &PreparedSplit) -> Result<EvaluationResult> {
        let mut model = spec.build(self.seed);

        let start = Instant::now();
        model.fit(&split.x_train, &split.y_train)?;
        let training_time = elapsed_ms(start);

        let start = Instant::now();
        let predictions = model.predict(&split.x_test)?;
        let prediction_time = elapsed_ms(start);

        let accuracy = metrics::accuracy(&split.y_test, &predictions);
        let scores = metrics::weighted_scores(&split.y_test, &predictions);
        let confusion_matrix = metrics::confusion_matrix(&split.y_test, &predictions);

        let roc_auc = if model.has_predict_proba() {
            let auc = panic::catch_unwind(AssertUnwindSafe(|| {
                let proba = model.predict_proba(&split.x_test)?;
                metrics::roc_auc(&split.y_test, &proba, model.classes())
            }));
            match auc {
                Ok(Ok(value)) if value.is_finite() => Some(value),
                Ok(Ok(_)) => None,
                Ok(Err(e)) => {
                    debug!(algorithm = spec.name, error = %e, "ROC-AUC unavailable");
                    None
                }
                Err(_) => None,
            }
        } else {
            None
        };

        let train_score = model.score(&split.x_train, &split.y_train)?;
        let test_score = model.score(&split.x_test, &split.y_test)?;

        let hyperparameters: Hyperparameters = model
            .hyperparameters()
            .into_iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .collect();
        drop(model);

        let (cv_f1_mean, cv_f1_std) = self.cross_validate(spec, split, scores.f1);

        Ok(EvaluationResult {
            algorithm: spec.name.to_string(),
            accuracy,
            precision: scores.precision,
            recall: scores.recall,
            f1_score: scores.f1,
            roc_auc,
            cv_f1_mean,
            cv_f1_std,
            training_time,
            prediction_time,
            train_score,
            test_score,
            confusion_matrix,
            hyperparameters,
            status: EvaluationStatus::Success,
            error: None,
        })
    }

    /// Mean and std of CV F1, or `(test_f1, 0.0)` if CV cannot run.
    fn cross_validate(&self, spec: &AlgorithmSpec, split: &PreparedSplit, test_f1: f64) -> (f64, f64) {
        let n_folds = self.cv_folds(split.x_train.nrows());
        let seed = self.seed;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            cross_val_f1(|| spec.build(seed), &split.x_train, &split.y_train, n_folds)
        }));

        match outcome {
            Ok(Ok(cv)) => (cv.mean_score, cv.std_score),
            Ok(Err(e)) => {
                warn!(algorithm = spec.name, n_folds, error = %e, "Cross-validation failed, using test F1");
                (test_f1, 0.0)
            }
            Err(payload) => {
                warn!(
                    algorithm = spec.name,
                    n_folds,
                    error = %panic_message(payload.as_ref()),
                    "Cross-validation panicked, using test F1"
                );
                (test_f1, 0.0)
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "estimator panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WranglerError;
    use crate::preprocessing::DatasetInfo;
    use crate::training::models::{hyperparameters, ClassIndex, Classifier};
    use ndarray::{Array1, Array2};

    fn blobs(n_per_class: usize) -> PreparedSplit {
        let n = n_per_class * 2;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let center = if i < n_per_class { -2.0 } else { 2.0 };
            center + ((i * 7 + j * 3) % 5) as f64 * 0.1
        });
        let y = Array1::from_iter((0..n).map(|i| usize::from(i >= n_per_class)));
        let test: Vec<usize> = (0..n).filter(|i| i % 5 == 0).collect();
        let train: Vec<usize> = (0..n).filter(|i| i % 5 != 0).collect();
        let select = |idx: &[usize]| {
            (
                x.select(ndarray::Axis(0), idx),
                y.select(ndarray::Axis(0), idx),
            )
        };
        let (x_train, y_train) = select(&train);
        let (x_test, y_test) = select(&test);
        PreparedSplit {
            info: DatasetInfo {
                samples: n,
                features: 2,
                features_after_encoding: 2,
                classes: 2,
                train_size: train.len(),
                test_size: test.len(),
            },
            x_train,
            x_test,
            y_train,
            y_test,
            class_labels: vec!["a".to_string(), "b".to_string()],
            feature_names: vec!["f0".to_string(), "f1".to_string()],
            stratified: false,
        }
    }

    /// Predicts the majority training class and exposes a private parameter
    struct Majority {
        index: ClassIndex,
        majority: usize,
    }

    impl Classifier for Majority {
        fn fit(&mut self, _x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
            self.index = ClassIndex::fit(y)?;
            let ones = y.iter().filter(|&&v| v == 1).count();
            self.majority = usize::from(ones * 2 > y.len());
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
            Ok(Array1::from_elem(x.nrows(), self.majority))
        }

        fn classes(&self) -> &[usize] {
            self.index.classes()
        }

        fn hyperparameters(&self) -> Hyperparameters {
            hyperparameters([("strategy", &"most_frequent"), ("_internal", &1)])
        }
    }

    fn majority(_seed: u64) -> Box<dyn Classifier> {
        Box::new(Majority {
            index: ClassIndex::default(),
            majority: 0,
        })
    }

    struct Broken;

    impl Classifier for Broken {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<usize>) -> Result<()> {
            Err(WranglerError::TrainingError("solver diverged".to_string()))
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

    struct Panicky;

    impl Classifier for Panicky {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<usize>) -> Result<()> {
            panic!("index out of bounds");
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

    #[test]
    fn test_successful_evaluation() {
        let split = blobs(20);
        let evaluator = Evaluator::new(&SessionConfig::default());
        let spec = AlgorithmSpec::new("Gaussian Naive Bayes", |_| -> Box<dyn Classifier> {
            Box::new(crate::training::naive_bayes::GaussianNaiveBayes::new())
        });

        let result = evaluator.evaluate(&spec, &split);
        assert!(result.is_success());
        assert_eq!(result.algorithm, "Gaussian Naive Bayes");
        assert!(result.accuracy > 0.9);
        assert!(result.roc_auc.is_some());
        assert_eq!(result.confusion_matrix.len(), 2);
        let total: u64 = result.confusion_matrix.iter().flatten().sum();
        assert_eq!(total as usize, split.y_test.len());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_private_hyperparameters_are_dropped() {
        let split = blobs(10);
        let evaluator = Evaluator::new(&SessionConfig::default());
        let result = evaluator.evaluate(&AlgorithmSpec::new("Majority", majority), &split);

        assert!(result.is_success());
        assert!(result.roc_auc.is_none());
        assert_eq!(result.hyperparameters.len(), 1);
        assert!(result.hyperparameters.contains_key("strategy"));
    }

    #[test]
    fn test_fit_error_becomes_failed_result() {
        let split = blobs(10);
        let evaluator = Evaluator::new(&SessionConfig::default());
        let result = evaluator.evaluate(&AlgorithmSpec::new("Broken", |_| -> Box<dyn Classifier> { Box::new(Broken) }), &split);

        assert_eq!(result.status, EvaluationStatus::Failed);
        assert_eq!(result.f1_score, 0.0);
        assert_eq!(result.confusion_matrix, vec![vec![0]]);
        assert!(result.hyperparameters.is_empty());
        assert!(result.error.as_deref().unwrap_or("").contains("solver diverged"));
    }

    #[test]
    fn test_panic_becomes_failed_result() {
        let split = blobs(10);
        let evaluator = Evaluator::new(&SessionConfig::default());
        let result = evaluator.evaluate(&AlgorithmSpec::new("Panicky", |_| -> Box<dyn Classifier> { Box::new(Panicky) }), &split);

        assert_eq!(result.status, EvaluationStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("index out of bounds"));
    }

    #[test]
    fn test_cv_falls_back_to_test_f1() {
        let split = blobs(10);
        // A single fold cannot be cross-validated.
        let config = SessionConfig {
            cv_fold_cap: 1,
            ..SessionConfig::default()
        };
        let evaluator = Evaluator::new(&config);
        let result = evaluator.evaluate(&AlgorithmSpec::new("Majority", majority), &split);

        assert!(result.is_success());
        assert_eq!(result.cv_f1_mean, result.f1_score);
        assert_eq!(result.cv_f1_std, 0.0);
    }

    #[test]
    fn test_cv_fold_count() {
        let evaluator = Evaluator::new(&SessionConfig::default());
        assert_eq!(evaluator.cv_folds(16), 5);
        assert_eq!(evaluator.cv_folds(8), 4);
        assert_eq!(evaluator.cv_folds(3), 1);
    }

    #[test]
    fn test_failed_result_serialization() {
        let json = serde_json::to_value(EvaluationResult::failed("X", "boom")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
        assert_eq!(json["f1Score"], 0.0);
        assert!(json["rocAuc"].is_null());
        assert_eq!(json["confusionMatrix"], serde_json::json!([[0]]));
    }
}
