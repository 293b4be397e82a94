//! Training session orchestration
//!
//! A [`TrainingSession`] prepares the data once, then evaluates each
//! registry entry in order against the same split, yielding a
//! [`ProgressEvent`] per step. Batch mode drives the same iterator to
//! completion, so both modes share one code path.

use crate::config::SessionConfig;
use crate::error::{Result, WranglerError};
use crate::preprocessing::{DatasetInfo, DatasetPreparer, PreparedSplit, RawDataset};
use crate::training::evaluator::{EvaluationResult, Evaluator};
use crate::training::registry::{AlgorithmRegistry, AlgorithmSpec};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of a completed session. `total_time` is in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// One result per algorithm, in registry order
    pub results: Vec<EvaluationResult>,
    pub best_model: EvaluationResult,
    pub total_time: f64,
    pub success_count: usize,
    pub failure_count: usize,
    pub dataset_info: DatasetInfo,
}

/// Incremental progress of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Start {
        #[serde(rename = "datasetInfo")]
        dataset_info: DatasetInfo,
        total: usize,
    },
    ModelComplete {
        /// 1-based position in the registry
        index: usize,
        total: usize,
        result: EvaluationResult,
    },
    /// Every algorithm failed
    Error { error: String },
    Complete(SessionSummary),
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Error { .. } | ProgressEvent::Complete(_))
    }
}

/// First successful result with the highest F1. Later results must be
/// strictly better to replace an earlier one.
pub fn select_best(results: &[EvaluationResult]) -> Option<&EvaluationResult> {
    let mut best: Option<&EvaluationResult> = None;
    for result in results.iter().filter(|r| r.is_success()) {
        match best {
            Some(current) if result.f1_score <= current.f1_score => {}
            _ => best = Some(result),
        }
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Evaluating,
    Done,
}

/// Lazily evaluates one algorithm per `next()` call
#[derive(Debug)]
pub struct TrainingSession {
    split: PreparedSplit,
    specs: Vec<AlgorithmSpec>,
    evaluator: Evaluator,
    results: Vec<EvaluationResult>,
    started: Instant,
    phase: Phase,
}

impl TrainingSession {
    fn new(split: PreparedSplit, specs: Vec<AlgorithmSpec>, evaluator: Evaluator, started: Instant) -> Self {
        Self {
            results: Vec::with_capacity(specs.len()),
            split,
            specs,
            evaluator,
            started,
            phase: Phase::Start,
        }
    }

    pub fn dataset_info(&self) -> &DatasetInfo {
        &self.split.info
    }

    pub fn total(&self) -> usize {
        self.specs.len()
    }

    /// Results evaluated so far
    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    fn evaluate_next(&mut self) -> ProgressEvent {
        let index = self.results.len();
        let spec = self.specs[index];
        let result = self.evaluator.evaluate(&spec, &self.split);

        if result.is_success() {
            info!(
                algorithm = spec.name,
                f1 = result.f1_score,
                accuracy = result.accuracy,
                training_ms = result.training_time,
                "Model trained"
            );
        } else {
            warn!(
                algorithm = spec.name,
                error = result.error.as_deref().unwrap_or(""),
                "Model failed"
            );
        }

        self.results.push(result.clone());
        ProgressEvent::ModelComplete {
            index: index + 1,
            total: self.specs.len(),
            result,
        }
    }

    fn finish(&mut self) -> ProgressEvent {
        let total_time = self.started.elapsed().as_secs_f64() * 1000.0;
        let results = std::mem::take(&mut self.results);

        let Some(best) = select_best(&results).cloned() else {
            error!(total = results.len(), "All models failed to train");
            return ProgressEvent::Error {
                error: WranglerError::AllModelsFailedError.to_string(),
            };
        };

        let success_count = results.iter().filter(|r| r.is_success()).count();
        info!(
            best = %best.algorithm,
            f1 = best.f1_score,
            success_count,
            total_ms = total_time,
            "Training session complete"
        );

        ProgressEvent::Complete(SessionSummary {
            failure_count: results.len() - success_count,
            success_count,
            best_model: best,
            total_time,
            dataset_info: self.split.info.clone(),
            results,
        })
    }
}

impl Iterator for TrainingSession {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        match self.phase {
            Phase::Start => {
                self.phase = Phase::Evaluating;
                Some(ProgressEvent::Start {
                    dataset_info: self.split.info.clone(),
                    total: self.specs.len(),
                })
            }
            Phase::Evaluating if self.results.len() < self.specs.len() => Some(self.evaluate_next()),
            Phase::Evaluating => {
                self.phase = Phase::Done;
                Some(self.finish())
            }
            Phase::Done => None,
        }
    }
}

/// Entry point for training sessions
#[derive(Debug, Clone)]
pub struct TrainEngine {
    config: SessionConfig,
    registry: AlgorithmRegistry,
}

impl TrainEngine {
    /// Engine over the catalog slice selected by `config.profile`
    pub fn new(config: SessionConfig) -> Self {
        let registry = AlgorithmRegistry::for_config(&config);
        Self { config, registry }
    }

    pub fn with_registry(config: SessionConfig, registry: AlgorithmRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Prepare the data and return a session that yields events lazily.
    ///
    /// Configuration and preparation errors are returned here, before any
    /// event exists.
    pub fn run_streaming(&self, dataset: &RawDataset, target: &str) -> Result<TrainingSession> {
        self.config.validate()?;
        let started = Instant::now();
        let split = DatasetPreparer::new(&self.config).prepare(dataset, target)?;
        info!(
            target_column = target,
            algorithms = self.registry.len(),
            profile = %self.config.profile,
            "Starting training session"
        );
        Ok(TrainingSession::new(
            split,
            self.registry.list_specs().to_vec(),
            Evaluator::new(&self.config),
            started,
        ))
    }

    /// Run every algorithm and return the summary.
    pub fn run_batch(&self, dataset: &RawDataset, target: &str) -> Result<SessionSummary> {
        let session = self.run_streaming(dataset, target)?;
        for event in session {
            match event {
                ProgressEvent::Complete(summary) => return Ok(summary),
                ProgressEvent::Error { .. } => return Err(WranglerError::AllModelsFailedError),
                ProgressEvent::Start { .. } | ProgressEvent::ModelComplete { .. } => {}
            }
        }
        Err(WranglerError::TrainingError(
            "Session ended without a terminal event".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::evaluator::EvaluationStatus;

    fn result(name: &str, f1: f64, ok: bool) -> EvaluationResult {
        if ok {
            EvaluationResult {
                f1_score: f1,
                status: EvaluationStatus::Success,
                error: None,
                ..EvaluationResult::failed(name, "")
            }
        } else {
            EvaluationResult::failed(name, "boom")
        }
    }

    #[test]
    fn test_select_best_first_seen_on_ties() {
        let results = vec![
            result("a", 0.8, true),
            result("b", 0.9, true),
            result("c", 0.9, true),
            result("d", 0.7, true),
        ];
        assert_eq!(select_best(&results).map(|r| r.algorithm.as_str()), Some("b"));
    }

    #[test]
    fn test_select_best_skips_failures() {
        let results = vec![result("a", 0.0, false), result("b", 0.0, true)];
        assert_eq!(select_best(&results).map(|r| r.algorithm.as_str()), Some("b"));

        let all_failed = vec![result("a", 0.0, false), result("b", 0.0, false)];
        assert!(select_best(&all_failed).is_none());
    }

    #[test]
    fn test_progress_event_json_shape() {
        let info = DatasetInfo {
            samples: 20,
            features: 3,
            features_after_encoding: 3,
            classes: 2,
            train_size: 16,
            test_size: 4,
        };
        let start = serde_json::to_value(ProgressEvent::Start { dataset_info: info.clone(), total: 22 }).unwrap();
        assert_eq!(start["type"], "start");
        assert_eq!(start["total"], 22);
        assert_eq!(start["datasetInfo"]["trainSize"], 16);

        let complete = serde_json::to_value(ProgressEvent::Complete(SessionSummary {
            results: vec![result("a", 0.5, true)],
            best_model: result("a", 0.5, true),
            total_time: 1.0,
            success_count: 1,
            failure_count: 0,
            dataset_info: info,
        }))
        .unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["bestModel"]["algorithm"], "a");
        assert_eq!(complete["successCount"], 1);

        let error = serde_json::to_value(ProgressEvent::Error { error: "x".to_string() }).unwrap();
        assert_eq!(error, serde_json::json!({"type": "error", "error": "x"}));
    }

    #[test]
    fn test_invalid_config_rejected_before_preparation() {
        let rows: Vec<serde_json::Value> = (0..12)
            .map(|i| serde_json::json!({"x": i, "y": i % 2}))
            .collect();
        let dataset = RawDataset::from_json(serde_json::Value::Array(rows)).unwrap();
        let engine = TrainEngine::with_registry(
            SessionConfig::default().with_test_ratio(1.5),
            AlgorithmRegistry::with_specs(Vec::new()),
        );

        let err = engine.run_streaming(&dataset, "y").unwrap_err();
        assert!(matches!(err, WranglerError::ConfigError(_)));
        assert!(!err.is_client_error());
    }
}
