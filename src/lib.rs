//! SuperWrangler ML - classification model comparison
//!
//! Given a table of rows and a target column, prepares one shared train/test
//! split and trains a fixed catalog of classifiers against it, reporting
//! comparable metrics and the best model, either all at once or as a stream
//! of progress events.
//!
//! # Modules
//!
//! ## Core
//! - [`preprocessing`] - Row ingestion, one-hot encoding, scaling, stratified split
//! - [`training`] - Estimators, algorithm registry, evaluator and session engine
//! - [`ensemble`] - Bagging, soft voting and stacking
//! - [`calibration`] - Platt scaling for margin-based classifiers
//!
//! ## Services
//! - [`server`] - HTTP API with batch and streaming training
//! - [`cli`] - Command-line interface
//!
//! ## Support
//! - [`config`] - Session configuration and deployment profiles
//! - [`utils`] - CSV/JSON loading
//!
//! # Example
//!
//! ```no_run
//! use superwrangler_ml::prelude::*;
//! use serde_json::json;
//!
//! let rows = json!([{"x": 1.0, "label": "a"}, {"x": 2.0, "label": "b"}]);
//! let dataset = RawDataset::from_json(rows)?;
//! let engine = TrainEngine::new(SessionConfig::default());
//! let summary = engine.run_batch(&dataset, "label")?;
//! println!("best: {}", summary.best_model.algorithm);
//! # Ok::<(), WranglerError>(())
//! ```

// Core error handling
pub mod error;
pub mod config;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod ensemble;
pub mod calibration;

// Utilities
pub mod utils;

// Services
pub mod server;
pub mod cli;

pub use error::{Result, WranglerError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, WranglerError};

    // Configuration
    pub use crate::config::{RegistryProfile, SessionConfig};

    // Preprocessing
    pub use crate::preprocessing::{DatasetInfo, DatasetPreparer, PreparedSplit, RawDataset};

    // Training
    pub use crate::training::{
        AlgorithmRegistry, AlgorithmSpec, Classifier, EvaluationResult, EvaluationStatus, Evaluator,
        ProgressEvent, SessionSummary, TrainEngine, TrainingSession,
    };

    // Ensemble
    pub use crate::ensemble::{BaggingClassifier, StackingClassifier, VotingClassifier};

    // Calibration
    pub use crate::calibration::PlattScaling;

    // Loading
    pub use crate::utils::DataLoader;
}
