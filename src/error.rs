//! Error types for the SuperWrangler ML service

use thiserror::Error;

/// Result type alias for training and evaluation operations
pub type Result<T> = std::result::Result<T, WranglerError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum WranglerError {
    #[error("{0}")]
    SchemaError(String),

    #[error("Dataset too small. Need at least {required} samples, got {samples}")]
    InsufficientDataError { samples: usize, required: usize },

    #[error("Target must have at least {required} classes. Found: {found}")]
    InsufficientClassesError { found: usize, required: usize },

    #[error("All models failed to train")]
    AllModelsFailedError,

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl WranglerError {
    /// Whether the caller's data or request is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WranglerError::SchemaError(_)
                | WranglerError::InsufficientDataError { .. }
                | WranglerError::InsufficientClassesError { .. }
                | WranglerError::DataError(_)
                | WranglerError::InvalidInput(_)
        )
    }
}

impl From<polars::error::PolarsError> for WranglerError {
    fn from(err: polars::error::PolarsError) -> Self {
        WranglerError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for WranglerError {
    fn from(err: serde_json::Error) -> Self {
        WranglerError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for WranglerError {
    fn from(err: ndarray::ShapeError) -> Self {
        WranglerError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
