//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::WranglerError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) | ServerError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Caller data problems become `Invalid data`, everything else `Training failed`.
impl From<WranglerError> for ServerError {
    fn from(err: WranglerError) -> Self {
        if err.is_client_error() {
            ServerError::BadRequest(format!("Invalid data: {}", err))
        } else {
            ServerError::Internal(format!("Training failed: {}", err))
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ServerError::BadRequest(msg) => tracing::info!(detail = %msg, "Rejected request"),
            ServerError::Internal(msg) => tracing::error!(detail = %msg, "Internal server error"),
            ServerError::Join(e) => tracing::error!(detail = %e, "Blocking task failed"),
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
