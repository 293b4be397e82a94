//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderName, HeaderValue},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::preprocessing::RawDataset;
use crate::training::{ProgressEvent, SessionSummary};

use super::error::{Result, ServerError};
use super::state::AppState;

/// A validated training request
#[derive(Debug)]
pub struct TrainRequest {
    pub dataset: RawDataset,
    pub target_column: String,
}

impl TrainRequest {
    /// Check the body shape: a JSON object with a non-empty `data` list and
    /// a `targetColumn` string.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let payload: Value = serde_json::from_slice(body)
            .ok()
            .filter(Value::is_object)
            .ok_or_else(|| ServerError::BadRequest("No JSON payload provided".to_string()))?;

        let (Some(data), Some(target)) = (payload.get("data"), payload.get("targetColumn")) else {
            return Err(ServerError::BadRequest(
                "Missing 'data' or 'targetColumn' in request".to_string(),
            ));
        };
        let target_column = target
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServerError::BadRequest("Missing 'data' or 'targetColumn' in request".to_string())
            })?
            .to_string();

        match data.as_array() {
            Some(rows) if !rows.is_empty() => {}
            _ => return Err(ServerError::BadRequest("Data must be a non-empty list".to_string())),
        }

        let dataset = RawDataset::from_json(data.clone())?;
        Ok(Self {
            dataset,
            target_column,
        })
    }
}

// ============================================================================
// System
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "SuperWrangler ML API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "profile": state.session.profile,
        "algorithms": state.registry().len(),
        "startedAt": state.started_at.to_rfc3339(),
        "uptimeSeconds": state.uptime_secs(),
        "sessions": state.counters(),
    }))
}

pub async fn list_algorithms(State(state): State<Arc<AppState>>) -> Json<Value> {
    let names = state.registry().names();
    Json(serde_json::json!({
        "count": names.len(),
        "algorithms": names,
    }))
}

// ============================================================================
// Training
// ============================================================================

/// Train every algorithm and answer with the session summary.
pub async fn train(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<SessionSummary>> {
    let request = TrainRequest::parse(&body)?;
    let session_id = Uuid::new_v4();
    info!(
        %session_id,
        rows = request.dataset.len(),
        target = %request.target_column,
        "Batch training requested"
    );

    let engine = state.engine();
    let guard = state.begin_session();
    let span = tracing::info_span!("session", %session_id);
    let outcome = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        engine.run_batch(&request.dataset, &request.target_column)
    })
    .await?;

    guard.finish(outcome.is_ok());
    Ok(Json(outcome?))
}

/// Train every algorithm, streaming one server-sent event per step.
///
/// Request and preparation errors are answered with a plain 400 before the
/// stream opens.
pub async fn train_stream(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response> {
    let TrainRequest {
        dataset,
        target_column,
    } = TrainRequest::parse(&body)?;
    let session_id = Uuid::new_v4();
    info!(
        %session_id,
        rows = dataset.len(),
        target = %target_column,
        "Streaming training requested"
    );

    let engine = state.engine();
    let span = tracing::info_span!("session", %session_id);
    let session = tokio::task::spawn_blocking(move || engine.run_streaming(&dataset, &target_column))
        .instrument(span.clone())
        .await??;

    let guard = state.begin_session();
    let (tx, rx) = mpsc::channel::<ProgressEvent>(1);

    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let mut session = session;
        loop {
            // Liveness is checked before starting the next algorithm.
            if tx.is_closed() {
                info!("Stream consumer disconnected, stopping session");
                return;
            }
            let Some(event) = session.next() else {
                return;
            };
            let outcome = match &event {
                ProgressEvent::Complete(_) => Some(true),
                ProgressEvent::Error { .. } => Some(false),
                _ => None,
            };
            if tx.blocking_send(event).is_err() {
                info!("Stream consumer disconnected, stopping session");
                return;
            }
            if let Some(success) = outcome {
                guard.finish(success);
                return;
            }
        }
    });

    let headers = [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ];
    Ok((headers, Sse::new(event_stream(rx))).into_response())
}

/// One `data: {json}` message per received event; ends when the sender drops.
fn event_stream(rx: mpsc::Receiver<ProgressEvent>) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let data = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize progress event");
                serde_json::json!({ "type": "error", "error": e.to_string() }).to_string()
            }
        };
        Some((Ok(Event::default().data(data)), rx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> String {
        TrainRequest::parse(body.as_bytes())
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_request_shape_errors() {
        assert_eq!(message(""), "No JSON payload provided");
        assert_eq!(message("[1, 2]"), "No JSON payload provided");
        assert_eq!(message(r#"{"data": [{"a": 1}]}"#), "Missing 'data' or 'targetColumn' in request");
        assert_eq!(message(r#"{"targetColumn": "a"}"#), "Missing 'data' or 'targetColumn' in request");
        assert_eq!(message(r#"{"data": [], "targetColumn": "a"}"#), "Data must be a non-empty list");
        assert_eq!(message(r#"{"data": {"a": 1}, "targetColumn": "a"}"#), "Data must be a non-empty list");
    }

    #[test]
    fn test_non_scalar_values_are_invalid_data() {
        let msg = message(r#"{"data": [{"a": [1, 2], "y": 0}], "targetColumn": "y"}"#);
        assert!(msg.starts_with("Invalid data:"), "{}", msg);
    }

    #[test]
    fn test_valid_request() {
        let request = TrainRequest::parse(br#"{"data": [{"a": 1, "y": "x"}], "targetColumn": "y"}"#).unwrap();
        assert_eq!(request.target_column, "y");
        assert_eq!(request.dataset.len(), 1);
    }
}
