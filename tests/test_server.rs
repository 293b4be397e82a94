//! Integration test: Server API endpoints

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use ndarray::{Array1, Array2};
use serde_json::{json, Value};
use superwrangler_ml::config::SessionConfig;
use superwrangler_ml::error::{Result, WranglerError};
use superwrangler_ml::server::{create_router, AppState, ServerConfig};
use superwrangler_ml::training::{AlgorithmRegistry, AlgorithmSpec, Classifier, Hyperparameters, CATALOG};
use tower::ServiceExt;

fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_body_bytes: 10 * 1024 * 1024,
    }
}

fn small_registry() -> AlgorithmRegistry {
    AlgorithmRegistry::with_specs(
        ["Logistic Regression", "Decision Tree", "Gaussian Naive Bayes"]
            .iter()
            .map(|name| *CATALOG.iter().find(|s| s.name == *name).unwrap())
            .collect(),
    )
}

fn test_app() -> Router {
    let state = AppState::with_registry(server_config(), SessionConfig::default(), small_registry());
    create_router(Arc::new(state))
}

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

fn failing_app() -> Router {
    let registry = AlgorithmRegistry::with_specs(vec![AlgorithmSpec::new("Always Fails", |_| -> Box<dyn Classifier> {
        Box::new(AlwaysFails)
    })]);
    let state = AppState::with_registry(server_config(), SessionConfig::default(), registry);
    create_router(Arc::new(state))
}

static GATE_OPEN: AtomicBool = AtomicBool::new(false);
static AFTER_GATE_BUILDS: AtomicUsize = AtomicUsize::new(0);

/// Holds `fit` until the gate opens, then predicts class 0
struct Gated {
    classes: Vec<usize>,
}

impl Classifier for Gated {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        for _ in 0..1000 {
            if GATE_OPEN.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let mut classes: Vec<usize> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        Ok(Array1::zeros(x.nrows()))
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::new()
    }
}

fn gated(_seed: u64) -> Box<dyn Classifier> {
    Box::new(Gated { classes: Vec::new() })
}

fn after_gate(_seed: u64) -> Box<dyn Classifier> {
    AFTER_GATE_BUILDS.fetch_add(1, Ordering::SeqCst);
    Box::new(Gated { classes: Vec::new() })
}

fn training_rows() -> Value {
    Value::Array(
        (0..20)
            .map(|i| {
                json!({
                    "f1": i as f64 * 0.5,
                    "f2": 10.0 - i as f64 * 0.3,
                    "color": if i % 3 == 0 { "red" } else { "blue" },
                    "target": if i < 10 { "no" } else { "yes" },
                })
            })
            .collect(),
    )
}

fn post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = test_app().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "SuperWrangler ML API is running");
    assert_eq!(body["algorithms"], 3);
    assert_eq!(body["sessions"]["active"], 0);
}

#[tokio::test]
async fn test_algorithms_endpoint() {
    let state = AppState::new(server_config(), SessionConfig::default());
    let response = create_router(Arc::new(state)).oneshot(get("/api/algorithms")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["count"], 22);
    assert_eq!(body["algorithms"][0], "Logistic Regression");
    assert_eq!(body["algorithms"][21], "Multi-Layer Perceptron");
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let response = test_app().oneshot(get("/api/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_train_request_shape_errors() {
    let cases = [
        ("", "No JSON payload provided"),
        ("not json", "No JSON payload provided"),
        (r#"{"data": []}"#, "Missing 'data' or 'targetColumn' in request"),
        (r#"{"data": [], "targetColumn": "y"}"#, "Data must be a non-empty list"),
        (r#"{"data": "rows", "targetColumn": "y"}"#, "Data must be a non-empty list"),
    ];
    for (body, expected) in cases {
        for uri in ["/api/train", "/api/train-stream"] {
            let response = test_app().oneshot(post(uri, body.to_string())).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", uri, body);
            assert_eq!(body_json(response).await["error"], expected);
        }
    }
}

#[tokio::test]
async fn test_train_validation_error_is_400() {
    let rows: Vec<Value> = (0..12).map(|i| json!({"x": i, "y": "only"})).collect();
    let body = json!({"data": rows, "targetColumn": "y"}).to_string();

    for uri in ["/api/train", "/api/train-stream"] {
        let response = test_app().oneshot(post(uri, body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Invalid data:"), "{}", error);
    }

    let body = json!({"data": training_rows(), "targetColumn": "missing"}).to_string();
    let response = test_app().oneshot(post("/api/train", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_train_endpoint() {
    let body = json!({"data": training_rows(), "targetColumn": "target"}).to_string();
    let response = test_app().oneshot(post("/api/train", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let summary = body_json(response).await;
    assert_eq!(summary["results"].as_array().unwrap().len(), 3);
    assert_eq!(summary["datasetInfo"]["samples"], 20);
    assert_eq!(summary["datasetInfo"]["trainSize"], 16);
    assert_eq!(summary["datasetInfo"]["testSize"], 4);
    assert_eq!(summary["successCount"], 3);
    assert!(summary["bestModel"]["algorithm"].is_string());
}

#[tokio::test]
async fn test_train_all_failed_is_500() {
    let body = json!({"data": training_rows(), "targetColumn": "target"}).to_string();
    let response = failing_app().oneshot(post("/api/train", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Training failed: All models failed to train");
}

#[tokio::test]
async fn test_train_stream_events() {
    let body = json!({"data": training_rows(), "targetColumn": "target"}).to_string();
    let response = test_app().oneshot(post("/api/train-stream", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    let text = body_text(response).await;
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(events.len(), 5);
    assert_eq!(events[0]["type"], "start");
    assert_eq!(events[0]["total"], 3);
    assert_eq!(events[0]["datasetInfo"]["samples"], 20);
    for (i, event) in events[1..4].iter().enumerate() {
        assert_eq!(event["type"], "model_complete");
        assert_eq!(event["index"], i + 1);
        assert_eq!(event["total"], 3);
    }
    assert_eq!(events[1]["result"]["algorithm"], "Logistic Regression");
    assert_eq!(events[4]["type"], "complete");
    assert_eq!(events[4]["successCount"], 3);
    assert_eq!(events[4]["results"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_train_stream_all_failed_ends_with_error_event() {
    let body = json!({"data": training_rows(), "targetColumn": "target"}).to_string();
    let response = failing_app().oneshot(post("/api/train-stream", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(events.len(), 3);
    assert_eq!(events[1]["result"]["status"], "failed");
    assert_eq!(events[2], json!({"type": "error", "error": "All models failed to train"}));
}

#[tokio::test]
async fn test_train_stream_disconnect_stops_session() {
    let registry = AlgorithmRegistry::with_specs(vec![
        AlgorithmSpec::new("Gated", gated),
        AlgorithmSpec::new("After Gate", after_gate),
    ]);
    let state = Arc::new(AppState::with_registry(server_config(), SessionConfig::default(), registry));
    let app = create_router(state.clone());

    let body = json!({"data": training_rows(), "targetColumn": "target"}).to_string();
    let response = app.oneshot(post("/api/train-stream", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut stream = response.into_body().into_data_stream();
    let first = stream.next().await.unwrap().unwrap();
    let first = String::from_utf8(first.to_vec()).unwrap();
    assert!(first.starts_with("data: "), "{}", first);
    assert!(first.contains(r#""type":"start""#), "{}", first);

    // The client goes away while the first algorithm is still fitting.
    drop(stream);
    GATE_OPEN.store(true, Ordering::SeqCst);

    for _ in 0..500 {
        if state.counters().active == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let counters = state.counters();
    assert_eq!(counters.active, 0);
    assert_eq!(counters.started, 1);
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.completed, 0);
    assert_eq!(AFTER_GATE_BUILDS.load(Ordering::SeqCst), 0);
}
