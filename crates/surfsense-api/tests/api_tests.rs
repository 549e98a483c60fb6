use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use surfsense_api::{create_app, AppState, HttpServer};
use surfsense_core::{MemoryBroker, ServerConfig, SpoolBroker, TaskBroker};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn app_with(broker: Arc<dyn TaskBroker>) -> Router {
    create_app(AppState::new(broker))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_root_describes_service() {
    let (status, body) = send(app_with(Arc::new(MemoryBroker::new())), get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "SurfSense API");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (status, body) = send(app_with(Arc::new(MemoryBroker::new())), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime_secs"].is_u64());
}

#[tokio::test]
async fn test_enqueue_and_stats() {
    let broker = Arc::new(MemoryBroker::new());
    let app = app_with(broker.clone());

    let (status, body) = send(
        app.clone(),
        post_json(
            "/api/v1/tasks",
            json!({"name": "documents.index", "payload": {"document_id": 7}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["name"], "documents.index");
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let (status, stats) = send(app, get("/api/v1/tasks/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats, json!({"pending": 1, "active": 0, "failed": 0}));

    let task = broker.claim().await.unwrap().unwrap();
    assert_eq!(task.id.to_string(), task_id);
    assert_eq!(task.payload["document_id"], 7);
}

#[tokio::test]
async fn test_enqueue_trims_name_and_defaults_payload() {
    let broker = Arc::new(MemoryBroker::new());
    let (status, body) = send(
        app_with(broker.clone()),
        post_json("/api/v1/tasks", json!({"name": "  maintenance.heartbeat  "})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["name"], "maintenance.heartbeat");
    let task = broker.claim().await.unwrap().unwrap();
    assert_eq!(task.name, "maintenance.heartbeat");
    assert!(task.payload.is_null());
}

#[tokio::test]
async fn test_enqueue_rejects_blank_name() {
    let broker = Arc::new(MemoryBroker::new());
    let (status, body) = send(
        app_with(broker.clone()),
        post_json("/api/v1/tasks", json!({"name": "   "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "task name must not be empty");
    assert_eq!(broker.stats().await.unwrap().pending, 0);
}

#[tokio::test]
async fn test_enqueue_body_errors_are_json() {
    let broker = Arc::new(MemoryBroker::new());
    let app = app_with(broker.clone());

    let (status, body) = send(app.clone(), post_json("/api/v1/tasks", json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("name"), "{body}");

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/v1/tasks")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app.clone(), malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string(), "{body}");

    let untyped = Request::builder()
        .method("POST")
        .uri("/api/v1/tasks")
        .body(Body::from(r#"{"name": "maintenance.heartbeat"}"#))
        .unwrap();
    let (status, body) = send(app, untyped).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["detail"].is_string(), "{body}");

    assert_eq!(broker.stats().await.unwrap().pending, 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (status, _) = send(app_with(Arc::new(MemoryBroker::new())), get("/api/v1/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_server_round_trip_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(SpoolBroker::open(dir.path()).await.unwrap());
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = HttpServer::bind(&config, AppState::new(broker.clone()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/v1/tasks"))
        .json(&json!({"name": "documents.index"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let stats: Value = client
        .get(format!("http://{addr}/api/v1/tasks/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["pending"], 1);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(broker.stats().await.unwrap().pending, 1);
}
