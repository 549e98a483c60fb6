//! Request handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use surfsense_core::{QueueStats, Task};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub task_id: String,
    pub name: String,
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "SurfSense API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Search spaces, documents and background processing for SurfSense".to_string(),
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Queue a task for the worker process
pub async fn enqueue_task(
    State(state): State<AppState>,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let Json(request) = body?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("task name must not be empty".to_string()));
    }

    let task = Task::with_payload(name, request.payload);
    let task_id = state.broker.enqueue(task).await?;
    info!(%task_id, task = name, "task submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            task_id: task_id.to_string(),
            name: name.to_string(),
        }),
    ))
}

pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.broker.stats().await?))
}
