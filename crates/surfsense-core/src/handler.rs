//! Task handlers executed by the worker

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use crate::task::{Task, TaskBroker};

/// Default age after which failed tasks are purged
pub const DEFAULT_FAILED_RETENTION_SECS: i64 = 7 * 24 * 60 * 60;

/// Context handed to a handler for one execution
pub struct TaskContext {
    pub task: Task,
    broker: Arc<dyn TaskBroker>,
}

impl TaskContext {
    pub fn new(task: Task, broker: Arc<dyn TaskBroker>) -> Self {
        Self { task, broker }
    }

    /// The broker the task was claimed from
    pub fn broker(&self) -> &Arc<dyn TaskBroker> {
        &self.broker
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.task.payload
    }
}

/// Result of one task execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// Transient failure; hand the task back to the queue
    Retry(String),
    /// Permanent failure
    Failed(String),
}

/// Trait for task handlers
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Task name this handler executes
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &TaskContext) -> TaskOutcome;
}

/// Name to handler lookup used by the worker
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the maintenance handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(HeartbeatHandler);
        registry.register(PurgeFailedHandler);
        registry
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register<H: TaskHandler + 'static>(&mut self, handler: H) {
        self.handlers
            .insert(handler.name().to_string(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered task names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// `maintenance.heartbeat`: proves the worker is consuming the queue
pub struct HeartbeatHandler;

#[async_trait]
impl TaskHandler for HeartbeatHandler {
    fn name(&self) -> &str {
        "maintenance.heartbeat"
    }

    async fn execute(&self, ctx: &TaskContext) -> TaskOutcome {
        let lag_ms = (Utc::now() - ctx.task.enqueued_at).num_milliseconds();
        info!(task_id = %ctx.task.id, lag_ms, "heartbeat");
        TaskOutcome::Success
    }
}

/// `maintenance.purge_failed`: drops failed tasks older than
/// `payload.older_than_secs` (default seven days)
pub struct PurgeFailedHandler;

#[async_trait]
impl TaskHandler for PurgeFailedHandler {
    fn name(&self) -> &str {
        "maintenance.purge_failed"
    }

    async fn execute(&self, ctx: &TaskContext) -> TaskOutcome {
        let cutoff = match purge_cutoff(ctx.payload(), Utc::now()) {
            Ok(cutoff) => cutoff,
            Err(reason) => return TaskOutcome::Failed(reason),
        };

        match ctx.broker().purge_failed(cutoff).await {
            Ok(purged) => {
                if purged > 0 {
                    info!(purged, "purged failed tasks");
                }
                TaskOutcome::Success
            }
            Err(err) => TaskOutcome::Retry(err.to_string()),
        }
    }
}

/// Cutoff for `maintenance.purge_failed`: `now - older_than_secs`
fn purge_cutoff(
    payload: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, String> {
    let secs = match payload.get("older_than_secs") {
        None | Some(serde_json::Value::Null) => DEFAULT_FAILED_RETENTION_SECS,
        Some(value) => value
            .as_u64()
            .and_then(|secs| i64::try_from(secs).ok())
            .ok_or_else(|| format!("older_than_secs must be a non-negative integer, got {value}"))?,
    };
    TimeDelta::try_seconds(secs)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| format!("older_than_secs {secs} is out of range"))
}
