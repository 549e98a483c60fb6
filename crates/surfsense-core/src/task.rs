//! Queued units of background work
//!
//! Tasks are produced by the HTTP server and the beat scheduler and consumed
//! by the worker process. Brokers move them between pending, active and
//! failed states.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work waiting for, or owned by, a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Handler name, e.g. `maintenance.heartbeat`
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Number of times the task has been handed back for retry
    #[serde(default)]
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Task {
    /// Create a task with an empty payload
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_payload(name, serde_json::Value::Null)
    }

    pub fn with_payload(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
            last_error: None,
        }
    }

    /// Spool file name; lexical order matches enqueue order.
    pub fn file_name(&self) -> String {
        let micros = self.enqueued_at.timestamp_micros().max(0);
        format!("{micros:020}-{}.json", self.id)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)?;
        if self.attempts > 0 {
            write!(f, " attempt {}", self.attempts + 1)?;
        }
        Ok(())
    }
}

/// Snapshot of queue depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub failed: usize,
}

/// Error recorded on tasks taken back from a worker that stopped mid-task
pub const ABANDONED_REASON: &str = "abandoned by a stopped worker";

/// What [`TaskBroker::recover_active`] did with leftover active tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recovered {
    pub requeued: u64,
    pub failed: u64,
}

impl Recovered {
    pub fn is_empty(&self) -> bool {
        self.requeued == 0 && self.failed == 0
    }
}

/// Broker trait for different queue backends
#[async_trait::async_trait]
pub trait TaskBroker: Send + Sync {
    /// Publish a task to the pending queue
    async fn enqueue(&self, task: Task) -> Result<TaskId>;

    /// Take ownership of the oldest pending task, if any.
    ///
    /// A task is handed to exactly one claimer.
    async fn claim(&self) -> Result<Option<Task>>;

    /// Remove a finished task
    async fn complete(&self, task: &Task) -> Result<()>;

    /// Hand an active task back to the pending queue with one more attempt
    async fn retry(&self, task: Task, error: &str) -> Result<()>;

    /// Park an active task in the failed set
    async fn fail(&self, task: Task, error: &str) -> Result<()>;

    /// Current queue depth
    async fn stats(&self) -> Result<QueueStats>;

    /// Delete failed tasks enqueued before `before`
    async fn purge_failed(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Take back every active task left by a worker that is gone.
    ///
    /// Tasks below `max_retries` attempts return to pending with one more
    /// attempt, the rest are failed. Must only run while no other worker
    /// holds tasks from this broker.
    async fn recover_active(&self, max_retries: u32) -> Result<Recovered>;
}
