//! In-memory broker for testing and single-process embedding

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::task::{QueueStats, Recovered, Task, TaskBroker, TaskId, ABANDONED_REASON};

/// In-memory broker (non-persistent, process-local)
#[derive(Clone)]
pub struct MemoryBroker {
    pending: Arc<DashMap<u64, Task>>,
    active: Arc<DashMap<TaskId, Task>>,
    failed: Arc<DashMap<TaskId, Task>>,
    sequence: Arc<AtomicU64>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            active: Arc::new(DashMap::new()),
            failed: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Failed tasks, in no particular order
    pub fn failed_tasks(&self) -> Vec<Task> {
        self.failed.iter().map(|entry| entry.value().clone()).collect()
    }

    fn push_pending(&self, task: Task) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.pending.insert(seq, task);
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskBroker for MemoryBroker {
    async fn enqueue(&self, task: Task) -> Result<TaskId> {
        let id = task.id;
        self.push_pending(task);
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<Task>> {
        loop {
            let Some(oldest) = self.pending.iter().map(|entry| *entry.key()).min() else {
                return Ok(None);
            };
            // Another claimer may have won the race for this key
            if let Some((_, task)) = self.pending.remove(&oldest) {
                self.active.insert(task.id, task.clone());
                return Ok(Some(task));
            }
        }
    }

    async fn complete(&self, task: &Task) -> Result<()> {
        self.active
            .remove(&task.id)
            .map(|_| ())
            .ok_or(Error::TaskNotActive(task.id))
    }

    async fn retry(&self, mut task: Task, error: &str) -> Result<()> {
        if !self.active.contains_key(&task.id) {
            return Err(Error::TaskNotActive(task.id));
        }
        let id = task.id;
        task.attempts += 1;
        task.last_error = Some(error.to_string());
        self.push_pending(task);
        self.active.remove(&id);
        Ok(())
    }

    async fn fail(&self, mut task: Task, error: &str) -> Result<()> {
        if !self.active.contains_key(&task.id) {
            return Err(Error::TaskNotActive(task.id));
        }
        let id = task.id;
        task.last_error = Some(error.to_string());
        self.failed.insert(id, task);
        self.active.remove(&id);
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.pending.len(),
            active: self.active.len(),
            failed: self.failed.len(),
        })
    }

    async fn purge_failed(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut to_remove = Vec::new();
        for entry in self.failed.iter() {
            if entry.value().enqueued_at < before {
                to_remove.push(*entry.key());
            }
        }

        let mut count = 0;
        for id in to_remove {
            if self.failed.remove(&id).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn recover_active(&self, max_retries: u32) -> Result<Recovered> {
        let ids: Vec<TaskId> = self.active.iter().map(|entry| *entry.key()).collect();
        let mut recovered = Recovered::default();
        for id in ids {
            let Some((_, mut task)) = self.active.remove(&id) else {
                continue;
            };
            task.last_error = Some(ABANDONED_REASON.to_string());
            if task.attempts < max_retries {
                task.attempts += 1;
                self.push_pending(task);
                recovered.requeued += 1;
            } else {
                self.failed.insert(id, task);
                recovered.failed += 1;
            }
        }
        Ok(recovered)
    }
}
