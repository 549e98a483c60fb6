//! Spool-directory broker shared between processes
//!
//! Layout under the root:
//!
//! ```text
//! tmp/      staging area, never read by claimers
//! pending/  <enqueued micros>-<id>.json, claimed in lexical order
//! active/   <id>.json, owned by exactly one worker (briefly under its
//!           pending name while a claim is in progress)
//! failed/   <id>.json, kept until purged
//! ```
//!
//! Every state change is a `rename(2)` within the root, so competing
//! workers in different processes never observe half-written files and
//! only one of them can win a claim.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::task::{QueueStats, Recovered, Task, TaskBroker, TaskId, ABANDONED_REASON};

const TMP_DIR: &str = "tmp";
const PENDING_DIR: &str = "pending";
const ACTIVE_DIR: &str = "active";
const FAILED_DIR: &str = "failed";

/// Filesystem-backed broker
#[derive(Debug, Clone)]
pub struct SpoolBroker {
    root: PathBuf,
}

impl SpoolBroker {
    /// Open (and create if needed) a spool rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [TMP_DIR, PENDING_DIR, ACTIVE_DIR, FAILED_DIR] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        debug!(root = %root.display(), "task spool opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn active_path(&self, id: TaskId) -> PathBuf {
        self.dir(ACTIVE_DIR).join(format!("{id}.json"))
    }

    /// Stage `task` in `tmp/` and atomically publish it as `dir/file_name`
    async fn publish(&self, dir: &str, file_name: &str, task: &Task) -> Result<()> {
        let staged = self.dir(TMP_DIR).join(format!("{}.tmp", Uuid::new_v4()));
        let encoded = serde_json::to_vec_pretty(task)?;
        fs::write(&staged, encoded).await?;
        if let Err(err) = fs::rename(&staged, self.dir(dir).join(file_name)).await {
            let _ = fs::remove_file(&staged).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// `.json` entries of a state directory, sorted by file name
    async fn entries(&self, dir: &str) -> Result<Vec<PathBuf>> {
        let mut reader = fs::read_dir(self.dir(dir)).await?;
        let mut paths = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn ensure_active(&self, id: TaskId) -> Result<PathBuf> {
        let path = self.active_path(id);
        match fs::metadata(&path).await {
            Ok(_) => Ok(path),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::TaskNotActive(id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn quarantine(&self, claimed: &Path, reason: &str) -> Result<()> {
        let Some(name) = claimed.file_name() else {
            return Ok(());
        };
        warn!(file = %claimed.display(), reason, "quarantining unreadable task file");
        fs::rename(claimed, self.dir(FAILED_DIR).join(name)).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskBroker for SpoolBroker {
    async fn enqueue(&self, task: Task) -> Result<TaskId> {
        self.publish(PENDING_DIR, &task.file_name(), &task).await?;
        debug!(task = %task, "task enqueued");
        Ok(task.id)
    }

    async fn claim(&self) -> Result<Option<Task>> {
        for pending in self.entries(PENDING_DIR).await? {
            let Some(name) = pending.file_name() else {
                continue;
            };
            let claimed = self.dir(ACTIVE_DIR).join(name);
            match fs::rename(&pending, &claimed).await {
                Ok(()) => {}
                // Lost the race to another worker
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }

            let bytes = fs::read(&claimed).await?;
            let task: Task = match serde_json::from_slice(&bytes) {
                Ok(task) => task,
                Err(err) => {
                    self.quarantine(&claimed, &err.to_string()).await?;
                    continue;
                }
            };

            let active = self.active_path(task.id);
            fs::rename(&claimed, &active).await?;
            return Ok(Some(task));
        }
        Ok(None)
    }

    async fn complete(&self, task: &Task) -> Result<()> {
        match fs::remove_file(self.active_path(task.id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::TaskNotActive(task.id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn retry(&self, mut task: Task, error: &str) -> Result<()> {
        let active = self.ensure_active(task.id).await?;
        task.attempts += 1;
        task.last_error = Some(error.to_string());
        self.publish(PENDING_DIR, &task.file_name(), &task).await?;
        fs::remove_file(active).await?;
        Ok(())
    }

    async fn fail(&self, mut task: Task, error: &str) -> Result<()> {
        let active = self.ensure_active(task.id).await?;
        task.last_error = Some(error.to_string());
        self.publish(FAILED_DIR, &format!("{}.json", task.id), &task).await?;
        fs::remove_file(active).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.entries(PENDING_DIR).await?.len(),
            active: self.entries(ACTIVE_DIR).await?.len(),
            failed: self.entries(FAILED_DIR).await?.len(),
        })
    }

    async fn purge_failed(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut count = 0;
        for path in self.entries(FAILED_DIR).await? {
            let stamp = match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Task>(&bytes) {
                    Ok(task) => task.enqueued_at,
                    // Quarantined files only carry their modification time
                    Err(_) => fs::metadata(&path).await?.modified()?.into(),
                },
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            if stamp < before {
                match fs::remove_file(&path).await {
                    Ok(()) => count += 1,
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(count)
    }

    async fn recover_active(&self, max_retries: u32) -> Result<Recovered> {
        let mut recovered = Recovered::default();
        // Covers both `<id>.json` and names left by an interrupted claim
        for path in self.entries(ACTIVE_DIR).await? {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            let mut task: Task = match serde_json::from_slice(&bytes) {
                Ok(task) => task,
                Err(err) => {
                    self.quarantine(&path, &err.to_string()).await?;
                    recovered.failed += 1;
                    continue;
                }
            };

            task.last_error = Some(ABANDONED_REASON.to_string());
            if task.attempts < max_retries {
                task.attempts += 1;
                self.publish(PENDING_DIR, &task.file_name(), &task).await?;
                recovered.requeued += 1;
            } else {
                self.publish(FAILED_DIR, &format!("{}.json", task.id), &task).await?;
                recovered.failed += 1;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(recovered)
    }
}
