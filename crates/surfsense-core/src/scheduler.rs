//! Periodic task scheduler (the beat process)

use std::sync::Arc;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::schedule::{BeatSchedule, ScheduleEntry};
use crate::task::{Task, TaskBroker};

/// Enqueues scheduled tasks for the worker
pub struct BeatScheduler {
    broker: Arc<dyn TaskBroker>,
    schedule: BeatSchedule,
}

impl BeatScheduler {
    pub fn new(broker: Arc<dyn TaskBroker>, schedule: BeatSchedule) -> Self {
        Self { broker, schedule }
    }

    /// Run until `shutdown` is cancelled. Returns the number of tasks
    /// enqueued.
    ///
    /// Each entry first fires one period after start. Periods missed while
    /// the scheduler was busy are skipped rather than replayed.
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        info!(schedule = %self.schedule, "scheduler started");

        if self.schedule.is_empty() {
            shutdown.cancelled().await;
            info!(enqueued = 0, "scheduler stopped");
            return 0;
        }

        let start = Instant::now();
        let mut next_due: Vec<Instant> = self
            .schedule
            .entries()
            .iter()
            .map(|entry| start + entry.every)
            .collect();
        let mut enqueued = 0;

        loop {
            let Some(wake_at) = next_due.iter().min().copied() else {
                break;
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = time::sleep_until(wake_at) => {}
            }

            let now = Instant::now();
            for (entry, due) in self.schedule.entries().iter().zip(next_due.iter_mut()) {
                if *due > now {
                    continue;
                }
                if self.fire(entry).await {
                    enqueued += 1;
                }
                *due = advance(*due, entry, now);
            }
        }

        info!(enqueued, "scheduler stopped");
        enqueued
    }

    async fn fire(&self, entry: &ScheduleEntry) -> bool {
        match self.broker.enqueue(Task::new(entry.task.clone())).await {
            Ok(id) => {
                debug!(task = %entry.task, task_id = %id, "scheduled task enqueued");
                true
            }
            Err(err) => {
                error!(task = %entry.task, error = %err, "failed to enqueue scheduled task");
                false
            }
        }
    }
}

/// Next due instant strictly after `now`, on the entry's period grid
fn advance(due: Instant, entry: &ScheduleEntry, now: Instant) -> Instant {
    let mut next = due + entry.every;
    if next <= now {
        let behind = now.duration_since(next).as_nanos();
        let period = entry.every.as_nanos().max(1);
        let skipped = u32::try_from(behind / period + 1).unwrap_or(u32::MAX);
        next += entry.every.saturating_mul(skipped);
    }
    next
}
