//! Background worker that drains the task queue
//!
//! The worker claims tasks from a [`TaskBroker`], dispatches them to the
//! registered [`TaskHandler`](crate::handler::TaskHandler) and settles them
//! (complete, retry or fail). It stops claiming as soon as shutdown is
//! requested and drains the tasks already in flight.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::handler::{HandlerRegistry, TaskContext, TaskOutcome};
use crate::task::{Task, TaskBroker};

/// Configuration for the worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Requested number of concurrent tasks
    pub concurrency: usize,

    /// How long to sleep when the queue is empty
    pub poll_interval: Duration,

    /// Retries granted before a task is failed permanently
    pub max_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism().map_or(1, usize::from),
            poll_interval: Duration::from_millis(500),
            max_retries: 3,
        }
    }
}

impl WorkerConfig {
    /// Concurrency mode for the current host
    pub fn mode(&self) -> ConcurrencyMode {
        ConcurrencyMode::for_host(self.concurrency)
    }
}

/// How the worker executes tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// One task at a time on the calling thread
    Solo,
    /// Up to `n` tasks concurrently on a multi-threaded runtime
    Pool(usize),
}

impl ConcurrencyMode {
    /// Windows hosts always run solo; elsewhere a request of one task is
    /// also solo.
    pub fn for_host(requested: usize) -> Self {
        if cfg!(windows) || requested <= 1 {
            Self::Solo
        } else {
            Self::Pool(requested)
        }
    }

    pub fn slots(self) -> usize {
        match self {
            Self::Solo => 1,
            Self::Pool(n) => n,
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solo => f.write_str("solo"),
            Self::Pool(n) => write!(f, "pool({n})"),
        }
    }
}

/// Counters reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub succeeded: u64,
    pub retried: u64,
    pub failed: u64,
}

impl WorkerStats {
    fn record(&mut self, settled: Settled) {
        match settled {
            Settled::Succeeded => self.succeeded += 1,
            Settled::Retried => self.retried += 1,
            Settled::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Settled {
    Succeeded,
    Retried,
    Failed,
}

/// Queue consumer
pub struct TaskWorker {
    broker: Arc<dyn TaskBroker>,
    handlers: Arc<HandlerRegistry>,
    config: WorkerConfig,
}

impl TaskWorker {
    pub fn new(broker: Arc<dyn TaskBroker>, handlers: HandlerRegistry, config: WorkerConfig) -> Self {
        Self {
            broker,
            handlers: Arc::new(handlers),
            config,
        }
    }

    /// Run until `shutdown` is cancelled, then drain in-flight tasks
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerStats {
        let mode = self.config.mode();
        info!(mode = %mode, handlers = ?self.handlers.names(), "worker started");

        match self.broker.recover_active(self.config.max_retries).await {
            Ok(recovered) if !recovered.is_empty() => warn!(
                requeued = recovered.requeued,
                failed = recovered.failed,
                "recovered tasks left active by a previous worker"
            ),
            Ok(_) => {}
            Err(err) => error!(error = %err, "failed to recover abandoned tasks"),
        }

        let slots = Arc::new(Semaphore::new(mode.slots()));
        let mut in_flight: JoinSet<Result<Settled>> = JoinSet::new();
        let mut stats = WorkerStats::default();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                Self::reap(&mut stats, joined);
            }

            let permit = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let task = match self.broker.claim().await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    drop(permit);
                    if self.idle(&shutdown).await {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    error!(error = %err, "failed to claim task");
                    drop(permit);
                    if self.idle(&shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let broker = self.broker.clone();
            let handlers = self.handlers.clone();
            let max_retries = self.config.max_retries;

            match mode {
                ConcurrencyMode::Solo => {
                    let settled = settle(broker, handlers, max_retries, task).await;
                    drop(permit);
                    Self::record(&mut stats, settled);
                }
                ConcurrencyMode::Pool(_) => {
                    in_flight.spawn(async move {
                        let settled = settle(broker, handlers, max_retries, task).await;
                        drop(permit);
                        settled
                    });
                }
            }
        }

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "waiting for in-flight tasks");
        }
        while let Some(joined) = in_flight.join_next().await {
            Self::reap(&mut stats, joined);
        }

        info!(
            succeeded = stats.succeeded,
            retried = stats.retried,
            failed = stats.failed,
            "worker stopped"
        );
        stats
    }

    /// Sleep for one poll interval; true if shutdown arrived meanwhile
    async fn idle(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            () = shutdown.cancelled() => true,
            () = tokio::time::sleep(self.config.poll_interval) => false,
        }
    }

    fn reap(stats: &mut WorkerStats, joined: std::result::Result<Result<Settled>, tokio::task::JoinError>) {
        match joined {
            Ok(settled) => Self::record(stats, settled),
            // The task stays in active until the next worker start recovers it
            Err(err) => error!(error = %err, "task settlement aborted"),
        }
    }

    fn record(stats: &mut WorkerStats, settled: Result<Settled>) {
        match settled {
            Ok(settled) => stats.record(settled),
            Err(err) => error!(error = %err, "failed to settle task"),
        }
    }
}

async fn settle(
    broker: Arc<dyn TaskBroker>,
    handlers: Arc<HandlerRegistry>,
    max_retries: u32,
    task: Task,
) -> Result<Settled> {
    let Some(handler) = handlers.get(&task.name) else {
        warn!(task = %task, "no handler registered");
        let reason = format!("no handler registered for '{}'", task.name);
        broker.fail(task, &reason).await?;
        return Ok(Settled::Failed);
    };

    debug!(task = %task, "task started");
    let started = Instant::now();
    let ctx = Arc::new(TaskContext::new(task, broker.clone()));
    // Handler panics stay inside this task and fail only the task
    let running = tokio::spawn({
        let ctx = ctx.clone();
        async move { handler.execute(&ctx).await }
    });
    let outcome = match running.await {
        Ok(outcome) => outcome,
        Err(err) => TaskOutcome::Failed(format!("handler panicked: {err}")),
    };
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let task = match Arc::try_unwrap(ctx) {
        Ok(ctx) => ctx.task,
        Err(ctx) => ctx.task.clone(),
    };

    match outcome {
        TaskOutcome::Success => {
            broker.complete(&task).await?;
            info!(task = %task, elapsed_ms, "task succeeded");
            Ok(Settled::Succeeded)
        }
        TaskOutcome::Retry(reason) if task.attempts < max_retries => {
            warn!(task = %task, reason = %reason, "task will be retried");
            broker.retry(task, &reason).await?;
            Ok(Settled::Retried)
        }
        TaskOutcome::Retry(reason) => {
            error!(task = %task, reason = %reason, "task retries exhausted");
            broker
                .fail(task, &format!("retries exhausted: {reason}"))
                .await?;
            Ok(Settled::Failed)
        }
        TaskOutcome::Failed(reason) => {
            error!(task = %task, reason = %reason, "task failed");
            broker.fail(task, &reason).await?;
            Ok(Settled::Failed)
        }
    }
}
