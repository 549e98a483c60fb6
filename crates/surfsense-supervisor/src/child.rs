//! Entry points of the worker and scheduler child processes

use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use std::sync::Arc;

use futures::FutureExt;
use surfsense_core::{
    AppConfig, BeatScheduler, ConcurrencyMode, HandlerRegistry, SpoolBroker, TaskBroker,
    TaskWorker,
};
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::child_spec::ChildRole;
use crate::error::SupervisorError;
use crate::signals;

/// Run a child role to completion and map the result to an exit status.
///
/// Errors and panics stay inside this process; the supervisor only sees the
/// exit.
pub fn run_child(role: ChildRole, config: AppConfig) -> ExitCode {
    let runtime = match build_runtime(role, config.worker.mode()) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(%role, error = %e, "child failed to start");
            return ExitCode::FAILURE;
        }
    };

    let span = info_span!("child", %role, pid = std::process::id());
    let result = runtime.block_on(
        AssertUnwindSafe(child_main(role, config))
            .catch_unwind()
            .instrument(span),
    );

    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(%role, error = %e, "child process failed");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!(%role, "child process panicked");
            ExitCode::FAILURE
        }
    }
}

/// Solo workers and the scheduler run on a single thread.
fn build_runtime(role: ChildRole, mode: ConcurrencyMode) -> Result<Runtime, SupervisorError> {
    let mut builder = match (role, mode) {
        (ChildRole::Worker, ConcurrencyMode::Pool(slots)) => {
            let mut builder = Builder::new_multi_thread();
            builder.worker_threads(slots);
            builder
        }
        _ => Builder::new_current_thread(),
    };
    builder.enable_all().build().map_err(SupervisorError::Runtime)
}

async fn child_main(role: ChildRole, config: AppConfig) -> Result<(), SupervisorError> {
    let shutdown = CancellationToken::new();
    let _signals = signals::install(shutdown.clone())?;

    info!(spool = %config.broker.spool_dir.display(), "opening task spool");
    let broker: Arc<dyn TaskBroker> = Arc::new(SpoolBroker::open(&config.broker.spool_dir).await?);

    match role {
        ChildRole::Worker => {
            TaskWorker::new(broker, HandlerRegistry::with_builtins(), config.worker)
                .run(shutdown)
                .await;
        }
        ChildRole::Scheduler => {
            BeatScheduler::new(broker, config.scheduler.schedule)
                .run(shutdown)
                .await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_flavors() {
        let pool = build_runtime(ChildRole::Worker, ConcurrencyMode::Pool(2)).unwrap();
        assert_eq!(pool.metrics().num_workers(), 2);

        let solo = build_runtime(ChildRole::Worker, ConcurrencyMode::Solo).unwrap();
        assert_eq!(solo.metrics().num_workers(), 1);

        let beat = build_runtime(ChildRole::Scheduler, ConcurrencyMode::Pool(4)).unwrap();
        assert_eq!(beat.metrics().num_workers(), 1);
    }
}
