//! The supervision run: children, server, cleanup

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::child_spec::{ChildRole, LaunchPlan};
use crate::launcher::ChildLauncher;
use crate::registry::{ProcessRegistry, ShutdownReport};
use crate::reload::ReloadWatcher;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub plan: LaunchPlan,
    /// How long each child gets to exit before it is killed
    pub grace: Duration,
}

impl SupervisorConfig {
    pub fn new(plan: LaunchPlan) -> Self {
        Self {
            plan,
            grace: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

/// How the server step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested and the server stopped cleanly
    Stopped,
    /// The executable changed; the caller should restart
    ReloadRequested,
    /// The server failed to start, failed while serving, or panicked
    ServerFailed(String),
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Stopped | Self::ReloadRequested => 0,
            Self::ServerFailed(_) => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorReport {
    pub outcome: RunOutcome,
    /// Children that were started, in order
    pub launched: Vec<ChildRole>,
    pub cleanup: ShutdownReport,
}

/// Owns the child processes for one run of the deployment
pub struct Supervisor {
    config: SupervisorConfig,
    launcher: Box<dyn ChildLauncher>,
    registry: ProcessRegistry,
    shutdown: CancellationToken,
    reload: Option<ReloadWatcher>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, launcher: impl ChildLauncher + 'static) -> Self {
        Self {
            config,
            launcher: Box::new(launcher),
            registry: ProcessRegistry::new(),
            shutdown: CancellationToken::new(),
            reload: None,
        }
    }

    /// Cancelling this token stops the server and begins cleanup
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn with_reload_watcher(mut self, watcher: ReloadWatcher) -> Self {
        self.reload = Some(watcher);
        self
    }

    /// Start the children, run `serve` until it returns, then stop every
    /// child.
    ///
    /// `serve` receives the shutdown token and must return once it is
    /// cancelled. Cleanup runs whether it returns `Ok`, `Err`, or panics.
    pub async fn run<F, Fut, E>(mut self, serve: F) -> SupervisorReport
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        self.start_children();
        let launched = self.registry.roles();

        let reload = self
            .reload
            .take()
            .map(|watcher| tokio::spawn(watcher.watch(self.shutdown.clone())));

        info!("starting HTTP server");
        let token = self.shutdown.clone();
        let served = AssertUnwindSafe(async move { serve(token).await })
            .catch_unwind()
            .await;

        let failure = match served {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                error!(error = %e, "HTTP server failed");
                Some(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "HTTP server panicked");
                Some(message)
            }
        };

        self.shutdown.cancel();
        let reload_requested = match reload {
            Some(handle) => handle.await.unwrap_or(false),
            None => false,
        };

        let cleanup = self.cleanup().await;
        info!("shutdown complete");

        let outcome = match failure {
            Some(message) => RunOutcome::ServerFailed(message),
            None if reload_requested => RunOutcome::ReloadRequested,
            None => RunOutcome::Stopped,
        };
        SupervisorReport {
            outcome,
            launched,
            cleanup,
        }
    }

    fn start_children(&mut self) {
        let roles = self.config.plan.roles().to_vec();
        for role in roles {
            if role == ChildRole::Scheduler && !self.registry.contains(ChildRole::Worker) {
                warn!("worker is not running, not starting scheduler");
                continue;
            }
            if let Err(e) = self.registry.spawn(self.launcher.as_ref(), role) {
                error!(error = %e, "failed to start child process");
            }
        }
    }

    async fn cleanup(&mut self) -> ShutdownReport {
        if self.registry.is_empty() {
            return ShutdownReport::default();
        }
        info!(
            children = self.registry.len(),
            grace_secs = self.config.grace.as_secs_f64(),
            "cleaning up children"
        );
        self.registry.shutdown(self.config.grace).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::Stopped.exit_code(), 0);
        assert_eq!(RunOutcome::ReloadRequested.exit_code(), 0);
        assert_eq!(RunOutcome::ServerFailed("bind".into()).exit_code(), 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
