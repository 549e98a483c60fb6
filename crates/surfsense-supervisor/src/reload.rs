//! Development reload: restart the whole deployment when the binary changes

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SupervisorError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls the modification time of an executable
#[derive(Debug, Clone)]
pub struct ReloadWatcher {
    path: PathBuf,
    poll_interval: Duration,
}

impl ReloadWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the executable to change and cancel `shutdown` when it does.
    ///
    /// A change counts once two consecutive polls agree on the new mtime, so
    /// a binary still being written is not picked up half-way. Returns
    /// `false` if shutdown was requested for another reason.
    pub async fn watch(self, shutdown: CancellationToken) -> bool {
        let baseline = modified(&self.path).await;
        let mut candidate: Option<SystemTime> = None;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(path = %self.path.display(), "watching executable for changes");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = ticker.tick() => {}
            }

            let current = modified(&self.path).await;
            if current.is_none() || current == baseline {
                candidate = None;
                continue;
            }
            if candidate == current {
                info!(path = %self.path.display(), "executable changed, reloading");
                shutdown.cancel();
                return true;
            }
            candidate = current;
        }
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Replace this process with a fresh run of `program` and the same arguments.
///
/// On Unix this only returns if the exec failed.
#[cfg(unix)]
pub fn restart(program: &Path) -> Result<ExitCode, SupervisorError> {
    use std::os::unix::process::CommandExt;

    info!(program = %program.display(), "restarting");
    let err = std::process::Command::new(program)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(SupervisorError::Restart(err))
}

#[cfg(not(unix))]
pub fn restart(program: &Path) -> Result<ExitCode, SupervisorError> {
    info!(program = %program.display(), "restarting");
    let status = std::process::Command::new(program)
        .args(std::env::args_os().skip(1))
        .status()
        .map_err(SupervisorError::Restart)?;
    let code = status.code().and_then(|code| u8::try_from(code).ok()).unwrap_or(1);
    Ok(ExitCode::from(code))
}
