//! Ownership of spawned child processes and their ordered shutdown

use std::io;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tracing::{info, warn};

use crate::child_spec::ChildRole;
use crate::error::SupervisorError;
use crate::launcher::ChildLauncher;

/// A running child and what it was started as
#[derive(Debug)]
pub struct ChildHandle {
    role: ChildRole,
    pid: u32,
    child: Child,
}

impl ChildHandle {
    pub fn role(&self) -> ChildRole {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the child to exit, wait up to `grace`, then kill it.
    async fn terminate(&mut self, grace: Duration) -> Termination {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                info!(role = %self.role, pid = self.pid, %status, "child process already exited");
                return Termination::AlreadyExited(status);
            }
            Ok(None) => {}
            Err(e) => warn!(role = %self.role, pid = self.pid, error = %e, "failed to poll child process"),
        }

        info!(role = %self.role, pid = self.pid, "stopping child process");
        if let Err(e) = request_stop(&mut self.child) {
            warn!(role = %self.role, pid = self.pid, error = %e, "failed to signal child process");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(role = %self.role, pid = self.pid, %status, "child process exited");
                Termination::Terminated(status)
            }
            Ok(Err(e)) => {
                warn!(role = %self.role, pid = self.pid, error = %e, "failed to wait for child process");
                self.kill().await
            }
            Err(_) => {
                warn!(
                    role = %self.role,
                    pid = self.pid,
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    "child process ignored termination request, killing"
                );
                self.kill().await
            }
        }
    }

    async fn kill(&mut self) -> Termination {
        if let Err(e) = self.child.kill().await {
            warn!(role = %self.role, pid = self.pid, error = %e, "failed to kill child process");
        }
        Termination::Killed
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
}

// No polite termination request exists here; the grace wait still applies
// to the exit itself.
#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

/// How a child left during shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Dead before shutdown reached it
    AlreadyExited(ExitStatus),
    /// Exited within the grace period
    Terminated(ExitStatus),
    /// Force-killed after the grace period
    Killed,
}

#[derive(Debug, Clone)]
pub struct TerminationRecord {
    pub role: ChildRole,
    pub pid: u32,
    pub termination: Termination,
    /// Time spent stopping this child
    pub waited: Duration,
}

/// Per-child results of a shutdown, in the order children were started
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub entries: Vec<TerminationRecord>,
}

impl ShutdownReport {
    pub fn roles(&self) -> Vec<ChildRole> {
        self.entries.iter().map(|entry| entry.role).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Children started by this supervisor, in start order
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    children: Vec<ChildHandle>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a child and record it.
    ///
    /// Children are killed if their handle is dropped without a shutdown.
    pub fn spawn(
        &mut self,
        launcher: &dyn ChildLauncher,
        role: ChildRole,
    ) -> Result<u32, SupervisorError> {
        let mut command = launcher.command(role);
        command.kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|source| SupervisorError::Spawn { role, source })?;
        let pid = child.id().unwrap_or_default();
        info!(role = %role, pid, "started child process");

        self.children.push(ChildHandle { role, pid, child });
        Ok(pid)
    }

    pub fn contains(&self, role: ChildRole) -> bool {
        self.children.iter().any(|child| child.role == role)
    }

    pub fn roles(&self) -> Vec<ChildRole> {
        self.children.iter().map(ChildHandle::role).collect()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn live_count(&mut self) -> usize {
        self.children
            .iter_mut()
            .fold(0, |live, child| live + usize::from(child.is_alive()))
    }

    /// Stop every child in start order, one at a time, draining the registry.
    pub async fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        for mut child in self.children.drain(..) {
            let started = Instant::now();
            let termination = child.terminate(grace).await;
            report.entries.push(TerminationRecord {
                role: child.role,
                pid: child.pid,
                termination,
                waited: started.elapsed(),
            });
        }
        report
    }
}
