//! Which child processes a run starts, and in what order

use std::fmt;

/// Role of a supervised child process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildRole {
    /// Executes queued tasks
    Worker,
    /// Enqueues periodic tasks
    Scheduler,
}

impl ChildRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Scheduler => "scheduler",
        }
    }

    /// Hidden subcommand the child is started with
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Scheduler => "beat",
        }
    }
}

impl fmt::Display for ChildRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of roles to launch before the server starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    roles: Vec<ChildRole>,
}

impl LaunchPlan {
    /// The scheduler only runs alongside a worker, so skipping the worker
    /// skips both.
    pub fn from_flags(no_worker: bool, no_scheduler: bool) -> Self {
        let mut roles = Vec::with_capacity(2);
        if !no_worker {
            roles.push(ChildRole::Worker);
            if !no_scheduler {
                roles.push(ChildRole::Scheduler);
            }
        }
        Self { roles }
    }

    pub fn roles(&self) -> &[ChildRole] {
        &self.roles
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
