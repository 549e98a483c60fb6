use clap::{Parser, Subcommand};

use crate::child_spec::{ChildRole, LaunchPlan};

/// Run the SurfSense API server together with its background processes
#[derive(Debug, Parser)]
#[command(name = "surfsense", version, about)]
pub struct Cli {
    /// Restart the server when the executable is rebuilt
    #[arg(long)]
    pub reload: bool,

    /// Do not start the background worker (implies --no-beat)
    #[arg(long)]
    pub no_celery: bool,

    /// Do not start the periodic task scheduler
    #[arg(long)]
    pub no_beat: bool,

    #[command(subcommand)]
    pub command: Option<ChildCommand>,
}

impl Cli {
    pub fn launch_plan(&self) -> LaunchPlan {
        LaunchPlan::from_flags(self.no_celery, self.no_beat)
    }
}

/// Entry points used by the supervisor for its own children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ChildCommand {
    #[command(hide = true)]
    Worker,
    #[command(hide = true)]
    Beat,
}

impl ChildCommand {
    pub fn role(self) -> ChildRole {
        match self {
            Self::Worker => ChildRole::Worker,
            Self::Beat => ChildRole::Scheduler,
        }
    }
}
