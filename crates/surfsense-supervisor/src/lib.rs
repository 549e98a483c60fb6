//! SurfSense Supervisor
//!
//! Runs a complete SurfSense deployment from one command:
//! - Background worker and beat scheduler as OS child processes
//! - The HTTP server in the calling process
//! - Ordered, bounded-time shutdown of every child on all exit paths
//! - Optional restart when the executable is rebuilt

pub mod child;
pub mod child_spec;
pub mod cli;
pub mod error;
pub mod launcher;
pub mod registry;
pub mod reload;
pub mod signals;
pub mod supervisor;

pub use child_spec::{ChildRole, LaunchPlan};
pub use cli::{ChildCommand, Cli};
pub use error::SupervisorError;
pub use launcher::{ChildLauncher, SelfExecLauncher};
pub use registry::{ProcessRegistry, ShutdownReport, Termination, TerminationRecord};
pub use reload::ReloadWatcher;
pub use supervisor::{RunOutcome, Supervisor, SupervisorConfig, SupervisorReport};
