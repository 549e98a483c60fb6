use std::io;

use thiserror::Error;

use crate::child_spec::ChildRole;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to start {role} process: {source}")]
    Spawn {
        role: ChildRole,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error("failed to build the async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to restart: {0}")]
    Restart(#[source] io::Error),

    #[error(transparent)]
    Core(#[from] surfsense_core::Error),
}
