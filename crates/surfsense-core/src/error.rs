//! Error type shared by the core crate

use std::io;

use thiserror::Error;

/// Errors raised by configuration, brokers, handlers and the background loops
#[derive(Debug, Error)]
pub enum Error {
    /// One or more configuration values were missing or malformed
    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A schedule entry could not be parsed
    #[error("invalid schedule entry '{entry}': {reason}")]
    InvalidSchedule { entry: String, reason: String },

    /// The broker could not find a task it was asked to settle
    #[error("task {0} is not active")]
    TaskNotActive(crate::task::TaskId),

    #[error("logging already initialised: {0}")]
    Telemetry(String),
}

pub type Result<T> = std::result::Result<T, Error>;
