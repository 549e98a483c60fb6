//! SurfSense Core
//!
//! Shared building blocks for the SurfSense backend processes:
//! - Environment-driven configuration for the server, worker and scheduler
//! - A task queue with a cross-process spool broker
//! - The background worker loop and its task handlers
//! - The periodic (beat) scheduler

pub mod broker;
pub mod config;
pub mod error;
pub mod handler;
pub mod schedule;
pub mod scheduler;
pub mod task;
pub mod telemetry;
pub mod worker;

pub use broker::{MemoryBroker, SpoolBroker};
pub use config::{AppConfig, BrokerConfig, LoggingConfig, SchedulerConfig, ServerConfig};
pub use error::{Error, Result};
pub use handler::{HandlerRegistry, TaskContext, TaskHandler, TaskOutcome};
pub use schedule::{BeatSchedule, ScheduleEntry};
pub use scheduler::BeatScheduler;
pub use task::{QueueStats, Recovered, Task, TaskBroker, TaskId, ABANDONED_REASON};
pub use worker::{ConcurrencyMode, TaskWorker, WorkerConfig, WorkerStats};
