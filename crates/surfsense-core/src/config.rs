//! Environment-driven configuration
//!
//! Every process (supervisor, worker, scheduler) resolves the same
//! [`AppConfig`] from the environment after loading an optional `.env` file.
//! Malformed values are collected and reported together.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schedule::BeatSchedule;
use crate::worker::WorkerConfig;

/// Default schedule run by the beat process
pub const DEFAULT_BEAT_SCHEDULE: &str = "maintenance.heartbeat@60s,maintenance.purge_failed@1h";

/// Bind and lifecycle settings for the HTTP server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Restart on rebuild of the executable
    pub reload: bool,
    /// How long a child gets to exit after a termination request
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            reload: false,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Apply the `--reload` command-line flag
    #[must_use]
    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    /// `host:port` as handed to the socket resolver
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Location of the shared task spool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub spool_dir: PathBuf,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("data/task-spool"),
        }
    }
}

/// Beat scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub schedule: BeatSchedule,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            default_filter: "info".to_string(),
        }
    }
}

/// Configuration shared by every SurfSense process
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load `.env` (if present) and resolve the configuration from the
    /// process environment.
    pub fn load() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(Error::Config(vec![format!("failed to load .env: {err}")]));
            }
        }
        Self::from_env()
    }

    /// Resolve the configuration from the process environment only
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary variable source.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SERVER_HOST` | `0.0.0.0` |
    /// | `SERVER_PORT` | `8000` |
    /// | `SERVER_SHUTDOWN_GRACE_SECS` | `5` |
    /// | `TASK_SPOOL_DIR` | `data/task-spool` |
    /// | `WORKER_CONCURRENCY` | available parallelism |
    /// | `WORKER_POLL_INTERVAL_MS` | `500` |
    /// | `WORKER_MAX_RETRIES` | `3` |
    /// | `BEAT_SCHEDULE` | [`DEFAULT_BEAT_SCHEDULE`] |
    /// | `LOG_FORMAT` | `text` |
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = Vars {
            lookup: &lookup,
            errors: Vec::new(),
        };

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: vars.string("SERVER_HOST", &server_defaults.host),
            port: vars.parse("SERVER_PORT", server_defaults.port),
            reload: false,
            shutdown_grace: Duration::from_secs(
                vars.parse("SERVER_SHUTDOWN_GRACE_SECS", server_defaults.shutdown_grace.as_secs()),
            ),
        };

        let broker = BrokerConfig {
            spool_dir: PathBuf::from(vars.string("TASK_SPOOL_DIR", "data/task-spool")),
        };

        let worker_defaults = WorkerConfig::default();
        let concurrency: usize = vars.parse("WORKER_CONCURRENCY", worker_defaults.concurrency);
        if concurrency == 0 {
            vars.errors
                .push("WORKER_CONCURRENCY must be at least 1".to_string());
        }
        let worker = WorkerConfig {
            concurrency: concurrency.max(1),
            poll_interval: Duration::from_millis(vars.parse(
                "WORKER_POLL_INTERVAL_MS",
                u64::try_from(worker_defaults.poll_interval.as_millis()).unwrap_or(500),
            )),
            max_retries: vars.parse("WORKER_MAX_RETRIES", worker_defaults.max_retries),
        };

        let schedule_text = vars.string("BEAT_SCHEDULE", DEFAULT_BEAT_SCHEDULE);
        let schedule = match schedule_text.parse::<BeatSchedule>() {
            Ok(schedule) => schedule,
            Err(err) => {
                vars.errors.push(format!("BEAT_SCHEDULE: {err}"));
                BeatSchedule::default()
            }
        };

        let logging = LoggingConfig {
            format: vars.parse("LOG_FORMAT", LogFormat::Text),
            ..LoggingConfig::default()
        };

        if !vars.errors.is_empty() {
            return Err(Error::Config(vars.errors));
        }

        Ok(Self {
            server,
            broker,
            worker,
            scheduler: SchedulerConfig { schedule },
            logging,
        })
    }
}

struct Vars<'a, F> {
    lookup: &'a F,
    errors: Vec<String>,
}

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.lookup)(key)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match (self.lookup)(key) {
            Some(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
                Ok(value) => value,
                Err(err) => {
                    self.errors.push(format!("{key}={raw}: {err}"));
                    default
                }
            },
            _ => default,
        }
    }
}
