use std::time::Duration;

use netwatch_core::config::{env_parse, env_string, ConfigError};
use netwatch_monitor::stats::DEFAULT_FAILURE_THRESHOLD;
use netwatch_monitor::ProbeConfig;
use netwatch_notifications::NotificationConfig;

const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Worker process settings, including the per-service configs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Postgres connection string; in-memory repositories when unset.
    pub database_url: Option<String>,
    /// Tick interval for monitors started without an explicit interval.
    pub monitor_interval: Duration,
    /// Consecutive failed runs after which a target is reported as failing.
    pub failure_threshold: u32,
    pub log_format: LogFormat,
    pub probe: ProbeConfig,
    pub notifications: NotificationConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default |
    /// |-------------------------|---------|
    /// | `DATABASE_URL`          | unset   |
    /// | `MONITOR_INTERVAL_SECS` | `300`   |
    /// | `MONITOR_FAILURE_THRESHOLD` | `3` |
    /// | `LOG_FORMAT`            | `text`  |
    ///
    /// See [`ProbeConfig::from_env`] and [`NotificationConfig::from_env`]
    /// for the rest.
    pub fn from_env() -> Result<Self, ConfigError> {
        let interval_secs = env_parse(
            "MONITOR_INTERVAL_SECS",
            DEFAULT_MONITOR_INTERVAL_SECS,
            "a whole number of seconds",
        )?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "MONITOR_INTERVAL_SECS",
                expected: "greater than zero",
                value: "0".to_string(),
            });
        }

        let failure_threshold = env_parse(
            "MONITOR_FAILURE_THRESHOLD",
            DEFAULT_FAILURE_THRESHOLD,
            "a positive whole number",
        )?;
        if failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                name: "MONITOR_FAILURE_THRESHOLD",
                expected: "greater than zero",
                value: "0".to_string(),
            });
        }

        let log_format = match env_string("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    expected: "`text` or `json`",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url: env_string("DATABASE_URL"),
            monitor_interval: Duration::from_secs(interval_secs),
            failure_threshold,
            log_format,
            probe: ProbeConfig::from_env()?,
            notifications: NotificationConfig::from_env()?,
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            log_format: LogFormat::Text,
            probe: ProbeConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
