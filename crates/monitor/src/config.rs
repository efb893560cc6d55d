use std::time::Duration;

use netwatch_core::config::{env_parse, env_string, ConfigError};

const DEFAULT_SMALL_URL: &str = "https://speed.hetzner.de/10MB.bin";
const DEFAULT_LARGE_URL: &str = "https://speed.hetzner.de/100MB.bin";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Probe runner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Deployment environment; `production` selects the large download file.
    pub app_env: String,
    /// Download URL used for every probe when set.
    pub download_override: Option<String>,
    pub small_url: String,
    pub large_url: String,
    /// Upper bound for each network step of a probe.
    pub timeout: Duration,
}

impl ProbeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                              |
    /// |------------------------|--------------------------------------|
    /// | `APP_ENV`              | `development`                        |
    /// | `SPEED_TEST_URL`       | unset                                |
    /// | `SPEED_TEST_SMALL_URL` | `https://speed.hetzner.de/10MB.bin`  |
    /// | `SPEED_TEST_LARGE_URL` | `https://speed.hetzner.de/100MB.bin` |
    /// | `PROBE_TIMEOUT_SECS`   | `30`                                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = env_parse(
            "PROBE_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
            "a whole number of seconds",
        )?;

        Ok(Self {
            app_env: env_string("APP_ENV").unwrap_or_else(|| "development".into()),
            download_override: env_string("SPEED_TEST_URL"),
            small_url: env_string("SPEED_TEST_SMALL_URL")
                .unwrap_or_else(|| DEFAULT_SMALL_URL.into()),
            large_url: env_string("SPEED_TEST_LARGE_URL")
                .unwrap_or_else(|| DEFAULT_LARGE_URL.into()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// The environment's default download file.
    pub fn default_download_url(&self) -> &str {
        if self.is_production() {
            &self.large_url
        } else {
            &self.small_url
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            app_env: "development".into(),
            download_override: None,
            small_url: DEFAULT_SMALL_URL.into(),
            large_url: DEFAULT_LARGE_URL.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
