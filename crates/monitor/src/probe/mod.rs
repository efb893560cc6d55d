//! One measurement cycle against a target.
//!
//! [`ProbeRunner::run`] performs a HEAD request against the target address
//! (latency), then a GET of a download test file (throughput). Any failure,
//! including a step exceeding the configured timeout, turns the whole cycle
//! into [`ProbeOutcome::Failure`]; the runner itself never errors.

mod download_url;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use netwatch_core::models::{ProbeOutcome, Target};
use tokio::time::Instant;

use crate::config::ProbeConfig;

pub use download_url::{CatalogPreferences, SpeedTestPreferences};
pub use transport::{ChunkSource, Download, ProbeTransport, ReqwestTransport};

/// Elapsed download times below this are rounded up.
const MIN_ELAPSED: Duration = Duration::from_millis(1);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The server answered with a 4xx/5xx status.
    #[error("HTTP {0}")]
    HttpStatus(u16),

    /// Connection, DNS, TLS or body read failure.
    #[error("{0}")]
    Network(String),

    #[error("{step} timed out after {millis}ms")]
    Timeout { step: &'static str, millis: u128 },
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Throughput in megabits per second.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    if bytes == 0 {
        return 0.0;
    }
    let secs = elapsed.max(MIN_ELAPSED).as_secs_f64();
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}

pub struct ProbeRunner {
    transport: Arc<dyn ProbeTransport>,
    preferences: Option<Arc<dyn SpeedTestPreferences>>,
    config: ProbeConfig,
}

impl ProbeRunner {
    pub fn new(transport: Arc<dyn ProbeTransport>, config: ProbeConfig) -> Self {
        Self {
            transport,
            preferences: None,
            config,
        }
    }

    /// Consult owner preferences when choosing the download file.
    pub fn with_preferences(mut self, preferences: Arc<dyn SpeedTestPreferences>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe `target`. `download_override` takes precedence over every other
    /// download URL source.
    pub async fn run(&self, target: &Target, download_override: Option<&str>) -> ProbeOutcome {
        match self.measure(target, download_override).await {
            Ok((ping_ms, download_mbps)) => {
                tracing::debug!(target_id = %target.id, ping_ms, download_mbps, "Probe succeeded");
                ProbeOutcome::Success {
                    ping_ms,
                    download_mbps,
                }
            }
            Err(e) => {
                tracing::warn!(
                    target_id = %target.id,
                    address = %target.address,
                    error = %e,
                    "Probe failed",
                );
                ProbeOutcome::Failure {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn measure(
        &self,
        target: &Target,
        download_override: Option<&str>,
    ) -> Result<(f64, f64), ProbeError> {
        let ping_ms = self.measure_ping(&target.address).await?;
        let url = self.resolve_download_url(target, download_override).await;
        let download_mbps = self.measure_download(&url).await?;
        Ok((ping_ms, download_mbps))
    }

    async fn measure_ping(&self, address: &str) -> Result<f64, ProbeError> {
        let start = Instant::now();
        self.bounded("ping", self.transport.head(address)).await?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }

    async fn measure_download(&self, url: &str) -> Result<f64, ProbeError> {
        let start = Instant::now();
        let bytes = self
            .bounded("download", async {
                let download = self.transport.get(url).await?;
                download.count_bytes().await
            })
            .await?;
        let elapsed = start.elapsed();
        tracing::debug!(url, bytes, elapsed_ms = crate::clock::millis(elapsed), "Download measured");
        Ok(throughput_mbps(bytes, elapsed))
    }

    /// Resolution order: explicit override, configured override, owner
    /// preference, then the environment default.
    pub async fn resolve_download_url(&self, target: &Target, download_override: Option<&str>) -> String {
        if let Some(url) = download_override.or(self.config.download_override.as_deref()) {
            return url.to_string();
        }

        if let Some(preferences) = &self.preferences {
            match preferences.preferred_url(&target.owner_id).await {
                Ok(Some(url)) => return url,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        owner_id = %target.owner_id,
                        error = %e,
                        "Speed test preference lookup failed, using default URL",
                    );
                }
            }
        }

        self.config.default_download_url().to_string()
    }

    async fn bounded<T>(
        &self,
        step: &'static str,
        work: impl std::future::Future<Output = Result<T, ProbeError>>,
    ) -> Result<T, ProbeError> {
        tokio::time::timeout(self.config.timeout, work)
            .await
            .map_err(|_| ProbeError::Timeout {
                step,
                millis: self.config.timeout.as_millis(),
            })?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
