//! Probe a target, persist the result, publish `SPEED_TEST_COMPLETED`.

use std::sync::Arc;

use netwatch_core::models::{NewProbeResult, Target};
use netwatch_db::repositories::ProbeResultRepository;
use netwatch_db::RepoError;
use netwatch_events::event::SpeedTestCompleted;
use netwatch_events::{Event, EventBus};
use tokio::time::Instant;

use crate::clock::millis;
use crate::probe::ProbeRunner;

/// Shared by scheduled ticks and on-demand speed tests.
pub struct SpeedTester {
    runner: ProbeRunner,
    results: Arc<dyn ProbeResultRepository>,
    bus: Arc<EventBus>,
}

impl SpeedTester {
    pub fn new(runner: ProbeRunner, results: Arc<dyn ProbeResultRepository>, bus: Arc<EventBus>) -> Self {
        Self { runner, results, bus }
    }

    /// Probe failures are recorded as FAILURE results; only persistence
    /// errors are returned. Returns the published `SPEED_TEST_COMPLETED`
    /// payload.
    pub async fn run(
        &self,
        target: &Target,
        download_override: Option<&str>,
    ) -> Result<SpeedTestCompleted, RepoError> {
        let start = Instant::now();
        let outcome = self.runner.run(target, download_override).await;
        let duration = millis(start.elapsed());

        let result = self
            .results
            .create(&NewProbeResult {
                target_id: target.id.clone(),
                outcome,
            })
            .await?;

        tracing::info!(
            target_id = %target.id,
            status = result.status.as_str(),
            duration_ms = duration,
            "Speed test completed",
        );

        let completed = SpeedTestCompleted {
            target_id: target.id.clone(),
            result,
            duration,
        };
        self.bus.emit(Event::SpeedTestCompleted(completed.clone()));
        Ok(completed)
    }
}
