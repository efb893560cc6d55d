//! Target management and monitoring control.
//!
//! [`MonitorService`] owns the target CRUD, the scheduler and on-demand
//! speed tests. Every mutation publishes its outcome on the bus; failures
//! publish the matching `*_FAILED` event and are returned to the caller.
//! [`MonitorService::register_handlers`] wires the `*_REQUESTED` events to
//! these operations and answers each request through
//! [`EventBus::respond`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use netwatch_core::models::{NewTarget, ProbeResult, Target, TargetUpdate};
use netwatch_db::repositories::{ProbeResultRepository, TargetRepository};
use netwatch_events::event::{
    MonitoringChanged, OperationFailed, SpeedTestCompleted, TargetDeleted,
};
use netwatch_events::{Event, EventBus, EventKind, HandlerId, Reply};
use validator::Validate;

use crate::clock::{millis, Clock};
use crate::error::MonitorError;
use crate::probe::ProbeRunner;
use crate::scheduler::MonitorScheduler;
use crate::speed_test::SpeedTester;
use crate::stats::{HealthStatus, SchedulerStats};

/// Interval used when a start request does not name one.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(300);

pub struct MonitorService {
    targets: Arc<dyn TargetRepository>,
    results: Arc<dyn ProbeResultRepository>,
    tester: Arc<SpeedTester>,
    scheduler: MonitorScheduler,
    bus: Arc<EventBus>,
    default_interval: Duration,
}

impl MonitorService {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        results: Arc<dyn ProbeResultRepository>,
        runner: ProbeRunner,
        clock: Arc<dyn Clock>,
        bus: Arc<EventBus>,
    ) -> Self {
        let tester = Arc::new(SpeedTester::new(runner, results.clone(), bus.clone()));
        let scheduler = MonitorScheduler::new(targets.clone(), tester.clone(), clock);
        Self {
            targets,
            results,
            tester,
            scheduler,
            bus,
            default_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }

    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Consecutive failed runs after which a target counts as failing.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.scheduler = self.scheduler.with_failure_threshold(threshold);
        self
    }

    pub fn scheduler(&self) -> &MonitorScheduler {
        &self.scheduler
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    pub async fn create_target(&self, data: &NewTarget) -> Result<Target, MonitorError> {
        let result: Result<Target, MonitorError> = async {
            data.validate()?;
            Ok(self.targets.create(data).await?)
        }
        .await;

        match result {
            Ok(target) => {
                tracing::info!(target_id = %target.id, name = %target.name, "Target created");
                self.bus.emit(Event::TargetCreated(target.clone()));
                Ok(target)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create target");
                self.bus
                    .emit(Event::TargetCreateFailed(OperationFailed::new(None, &e)));
                Err(e)
            }
        }
    }

    pub async fn get_target(&self, id: &str) -> Result<Option<Target>, MonitorError> {
        Ok(self.targets.find_by_id(id).await?)
    }

    pub async fn get_targets(&self, owner_id: &str) -> Result<Vec<Target>, MonitorError> {
        Ok(self.targets.find_by_owner_id(owner_id).await?)
    }

    pub async fn get_all_targets(&self) -> Result<Vec<Target>, MonitorError> {
        Ok(self.targets.list_all().await?)
    }

    pub async fn update_target(
        &self,
        id: &str,
        changes: &TargetUpdate,
    ) -> Result<Target, MonitorError> {
        let result: Result<Target, MonitorError> = async {
            changes.validate()?;
            Ok(self.targets.update(id, changes).await?)
        }
        .await;

        match result {
            Ok(target) => {
                tracing::info!(target_id = %target.id, "Target updated");
                self.bus.emit(Event::TargetUpdated(target.clone()));
                Ok(target)
            }
            Err(e) => {
                tracing::error!(target_id = id, error = %e, "Failed to update target");
                self.bus.emit(Event::TargetUpdateFailed(OperationFailed::new(
                    Some(id.to_string()),
                    &e,
                )));
                Err(e)
            }
        }
    }

    /// Stops any active monitor before the target row is removed.
    pub async fn delete_target(&self, id: &str) -> Result<(), MonitorError> {
        if self.scheduler.is_active(id) {
            self.stop_monitoring(id);
        }

        match self.targets.delete(id).await {
            Ok(()) => {
                tracing::info!(target_id = id, "Target deleted");
                self.bus
                    .emit(Event::TargetDeleted(TargetDeleted { id: id.to_string() }));
                Ok(())
            }
            Err(e) => {
                let e = MonitorError::from(e);
                tracing::error!(target_id = id, error = %e, "Failed to delete target");
                self.bus.emit(Event::TargetDeleteFailed(OperationFailed::new(
                    Some(id.to_string()),
                    &e,
                )));
                Err(e)
            }
        }
    }

    pub async fn get_target_results(
        &self,
        target_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ProbeResult>, MonitorError> {
        Ok(self.results.find_by_target_id(target_id, limit).await?)
    }

    // -----------------------------------------------------------------------
    // Speed tests and monitoring
    // -----------------------------------------------------------------------

    /// Run one probe now. An unreachable target still yields a FAILURE
    /// result; only a missing target or a storage error is an `Err`.
    pub async fn run_speed_test(
        &self,
        target_id: &str,
        download_url: Option<&str>,
    ) -> Result<SpeedTestCompleted, MonitorError> {
        let result: Result<SpeedTestCompleted, MonitorError> = async {
            let target = self
                .targets
                .find_by_id(target_id)
                .await?
                .ok_or_else(|| MonitorError::TargetNotFound(target_id.to_string()))?;
            Ok(self.tester.run(&target, download_url).await?)
        }
        .await;

        if let Err(e) = &result {
            tracing::error!(target_id, error = %e, "Speed test failed");
            self.bus.emit(Event::SpeedTestFailed(OperationFailed::new(
                Some(target_id.to_string()),
                e,
            )));
        }
        result
    }

    /// Start monitoring an existing target. `Ok(false)` means it was
    /// already monitored.
    pub async fn start_monitoring(
        &self,
        target_id: &str,
        interval: Option<Duration>,
    ) -> Result<bool, MonitorError> {
        let interval = interval.unwrap_or(self.default_interval);
        let result: Result<bool, MonitorError> = async {
            if interval.is_zero() {
                return Err(MonitorError::Validation(
                    "interval must be greater than zero".to_string(),
                ));
            }
            if self.targets.find_by_id(target_id).await?.is_none() {
                return Err(MonitorError::TargetNotFound(target_id.to_string()));
            }
            Ok(self.scheduler.start_monitoring(target_id, interval))
        }
        .await;

        match &result {
            Ok(true) => self.bus.emit(Event::MonitoringStarted(MonitoringChanged {
                target_id: target_id.to_string(),
                interval_ms: Some(millis(interval)),
            })),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(target_id, error = %e, "Failed to start monitoring");
                self.bus.emit(Event::MonitoringStartFailed(OperationFailed::new(
                    Some(target_id.to_string()),
                    e,
                )));
            }
        }
        result
    }

    /// Returns `false` if the target was not monitored.
    pub fn stop_monitoring(&self, target_id: &str) -> bool {
        let stopped = self.scheduler.stop_monitoring(target_id);
        if stopped {
            self.bus.emit(Event::MonitoringStopped(MonitoringChanged {
                target_id: target_id.to_string(),
                interval_ms: None,
            }));
        }
        stopped
    }

    pub fn get_active_targets(&self) -> Vec<String> {
        self.scheduler.active_targets()
    }

    pub fn failed_targets(&self) -> Vec<String> {
        self.scheduler.failed_targets()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn health(&self) -> HealthStatus {
        self.scheduler.health()
    }

    /// Start a monitor for every stored target at the default interval.
    pub async fn start_all(&self) -> Result<usize, MonitorError> {
        let targets = self.targets.list_all().await?;
        let mut started = 0;
        for target in &targets {
            // Failures are already logged and published.
            if let Ok(true) = self.start_monitoring(&target.id, None).await {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Stop every monitor and wait for in-flight ticks.
    pub async fn shutdown(&self) -> usize {
        self.scheduler.stop_all().await
    }

    // -----------------------------------------------------------------------
    // Bus requests
    // -----------------------------------------------------------------------

    /// Subscribe to the request events this service answers.
    ///
    /// Handlers hold a weak reference; once the service is dropped they
    /// ignore further requests.
    pub fn register_handlers(self: &Arc<Self>) -> Vec<(EventKind, HandlerId)> {
        vec![
            self.on_request(EventKind::TargetCreateRequested, Self::handle_target_create),
            self.on_request(EventKind::TargetUpdateRequested, Self::handle_target_update),
            self.on_request(EventKind::TargetDeleteRequested, Self::handle_target_delete),
            self.on_request(EventKind::MonitoringStartRequested, Self::handle_monitoring_start),
            self.on_request(EventKind::MonitoringStopRequested, Self::handle_monitoring_stop),
            self.on_request(EventKind::SpeedTestRequested, Self::handle_speed_test),
        ]
    }

    fn on_request<F, Fut>(self: &Arc<Self>, kind: EventKind, handle: F) -> (EventKind, HandlerId)
    where
        F: Fn(Arc<Self>, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        (kind, self.bus.on_spawn(kind, Arc::downgrade(self), handle))
    }

    async fn handle_target_create(self: Arc<Self>, event: Event) {
        let Event::TargetCreateRequested(request) = event else {
            return;
        };
        let result = self.create_target(&request.body).await;
        self.bus.respond(
            &request.request_id,
            Reply::from_result(EventKind::TargetCreated, EventKind::TargetCreateFailed, result),
        );
    }

    async fn handle_target_update(self: Arc<Self>, event: Event) {
        let Event::TargetUpdateRequested(request) = event else {
            return;
        };
        let result = self
            .update_target(&request.body.id, &request.body.changes)
            .await;
        self.bus.respond(
            &request.request_id,
            Reply::from_result(EventKind::TargetUpdated, EventKind::TargetUpdateFailed, result),
        );
    }

    async fn handle_target_delete(self: Arc<Self>, event: Event) {
        let Event::TargetDeleteRequested(request) = event else {
            return;
        };
        let id = request.body.id;
        let result = self
            .delete_target(&id)
            .await
            .map(|()| TargetDeleted { id: id.clone() });
        self.bus.respond(
            &request.request_id,
            Reply::from_result(EventKind::TargetDeleted, EventKind::TargetDeleteFailed, result),
        );
    }

    async fn handle_monitoring_start(self: Arc<Self>, event: Event) {
        let Event::MonitoringStartRequested(request) = event else {
            return;
        };
        let target_id = request.body.target_id;
        let interval = request.body.interval_ms.map(Duration::from_millis);
        let result = self
            .start_monitoring(&target_id, interval)
            .await
            .map(|_| MonitoringChanged {
                interval_ms: self
                    .scheduler
                    .interval_of(&target_id)
                    .map(millis),
                target_id: target_id.clone(),
            });
        self.bus.respond(
            &request.request_id,
            Reply::from_result(
                EventKind::MonitoringStarted,
                EventKind::MonitoringStartFailed,
                result,
            ),
        );
    }

    async fn handle_monitoring_stop(self: Arc<Self>, event: Event) {
        let Event::MonitoringStopRequested(request) = event else {
            return;
        };
        let target_id = request.body.target_id;
        self.stop_monitoring(&target_id);
        let result: Result<_, MonitorError> = Ok(MonitoringChanged {
            target_id,
            interval_ms: None,
        });
        self.bus.respond(
            &request.request_id,
            Reply::from_result(
                EventKind::MonitoringStopped,
                EventKind::MonitoringStopFailed,
                result,
            ),
        );
    }

    async fn handle_speed_test(self: Arc<Self>, event: Event) {
        let Event::SpeedTestRequested(request) = event else {
            return;
        };
        let result = self
            .run_speed_test(&request.body.target_id, request.body.download_url.as_deref())
            .await;
        self.bus.respond(
            &request.request_id,
            Reply::from_result(EventKind::SpeedTestCompleted, EventKind::SpeedTestFailed, result),
        );
    }
}
