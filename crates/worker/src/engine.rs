//! Service graph: repositories, bus and the three services wired together.

use std::sync::Arc;

use netwatch_alerting::AlertingService;
use netwatch_db::memory::{
    MemoryAlertRuleRepository, MemoryIncidentRepository, MemoryNotificationRepository,
    MemoryProbeResultRepository, MemoryPushSubscriptionRepository,
    MemorySpeedTestPreferenceRepository, MemoryTargetRepository,
};
use netwatch_db::postgres::{
    PgAlertRuleRepository, PgIncidentRepository, PgNotificationRepository,
    PgProbeResultRepository, PgPushSubscriptionRepository, PgSpeedTestPreferenceRepository,
    PgTargetRepository,
};
use netwatch_db::repositories::{
    AlertRuleRepository, IncidentRepository, NotificationRepository, ProbeResultRepository,
    PushSubscriptionRepository, SpeedTestPreferenceRepository, TargetRepository,
};
use netwatch_db::DbPool;
use netwatch_events::{EventBus, EventKind, HandlerId};
use netwatch_monitor::probe::CatalogPreferences;
use netwatch_monitor::{Clock, MonitorService, ProbeRunner, ProbeTransport};
use netwatch_notifications::{NotificationService, PushTransport};

use crate::config::WorkerConfig;

/// Every store the services need.
#[derive(Clone)]
pub struct Repositories {
    pub targets: Arc<dyn TargetRepository>,
    pub results: Arc<dyn ProbeResultRepository>,
    pub rules: Arc<dyn AlertRuleRepository>,
    pub incidents: Arc<dyn IncidentRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub subscriptions: Arc<dyn PushSubscriptionRepository>,
    pub preferences: Arc<dyn SpeedTestPreferenceRepository>,
}

impl Repositories {
    /// Process-local stores; nothing survives a restart.
    pub fn memory() -> Self {
        Self {
            targets: Arc::new(MemoryTargetRepository::new()),
            results: Arc::new(MemoryProbeResultRepository::new()),
            rules: Arc::new(MemoryAlertRuleRepository::new()),
            incidents: Arc::new(MemoryIncidentRepository::new()),
            notifications: Arc::new(MemoryNotificationRepository::new()),
            subscriptions: Arc::new(MemoryPushSubscriptionRepository::new()),
            preferences: Arc::new(MemorySpeedTestPreferenceRepository::new()),
        }
    }

    pub fn postgres(pool: DbPool) -> Self {
        Self {
            targets: Arc::new(PgTargetRepository::new(pool.clone())),
            results: Arc::new(PgProbeResultRepository::new(pool.clone())),
            rules: Arc::new(PgAlertRuleRepository::new(pool.clone())),
            incidents: Arc::new(PgIncidentRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            subscriptions: Arc::new(PgPushSubscriptionRepository::new(pool.clone())),
            preferences: Arc::new(PgSpeedTestPreferenceRepository::new(pool)),
        }
    }
}

/// The running engine. Dropping it without [`Engine::shutdown`] cancels the
/// monitors but does not wait for in-flight ticks.
pub struct Engine {
    pub bus: Arc<EventBus>,
    pub monitor: Arc<MonitorService>,
    pub alerting: Arc<AlertingService>,
    pub notifications: Arc<NotificationService>,
    handlers: Vec<(EventKind, HandlerId)>,
}

impl Engine {
    /// Build the services over `repos` and register their bus handlers.
    pub fn build(
        repos: Repositories,
        probe_transport: Arc<dyn ProbeTransport>,
        push_transport: Arc<dyn PushTransport>,
        clock: Arc<dyn Clock>,
        config: &WorkerConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::default());

        let runner = ProbeRunner::new(probe_transport, config.probe.clone())
            .with_preferences(Arc::new(CatalogPreferences::new(repos.preferences.clone())));
        let monitor = Arc::new(
            MonitorService::new(
                repos.targets.clone(),
                repos.results.clone(),
                runner,
                clock,
                bus.clone(),
            )
            .with_default_interval(config.monitor_interval)
            .with_failure_threshold(config.failure_threshold),
        );
        let alerting = Arc::new(AlertingService::new(
            repos.rules.clone(),
            repos.incidents.clone(),
            bus.clone(),
        ));
        let notifications = Arc::new(
            NotificationService::new(
                repos.notifications.clone(),
                repos.subscriptions.clone(),
                push_transport,
                bus.clone(),
            )
            .with_system_recipient(config.notifications.system_recipient.clone()),
        );

        let mut handlers = monitor.register_handlers();
        handlers.extend(alerting.register_handlers());
        handlers.extend(notifications.register_handlers());
        tracing::debug!(count = handlers.len(), "Bus handlers registered");

        Self {
            bus,
            monitor,
            alerting,
            notifications,
            handlers,
        }
    }

    /// Start a monitor for every stored target.
    pub async fn start(&self) -> Result<usize, netwatch_monitor::MonitorError> {
        let started = self.monitor.start_all().await?;
        match self.alerting.get_unresolved_incidents().await {
            Ok(open) => tracing::info!(
                started,
                open_incidents = open.len(),
                system_recipient = self.notifications.system_recipient(),
                "Monitoring resumed for stored targets",
            ),
            Err(e) => tracing::warn!(started, error = %e, "Failed to count open incidents"),
        }
        Ok(started)
    }

    /// Stop the monitors, detach the handlers and fail pending requests.
    pub async fn shutdown(self) {
        let stats = self.monitor.stats();
        tracing::info!(
            total_runs = stats.total_runs,
            failed_runs = stats.failed_runs,
            failed_targets = stats.failed_targets,
            uptime_secs = stats.uptime.as_secs(),
            "Monitor run summary",
        );
        let stopped = self.monitor.shutdown().await;
        for (kind, id) in &self.handlers {
            self.bus.off(*kind, *id);
        }
        let abandoned = self.bus.abandon_pending();
        tracing::info!(stopped, abandoned, "Engine stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
