//! Rule evaluation and incident lifecycle.

use std::sync::Arc;

use chrono::Utc;
use netwatch_core::models::{IncidentEvent, IncidentType, NewIncident, ProbeResult};
use netwatch_core::rules::{self, RuleBreach};
use netwatch_core::types::DbId;
use netwatch_db::repositories::{AlertRuleRepository, IncidentRepository};
use netwatch_db::RepoError;
use netwatch_events::event::{AlertTriggered, IncidentCreated, IncidentResolved};
use netwatch_events::{Event, EventBus, EventKind, HandlerId};

use crate::error::AlertingError;

pub struct AlertingService {
    pub(crate) rules: Arc<dyn AlertRuleRepository>,
    incidents: Arc<dyn IncidentRepository>,
    pub(crate) bus: Arc<EventBus>,
}

impl AlertingService {
    pub fn new(
        rules: Arc<dyn AlertRuleRepository>,
        incidents: Arc<dyn IncidentRepository>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            rules,
            incidents,
            bus,
        }
    }

    /// Subscribe to completed speed tests and to the rule requests.
    pub fn register_handlers(self: &Arc<Self>) -> Vec<(EventKind, HandlerId)> {
        let evaluate = self.bus.on_spawn(
            EventKind::SpeedTestCompleted,
            Arc::downgrade(self),
            |service: Arc<Self>, event| async move {
                if let Event::SpeedTestCompleted(completed) = event {
                    service.evaluate_probe_result(&completed.result).await;
                }
            },
        );

        let mut handlers = vec![(EventKind::SpeedTestCompleted, evaluate)];
        handlers.extend(self.register_rule_handlers());
        handlers
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Check a probe result against its target's rules and record one ALERT
    /// incident per breach. Returns the incidents created.
    ///
    /// Errors are logged, never returned: a rule lookup failure abandons the
    /// evaluation, an incident failure only skips that breach.
    pub async fn evaluate_probe_result(&self, result: &ProbeResult) -> Vec<IncidentEvent> {
        let rules = match self.rules.find_by_target_id(&result.target_id).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(
                    target_id = %result.target_id,
                    error = %e,
                    "Failed to load alert rules, skipping evaluation",
                );
                return Vec::new();
            }
        };

        let mut created = Vec::new();
        for breach in rules::evaluate(&rules, result) {
            match self.record_breach(&breach).await {
                Ok(incident) => created.push(incident),
                Err(e) => tracing::error!(
                    target_id = %result.target_id,
                    rule_id = breach.rule.id,
                    error = %e,
                    "Failed to create alert incident",
                ),
            }
        }
        created
    }

    async fn record_breach(&self, breach: &RuleBreach) -> Result<IncidentEvent, RepoError> {
        let rule = &breach.rule;
        let incident = self
            .incidents
            .create(&NewIncident {
                target_id: rule.target_id.clone(),
                incident_type: IncidentType::Alert,
                description: breach.description(),
                rule_id: Some(rule.id),
            })
            .await?;

        tracing::warn!(
            target_id = %rule.target_id,
            rule_id = rule.id,
            rule = %rule.name,
            value = breach.value,
            threshold = rule.threshold,
            "Alert triggered",
        );

        self.bus.emit(Event::AlertTriggered(AlertTriggered {
            target_id: rule.target_id.clone(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            metric: rule.metric,
            value: breach.value,
            threshold: rule.threshold,
            condition: rule.condition,
            triggered_at: incident.timestamp,
        }));
        self.publish_created(&incident);
        Ok(incident)
    }

    fn publish_created(&self, incident: &IncidentEvent) {
        self.bus.emit(Event::IncidentCreated(IncidentCreated {
            id: incident.id,
            target_id: incident.target_id.clone(),
            incident_type: incident.incident_type,
            description: incident.description.clone(),
            rule_id: incident.rule_id,
            created_at: incident.timestamp,
        }));
    }

    // -----------------------------------------------------------------------
    // Incidents
    // -----------------------------------------------------------------------

    /// Record an incident that no rule raised, typically an outage.
    pub async fn create_incident(&self, data: &NewIncident) -> Result<IncidentEvent, AlertingError> {
        let incident = self.incidents.create(data).await?;
        tracing::warn!(
            target_id = %incident.target_id,
            incident_id = incident.id,
            kind = incident.incident_type.as_str(),
            "Incident created",
        );
        self.publish_created(&incident);
        Ok(incident)
    }

    /// Mark an incident resolved. Resolving twice is a no-op that returns
    /// the stored incident.
    pub async fn resolve_incident(&self, id: DbId) -> Result<IncidentEvent, AlertingError> {
        let incident = self
            .incidents
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::not_found("incident", id))?;

        if incident.resolved {
            tracing::debug!(incident_id = id, "Incident already resolved");
            return Ok(incident);
        }

        let resolved = self.incidents.resolve(id).await?;
        let resolved_at = Utc::now();
        let duration = (resolved_at - resolved.timestamp).num_milliseconds();

        tracing::info!(
            target_id = %resolved.target_id,
            incident_id = id,
            duration_ms = duration,
            "Incident resolved",
        );
        self.bus.emit(Event::IncidentResolved(IncidentResolved {
            id,
            target_id: resolved.target_id.clone(),
            resolved_at,
            duration,
        }));
        Ok(resolved)
    }

    pub async fn get_incidents_by_target_id(
        &self,
        target_id: &str,
    ) -> Result<Vec<IncidentEvent>, AlertingError> {
        Ok(self.incidents.find_by_target_id(target_id).await?)
    }

    pub async fn get_unresolved_incidents(&self) -> Result<Vec<IncidentEvent>, AlertingError> {
        Ok(self.incidents.find_unresolved().await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use netwatch_core::models::{Condition, Metric, NewAlertRule, NewProbeResult, ProbeOutcome};
    use netwatch_db::memory::{MemoryAlertRuleRepository, MemoryIncidentRepository};

    struct Fixture {
        service: AlertingService,
        rules: Arc<MemoryAlertRuleRepository>,
        incidents: Arc<MemoryIncidentRepository>,
        bus: Arc<EventBus>,
    }

    fn fixture() -> Fixture {
        let rules = Arc::new(MemoryAlertRuleRepository::new());
        let incidents = Arc::new(MemoryIncidentRepository::new());
        let bus = Arc::new(EventBus::default());
        Fixture {
            service: AlertingService::new(rules.clone(), incidents.clone(), bus.clone()),
            rules,
            incidents,
            bus,
        }
    }

    fn ping_rule(threshold: f64) -> NewAlertRule {
        NewAlertRule {
            name: "High ping".to_string(),
            target_id: "t1".to_string(),
            metric: Metric::Ping,
            condition: Condition::GreaterThan,
            threshold,
            enabled: true,
        }
    }

    fn probe(outcome: ProbeOutcome) -> ProbeResult {
        let new = NewProbeResult {
            target_id: "t1".to_string(),
            outcome,
        };
        ProbeResult::from_new("r1".to_string(), &new, Utc::now())
    }

    fn ping(ping_ms: f64) -> ProbeResult {
        probe(ProbeOutcome::Success {
            ping_ms,
            download_mbps: 100.0,
        })
    }

    #[tokio::test]
    async fn breach_creates_incident_and_publishes_in_order() {
        let f = fixture();
        f.rules.create(&ping_rule(100.0)).await.unwrap();
        let mut rx = f.bus.subscribe();

        let created = f.service.evaluate_probe_result(&ping(150.0)).await;

        assert_eq!(created.len(), 1);
        assert_eq!(
            created[0].description,
            "Alert triggered: ping GREATER_THAN 100 (actual: 150)"
        );
        assert_eq!(created[0].incident_type, IncidentType::Alert);
        assert_eq!(created[0].rule_id, Some(1));

        assert_matches!(
            rx.try_recv().unwrap(),
            Event::AlertTriggered(a) if a.value == 150.0 && a.threshold == 100.0 && a.rule_name == "High ping"
        );
        assert_matches!(
            rx.try_recv().unwrap(),
            Event::IncidentCreated(i) if i.id == created[0].id && i.rule_id == Some(1)
        );
    }

    #[tokio::test]
    async fn no_breach_creates_nothing() {
        let f = fixture();
        f.rules.create(&ping_rule(100.0)).await.unwrap();
        let mut rx = f.bus.subscribe();

        assert!(f.service.evaluate_probe_result(&ping(50.0)).await.is_empty());
        assert_eq!(f.incidents.count().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_probe_creates_nothing() {
        let f = fixture();
        f.rules.create(&ping_rule(0.0)).await.unwrap();

        let failure = probe(ProbeOutcome::Failure {
            error: "HTTP 503".to_string(),
        });
        assert!(f.service.evaluate_probe_result(&failure).await.is_empty());
    }

    #[tokio::test]
    async fn resolve_publishes_duration_once() {
        let f = fixture();
        let incident = f
            .service
            .create_incident(&NewIncident::outage("t1", "Target unreachable"))
            .await
            .unwrap();
        assert_eq!(incident.rule_id, None);
        let mut rx = f.bus.subscribe();

        let resolved = f.service.resolve_incident(incident.id).await.unwrap();
        assert!(resolved.resolved);
        assert_matches!(
            rx.try_recv().unwrap(),
            Event::IncidentResolved(r) if r.id == incident.id && r.duration >= 0
        );

        // Second resolve is a quiet no-op.
        let again = f.service.resolve_incident(incident.id).await.unwrap();
        assert!(again.resolved);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn resolve_unknown_incident_is_not_found() {
        let f = fixture();
        let err = f.service.resolve_incident(42).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "incident not found: 42");
    }

    #[tokio::test]
    async fn unresolved_query_excludes_resolved() {
        let f = fixture();
        let a = f
            .service
            .create_incident(&NewIncident::outage("t1", "down"))
            .await
            .unwrap();
        f.service
            .create_incident(&NewIncident::outage("t2", "down"))
            .await
            .unwrap();
        f.service.resolve_incident(a.id).await.unwrap();

        let open = f.service.get_unresolved_incidents().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].target_id, "t2");
        assert_eq!(f.service.get_incidents_by_target_id("t1").await.unwrap().len(), 1);
    }
}
