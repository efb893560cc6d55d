//! Alert rule administration and its bus requests.

use std::sync::Arc;

use netwatch_core::models::{AlertRule, AlertRuleUpdate, NewAlertRule};
use netwatch_core::types::DbId;
use netwatch_db::RepoError;
use netwatch_events::event::{AlertRuleDeleted, OperationFailed};
use netwatch_events::{Event, EventKind, HandlerId, Reply};

use crate::error::AlertingError;
use crate::service::AlertingService;

impl AlertingService {
    pub async fn create_alert_rule(&self, data: &NewAlertRule) -> Result<AlertRule, AlertingError> {
        let result: Result<AlertRule, AlertingError> = async {
            data.check()?;
            Ok(self.rules.create(data).await?)
        }
        .await;

        match result {
            Ok(rule) => {
                tracing::info!(rule_id = rule.id, target_id = %rule.target_id, "Alert rule created");
                self.bus.emit(Event::AlertRuleCreated(rule.clone()));
                Ok(rule)
            }
            Err(e) => {
                tracing::error!(target_id = %data.target_id, error = %e, "Failed to create alert rule");
                self.bus
                    .emit(Event::AlertRuleCreateFailed(OperationFailed::new(None, &e)));
                Err(e)
            }
        }
    }

    pub async fn update_alert_rule(
        &self,
        id: DbId,
        changes: &AlertRuleUpdate,
    ) -> Result<AlertRule, AlertingError> {
        let result: Result<AlertRule, AlertingError> = async {
            changes.check()?;
            Ok(self.rules.update(id, changes).await?)
        }
        .await;
        self.publish_updated(id, result)
    }

    /// Enable or disable a rule; published as `ALERT_RULE_UPDATED`.
    pub async fn toggle_alert_rule(&self, id: DbId, enabled: bool) -> Result<AlertRule, AlertingError> {
        let result = self
            .rules
            .toggle_enabled(id, enabled)
            .await
            .map_err(AlertingError::from);
        self.publish_updated(id, result)
    }

    fn publish_updated(
        &self,
        id: DbId,
        result: Result<AlertRule, AlertingError>,
    ) -> Result<AlertRule, AlertingError> {
        match &result {
            Ok(rule) => {
                tracing::info!(rule_id = id, enabled = rule.enabled, "Alert rule updated");
                self.bus.emit(Event::AlertRuleUpdated(rule.clone()));
            }
            Err(e) => {
                tracing::error!(rule_id = id, error = %e, "Failed to update alert rule");
                self.bus.emit(Event::AlertRuleUpdateFailed(OperationFailed::new(
                    Some(id.to_string()),
                    e,
                )));
            }
        }
        result
    }

    /// Returns the deleted rule's id and target.
    pub async fn delete_alert_rule(&self, id: DbId) -> Result<AlertRuleDeleted, AlertingError> {
        let result: Result<AlertRuleDeleted, AlertingError> = async {
            let rule = self
                .rules
                .find_by_id(id)
                .await?
                .ok_or_else(|| RepoError::not_found("alert rule", id))?;
            self.rules.delete(id).await?;
            Ok(AlertRuleDeleted {
                id,
                target_id: rule.target_id,
            })
        }
        .await;

        match &result {
            Ok(deleted) => {
                tracing::info!(rule_id = id, target_id = %deleted.target_id, "Alert rule deleted");
                self.bus.emit(Event::AlertRuleDeleted(deleted.clone()));
            }
            Err(e) => {
                tracing::error!(rule_id = id, error = %e, "Failed to delete alert rule");
                self.bus.emit(Event::AlertRuleDeleteFailed(OperationFailed::new(
                    Some(id.to_string()),
                    e,
                )));
            }
        }
        result
    }

    pub async fn get_alert_rule(&self, id: DbId) -> Result<Option<AlertRule>, AlertingError> {
        Ok(self.rules.find_by_id(id).await?)
    }

    pub async fn get_alert_rules_by_target_id(
        &self,
        target_id: &str,
    ) -> Result<Vec<AlertRule>, AlertingError> {
        Ok(self.rules.find_by_target_id(target_id).await?)
    }

    // -----------------------------------------------------------------------
    // Bus requests
    // -----------------------------------------------------------------------

    pub(crate) fn register_rule_handlers(self: &Arc<Self>) -> Vec<(EventKind, HandlerId)> {
        let owner = Arc::downgrade(self);
        vec![
            (
                EventKind::AlertRuleCreateRequested,
                self.bus.on_spawn(
                    EventKind::AlertRuleCreateRequested,
                    owner.clone(),
                    Self::handle_create,
                ),
            ),
            (
                EventKind::AlertRuleUpdateRequested,
                self.bus.on_spawn(
                    EventKind::AlertRuleUpdateRequested,
                    owner.clone(),
                    Self::handle_update,
                ),
            ),
            (
                EventKind::AlertRuleDeleteRequested,
                self.bus
                    .on_spawn(EventKind::AlertRuleDeleteRequested, owner, Self::handle_delete),
            ),
        ]
    }

    async fn handle_create(self: Arc<Self>, event: Event) {
        let Event::AlertRuleCreateRequested(request) = event else {
            return;
        };
        let result = self.create_alert_rule(&request.body).await;
        self.bus.respond(
            &request.request_id,
            Reply::from_result(EventKind::AlertRuleCreated, EventKind::AlertRuleCreateFailed, result),
        );
    }

    async fn handle_update(self: Arc<Self>, event: Event) {
        let Event::AlertRuleUpdateRequested(request) = event else {
            return;
        };
        let result = self
            .update_alert_rule(request.body.id, &request.body.changes)
            .await;
        self.bus.respond(
            &request.request_id,
            Reply::from_result(EventKind::AlertRuleUpdated, EventKind::AlertRuleUpdateFailed, result),
        );
    }

    async fn handle_delete(self: Arc<Self>, event: Event) {
        let Event::AlertRuleDeleteRequested(request) = event else {
            return;
        };
        let result = self.delete_alert_rule(request.body.id).await;
        self.bus.respond(
            &request.request_id,
            Reply::from_result(EventKind::AlertRuleDeleted, EventKind::AlertRuleDeleteFailed, result),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use netwatch_core::models::{Condition, Metric};
    use netwatch_db::memory::{MemoryAlertRuleRepository, MemoryIncidentRepository};
    use netwatch_events::EventBus;

    fn service() -> (AlertingService, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let service = AlertingService::new(
            Arc::new(MemoryAlertRuleRepository::new()),
            Arc::new(MemoryIncidentRepository::new()),
            bus.clone(),
        );
        (service, bus)
    }

    fn download_rule(threshold: f64) -> NewAlertRule {
        NewAlertRule {
            name: "Slow download".to_string(),
            target_id: "t1".to_string(),
            metric: Metric::Download,
            condition: Condition::LessThan,
            threshold,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn create_publishes_rule() {
        let (service, bus) = service();
        let mut rx = bus.subscribe();

        let rule = service.create_alert_rule(&download_rule(10.0)).await.unwrap();

        assert_matches!(rx.try_recv().unwrap(), Event::AlertRuleCreated(r) if r == rule);
        assert_eq!(service.get_alert_rule(rule.id).await.unwrap(), Some(rule));
    }

    #[tokio::test]
    async fn negative_threshold_is_rejected() {
        let (service, bus) = service();
        let mut rx = bus.subscribe();

        let err = service.create_alert_rule(&download_rule(-1.0)).await.unwrap_err();

        assert_matches!(err, AlertingError::Invalid(_));
        assert_matches!(rx.try_recv().unwrap(), Event::AlertRuleCreateFailed(f) if f.id.is_none());
        assert!(service.get_alert_rules_by_target_id("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toggle_publishes_update() {
        let (service, bus) = service();
        let rule = service.create_alert_rule(&download_rule(10.0)).await.unwrap();
        let mut rx = bus.subscribe();

        let toggled = service.toggle_alert_rule(rule.id, false).await.unwrap();

        assert!(!toggled.enabled);
        assert_matches!(rx.try_recv().unwrap(), Event::AlertRuleUpdated(r) if !r.enabled);
    }

    #[tokio::test]
    async fn update_missing_rule_publishes_failure() {
        let (service, bus) = service();
        let mut rx = bus.subscribe();

        let changes = AlertRuleUpdate {
            threshold: Some(5.0),
            ..Default::default()
        };
        let err = service.update_alert_rule(99, &changes).await.unwrap_err();

        assert!(err.is_not_found());
        assert_matches!(
            rx.try_recv().unwrap(),
            Event::AlertRuleUpdateFailed(f) if f.id.as_deref() == Some("99")
        );
    }

    #[tokio::test]
    async fn delete_reports_target() {
        let (service, bus) = service();
        let rule = service.create_alert_rule(&download_rule(10.0)).await.unwrap();
        let mut rx = bus.subscribe();

        let deleted = service.delete_alert_rule(rule.id).await.unwrap();

        assert_eq!(deleted.target_id, "t1");
        assert_matches!(rx.try_recv().unwrap(), Event::AlertRuleDeleted(d) if d.id == rule.id);
        assert!(service.get_alert_rule(rule.id).await.unwrap().is_none());
        assert!(service.delete_alert_rule(rule.id).await.unwrap_err().is_not_found());
    }
}
