//! Process-local repository implementations.
//!
//! Each repository keeps its rows behind a `tokio::sync::RwLock` and hands
//! out clones. Numeric ids come from a per-repository sequence starting at 1;
//! string ids are UUIDs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use netwatch_core::models::{
    AlertRule, AlertRuleUpdate, IncidentEvent, NewAlertRule, NewIncident, NewNotification,
    NewProbeResult, NewPushSubscription, NewTarget, Notification, ProbeResult, PushSubscription,
    Target, TargetUpdate, UserSpeedTestPreference,
};
use netwatch_core::types::{new_string_id, DbId};
use tokio::sync::RwLock;

use crate::error::RepoError;
use crate::repositories::{
    AlertRuleRepository, IncidentRepository, NotificationRepository, ProbeResultRepository,
    PushSubscriptionRepository, SpeedTestPreferenceRepository, TargetRepository,
};

/// Monotonic id source for numeric primary keys.
#[derive(Debug)]
struct Sequence(AtomicI64);

impl Default for Sequence {
    fn default() -> Self {
        Self(AtomicI64::new(1))
    }
}

impl Sequence {
    fn next(&self) -> DbId {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryTargetRepository {
    // Insertion order is kept so listings are stable.
    rows: RwLock<Vec<Target>>,
}

impl MemoryTargetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a target with a caller-chosen id (fixtures).
    pub async fn insert(&self, target: Target) {
        self.rows.write().await.push(target);
    }
}

#[async_trait]
impl TargetRepository for MemoryTargetRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Target>, RepoError> {
        Ok(self.rows.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn find_by_owner_id(&self, owner_id: &str) -> Result<Vec<Target>, RepoError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Target>, RepoError> {
        Ok(self.rows.read().await.clone())
    }

    async fn create(&self, data: &NewTarget) -> Result<Target, RepoError> {
        let target = Target {
            id: new_string_id(),
            name: data.name.clone(),
            address: data.address.clone(),
            owner_id: data.owner_id.clone(),
        };
        self.rows.write().await.push(target.clone());
        Ok(target)
    }

    async fn update(&self, id: &str, data: &TargetUpdate) -> Result<Target, RepoError> {
        let mut rows = self.rows.write().await;
        let target = rows
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RepoError::not_found("target", id))?;
        data.apply(target);
        Ok(target.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|t| t.id != id);
        if rows.len() == before {
            return Err(RepoError::not_found("target", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Probe results
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryProbeResultRepository {
    rows: RwLock<Vec<ProbeResult>>,
}

impl MemoryProbeResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl ProbeResultRepository for MemoryProbeResultRepository {
    async fn create(&self, data: &NewProbeResult) -> Result<ProbeResult, RepoError> {
        let result = ProbeResult::from_new(new_string_id(), data, Utc::now());
        self.rows.write().await.push(result.clone());
        Ok(result)
    }

    async fn find_by_target_id(
        &self,
        target_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ProbeResult>, RepoError> {
        let rows = self.rows.read().await;
        let matching = rows.iter().rev().filter(|r| r.target_id == target_id);
        let results = match limit {
            Some(limit) => matching.take(usize::try_from(limit).unwrap_or(0)).cloned().collect(),
            None => matching.cloned().collect(),
        };
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Alert rules
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryAlertRuleRepository {
    rows: RwLock<BTreeMap<DbId, AlertRule>>,
    seq: Sequence,
}

impl MemoryAlertRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRuleRepository for MemoryAlertRuleRepository {
    async fn find_by_id(&self, id: DbId) -> Result<Option<AlertRule>, RepoError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_target_id(&self, target_id: &str) -> Result<Vec<AlertRule>, RepoError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn create(&self, data: &NewAlertRule) -> Result<AlertRule, RepoError> {
        let rule = AlertRule {
            id: self.seq.next(),
            name: data.name.clone(),
            target_id: data.target_id.clone(),
            metric: data.metric,
            condition: data.condition,
            threshold: data.threshold,
            enabled: data.enabled,
        };
        self.rows.write().await.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update(&self, id: DbId, data: &AlertRuleUpdate) -> Result<AlertRule, RepoError> {
        let mut rows = self.rows.write().await;
        let rule = rows
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("alert rule", id))?;
        data.apply(rule);
        Ok(rule.clone())
    }

    async fn delete(&self, id: DbId) -> Result<(), RepoError> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepoError::not_found("alert rule", id))
    }

    async fn toggle_enabled(&self, id: DbId, enabled: bool) -> Result<AlertRule, RepoError> {
        let mut rows = self.rows.write().await;
        let rule = rows
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("alert rule", id))?;
        rule.enabled = enabled;
        Ok(rule.clone())
    }
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryIncidentRepository {
    rows: RwLock<BTreeMap<DbId, IncidentEvent>>,
    seq: Sequence,
}

impl MemoryIncidentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl IncidentRepository for MemoryIncidentRepository {
    async fn create(&self, data: &NewIncident) -> Result<IncidentEvent, RepoError> {
        let incident = IncidentEvent {
            id: self.seq.next(),
            target_id: data.target_id.clone(),
            rule_id: data.rule_id,
            incident_type: data.incident_type,
            description: data.description.clone(),
            resolved: false,
            timestamp: Utc::now(),
        };
        self.rows.write().await.insert(incident.id, incident.clone());
        Ok(incident)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<IncidentEvent>, RepoError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_target_id(&self, target_id: &str) -> Result<Vec<IncidentEvent>, RepoError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .rev()
            .filter(|i| i.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn find_unresolved(&self) -> Result<Vec<IncidentEvent>, RepoError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .rev()
            .filter(|i| !i.resolved)
            .cloned()
            .collect())
    }

    async fn resolve(&self, id: DbId) -> Result<IncidentEvent, RepoError> {
        let mut rows = self.rows.write().await;
        let incident = rows
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("incident", id))?;
        incident.resolved = true;
        Ok(incident.clone())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryNotificationRepository {
    rows: RwLock<BTreeMap<DbId, Notification>>,
    seq: Sequence,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn create(&self, data: &NewNotification) -> Result<Notification, RepoError> {
        let notification = Notification {
            id: self.seq.next(),
            user_id: data.user_id.clone(),
            message: data.message.clone(),
            read: false,
            sent_at: Utc::now(),
        };
        self.rows
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Notification>, RepoError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_as_read(&self, id: DbId) -> Result<Notification, RepoError> {
        let mut rows = self.rows.write().await;
        let notification = rows
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("notification", id))?;
        notification.read = true;
        Ok(notification.clone())
    }

    async fn mark_all_as_read_by_user_id(&self, user_id: &str) -> Result<u64, RepoError> {
        let mut count = 0;
        for notification in self.rows.write().await.values_mut() {
            if notification.user_id == user_id && !notification.read {
                notification.read = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete(&self, id: DbId) -> Result<(), RepoError> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepoError::not_found("notification", id))
    }
}

// ---------------------------------------------------------------------------
// Push subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPushSubscriptionRepository {
    rows: RwLock<Vec<PushSubscription>>,
}

impl MemoryPushSubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushSubscriptionRepository for MemoryPushSubscriptionRepository {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<PushSubscription>, RepoError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(&self, data: &NewPushSubscription) -> Result<PushSubscription, RepoError> {
        let subscription = PushSubscription {
            id: new_string_id(),
            user_id: data.user_id.clone(),
            endpoint: data.endpoint.clone(),
            p256dh: data.p256dh.clone(),
            auth: data.auth.clone(),
        };
        let mut rows = self.rows.write().await;
        // Endpoints are unique; re-subscribing replaces the old keys.
        rows.retain(|s| s.endpoint != data.endpoint);
        rows.push(subscription.clone());
        Ok(subscription)
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|s| s.id != id);
        if rows.len() == before {
            return Err(RepoError::not_found("push subscription", id));
        }
        Ok(())
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<u64, RepoError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|s| s.endpoint != endpoint);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_by_user_id(&self, user_id: &str) -> Result<u64, RepoError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|s| s.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Speed test preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySpeedTestPreferenceRepository {
    rows: RwLock<HashMap<String, UserSpeedTestPreference>>,
}

impl MemorySpeedTestPreferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeedTestPreferenceRepository for MemorySpeedTestPreferenceRepository {
    async fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSpeedTestPreference>, RepoError> {
        Ok(self.rows.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, preference: &UserSpeedTestPreference) -> Result<(), RepoError> {
        self.rows
            .write()
            .await
            .insert(preference.user_id.clone(), preference.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use netwatch_core::models::{Condition, IncidentType, Metric, ProbeOutcome};

    fn new_target(owner: &str) -> NewTarget {
        NewTarget {
            name: "Home".to_string(),
            address: "https://example.com".to_string(),
            owner_id: owner.to_string(),
        }
    }

    #[tokio::test]
    async fn target_crud_round_trip() {
        let repo = MemoryTargetRepository::new();
        let created = repo.create(&new_target("u1")).await.unwrap();
        repo.create(&new_target("u2")).await.unwrap();

        assert_eq!(repo.find_by_id(&created.id).await.unwrap(), Some(created.clone()));
        assert_eq!(repo.find_by_owner_id("u1").await.unwrap().len(), 1);
        assert_eq!(repo.list_all().await.unwrap().len(), 2);

        let updated = repo
            .update(
                &created.id,
                &TargetUpdate {
                    name: Some("Office".to_string()),
                    address: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Office");

        repo.delete(&created.id).await.unwrap();
        assert!(repo.find_by_id(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_missing_target_is_not_found() {
        let repo = MemoryTargetRepository::new();
        assert_matches!(repo.delete("missing").await, Err(RepoError::NotFound { .. }));
    }

    #[tokio::test]
    async fn probe_results_are_newest_first_and_limited() {
        let repo = MemoryProbeResultRepository::new();
        for ping in [10.0, 20.0, 30.0] {
            repo.create(&NewProbeResult {
                target_id: "t1".to_string(),
                outcome: ProbeOutcome::Success {
                    ping_ms: ping,
                    download_mbps: 1.0,
                },
            })
            .await
            .unwrap();
        }

        let latest = repo.find_by_target_id("t1", Some(2)).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].ping, Some(30.0));
        assert_eq!(latest[1].ping, Some(20.0));
        assert!(repo.find_by_target_id("t2", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn alert_rule_ids_are_sequential_and_toggle_works() {
        let repo = MemoryAlertRuleRepository::new();
        let data = NewAlertRule {
            name: "High ping".to_string(),
            target_id: "t1".to_string(),
            metric: Metric::Ping,
            condition: Condition::GreaterThan,
            threshold: 100.0,
            enabled: true,
        };
        let first = repo.create(&data).await.unwrap();
        let second = repo.create(&data).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let toggled = repo.toggle_enabled(first.id, false).await.unwrap();
        assert!(!toggled.enabled);
        assert_matches!(repo.toggle_enabled(99, true).await, Err(RepoError::NotFound { .. }));
    }

    #[tokio::test]
    async fn resolved_incidents_leave_unresolved_listing() {
        let repo = MemoryIncidentRepository::new();
        let incident = repo
            .create(&NewIncident {
                target_id: "t1".to_string(),
                incident_type: IncidentType::Alert,
                description: "Alert triggered".to_string(),
                rule_id: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(repo.find_unresolved().await.unwrap().len(), 1);

        let resolved = repo.resolve(incident.id).await.unwrap();
        assert!(resolved.resolved);
        assert!(repo.find_unresolved().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_all_as_read_counts_only_unread() {
        let repo = MemoryNotificationRepository::new();
        let first = repo
            .create(&NewNotification {
                user_id: "u1".to_string(),
                message: "one".to_string(),
            })
            .await
            .unwrap();
        repo.create(&NewNotification {
            user_id: "u1".to_string(),
            message: "two".to_string(),
        })
        .await
        .unwrap();
        repo.mark_as_read(first.id).await.unwrap();

        assert_eq!(repo.mark_all_as_read_by_user_id("u1").await.unwrap(), 1);
        assert_eq!(repo.mark_all_as_read_by_user_id("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn push_subscriptions_delete_by_endpoint_and_user() {
        let repo = MemoryPushSubscriptionRepository::new();
        for (user, endpoint) in [
            ("u1", "https://push.example/a"),
            ("u1", "https://push.example/b"),
            ("u2", "https://push.example/c"),
        ] {
            repo.create(&NewPushSubscription {
                user_id: user.to_string(),
                endpoint: endpoint.to_string(),
                p256dh: "key".to_string(),
                auth: "auth".to_string(),
            })
            .await
            .unwrap();
        }

        assert_eq!(repo.delete_by_endpoint("https://push.example/a").await.unwrap(), 1);
        assert_eq!(repo.find_by_user_id("u1").await.unwrap().len(), 1);
        assert_eq!(repo.delete_by_user_id("u1").await.unwrap(), 1);
        assert_eq!(repo.find_by_user_id("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn preference_upsert_replaces() {
        let repo = MemorySpeedTestPreferenceRepository::new();
        for url_id in ["cachefly-10mb", "cachefly-100mb"] {
            repo.upsert(&UserSpeedTestPreference {
                user_id: "u1".to_string(),
                speed_test_url_id: url_id.to_string(),
            })
            .await
            .unwrap();
        }
        let pref = repo.find_by_user_id("u1").await.unwrap().unwrap();
        assert_eq!(pref.speed_test_url_id, "cachefly-100mb");
    }
}
