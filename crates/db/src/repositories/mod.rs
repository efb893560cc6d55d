//! Repository traits consumed by the monitoring, alerting and notification
//! services.
//!
//! Every trait is object safe so services can hold `Arc<dyn ...>` and tests
//! can swap in failing or recording implementations.

use async_trait::async_trait;
use netwatch_core::models::{
    AlertRule, AlertRuleUpdate, IncidentEvent, NewAlertRule, NewIncident, NewNotification,
    NewProbeResult, NewPushSubscription, NewTarget, Notification, ProbeResult, PushSubscription,
    Target, TargetUpdate, UserSpeedTestPreference,
};
use netwatch_core::types::DbId;

use crate::error::RepoError;

#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Target>, RepoError>;

    async fn find_by_owner_id(&self, owner_id: &str) -> Result<Vec<Target>, RepoError>;

    async fn list_all(&self) -> Result<Vec<Target>, RepoError>;

    async fn create(&self, data: &NewTarget) -> Result<Target, RepoError>;

    /// Fails with [`RepoError::NotFound`] if the target does not exist.
    async fn update(&self, id: &str, data: &TargetUpdate) -> Result<Target, RepoError>;

    /// Fails with [`RepoError::NotFound`] if the target does not exist.
    async fn delete(&self, id: &str) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ProbeResultRepository: Send + Sync {
    async fn create(&self, data: &NewProbeResult) -> Result<ProbeResult, RepoError>;

    /// Results for a target, newest first, optionally capped at `limit`.
    async fn find_by_target_id(
        &self,
        target_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ProbeResult>, RepoError>;
}

#[async_trait]
pub trait AlertRuleRepository: Send + Sync {
    async fn find_by_id(&self, id: DbId) -> Result<Option<AlertRule>, RepoError>;

    /// All rules for a target, enabled or not.
    async fn find_by_target_id(&self, target_id: &str) -> Result<Vec<AlertRule>, RepoError>;

    async fn create(&self, data: &NewAlertRule) -> Result<AlertRule, RepoError>;

    async fn update(&self, id: DbId, data: &AlertRuleUpdate) -> Result<AlertRule, RepoError>;

    async fn delete(&self, id: DbId) -> Result<(), RepoError>;

    async fn toggle_enabled(&self, id: DbId, enabled: bool) -> Result<AlertRule, RepoError>;
}

#[async_trait]
pub trait IncidentRepository: Send + Sync {
    async fn create(&self, data: &NewIncident) -> Result<IncidentEvent, RepoError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<IncidentEvent>, RepoError>;

    /// Incidents for a target, newest first.
    async fn find_by_target_id(&self, target_id: &str) -> Result<Vec<IncidentEvent>, RepoError>;

    async fn find_unresolved(&self) -> Result<Vec<IncidentEvent>, RepoError>;

    /// Mark an incident resolved and return the updated row.
    async fn resolve(&self, id: DbId) -> Result<IncidentEvent, RepoError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, data: &NewNotification) -> Result<Notification, RepoError>;

    /// Notifications for a user, newest first.
    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Notification>, RepoError>;

    async fn mark_as_read(&self, id: DbId) -> Result<Notification, RepoError>;

    /// Returns the number of notifications that changed from unread to read.
    async fn mark_all_as_read_by_user_id(&self, user_id: &str) -> Result<u64, RepoError>;

    async fn delete(&self, id: DbId) -> Result<(), RepoError>;
}

#[async_trait]
pub trait PushSubscriptionRepository: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<PushSubscription>, RepoError>;

    async fn create(&self, data: &NewPushSubscription) -> Result<PushSubscription, RepoError>;

    async fn delete(&self, id: &str) -> Result<(), RepoError>;

    /// Returns the number of subscriptions removed.
    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<u64, RepoError>;

    /// Returns the number of subscriptions removed.
    async fn delete_by_user_id(&self, user_id: &str) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait SpeedTestPreferenceRepository: Send + Sync {
    async fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSpeedTestPreference>, RepoError>;

    async fn upsert(&self, preference: &UserSpeedTestPreference) -> Result<(), RepoError>;
}
