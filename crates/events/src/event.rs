//! The fixed event catalogue.
//!
//! [`EventKind`] names every event the services exchange; [`Event`] carries
//! the typed payload for each kind. On the wire (dynamic handlers, logs) an
//! event is its [`EventKind::as_str`] name plus the camelCase JSON of its
//! payload.

use std::fmt;

use chrono::{DateTime, Utc};
use netwatch_core::models::{
    AlertRule, AlertRuleUpdate, Condition, IncidentType, Metric, NewAlertRule,
    NewPushSubscription, NewTarget, Notification, ProbeResult, PushSubscription, Target,
    TargetUpdate,
};
use netwatch_core::types::DbId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

macro_rules! event_kinds {
    ($($variant:ident => $name:literal,)+) => {
        /// Every event name known at compile time.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $($variant,)+
        }

        impl EventKind {
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant,)+];

            /// Wire name, e.g. `"TARGET_CREATED"`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name,)+
                }
            }

            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(EventKind::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

event_kinds! {
    TargetCreated => "TARGET_CREATED",
    TargetUpdated => "TARGET_UPDATED",
    TargetDeleted => "TARGET_DELETED",
    TargetCreateFailed => "TARGET_CREATE_FAILED",
    TargetUpdateFailed => "TARGET_UPDATE_FAILED",
    TargetDeleteFailed => "TARGET_DELETE_FAILED",
    TargetCreateRequested => "TARGET_CREATE_REQUESTED",
    TargetUpdateRequested => "TARGET_UPDATE_REQUESTED",
    TargetDeleteRequested => "TARGET_DELETE_REQUESTED",

    MonitoringStarted => "MONITORING_STARTED",
    MonitoringStopped => "MONITORING_STOPPED",
    MonitoringStartFailed => "MONITORING_START_FAILED",
    MonitoringStopFailed => "MONITORING_STOP_FAILED",
    MonitoringStartRequested => "MONITORING_START_REQUESTED",
    MonitoringStopRequested => "MONITORING_STOP_REQUESTED",

    SpeedTestCompleted => "SPEED_TEST_COMPLETED",
    SpeedTestFailed => "SPEED_TEST_FAILED",
    SpeedTestRequested => "SPEED_TEST_REQUESTED",

    AlertRuleCreated => "ALERT_RULE_CREATED",
    AlertRuleUpdated => "ALERT_RULE_UPDATED",
    AlertRuleDeleted => "ALERT_RULE_DELETED",
    AlertRuleCreateFailed => "ALERT_RULE_CREATE_FAILED",
    AlertRuleUpdateFailed => "ALERT_RULE_UPDATE_FAILED",
    AlertRuleDeleteFailed => "ALERT_RULE_DELETE_FAILED",
    AlertRuleCreateRequested => "ALERT_RULE_CREATE_REQUESTED",
    AlertRuleUpdateRequested => "ALERT_RULE_UPDATE_REQUESTED",
    AlertRuleDeleteRequested => "ALERT_RULE_DELETE_REQUESTED",
    AlertTriggered => "ALERT_TRIGGERED",

    IncidentCreated => "INCIDENT_CREATED",
    IncidentResolved => "INCIDENT_RESOLVED",

    NotificationCreated => "NOTIFICATION_CREATED",
    NotificationRead => "NOTIFICATION_READ",
    NotificationDeleted => "NOTIFICATION_DELETED",
    AllNotificationsRead => "ALL_NOTIFICATIONS_READ",
    NotificationSent => "NOTIFICATION_SENT",
    NotificationSendFailed => "NOTIFICATION_SEND_FAILED",
    NotificationSendRequested => "NOTIFICATION_SEND_REQUESTED",

    PushSubscriptionCreated => "PUSH_SUBSCRIPTION_CREATED",
    PushSubscriptionDeleted => "PUSH_SUBSCRIPTION_DELETED",
    PushSubscriptionCreateFailed => "PUSH_SUBSCRIPTION_CREATE_FAILED",
    PushSubscriptionCreateRequested => "PUSH_SUBSCRIPTION_CREATE_REQUESTED",
    PushNotificationSent => "PUSH_NOTIFICATION_SENT",
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDeleted {
    pub id: String,
}

/// Failure of a service operation. `id` names the subject when one exists
/// (target id, rule id, user id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: String,
}

impl OperationFailed {
    pub fn new(id: Option<String>, error: impl fmt::Display) -> Self {
        Self {
            id,
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringChanged {
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTestCompleted {
    pub target_id: String,
    pub result: ProbeResult,
    /// Probe wall-clock time in milliseconds.
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRuleDeleted {
    pub id: DbId,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTriggered {
    pub target_id: String,
    pub rule_id: DbId,
    pub rule_name: String,
    pub metric: Metric,
    pub value: f64,
    pub threshold: f64,
    pub condition: Condition,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentCreated {
    pub id: DbId,
    pub target_id: String,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub description: String,
    pub rule_id: Option<DbId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentResolved {
    pub id: DbId,
    pub target_id: String,
    pub resolved_at: DateTime<Utc>,
    /// Milliseconds between the incident timestamp and `resolved_at`.
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDeleted {
    pub id: DbId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllNotificationsRead {
    pub user_id: String,
    pub count: u64,
}

/// Which subscriptions a delete removed. Exactly one selector is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscriptionDeleted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotificationSent {
    pub user_id: String,
    pub message: String,
    pub title: Option<String>,
    pub subscription_count: usize,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// A `*_REQUESTED` payload: the request id next to the operation input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub request_id: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Request<T> {
    pub fn new(request_id: impl Into<String>, body: T) -> Self {
        Self {
            request_id: request_id.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPatch {
    pub id: String,
    #[serde(flatten)]
    pub changes: TargetUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStart {
    pub target_id: String,
    /// Falls back to the service's default interval when absent.
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStop {
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTestRequest {
    pub target_id: String,
    #[serde(default)]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRulePatch {
    pub id: DbId,
    #[serde(flatten)]
    pub changes: AlertRuleUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRuleRef {
    pub id: DbId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSend {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A bus event with its typed payload.
///
/// `NOTIFICATION_SENT` has no variant: it only appears as a correlation reply
/// name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    TargetCreated(Target),
    TargetUpdated(Target),
    TargetDeleted(TargetDeleted),
    TargetCreateFailed(OperationFailed),
    TargetUpdateFailed(OperationFailed),
    TargetDeleteFailed(OperationFailed),
    TargetCreateRequested(Request<NewTarget>),
    TargetUpdateRequested(Request<TargetPatch>),
    TargetDeleteRequested(Request<TargetRef>),

    MonitoringStarted(MonitoringChanged),
    MonitoringStopped(MonitoringChanged),
    MonitoringStartFailed(OperationFailed),
    MonitoringStopFailed(OperationFailed),
    MonitoringStartRequested(Request<MonitoringStart>),
    MonitoringStopRequested(Request<MonitoringStop>),

    SpeedTestCompleted(SpeedTestCompleted),
    SpeedTestFailed(OperationFailed),
    SpeedTestRequested(Request<SpeedTestRequest>),

    AlertRuleCreated(AlertRule),
    AlertRuleUpdated(AlertRule),
    AlertRuleDeleted(AlertRuleDeleted),
    AlertRuleCreateFailed(OperationFailed),
    AlertRuleUpdateFailed(OperationFailed),
    AlertRuleDeleteFailed(OperationFailed),
    AlertRuleCreateRequested(Request<NewAlertRule>),
    AlertRuleUpdateRequested(Request<AlertRulePatch>),
    AlertRuleDeleteRequested(Request<AlertRuleRef>),
    AlertTriggered(AlertTriggered),

    IncidentCreated(IncidentCreated),
    IncidentResolved(IncidentResolved),

    NotificationCreated(Notification),
    NotificationRead(Notification),
    NotificationDeleted(NotificationDeleted),
    AllNotificationsRead(AllNotificationsRead),
    NotificationSendFailed(OperationFailed),
    NotificationSendRequested(Request<NotificationSend>),

    PushSubscriptionCreated(PushSubscription),
    PushSubscriptionDeleted(PushSubscriptionDeleted),
    PushSubscriptionCreateFailed(OperationFailed),
    PushSubscriptionCreateRequested(Request<NewPushSubscription>),
    PushNotificationSent(PushNotificationSent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TargetCreated(_) => EventKind::TargetCreated,
            Self::TargetUpdated(_) => EventKind::TargetUpdated,
            Self::TargetDeleted(_) => EventKind::TargetDeleted,
            Self::TargetCreateFailed(_) => EventKind::TargetCreateFailed,
            Self::TargetUpdateFailed(_) => EventKind::TargetUpdateFailed,
            Self::TargetDeleteFailed(_) => EventKind::TargetDeleteFailed,
            Self::TargetCreateRequested(_) => EventKind::TargetCreateRequested,
            Self::TargetUpdateRequested(_) => EventKind::TargetUpdateRequested,
            Self::TargetDeleteRequested(_) => EventKind::TargetDeleteRequested,
            Self::MonitoringStarted(_) => EventKind::MonitoringStarted,
            Self::MonitoringStopped(_) => EventKind::MonitoringStopped,
            Self::MonitoringStartFailed(_) => EventKind::MonitoringStartFailed,
            Self::MonitoringStopFailed(_) => EventKind::MonitoringStopFailed,
            Self::MonitoringStartRequested(_) => EventKind::MonitoringStartRequested,
            Self::MonitoringStopRequested(_) => EventKind::MonitoringStopRequested,
            Self::SpeedTestCompleted(_) => EventKind::SpeedTestCompleted,
            Self::SpeedTestFailed(_) => EventKind::SpeedTestFailed,
            Self::SpeedTestRequested(_) => EventKind::SpeedTestRequested,
            Self::AlertRuleCreated(_) => EventKind::AlertRuleCreated,
            Self::AlertRuleUpdated(_) => EventKind::AlertRuleUpdated,
            Self::AlertRuleDeleted(_) => EventKind::AlertRuleDeleted,
            Self::AlertRuleCreateFailed(_) => EventKind::AlertRuleCreateFailed,
            Self::AlertRuleUpdateFailed(_) => EventKind::AlertRuleUpdateFailed,
            Self::AlertRuleDeleteFailed(_) => EventKind::AlertRuleDeleteFailed,
            Self::AlertRuleCreateRequested(_) => EventKind::AlertRuleCreateRequested,
            Self::AlertRuleUpdateRequested(_) => EventKind::AlertRuleUpdateRequested,
            Self::AlertRuleDeleteRequested(_) => EventKind::AlertRuleDeleteRequested,
            Self::AlertTriggered(_) => EventKind::AlertTriggered,
            Self::IncidentCreated(_) => EventKind::IncidentCreated,
            Self::IncidentResolved(_) => EventKind::IncidentResolved,
            Self::NotificationCreated(_) => EventKind::NotificationCreated,
            Self::NotificationRead(_) => EventKind::NotificationRead,
            Self::NotificationDeleted(_) => EventKind::NotificationDeleted,
            Self::AllNotificationsRead(_) => EventKind::AllNotificationsRead,
            Self::NotificationSendFailed(_) => EventKind::NotificationSendFailed,
            Self::NotificationSendRequested(_) => EventKind::NotificationSendRequested,
            Self::PushSubscriptionCreated(_) => EventKind::PushSubscriptionCreated,
            Self::PushSubscriptionDeleted(_) => EventKind::PushSubscriptionDeleted,
            Self::PushSubscriptionCreateFailed(_) => EventKind::PushSubscriptionCreateFailed,
            Self::PushSubscriptionCreateRequested(_) => {
                EventKind::PushSubscriptionCreateRequested
            }
            Self::PushNotificationSent(_) => EventKind::PushNotificationSent,
        }
    }

    /// The correlation id of a `*_REQUESTED` event.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::TargetCreateRequested(r) => Some(&r.request_id),
            Self::TargetUpdateRequested(r) => Some(&r.request_id),
            Self::TargetDeleteRequested(r) => Some(&r.request_id),
            Self::MonitoringStartRequested(r) => Some(&r.request_id),
            Self::MonitoringStopRequested(r) => Some(&r.request_id),
            Self::SpeedTestRequested(r) => Some(&r.request_id),
            Self::AlertRuleCreateRequested(r) => Some(&r.request_id),
            Self::AlertRuleUpdateRequested(r) => Some(&r.request_id),
            Self::AlertRuleDeleteRequested(r) => Some(&r.request_id),
            Self::NotificationSendRequested(r) => Some(&r.request_id),
            Self::PushSubscriptionCreateRequested(r) => Some(&r.request_id),
            _ => None,
        }
    }

    /// The payload alone, as delivered to string-keyed handlers.
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> Target {
        Target {
            id: "t1".to_string(),
            name: "Home".to_string(),
            address: "https://example.com".to_string(),
            owner_id: "u1".to_string(),
        }
    }

    #[test]
    fn kind_names_are_unique_and_parse_back() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(*kind));
        }
        let mut names: Vec<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventKind::ALL.len());
    }

    #[test]
    fn serde_tag_matches_kind_name() {
        let events = [
            Event::TargetCreated(target()),
            Event::AllNotificationsRead(AllNotificationsRead {
                user_id: "u1".to_string(),
                count: 2,
            }),
            Event::PushSubscriptionCreateRequested(Request::new(
                "r1",
                NewPushSubscription {
                    user_id: "u1".to_string(),
                    endpoint: "https://push.example/1".to_string(),
                    p256dh: "k".to_string(),
                    auth: "a".to_string(),
                },
            )),
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.kind().as_str());
        }
    }

    #[test]
    fn request_payload_is_flat() {
        let event = Event::TargetCreateRequested(Request::new(
            "r1",
            NewTarget {
                name: "A".to_string(),
                address: "https://a.com".to_string(),
                owner_id: "u1".to_string(),
            },
        ));
        assert_eq!(event.request_id(), Some("r1"));
        assert_eq!(
            event.payload_json().unwrap(),
            json!({"requestId": "r1", "name": "A", "address": "https://a.com", "ownerId": "u1"})
        );
    }

    #[test]
    fn request_round_trips_from_wire_json() {
        let event: Event = serde_json::from_value(json!({
            "type": "TARGET_UPDATE_REQUESTED",
            "payload": {"requestId": "r2", "id": "t1", "name": "Office"}
        }))
        .unwrap();
        match event {
            Event::TargetUpdateRequested(request) => {
                assert_eq!(request.request_id, "r2");
                assert_eq!(request.body.id, "t1");
                assert_eq!(request.body.changes.name.as_deref(), Some("Office"));
                assert!(request.body.changes.address.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn non_request_events_have_no_request_id() {
        assert!(Event::TargetCreated(target()).request_id().is_none());
    }

    #[test]
    fn incident_created_uses_type_field() {
        let payload = Event::IncidentCreated(IncidentCreated {
            id: 7,
            target_id: "t1".to_string(),
            incident_type: IncidentType::Alert,
            description: "d".to_string(),
            rule_id: Some(3),
            created_at: Utc::now(),
        })
        .payload_json()
        .unwrap();
        assert_eq!(payload["type"], "ALERT");
        assert_eq!(payload["ruleId"], 3);
    }
}
