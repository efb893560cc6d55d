//! Domain models shared by the monitoring, alerting and notification crates.
//!
//! All models serialize with `camelCase` field names, which is the shape
//! carried on the event bus and stored by the persistence collaborators.

pub mod alert_rule;
pub mod incident;
pub mod notification;
pub mod preference;
pub mod probe;
pub mod push_subscription;
pub mod target;

pub use alert_rule::{AlertRule, AlertRuleUpdate, Condition, Metric, NewAlertRule};
pub use incident::{IncidentEvent, IncidentType, NewIncident};
pub use notification::{NewNotification, Notification};
pub use preference::UserSpeedTestPreference;
pub use probe::{NewProbeResult, ProbeOutcome, ProbeResult, ProbeStatus};
pub use push_subscription::{NewPushSubscription, PushSubscription};
pub use target::{NewTarget, Target, TargetUpdate};
