//! Incidents: persisted records of a rule breach or an outage.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    /// Raised by an alert rule; `rule_id` is set.
    Alert,
    /// Raw outage with no rule attached.
    Outage,
}

impl IncidentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "ALERT",
            Self::Outage => "OUTAGE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ALERT" => Some(Self::Alert),
            "OUTAGE" => Some(Self::Outage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentEvent {
    pub id: DbId,
    pub target_id: String,
    pub rule_id: Option<DbId>,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub description: String,
    pub resolved: bool,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    pub target_id: String,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub description: String,
    pub rule_id: Option<DbId>,
}

impl NewIncident {
    /// An outage incident with no rule attached.
    pub fn outage(target_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            incident_type: IncidentType::Outage,
            description: description.into(),
            rule_id: None,
        }
    }
}
