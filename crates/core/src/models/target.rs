//! Monitored network targets.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A network endpoint being monitored. The address is probed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub name: String,
    pub address: String,
    pub owner_id: String,
}

/// Input for creating a target.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewTarget {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(url)]
    pub address: String,
    #[validate(length(min = 1))]
    pub owner_id: String,
}

/// Partial update of a target. Only name and address are mutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TargetUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(url)]
    pub address: Option<String>,
}

impl TargetUpdate {
    /// Apply the present fields onto an existing target.
    pub fn apply(&self, target: &mut Target) {
        if let Some(name) = &self.name {
            target.name = name.clone();
        }
        if let Some(address) = &self.address {
            target.address = address.clone();
        }
    }
}
