//! Threshold alert rules attached to a target.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::DbId;

/// The probe measurement a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Latency in milliseconds.
    Ping,
    /// Throughput in Mbps.
    Download,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Download => "download",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ping" => Some(Self::Ping),
            "download" => Some(Self::Download),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied between the observed value and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    GreaterThan,
    LessThan,
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThan => "LESS_THAN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GREATER_THAN" => Some(Self::GreaterThan),
            "LESS_THAN" => Some(Self::LessThan),
            _ => None,
        }
    }

    /// Strict comparison; a value equal to the threshold never breaches.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: DbId,
    pub name: String,
    pub target_id: String,
    pub metric: Metric,
    pub condition: Condition,
    pub threshold: f64,
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAlertRule {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1))]
    pub target_id: String,
    pub metric: Metric,
    pub condition: Condition,
    pub threshold: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl NewAlertRule {
    /// Field validation plus the threshold check.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()?;
        check_threshold(self.threshold)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AlertRuleUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub metric: Option<Metric>,
    pub condition: Option<Condition>,
    pub threshold: Option<f64>,
    pub enabled: Option<bool>,
}

impl AlertRuleUpdate {
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()?;
        match self.threshold {
            Some(threshold) => check_threshold(threshold),
            None => Ok(()),
        }
    }

    pub fn apply(&self, rule: &mut AlertRule) {
        if let Some(name) = &self.name {
            rule.name = name.clone();
        }
        if let Some(metric) = self.metric {
            rule.metric = metric;
        }
        if let Some(condition) = self.condition {
            rule.condition = condition;
        }
        if let Some(threshold) = self.threshold {
            rule.threshold = threshold;
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
    }
}

/// Thresholds must be finite and non-negative.
pub fn check_threshold(threshold: f64) -> Result<(), CoreError> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(CoreError::Validation(format!(
            "threshold must be a finite non-negative number, got {threshold}"
        )));
    }
    Ok(())
}
