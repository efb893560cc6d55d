//! Alert rule evaluation engine.
//!
//! Pure logic, no persistence. The caller loads the rules for a target and
//! passes them in together with the probe result to check.

use crate::models::{AlertRule, Metric, ProbeResult};

/// An enabled rule whose condition held against an observed value.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleBreach {
    pub rule: AlertRule,
    pub value: f64,
}

impl RuleBreach {
    /// Incident description, e.g.
    /// `"Alert triggered: ping GREATER_THAN 100 (actual: 150)"`.
    pub fn description(&self) -> String {
        format!(
            "Alert triggered: {} {} {} (actual: {})",
            self.rule.metric, self.rule.condition, self.rule.threshold, self.value
        )
    }
}

/// The measurement a metric refers to, if the probe produced one.
pub fn metric_value(result: &ProbeResult, metric: Metric) -> Option<f64> {
    match metric {
        Metric::Ping => result.ping,
        Metric::Download => result.download,
    }
}

/// Evaluate `rules` against a probe result and return every breach.
///
/// Disabled rules are ignored. A rule whose metric is absent from the result
/// (failed probes carry no measurements) is skipped without a breach.
pub fn evaluate(rules: &[AlertRule], result: &ProbeResult) -> Vec<RuleBreach> {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter_map(|rule| {
            let value = metric_value(result, rule.metric)?;
            rule.condition
                .holds(value, rule.threshold)
                .then(|| RuleBreach {
                    rule: rule.clone(),
                    value,
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
