//! Probe results: one measurement cycle against a target.
//!
//! A result is either fully successful (ping and download measured, no
//! error) or a full failure (nothing measured, error text present). The
//! runner produces a [`ProbeOutcome`], which cannot express a mixed state,
//! and the row shape is derived from it.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    Success,
    Failure,
}

impl ProbeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// What a probe run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeOutcome {
    #[serde(rename_all = "camelCase")]
    Success { ping_ms: f64, download_mbps: f64 },
    Failure { error: String },
}

impl ProbeOutcome {
    pub fn status(&self) -> ProbeStatus {
        match self {
            Self::Success { .. } => ProbeStatus::Success,
            Self::Failure { .. } => ProbeStatus::Failure,
        }
    }

    pub fn ping(&self) -> Option<f64> {
        match self {
            Self::Success { ping_ms, .. } => Some(*ping_ms),
            Self::Failure { .. } => None,
        }
    }

    pub fn download(&self) -> Option<f64> {
        match self {
            Self::Success { download_mbps, .. } => Some(*download_mbps),
            Self::Failure { .. } => None,
        }
    }

    /// Upload is not measured; successful probes record `0`.
    pub fn upload(&self) -> Option<f64> {
        match self {
            Self::Success { .. } => Some(0.0),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }
}

/// Input for persisting a probe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProbeResult {
    pub target_id: String,
    pub outcome: ProbeOutcome,
}

/// A persisted probe result. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub id: String,
    pub target_id: String,
    pub ping: Option<f64>,
    pub download: Option<f64>,
    pub upload: Option<f64>,
    pub status: ProbeStatus,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

impl ProbeResult {
    /// Build the row shape for a persisted outcome.
    pub fn from_new(id: String, new: &NewProbeResult, created_at: Timestamp) -> Self {
        Self {
            id,
            target_id: new.target_id.clone(),
            ping: new.outcome.ping(),
            download: new.outcome.download(),
            upload: new.outcome.upload(),
            status: new.outcome.status(),
            error: new.outcome.error().map(str::to_string),
            created_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProbeStatus::Success
    }
}
