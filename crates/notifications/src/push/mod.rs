//! Push delivery to browser subscriptions.

use async_trait::async_trait;
use netwatch_core::models::PushSubscription;
use serde::Serialize;

mod log;
mod webhook;

pub use log::LogPushTransport;
pub use webhook::WebhookPushTransport;

/// Title used when the sender gives none.
pub const DEFAULT_TITLE: &str = "Network Monitor";

/// What a subscriber's browser displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
}

impl PushPayload {
    pub fn new(message: &str, title: Option<&str>) -> Self {
        Self {
            title: title.unwrap_or(DEFAULT_TITLE).to_string(),
            body: message.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The push endpoint returned a non-2xx status code.
    #[error("Push endpoint returned HTTP {0}")]
    HttpStatus(u16),
}

/// Sends one payload to one subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<(), PushError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_defaults_title() {
        let payload = PushPayload::new("Ping is high", None);
        assert_eq!(payload.title, "Network Monitor");
        assert_eq!(payload.body, "Ping is high");
    }

    #[test]
    fn push_error_display_http_status() {
        assert_eq!(
            PushError::HttpStatus(410).to_string(),
            "Push endpoint returned HTTP 410"
        );
    }
}
