//! Push delivery as a JSON POST with exponential-backoff retry.
//!
//! Each subscription endpoint receives the payload together with the
//! subscription keys. Failed attempts are retried after 1 s, 2 s and 4 s,
//! then once more before giving up.

use std::time::Duration;

use async_trait::async_trait;
use netwatch_core::models::PushSubscription;
use serde_json::json;

use super::{PushError, PushPayload, PushTransport};

/// Backoff before each retry.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookPushTransport {
    client: reqwest::Client,
    retry_delays: Vec<Duration>,
}

impl WebhookPushTransport {
    pub fn new() -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            retry_delays: RETRY_DELAYS.to_vec(),
        })
    }

    /// Replace the backoff schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    async fn try_send(&self, url: &str, body: &serde_json::Value) -> Result<(), PushError> {
        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(PushError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl PushTransport for WebhookPushTransport {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<(), PushError> {
        let url = subscription.endpoint.as_str();
        let body = json!({
            "endpoint": subscription.endpoint,
            "keys": {
                "p256dh": subscription.p256dh,
                "auth": subscription.auth,
            },
            "notification": payload,
        });

        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(url, &body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        error = %e,
                        "Push delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.try_send(url, &body).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(url, error = %e, "Push delivery failed after all retries");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
