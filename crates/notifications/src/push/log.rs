use async_trait::async_trait;
use netwatch_core::models::PushSubscription;

use super::{PushError, PushPayload, PushTransport};

/// Logs each push instead of delivering it. Used when no push service is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPushTransport;

#[async_trait]
impl PushTransport for LogPushTransport {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<(), PushError> {
        tracing::info!(
            user_id = %subscription.user_id,
            endpoint = %subscription.endpoint,
            title = %payload.title,
            body = %payload.body,
            "Push notification (log transport)",
        );
        Ok(())
    }
}
