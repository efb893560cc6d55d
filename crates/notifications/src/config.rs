use std::sync::Arc;

use netwatch_core::config::{env_string, ConfigError};

use crate::push::{LogPushTransport, PushError, PushTransport, WebhookPushTransport};

/// Recipient of notifications raised by alerts and incidents.
pub const DEFAULT_SYSTEM_RECIPIENT: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTransportKind {
    /// Log each push; nothing leaves the process.
    Log,
    /// POST each push to the subscription endpoint.
    Webhook,
}

impl std::str::FromStr for PushTransportKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "webhook" => Ok(Self::Webhook),
            _ => Err(()),
        }
    }
}

/// Notification dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    /// User id that alert and incident notifications are addressed to.
    pub system_recipient: String,
    pub transport: PushTransportKind,
}

impl NotificationConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default     |
    /// |---------------------------------|-------------|
    /// | `SYSTEM_NOTIFICATION_RECIPIENT` | `anonymous` |
    /// | `PUSH_TRANSPORT`                | `log`       |
    pub fn from_env() -> Result<Self, ConfigError> {
        let transport = match env_string("PUSH_TRANSPORT") {
            None => PushTransportKind::Log,
            Some(value) => value.parse().map_err(|()| ConfigError::Invalid {
                name: "PUSH_TRANSPORT",
                expected: "`log` or `webhook`",
                value,
            })?,
        };

        Ok(Self {
            system_recipient: env_string("SYSTEM_NOTIFICATION_RECIPIENT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_RECIPIENT.into()),
            transport,
        })
    }

    pub fn build_transport(&self) -> Result<Arc<dyn PushTransport>, PushError> {
        Ok(match self.transport {
            PushTransportKind::Log => Arc::new(LogPushTransport),
            PushTransportKind::Webhook => Arc::new(WebhookPushTransport::new()?),
        })
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            system_recipient: DEFAULT_SYSTEM_RECIPIENT.into(),
            transport: PushTransportKind::Log,
        }
    }
}
