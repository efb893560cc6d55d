//! In-app notifications and browser push fan-out.
//!
//! [`NotificationService`] stores notifications and push subscriptions,
//! delivers push messages through a [`PushTransport`], and turns
//! `ALERT_TRIGGERED` / `INCIDENT_CREATED` events into notifications for
//! the configured system recipient.

pub mod config;
pub mod error;
pub mod push;
pub mod service;

pub use config::{NotificationConfig, PushTransportKind};
pub use error::NotificationError;
pub use push::{LogPushTransport, PushError, PushPayload, PushTransport, WebhookPushTransport};
pub use service::NotificationService;
