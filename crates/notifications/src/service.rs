//! Notification storage, push fan-out and alert routing.

use std::sync::Arc;

use netwatch_core::models::{NewNotification, NewPushSubscription, Notification, PushSubscription};
use netwatch_core::types::DbId;
use netwatch_db::repositories::{NotificationRepository, PushSubscriptionRepository};
use netwatch_events::event::{
    AlertTriggered, AllNotificationsRead, IncidentCreated, NotificationDeleted, OperationFailed,
    PushNotificationSent, PushSubscriptionDeleted,
};
use netwatch_events::{Event, EventBus, EventKind, HandlerId, Reply};
use validator::Validate;

use crate::config::DEFAULT_SYSTEM_RECIPIENT;
use crate::error::NotificationError;
use crate::push::{PushPayload, PushTransport};

pub const ALERT_TITLE: &str = "Connection Alert";
pub const INCIDENT_TITLE: &str = "System Alert";
const TEST_TITLE: &str = "Test Notification";
const TEST_MESSAGE: &str = "This is a test notification from Network Monitor";

/// Body of the notification sent for an `ALERT_TRIGGERED` event.
pub fn alert_message(alert: &AlertTriggered) -> String {
    format!(
        "Alert: {} {} is {} (threshold {}, rule \"{}\")",
        alert.target_id, alert.metric, alert.value, alert.threshold, alert.rule_name
    )
}

/// Body of the notification sent for an `INCIDENT_CREATED` event.
pub fn incident_message(incident: &IncidentCreated) -> String {
    format!("Incident: {}", incident.description)
}

/// Stored text of a notification with an optional title.
fn notification_text(message: &str, title: Option<&str>) -> String {
    match title {
        Some(title) => format!("{title}: {message}"),
        None => message.to_string(),
    }
}

pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    subscriptions: Arc<dyn PushSubscriptionRepository>,
    transport: Arc<dyn PushTransport>,
    bus: Arc<EventBus>,
    system_recipient: String,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        subscriptions: Arc<dyn PushSubscriptionRepository>,
        transport: Arc<dyn PushTransport>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            notifications,
            subscriptions,
            transport,
            bus,
            system_recipient: DEFAULT_SYSTEM_RECIPIENT.to_string(),
        }
    }

    /// Address alert and incident notifications to `user_id`.
    pub fn with_system_recipient(mut self, user_id: impl Into<String>) -> Self {
        self.system_recipient = user_id.into();
        self
    }

    pub fn system_recipient(&self) -> &str {
        &self.system_recipient
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    /// Push `message` to every subscription of `user_id`, then store one
    /// notification for it.
    ///
    /// A user without subscriptions gets nothing and `Ok(None)`. Failed
    /// deliveries are logged; the remaining subscriptions are still tried.
    pub async fn send_push_notification(
        &self,
        user_id: &str,
        message: &str,
        title: Option<&str>,
    ) -> Result<Option<Notification>, NotificationError> {
        let subscriptions = self.subscriptions.find_by_user_id(user_id).await?;
        if subscriptions.is_empty() {
            tracing::warn!(user_id, "No push subscriptions found for user");
            return Ok(None);
        }

        let payload = PushPayload::new(message, title);
        let mut delivered = 0;
        for subscription in &subscriptions {
            match self.transport.send(subscription, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(
                    user_id,
                    endpoint = %subscription.endpoint,
                    error = %e,
                    "Failed to deliver push notification",
                ),
            }
        }
        tracing::info!(
            user_id,
            delivered,
            subscriptions = subscriptions.len(),
            "Push notification sent",
        );

        let notification = self
            .create_notification(user_id, &notification_text(message, title))
            .await?;

        self.bus.emit(Event::PushNotificationSent(PushNotificationSent {
            user_id: user_id.to_string(),
            message: message.to_string(),
            title: title.map(str::to_string),
            subscription_count: subscriptions.len(),
        }));
        Ok(Some(notification))
    }

    /// Push the same message to several users. Returns how many had at
    /// least one subscription; per-user failures are logged.
    pub async fn send_bulk_push_notification(&self, user_ids: &[String], message: &str) -> usize {
        let mut notified = 0;
        for user_id in user_ids {
            match self.send_push_notification(user_id, message, None).await {
                Ok(Some(_)) => notified += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "Bulk push failed for user");
                }
            }
        }
        notified
    }

    pub async fn send_test_notification(
        &self,
        user_id: &str,
    ) -> Result<Option<Notification>, NotificationError> {
        self.send_push_notification(user_id, TEST_MESSAGE, Some(TEST_TITLE))
            .await
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    pub async fn create_notification(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<Notification, NotificationError> {
        let notification = self
            .notifications
            .create(&NewNotification {
                user_id: user_id.to_string(),
                message: message.to_string(),
            })
            .await?;
        tracing::debug!(user_id, notification_id = notification.id, "Notification created");
        self.bus
            .emit(Event::NotificationCreated(notification.clone()));
        Ok(notification)
    }

    /// Newest first.
    pub async fn get_notifications(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.notifications.find_by_user_id(user_id).await?)
    }

    pub async fn mark_notification_as_read(&self, id: DbId) -> Result<Notification, NotificationError> {
        let notification = self.notifications.mark_as_read(id).await?;
        self.bus.emit(Event::NotificationRead(notification.clone()));
        Ok(notification)
    }

    /// Returns how many notifications changed to read.
    pub async fn mark_all_notifications_as_read(&self, user_id: &str) -> Result<u64, NotificationError> {
        let count = self
            .notifications
            .mark_all_as_read_by_user_id(user_id)
            .await?;
        self.bus
            .emit(Event::AllNotificationsRead(AllNotificationsRead {
                user_id: user_id.to_string(),
                count,
            }));
        Ok(count)
    }

    pub async fn delete_notification(&self, id: DbId) -> Result<(), NotificationError> {
        self.notifications.delete(id).await?;
        self.bus
            .emit(Event::NotificationDeleted(NotificationDeleted { id }));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub async fn create_push_subscription(
        &self,
        data: &NewPushSubscription,
    ) -> Result<PushSubscription, NotificationError> {
        let result: Result<PushSubscription, NotificationError> = async {
            data.validate()?;
            Ok(self.subscriptions.create(data).await?)
        }
        .await;

        match result {
            Ok(subscription) => {
                tracing::info!(user_id = %subscription.user_id, "Push subscription created");
                self.bus
                    .emit(Event::PushSubscriptionCreated(subscription.clone()));
                Ok(subscription)
            }
            Err(e) => {
                tracing::error!(user_id = %data.user_id, error = %e, "Failed to create push subscription");
                self.bus
                    .emit(Event::PushSubscriptionCreateFailed(OperationFailed::new(
                        Some(data.user_id.clone()),
                        &e,
                    )));
                Err(e)
            }
        }
    }

    pub async fn get_push_subscriptions(
        &self,
        user_id: &str,
    ) -> Result<Vec<PushSubscription>, NotificationError> {
        Ok(self.subscriptions.find_by_user_id(user_id).await?)
    }

    pub async fn delete_push_subscription(&self, id: &str) -> Result<(), NotificationError> {
        self.subscriptions.delete(id).await?;
        self.publish_deleted(PushSubscriptionDeleted {
            id: Some(id.to_string()),
            endpoint: None,
            user_id: None,
            count: 1,
        });
        Ok(())
    }

    /// Returns the number of subscriptions removed.
    pub async fn delete_push_subscription_by_endpoint(
        &self,
        endpoint: &str,
    ) -> Result<u64, NotificationError> {
        let count = self.subscriptions.delete_by_endpoint(endpoint).await?;
        self.publish_deleted(PushSubscriptionDeleted {
            id: None,
            endpoint: Some(endpoint.to_string()),
            user_id: None,
            count,
        });
        Ok(count)
    }

    /// Returns the number of subscriptions removed.
    pub async fn delete_push_subscriptions_for_user(
        &self,
        user_id: &str,
    ) -> Result<u64, NotificationError> {
        let count = self.subscriptions.delete_by_user_id(user_id).await?;
        self.publish_deleted(PushSubscriptionDeleted {
            id: None,
            endpoint: None,
            user_id: Some(user_id.to_string()),
            count,
        });
        Ok(count)
    }

    fn publish_deleted(&self, deleted: PushSubscriptionDeleted) {
        tracing::info!(count = deleted.count, "Push subscriptions deleted");
        self.bus.emit(Event::PushSubscriptionDeleted(deleted));
    }

    // -----------------------------------------------------------------------
    // Bus
    // -----------------------------------------------------------------------

    /// Route alerts and incidents to the system recipient and answer the
    /// notification requests.
    pub fn register_handlers(self: &Arc<Self>) -> Vec<(EventKind, HandlerId)> {
        let owner = Arc::downgrade(self);
        let bus = &self.bus;
        vec![
            (
                EventKind::AlertTriggered,
                bus.on_spawn(EventKind::AlertTriggered, owner.clone(), Self::handle_alert),
            ),
            (
                EventKind::IncidentCreated,
                bus.on_spawn(EventKind::IncidentCreated, owner.clone(), Self::handle_incident),
            ),
            (
                EventKind::NotificationSendRequested,
                bus.on_spawn(
                    EventKind::NotificationSendRequested,
                    owner.clone(),
                    Self::handle_send_request,
                ),
            ),
            (
                EventKind::PushSubscriptionCreateRequested,
                bus.on_spawn(
                    EventKind::PushSubscriptionCreateRequested,
                    owner,
                    Self::handle_subscription_request,
                ),
            ),
        ]
    }

    async fn handle_alert(self: Arc<Self>, event: Event) {
        let Event::AlertTriggered(alert) = event else {
            return;
        };
        self.route(&alert_message(&alert), ALERT_TITLE).await;
    }

    async fn handle_incident(self: Arc<Self>, event: Event) {
        let Event::IncidentCreated(incident) = event else {
            return;
        };
        self.route(&incident_message(&incident), INCIDENT_TITLE).await;
    }

    async fn route(&self, message: &str, title: &str) {
        if let Err(e) = self
            .send_push_notification(&self.system_recipient, message, Some(title))
            .await
        {
            tracing::error!(
                user_id = %self.system_recipient,
                error = %e,
                "Failed to route system notification",
            );
        }
    }

    async fn handle_send_request(self: Arc<Self>, event: Event) {
        let Event::NotificationSendRequested(request) = event else {
            return;
        };
        let send = &request.body;
        let result = self
            .create_notification(
                &send.user_id,
                &notification_text(&send.message, send.title.as_deref()),
            )
            .await;

        if let Err(e) = &result {
            tracing::error!(user_id = %send.user_id, error = %e, "Failed to send notification");
            self.bus
                .emit(Event::NotificationSendFailed(OperationFailed::new(
                    Some(send.user_id.clone()),
                    e,
                )));
        }
        self.bus.respond(
            &request.request_id,
            Reply::from_result(
                EventKind::NotificationSent,
                EventKind::NotificationSendFailed,
                result,
            ),
        );
    }

    async fn handle_subscription_request(self: Arc<Self>, event: Event) {
        let Event::PushSubscriptionCreateRequested(request) = event else {
            return;
        };
        let result = self.create_push_subscription(&request.body).await;
        self.bus.respond(
            &request.request_id,
            Reply::from_result(
                EventKind::PushSubscriptionCreated,
                EventKind::PushSubscriptionCreateFailed,
                result,
            ),
        );
    }
}
