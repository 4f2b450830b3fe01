//! Channel-name to sink routing.
//!
//! [`NotificationRouter`] holds the sinks provisioned for this run. Alert
//! registration checks the channel up front so a missing integration is
//! reported as a configuration error, not at fire time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use warehouse_core::alert::Notification;
use warehouse_core::error::CoreError;

use crate::delivery::{DeliveryError, NotificationSink};

#[derive(Default)]
pub struct NotificationRouter {
    channels: RwLock<HashMap<String, Arc<dyn NotificationSink>>>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the sink for `channel`.
    pub fn provision(&self, channel: impl Into<String>, sink: Arc<dyn NotificationSink>) {
        let channel = channel.into();
        tracing::info!(channel = %channel, "Notification channel provisioned");
        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(channel, sink);
    }

    pub fn is_provisioned(&self, channel: &str) -> bool {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(channel)
    }

    pub fn ensure_provisioned(&self, channel: &str) -> Result<(), CoreError> {
        if self.is_provisioned(channel) {
            Ok(())
        } else {
            Err(CoreError::Config(format!(
                "notification channel '{channel}' is not provisioned"
            )))
        }
    }

    /// Deliver through the notification's channel.
    pub async fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let sink = self
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&notification.channel)
            .cloned()
            .ok_or_else(|| DeliveryError::Unprovisioned(notification.channel.clone()))?;
        sink.notify(notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::recording::RecordingSink;
    use assert_matches::assert_matches;
    use warehouse_core::channels::{CHANNEL_EMAIL, CHANNEL_LOG};

    fn notification(channel: &str) -> Notification {
        Notification {
            channel: channel.into(),
            recipients: vec!["ops@example.com".into()],
            subject: "Low Inventory Alert".into(),
            body: String::new(),
            alert: Some("low_inventory_alert".into()),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn routes_to_provisioned_sink() {
        let router = NotificationRouter::new();
        let sink = Arc::new(RecordingSink::new());
        router.provision(CHANNEL_LOG, sink.clone());

        router.notify(&notification(CHANNEL_LOG)).await.unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn unprovisioned_channel_fails() {
        let router = NotificationRouter::new();
        assert_matches!(
            router.notify(&notification(CHANNEL_EMAIL)).await,
            Err(DeliveryError::Unprovisioned(c)) if c == CHANNEL_EMAIL
        );
        assert_matches!(
            router.ensure_provisioned(CHANNEL_EMAIL),
            Err(CoreError::Config(_))
        );
    }
}
