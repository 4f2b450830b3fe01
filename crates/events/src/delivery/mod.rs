//! Delivery sinks for alert notifications.
//!
//! Each sink implements [`NotificationSink`]; the
//! [`NotificationRouter`](crate::router::NotificationRouter) maps channel
//! names to sinks.

use async_trait::async_trait;
use warehouse_core::alert::Notification;

pub mod email;
pub mod recording;
pub mod webhook;

/// Error type for any notification delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Email(#[from] email::EmailError),

    #[error(transparent)]
    Webhook(#[from] webhook::WebhookError),

    /// No sink is provisioned for the notification's channel.
    #[error("Notification channel '{0}' is not provisioned")]
    Unprovisioned(String),
}

/// Something that can deliver a rendered [`Notification`].
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), DeliveryError>;
}
