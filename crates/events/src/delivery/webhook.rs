//! The `webhook` channel: alert notifications POSTed as JSON to one URL.
//!
//! A failed POST (transport error or non-2xx status) is retried after
//! doubling delays, 1 s, 2 s and then 4 s by default.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use warehouse_core::alert::Notification;

use super::{DeliveryError, NotificationSink};

/// Per-request timeout, separate from the retry backoff.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a webhook POST did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Connection, TLS, timeout or body serialization failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// How many extra attempts to make, and the first backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first; `0` disables retrying.
    pub retries: u32,
    /// Wait before the first retry; each later wait doubles.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before each retry, doubling from `base_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.retries).map(|n| self.base_delay * 2u32.saturating_pow(n))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// JSON body sent to the endpoint.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    /// Always `warehouse.alert`, so receivers can route on it.
    kind: &'static str,
    alert: Option<&'a str>,
    subject: &'a str,
    body: &'a str,
    recipients: &'a [String],
    created_at: String,
}

impl<'a> From<&'a Notification> for WebhookPayload<'a> {
    fn from(n: &'a Notification) -> Self {
        Self {
            kind: "warehouse.alert",
            alert: n.alert.as_deref(),
            subject: &n.subject,
            body: &n.body,
            recipients: &n.recipients,
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

/// Sink for the `webhook` channel.
pub struct WebhookDelivery {
    client: reqwest::Client,
    /// Endpoint every notification is POSTed to.
    url: String,
    retry: RetryPolicy,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>) -> Result<Self, WebhookError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            url: url.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `notification`, retrying per the [`RetryPolicy`]. Returns the
    /// last error once every attempt has failed.
    pub async fn deliver(&self, notification: &Notification) -> Result<(), WebhookError> {
        let payload = WebhookPayload::from(notification);
        let mut delays = self.retry.delays();
        let mut attempt = 1u32;

        loop {
            let err = match self.post(&payload).await {
                Ok(()) => {
                    tracing::info!(url = %self.url, attempt, subject = %notification.subject, "Webhook delivered");
                    return Ok(());
                }
                Err(e) => e,
            };

            let Some(delay) = delays.next() else {
                tracing::error!(url = %self.url, attempt, error = %err, "Webhook delivery gave up");
                return Err(err);
            };
            tracing::warn!(
                url = %self.url,
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "Webhook delivery failed"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<(), WebhookError> {
        let status = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await?
            .status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::HttpStatus(status.as_u16()))
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookDelivery {
    async fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.deliver(notification).await.map_err(DeliveryError::from)
    }
}
