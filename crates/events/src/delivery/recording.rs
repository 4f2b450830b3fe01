//! In-memory notification sink.
//!
//! [`RecordingSink`] keeps every notification it receives and writes it to
//! the log. It backs the `log` channel in the demo and lets tests wait for
//! and inspect deliveries.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use warehouse_core::alert::Notification;

use super::{DeliveryError, NotificationSink};

pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
    count: watch::Sender<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            received: Mutex::new(Vec::new()),
            count,
        }
    }

    /// Snapshot of everything delivered so far, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        *self.count.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` notifications have arrived. Returns
    /// `false` if `timeout` elapses first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let mut rx = self.count.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|n| *n >= count))
            .await
            .is_ok_and(|r| r.is_ok())
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::info!(
            channel = %notification.channel,
            recipients = %notification.recipients.join(","),
            subject = %notification.subject,
            alert = notification.alert.as_deref().unwrap_or("-"),
            "Notification delivered"
        );
        let total = {
            let mut received = self.received.lock().unwrap_or_else(|e| e.into_inner());
            received.push(notification.clone());
            received.len()
        };
        self.count.send_replace(total);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(subject: &str) -> Notification {
        Notification {
            channel: "log".into(),
            recipients: vec!["ops".into()],
            subject: subject.into(),
            body: String::new(),
            alert: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_in_order() {
        let sink = RecordingSink::new();
        sink.notify(&notification("a")).await.unwrap();
        sink.notify(&notification("b")).await.unwrap();

        let subjects: Vec<_> = sink.notifications().into_iter().map(|n| n.subject).collect();
        assert_eq!(subjects, vec!["a", "b"]);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out_without_deliveries() {
        let sink = RecordingSink::new();
        assert!(!sink.wait_for(1, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn wait_for_returns_once_count_reached() {
        let sink = std::sync::Arc::new(RecordingSink::new());
        let writer = sink.clone();
        tokio::spawn(async move {
            writer.notify(&notification("late")).await.unwrap();
        });
        assert!(sink.wait_for(1, Duration::from_secs(5)).await);
    }
}
