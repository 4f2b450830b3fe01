//! Demo-wide event fan-out.
//!
//! Every interesting step of a run (tables set up, a pipeline finished, an
//! alert fired) is published once on the [`EventBus`] as a [`PlatformEvent`].
//! Subscribers each get their own copy through a `tokio::sync::broadcast`
//! channel; share the bus as `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

pub const SETUP_COMPLETED: &str = "setup.completed";
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
pub const ALERT_FIRED: &str = "alert.fired";

/// Buffered events per subscriber before the slowest one starts lagging.
const DEFAULT_CAPACITY: usize = 1024;

/// One published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dotted name such as [`ALERT_FIRED`].
    pub event_type: String,
    pub table: Option<String>,
    pub alert: Option<String>,
    /// Event-specific details; an empty object when unset.
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            table: None,
            alert: None,
            payload: Value::Object(Map::new()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_table(self, table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..self
        }
    }

    pub fn with_alert(self, alert: impl Into<String>) -> Self {
        Self {
            alert: Some(alert.into()),
            ..self
        }
    }

    pub fn with_payload(self, payload: Value) -> Self {
        Self { payload, ..self }
    }
}

/// Broadcast hub for [`PlatformEvent`]s.
///
/// ```rust
/// use warehouse_events::bus::{EventBus, PlatformEvent, PIPELINE_COMPLETED};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
/// assert_eq!(bus.publish(PlatformEvent::new(PIPELINE_COMPLETED)), 1);
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// A lagging subscriber loses the oldest events beyond `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    /// Fan `event` out to the current subscribers and return how many
    /// received it. Events published with nobody listening are dropped.
    pub fn publish(&self, event: PlatformEvent) -> usize {
        let event_type = event.event_type.clone();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!(event_type = %event_type, "Event dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let bus = EventBus::default();
        let mut journal = bus.subscribe();
        let mut tests = bus.subscribe();

        let delivered = bus.publish(
            PlatformEvent::new(ALERT_FIRED)
                .with_table("sales_processed")
                .with_alert("high_sales_alert")
                .with_payload(json!({"matched_rows": 1})),
        );
        assert_eq!(delivered, 2);

        for rx in [&mut journal, &mut tests] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.event_type, ALERT_FIRED);
            assert_eq!(event.table.as_deref(), Some("sales_processed"));
            assert_eq!(event.alert.as_deref(), Some("high_sales_alert"));
            assert_eq!(event.payload["matched_rows"], 1);
        }
    }

    #[test]
    fn events_without_subscribers_are_dropped() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(PlatformEvent::new(SETUP_COMPLETED)), 0);
    }

    #[test]
    fn bare_event_has_empty_payload() {
        let event = PlatformEvent::new(PIPELINE_COMPLETED);
        assert!(event.table.is_none() && event.alert.is_none());
        assert_eq!(event.payload, json!({}));
    }

    #[tokio::test]
    async fn slow_subscriber_lags_past_capacity() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..3 {
            bus.publish(PlatformEvent::new(SETUP_COMPLETED));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }
}
