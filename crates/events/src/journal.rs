//! Event journal service.
//!
//! [`EventJournal`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and writes every received [`PlatformEvent`] to the log.
//! It runs as a long-lived background task and shuts down when the bus
//! sender is dropped.

use tokio::sync::broadcast;

use crate::bus::PlatformEvent;

/// Background service that records platform events.
pub struct EventJournal;

impl EventJournal {
    /// Run the journal loop. Returns the number of events recorded once the
    /// channel is closed.
    pub async fn run(mut receiver: broadcast::Receiver<PlatformEvent>) -> u64 {
        let mut recorded = 0;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    Self::record(&event);
                    recorded += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event journal lagged, some events were not recorded");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!(recorded, "Event bus closed, journal shutting down");
                    break;
                }
            }
        }
        recorded
    }

    fn record(event: &PlatformEvent) {
        tracing::info!(
            event_type = %event.event_type,
            table = event.table.as_deref().unwrap_or("-"),
            alert = event.alert.as_deref().unwrap_or("-"),
            payload = %event.payload,
            "Event"
        );
    }
}
