//! Periodic alert scheduler.
//!
//! [`AlertScheduler`] runs as a background task, waking every tick to
//! evaluate the active periodic rules whose interval has elapsed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use warehouse_db::Warehouse;

use super::AlertRegistry;

/// How often the scheduler checks for due rules.
const DEFAULT_TICK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// AlertScheduler
// ---------------------------------------------------------------------------

/// Background service that evaluates periodic alerts.
pub struct AlertScheduler {
    registry: Arc<AlertRegistry>,
    warehouse: Warehouse,
    tick: Duration,
}

impl AlertScheduler {
    pub fn new(registry: Arc<AlertRegistry>, warehouse: Warehouse) -> Self {
        Self {
            registry,
            warehouse,
            tick: DEFAULT_TICK,
        }
    }

    /// Override the polling tick. Rules are evaluated at most one tick late.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run the scheduler loop.
    ///
    /// The loop exits gracefully when the provided [`CancellationToken`] is
    /// cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(tick_ms = self.tick.as_millis() as u64, "Alert scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Alert scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let outcomes = self.registry.evaluate_due(&self.warehouse).await;
                    let fired = outcomes.iter().filter(|o| o.fired).count();
                    if !outcomes.is_empty() {
                        tracing::debug!(evaluated = outcomes.len(), fired, "Scheduled alerts evaluated");
                    }
                }
            }
        }
    }
}
