//! Warehouse event bus, notification delivery and alert engine.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the event envelope (`pipeline.completed`,
//!   `alert.fired`, ...).
//! - [`EventJournal`]: background subscriber that logs every event.
//! - [`delivery`]: notification sinks (email, webhook, in-memory).
//! - [`NotificationRouter`]: maps channel names to provisioned sinks.
//! - [`alerts`]: alert registry, write-triggered evaluation and the
//!   periodic [`AlertScheduler`].

pub mod alerts;
pub mod bus;
pub mod delivery;
pub mod journal;
pub mod router;

pub use alerts::{AlertError, AlertOutcome, AlertRegistry, AlertScheduler, EvaluationTrigger};
pub use bus::{EventBus, PlatformEvent};
pub use delivery::email::{EmailConfig, EmailDelivery};
pub use delivery::recording::RecordingSink;
pub use delivery::webhook::WebhookDelivery;
pub use delivery::{DeliveryError, NotificationSink};
pub use journal::EventJournal;
pub use router::NotificationRouter;
