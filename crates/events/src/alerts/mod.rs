//! Alert engine.
//!
//! [`AlertRegistry`] owns the registered rules with their state and
//! watermark. Rules are evaluated three ways:
//!
//! - manually, via [`AlertRegistry::evaluate_now`], regardless of state;
//! - after each committed write to the watched table, for active
//!   event-triggered rules (the registry is a [`WriteHook`]);
//! - on their polling interval, for active periodic rules, driven by
//!   [`AlertScheduler`].
//!
//! [`WriteHook`]: warehouse_db::WriteHook

use serde::Serialize;
use warehouse_core::error::CoreError;
use warehouse_core::types::Timestamp;
use warehouse_db::EngineError;

mod registry;
mod scheduler;

pub use registry::AlertRegistry;
pub use scheduler::AlertScheduler;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationTrigger {
    Manual,
    Schedule,
    Write,
}

/// Result of one evaluation of one rule.
#[derive(Debug, Clone, Serialize)]
pub struct AlertOutcome {
    pub alert: String,
    pub trigger: EvaluationTrigger,
    pub fired: bool,
    pub matched_rows: usize,
    pub evaluated_at: Timestamp,
}
