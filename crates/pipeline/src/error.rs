//! Orchestration error taxonomy.

use std::time::Duration;

use warehouse_core::error::CoreError;
use warehouse_core::pipeline_run::PipelineMode;
use warehouse_db::EngineError;
use warehouse_events::AlertError;

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    /// The engine rejected a statement.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The await-all barrier exceeded its bound.
    #[error("Timed out after {after:?} with {pending} task(s) still running")]
    Timeout { after: Duration, pending: usize },

    /// A required external integration is missing or misconfigured.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(CoreError),

    /// A task panicked or was cancelled.
    #[error("Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    /// Every failure collected under [`JoinPolicy::CollectAll`].
    ///
    /// [`JoinPolicy::CollectAll`]: crate::tasks::JoinPolicy::CollectAll
    #[error("{} task(s) failed: {}", .0.len(), join_messages(.0))]
    Tasks(Vec<DemoError>),
}

fn join_messages(errors: &[DemoError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<CoreError> for DemoError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(msg) => DemoError::Config(msg),
            other => DemoError::Core(other),
        }
    }
}

impl From<AlertError> for DemoError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::Core(e) => e.into(),
            AlertError::Engine(e) => DemoError::Engine(e),
        }
    }
}

/// Failure of a whole demo run, tagged with the phase it happened in.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Nothing was timed.
    #[error("Setup failed: {0}")]
    Setup(#[source] DemoError),

    /// A pipeline aborted; `partial_elapsed` is the time spent before the
    /// failure surfaced.
    #[error("{mode} pipeline failed after {partial_elapsed:?}: {source}")]
    Pipeline {
        mode: PipelineMode,
        partial_elapsed: Duration,
        #[source]
        source: DemoError,
    },

    /// A later demo step (alerts, statements) failed.
    #[error("Step '{step}' failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: DemoError,
    },
}
