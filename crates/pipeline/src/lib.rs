//! Demo orchestration: simulated workers, sequential and concurrent
//! pipelines, alert definitions and the convenience statements.

pub mod error;
pub mod orchestrator;
pub mod tasks;
pub mod worker;

pub use error::{DemoError, RunError};
pub use orchestrator::{AlertCheck, DemoOrchestrator, DemoReport, OrchestratorSettings};
pub use tasks::{await_all, submit, JoinPolicy, TaskHandle};
