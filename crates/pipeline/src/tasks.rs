//! Async task submission and the await-all barrier.
//!
//! [`submit`] spawns a named task on the Tokio runtime; [`await_all`] blocks
//! until every handle resolves, applying a [`JoinPolicy`] to failures and an
//! optional bound on the whole wait. Whenever the barrier returns an error,
//! tasks still running are aborted.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tracing::Instrument;
use warehouse_core::error::CoreError;

use crate::error::DemoError;

/// What the barrier does when one task fails while others are in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Return the first failure and abort the rest.
    #[default]
    FailFast,
    /// Let every task finish and report all failures together.
    CollectAll,
}

impl FromStr for JoinPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "fail_fast" => Ok(JoinPolicy::FailFast),
            "collect-all" | "collect_all" => Ok(JoinPolicy::CollectAll),
            other => Err(CoreError::Config(format!(
                "unknown join policy '{other}' (expected fail-fast or collect-all)"
            ))),
        }
    }
}

/// A submitted task.
pub struct TaskHandle<T> {
    name: String,
    handle: JoinHandle<Result<T, DemoError>>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Spawn `task` without waiting for it.
pub fn submit<T, F>(name: impl Into<String>, task: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, DemoError>> + Send + 'static,
{
    let name = name.into();
    tracing::debug!(task = %name, "Task submitted");
    let span = tracing::info_span!("task", name = %name);
    TaskHandle {
        handle: tokio::spawn(task.instrument(span)),
        name,
    }
}

/// Wait for every handle. Results come back in submission order.
///
/// Completion order is not constrained; the barrier only returns once every
/// task has resolved, the policy short-circuits, or `timeout` elapses.
pub async fn await_all<T>(
    handles: Vec<TaskHandle<T>>,
    policy: JoinPolicy,
    timeout: Option<Duration>,
) -> Result<Vec<T>, DemoError> {
    let total = handles.len();
    let abort_handles: Vec<_> = handles.iter().map(|h| h.handle.abort_handle()).collect();

    let mut pending: FuturesUnordered<_> = handles
        .into_iter()
        .enumerate()
        .map(|(index, h)| async move { (index, h.name, h.handle.await) })
        .collect();
    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut failures: Vec<DemoError> = Vec::new();
    let mut completed = 0usize;

    let barrier = async {
        while let Some((index, name, joined)) = pending.next().await {
            completed += 1;
            let outcome = match joined {
                Ok(result) => result,
                Err(join_err) => Err(DemoError::TaskFailed {
                    task: name.clone(),
                    reason: join_err.to_string(),
                }),
            };
            match outcome {
                Ok(value) => {
                    tracing::debug!(task = %name, "Task completed");
                    results[index] = Some(value);
                }
                Err(e) => {
                    tracing::warn!(task = %name, error = %e, "Task failed");
                    match policy {
                        JoinPolicy::FailFast => return Err(e),
                        JoinPolicy::CollectAll => failures.push(e),
                    }
                }
            }
        }
        Ok(())
    };

    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, barrier).await.ok(),
        None => Some(barrier.await),
    };

    let result = match joined {
        None => Err(DemoError::Timeout {
            after: timeout.unwrap_or_default(),
            pending: total - completed,
        }),
        Some(Err(e)) => Err(e),
        Some(Ok(())) if !failures.is_empty() => Err(DemoError::Tasks(failures)),
        Some(Ok(())) => Ok(results.into_iter().flatten().collect()),
    };

    if result.is_err() {
        for handle in &abort_handles {
            handle.abort();
        }
    }
    result
}
