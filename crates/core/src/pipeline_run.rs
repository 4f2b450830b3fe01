//! Timing record of one orchestration pass.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Each worker awaited before the next starts.
    Sequential,
    /// All workers launched, then joined behind one barrier.
    Concurrent,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMode::Sequential => f.write_str("sequential"),
            PipelineMode::Concurrent => f.write_str("concurrent"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub mode: PipelineMode,
    pub workers: usize,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Measured on the monotonic clock, not derived from the wall-clock stamps.
    pub elapsed: Duration,
}

impl PipelineRun {
    pub fn new(
        mode: PipelineMode,
        workers: usize,
        start_time: Timestamp,
        end_time: Timestamp,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            mode,
            workers,
            start_time,
            end_time,
            elapsed,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} pipeline: {} workers finished in {:.1}s",
            self.mode,
            self.workers,
            self.elapsed.as_secs_f64()
        )
    }
}
