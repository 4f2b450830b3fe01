//! The engine seam and write notifications.

use async_trait::async_trait;
use warehouse_core::schema::{Row, TableSchema};

use crate::error::EngineError;
use crate::warehouse::Warehouse;

/// Row counts produced by a merge on a key column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub updated: u64,
    pub inserted: u64,
}

/// A SQL-capable engine.
///
/// Implementations may assume rows were already checked and normalized
/// against the table schema by [`Warehouse`]; they only enforce table
/// existence and their own storage rules.
#[async_trait]
pub trait Store: Send + Sync {
    /// Drop any table of the same name and create it empty.
    async fn create_or_replace_table(&self, schema: &TableSchema) -> Result<(), EngineError>;

    /// `None` when the table does not exist.
    async fn table_schema(&self, table: &str) -> Result<Option<TableSchema>, EngineError>;

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64, EngineError>;

    /// All rows of `table`; order is engine-defined.
    async fn select_rows(&self, table: &str) -> Result<Vec<Row>, EngineError>;

    /// Replace rows whose `key` matches, insert the rest. Atomic per call.
    async fn merge_rows(
        &self,
        table: &str,
        key: &str,
        rows: &[Row],
    ) -> Result<MergeOutcome, EngineError>;
}

// ---------------------------------------------------------------------------
// Write hooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Merge,
}

/// A committed write to one table.
#[derive(Debug, Clone)]
pub struct WriteEvent {
    pub table: String,
    pub kind: WriteKind,
    pub rows: u64,
}

/// Callback run by [`Warehouse`] after every committed write, before the
/// write call returns.
#[async_trait]
pub trait WriteHook: Send + Sync {
    async fn after_write(&self, warehouse: &Warehouse, event: &WriteEvent);
}
