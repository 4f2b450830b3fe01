//! The store handle passed to every orchestrator operation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::SubsecRound;

use warehouse_core::domain::{ID_COLUMN, PROCESSED_AT_COLUMN};
use warehouse_core::schema::{is_valid_identifier, timestamp_value, Row, TableSchema};
use warehouse_core::types::Timestamp;

use crate::error::EngineError;
use crate::memory::MemoryStore;
use crate::store::{MergeOutcome, Store, WriteEvent, WriteHook, WriteKind};

/// Cloneable handle over a [`Store`].
///
/// Validates every statement before it reaches the engine so all engines
/// reject the same inputs, and runs registered [`WriteHook`]s after each
/// committed write. Clones share the store and the hook list.
///
/// Writes to one table commit one at a time, and `processed_at` is stamped
/// inside that critical section. Stamps therefore follow commit order, which
/// is what [`Warehouse::snapshot`] relies on.
#[derive(Clone)]
pub struct Warehouse {
    store: Arc<dyn Store>,
    hooks: Arc<RwLock<Vec<Arc<dyn WriteHook>>>>,
    commit_clocks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<CommitClock>>>>>,
}

/// Rows of one table read at `taken_at`.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    /// Every row stamped before this instant is in `rows`; every row
    /// committed afterwards is stamped at or after it.
    pub taken_at: Timestamp,
    pub rows: Vec<Row>,
}

impl Warehouse {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            hooks: Arc::new(RwLock::new(Vec::new())),
            commit_clocks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handle over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn add_write_hook(&self, hook: Arc<dyn WriteHook>) {
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(hook);
    }

    pub async fn create_or_replace_table(&self, schema: &TableSchema) -> Result<(), EngineError> {
        schema
            .validate()
            .map_err(|e| EngineError::from_core("create table", e))?;
        self.store.create_or_replace_table(schema).await
    }

    /// Schema of an existing table.
    pub async fn schema(&self, table: &str) -> Result<TableSchema, EngineError> {
        check_identifier("describe", table)?;
        self.store
            .table_schema(table)
            .await?
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))
    }

    /// Append rows to `table`. Returns the number of rows written.
    pub async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64, EngineError> {
        let schema = self.schema(table).await?;
        let mut rows = normalize_all("insert", &schema, rows)?;
        let written = {
            let commit = self.commit_clock(table);
            let mut clock = commit.lock().await;
            clock.stamp(&schema, &mut rows);
            self.store.insert_rows(table, &rows).await?
        };
        tracing::debug!(table, rows = written, "Rows inserted");
        self.after_write(table, WriteKind::Insert, written).await;
        Ok(written)
    }

    /// All rows of `table`, ordered by `id` when the table has one.
    pub async fn select(&self, table: &str) -> Result<Vec<Row>, EngineError> {
        let schema = self.schema(table).await?;
        let mut rows = self.store.select_rows(table).await?;
        if schema.column_def(ID_COLUMN).is_some() {
            rows.sort_by(compare_ids);
        }
        Ok(rows)
    }

    /// [`Warehouse::select`] plus the cutoff instant, read while no write to
    /// `table` is in flight.
    pub async fn snapshot(&self, table: &str) -> Result<TableSnapshot, EngineError> {
        let commit = self.commit_clock(table);
        let mut clock = commit.lock().await;
        let taken_at = clock.cutoff();
        let rows = self.select(table).await?;
        Ok(TableSnapshot { taken_at, rows })
    }

    /// Row with the lowest `id`, if any.
    pub async fn first_row(&self, table: &str) -> Result<Option<Row>, EngineError> {
        Ok(self.select(table).await?.into_iter().next())
    }

    pub async fn count(&self, table: &str) -> Result<usize, EngineError> {
        check_identifier("select", table)?;
        Ok(self.store.select_rows(table).await?.len())
    }

    /// Upsert rows on `key`: rows whose key matches an existing row replace
    /// it, the rest are appended. Every row must carry a non-NULL key.
    pub async fn merge(
        &self,
        table: &str,
        key: &str,
        rows: &[Row],
    ) -> Result<MergeOutcome, EngineError> {
        let schema = self.schema(table).await?;
        let key = schema
            .column_def(key)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                EngineError::rejected("merge", format!("unknown key column '{key}' for '{table}'"))
            })?;
        let mut rows = normalize_all("merge", &schema, rows)?;
        if rows
            .iter()
            .any(|r| r.get(&key).map_or(true, serde_json::Value::is_null))
        {
            return Err(EngineError::rejected(
                "merge",
                format!("every row needs a value for key '{key}'"),
            ));
        }

        let outcome = {
            let commit = self.commit_clock(table);
            let mut clock = commit.lock().await;
            clock.stamp(&schema, &mut rows);
            self.store.merge_rows(table, &key, &rows).await?
        };
        tracing::debug!(
            table,
            updated = outcome.updated,
            inserted = outcome.inserted,
            "Rows merged"
        );
        self.after_write(table, WriteKind::Merge, outcome.updated + outcome.inserted)
            .await;
        Ok(outcome)
    }

    fn commit_clock(&self, table: &str) -> Arc<tokio::sync::Mutex<CommitClock>> {
        self.commit_clocks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(table.to_ascii_lowercase())
            .or_default()
            .clone()
    }

    async fn after_write(&self, table: &str, kind: WriteKind, rows: u64) {
        let hooks: Vec<Arc<dyn WriteHook>> = self
            .hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if hooks.is_empty() {
            return;
        }

        let event = WriteEvent {
            table: table.to_string(),
            kind,
            rows,
        };
        for hook in hooks {
            hook.after_write(self, &event).await;
        }
    }
}

/// Commit-time stamps for one table, at microsecond precision (what
/// Postgres keeps). Stamps never go backwards, and a cutoff is strictly
/// later than every stamp handed out before it.
#[derive(Default)]
struct CommitClock {
    /// Earliest stamp the next write may take.
    next_stamp: Timestamp,
}

impl CommitClock {
    /// Overwrite `processed_at`, when the table has one, with the commit time.
    fn stamp(&mut self, schema: &TableSchema, rows: &mut [Row]) {
        let Some(column) = schema.column_def(PROCESSED_AT_COLUMN) else {
            return;
        };
        let stamp = now_micros().max(self.next_stamp);
        self.next_stamp = stamp;
        let value = timestamp_value(stamp);
        for row in rows {
            row.insert(column.name.clone(), value.clone());
        }
    }

    fn cutoff(&mut self) -> Timestamp {
        let cutoff = now_micros().max(self.next_stamp + chrono::Duration::microseconds(1));
        self.next_stamp = cutoff;
        cutoff
    }
}

fn now_micros() -> Timestamp {
    chrono::Utc::now().trunc_subsecs(6)
}

fn check_identifier(statement: &'static str, name: &str) -> Result<(), EngineError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(EngineError::rejected(
            statement,
            format!("invalid identifier '{name}'"),
        ))
    }
}

fn normalize_all(
    statement: &'static str,
    schema: &TableSchema,
    rows: &[Row],
) -> Result<Vec<Row>, EngineError> {
    rows.iter()
        .map(|row| {
            schema
                .check_row(row)
                .map_err(|reason| EngineError::rejected(statement, reason))?;
            Ok(schema.normalize_row(row))
        })
        .collect()
}

/// Ascending by numeric `id`; rows without one sort last.
fn compare_ids(a: &Row, b: &Row) -> Ordering {
    let id = |r: &Row| r.get(ID_COLUMN).and_then(|v| v.as_i64());
    match (id(a), id(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
