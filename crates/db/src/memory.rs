//! In-process engine backed by a map of tables.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use warehouse_core::schema::{Row, TableSchema};

use crate::error::EngineError;
use crate::store::{MergeOutcome, Store};

struct MemTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

/// Tables live for the lifetime of the store. Writes to any table are
/// serialized by one lock; the lock is never held across an await.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MemTable>> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, MemTable>> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_or_replace_table(&self, schema: &TableSchema) -> Result<(), EngineError> {
        let replaced = self
            .write()
            .insert(
                schema.name.clone(),
                MemTable {
                    schema: schema.clone(),
                    rows: Vec::new(),
                },
            )
            .is_some();
        tracing::debug!(table = %schema.name, replaced, "Table created");
        Ok(())
    }

    async fn table_schema(&self, table: &str) -> Result<Option<TableSchema>, EngineError> {
        Ok(self.read().get(table).map(|t| t.schema.clone()))
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64, EngineError> {
        let mut tables = self.write();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        target.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn select_rows(&self, table: &str) -> Result<Vec<Row>, EngineError> {
        self.read()
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))
    }

    async fn merge_rows(
        &self,
        table: &str,
        key: &str,
        rows: &[Row],
    ) -> Result<MergeOutcome, EngineError> {
        let mut tables = self.write();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;

        let mut outcome = MergeOutcome::default();
        for row in rows {
            let key_value = row.get(key);
            let mut matched = false;
            for existing in target.rows.iter_mut().filter(|r| r.get(key) == key_value) {
                *existing = row.clone();
                matched = true;
            }
            if matched {
                outcome.updated += 1;
            } else {
                target.rows.push(row.clone());
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use warehouse_core::schema::ColumnType;

    fn schema() -> TableSchema {
        TableSchema::new("t")
            .column("id", ColumnType::BigInt)
            .column("v", ColumnType::Text)
    }

    fn row(id: i64, v: &str) -> Row {
        json!({"id": id, "v": v}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_into_missing_table_fails() {
        let store = MemoryStore::new();
        assert_matches!(
            store.insert_rows("nope", &[row(1, "a")]).await,
            Err(EngineError::TableNotFound(t)) if t == "nope"
        );
    }

    #[tokio::test]
    async fn replace_table_discards_rows() {
        let store = MemoryStore::new();
        store.create_or_replace_table(&schema()).await.unwrap();
        store.insert_rows("t", &[row(1, "a")]).await.unwrap();
        store.create_or_replace_table(&schema()).await.unwrap();
        assert!(store.select_rows("t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_updates_matches_and_inserts_rest() {
        let store = MemoryStore::new();
        store.create_or_replace_table(&schema()).await.unwrap();
        store.insert_rows("t", &[row(1, "a")]).await.unwrap();

        let outcome = store
            .merge_rows("t", "id", &[row(1, "b"), row(2, "c")])
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome { updated: 1, inserted: 1 });
        let rows = store.select_rows("t").await.unwrap();
        assert_eq!(rows, vec![row(1, "b"), row(2, "c")]);
    }
}
