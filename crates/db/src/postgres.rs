//! PostgreSQL engine.
//!
//! Rows cross the boundary as JSONB: inserts go through
//! `jsonb_populate_record`, selects through `to_jsonb`. Table and column
//! names are interpolated, which is safe only because [`Warehouse`] checks
//! every identifier with [`is_valid_identifier`] first.
//!
//! [`Warehouse`]: crate::Warehouse
//! [`is_valid_identifier`]: warehouse_core::schema::is_valid_identifier

use async_trait::async_trait;
use serde_json::Value;
use warehouse_core::schema::{ColumnType, Row, TableSchema};

use crate::error::EngineError;
use crate::store::{MergeOutcome, Store};
use crate::DbPool;

/// Provides statement execution against a Postgres pool.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn column_type_of(data_type: &str) -> Option<ColumnType> {
    match data_type {
        "bigint" | "integer" | "smallint" => Some(ColumnType::BigInt),
        "numeric" | "double precision" | "real" => Some(ColumnType::Number),
        "text" | "character varying" => Some(ColumnType::Text),
        "timestamp with time zone" => Some(ColumnType::Timestamp),
        _ => None,
    }
}

/// Key value rendered the way `<column>::text` renders it in Postgres.
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn insert_sql(table: &str) -> String {
    format!("INSERT INTO {table} SELECT * FROM jsonb_populate_record(NULL::{table}, $1)")
}

#[async_trait]
impl Store for PgStore {
    async fn create_or_replace_table(&self, schema: &TableSchema) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", schema.name))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&schema.create_sql()).execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::debug!(table = %schema.name, "Table created");
        Ok(())
    }

    async fn table_schema(&self, table: &str) -> Result<Option<TableSchema>, EngineError> {
        let columns: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name::text, data_type::text \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        if columns.is_empty() {
            return Ok(None);
        }

        let mut schema = TableSchema::new(table);
        for (name, data_type) in columns {
            let column_type = column_type_of(&data_type).ok_or_else(|| {
                EngineError::rejected(
                    "describe",
                    format!("unsupported type '{data_type}' for column '{table}.{name}'"),
                )
            })?;
            schema = schema.column(name, column_type);
        }
        Ok(Some(schema))
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64, EngineError> {
        let query = insert_sql(table);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            inserted += sqlx::query(&query)
                .bind(Value::Object(row.clone()))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn select_rows(&self, table: &str) -> Result<Vec<Row>, EngineError> {
        let values: Vec<Value> = sqlx::query_scalar(&format!("SELECT to_jsonb(t) FROM {table} t"))
            .fetch_all(&self.pool)
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect())
    }

    async fn merge_rows(
        &self,
        table: &str,
        key: &str,
        rows: &[Row],
    ) -> Result<MergeOutcome, EngineError> {
        let delete = format!("DELETE FROM {table} WHERE {key}::text = $1");
        let insert = insert_sql(table);
        let mut outcome = MergeOutcome::default();

        let mut tx = self.pool.begin().await?;
        for row in rows {
            let key_value = row.get(key).and_then(key_text).ok_or_else(|| {
                EngineError::rejected("merge", format!("row has no value for key '{key}'"))
            })?;
            let deleted = sqlx::query(&delete)
                .bind(&key_value)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query(&insert)
                .bind(Value::Object(row.clone()))
                .execute(&mut *tx)
                .await?;
            if deleted > 0 {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_information_schema_types() {
        assert_eq!(column_type_of("bigint"), Some(ColumnType::BigInt));
        assert_eq!(column_type_of("numeric"), Some(ColumnType::Number));
        assert_eq!(column_type_of("timestamp with time zone"), Some(ColumnType::Timestamp));
        assert_eq!(column_type_of("bytea"), None);
    }

    #[test]
    fn key_text_matches_postgres_text_cast() {
        assert_eq!(key_text(&json!(7)), Some("7".to_string()));
        assert_eq!(key_text(&json!("abc")), Some("abc".to_string()));
        assert_eq!(key_text(&Value::Null), None);
    }

    #[test]
    fn insert_sql_populates_from_jsonb() {
        assert_eq!(
            insert_sql("sales_raw"),
            "INSERT INTO sales_raw SELECT * FROM jsonb_populate_record(NULL::sales_raw, $1)"
        );
    }
}
