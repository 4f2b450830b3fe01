//! Table schemas and the JSON row representation.
//!
//! A [`Row`] is a JSON object keyed by column name. Every store validates
//! inserted rows against the target [`TableSchema`] with
//! [`TableSchema::check_row`] so the in-memory and Postgres stores reject
//! the same statements.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::Timestamp;

/// A single table row, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// ColumnType
// ---------------------------------------------------------------------------

/// Supported column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    BigInt,
    Number,
    Text,
    /// Stored as an RFC 3339 string in rows.
    Timestamp,
}

impl ColumnType {
    /// PostgreSQL type used when the table is created.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::BigInt => "BIGINT",
            ColumnType::Number => "NUMERIC(18, 2)",
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "TIMESTAMPTZ",
        }
    }

    /// Whether `value` can be stored in a column of this type. NULL always can.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::BigInt, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ColumnType::Number, Value::Number(_)) => true,
            (ColumnType::Text, Value::String(_)) => true,
            (ColumnType::Timestamp, Value::String(s)) => parse_timestamp(s).is_some(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// TableSchema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

/// Column layout of one table. Column order is significant for display and
/// for `CREATE TABLE`, never for row lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column (builder style).
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            column_type,
        });
        self
    }

    /// Same columns under a different table name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: self.columns.clone(),
        }
    }

    /// Case-insensitive column lookup.
    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Check identifiers and reject empty or duplicate column lists.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !is_valid_identifier(&self.name) {
            return Err(CoreError::Validation(format!(
                "invalid table name '{}'",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(CoreError::Validation(format!(
                "table '{}' has no columns",
                self.name
            )));
        }
        for (i, col) in self.columns.iter().enumerate() {
            if !is_valid_identifier(&col.name) {
                return Err(CoreError::Validation(format!(
                    "invalid column name '{}' in table '{}'",
                    col.name, self.name
                )));
            }
            if self.columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&col.name))
            {
                return Err(CoreError::Validation(format!(
                    "duplicate column '{}' in table '{}'",
                    col.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Verify that every value in `row` names a known column of a compatible
    /// type. Missing columns are allowed and read back as NULL.
    pub fn check_row(&self, row: &Row) -> Result<(), String> {
        for (name, value) in row {
            let Some(def) = self.column_def(name) else {
                return Err(format!("unknown column '{name}' for table '{}'", self.name));
            };
            if !def.column_type.accepts(value) {
                return Err(format!(
                    "value {value} is not a valid {:?} for column '{}.{}'",
                    def.column_type, self.name, def.name
                ));
            }
        }
        Ok(())
    }

    /// Full-width copy of `row`: canonical column names, in schema order,
    /// with NULL for every column the row omits. Call after [`check_row`].
    ///
    /// [`check_row`]: TableSchema::check_row
    pub fn normalize_row(&self, row: &Row) -> Row {
        self.columns
            .iter()
            .map(|col| {
                let value = row
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&col.name))
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null);
                (col.name.clone(), value)
            })
            .collect()
    }

    /// `CREATE TABLE` statement for this schema.
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.column_type.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({columns})", self.name)
    }
}

/// Identifiers are interpolated into SQL, so only `[a-z_][a-z0-9_]*` is
/// accepted.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Numeric value of `column`, if present and numeric.
pub fn number_of(row: &Row, column: &str) -> Option<f64> {
    row.get(column).and_then(Value::as_f64)
}

/// Timestamp value of `column`, if present and parseable.
pub fn timestamp_of(row: &Row, column: &str) -> Option<Timestamp> {
    row.get(column)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

pub fn timestamp_value(ts: Timestamp) -> Value {
    Value::String(ts.to_rfc3339())
}

fn parse_timestamp(s: &str) -> Option<Timestamp> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales() -> TableSchema {
        TableSchema::new("sales_raw")
            .column("id", ColumnType::BigInt)
            .column("amount", ColumnType::Number)
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn identifiers_are_lowercase_snake_case() {
        assert!(is_valid_identifier("sales_raw"));
        assert!(is_valid_identifier("_t1"));
        assert!(!is_valid_identifier("Sales"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("drop table; --"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn validate_rejects_duplicate_columns() {
        let schema = sales().column("ID", ColumnType::Text);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn check_row_accepts_partial_rows() {
        assert!(sales().check_row(&row(json!({"id": 1}))).is_ok());
    }

    #[test]
    fn check_row_rejects_unknown_column() {
        let err = sales()
            .check_row(&row(json!({"id": 1, "qty": 3})))
            .unwrap_err();
        assert!(err.contains("unknown column 'qty'"));
    }

    #[test]
    fn check_row_rejects_type_mismatch() {
        assert!(sales()
            .check_row(&row(json!({"id": 1.5})))
            .is_err());
        assert!(sales()
            .check_row(&row(json!({"amount": "lots"})))
            .is_err());
    }

    #[test]
    fn normalize_fills_nulls_and_canonical_names() {
        let normalized = sales().normalize_row(&row(json!({"ID": 4})));
        assert_eq!(normalized["id"], 4);
        assert_eq!(normalized["amount"], Value::Null);
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn timestamp_columns_require_rfc3339() {
        assert!(ColumnType::Timestamp.accepts(&json!("2026-10-19T12:00:00Z")));
        assert!(!ColumnType::Timestamp.accepts(&json!("yesterday")));
    }

    #[test]
    fn create_sql_lists_columns_in_order() {
        assert_eq!(
            sales().create_sql(),
            "CREATE TABLE sales_raw (id BIGINT, amount NUMERIC(18, 2))"
        );
    }

    #[test]
    fn timestamp_round_trips_through_row() {
        let now = chrono::Utc::now();
        let mut r = Row::new();
        r.insert("at".into(), timestamp_value(now));
        assert_eq!(timestamp_of(&r, "at"), Some(now));
    }
}
