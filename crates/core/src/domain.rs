//! The three demo data domains and their table layouts.
//!
//! Each domain owns a `<domain>_raw` source table and a `<domain>_processed`
//! table that carries the same columns plus `processed_at`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CoreError;
use crate::schema::{timestamp_value, ColumnType, Row, TableSchema};
use crate::types::Timestamp;

/// Primary key column present in every demo table.
pub const ID_COLUMN: &str = "id";

/// Column stamped by a worker when it writes a processed row.
pub const PROCESSED_AT_COLUMN: &str = "processed_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Sales,
    Inventory,
    Customers,
}

impl Domain {
    /// All domains in pipeline order.
    pub const ALL: [Domain; 3] = [Domain::Sales, Domain::Inventory, Domain::Customers];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Sales => "sales",
            Domain::Inventory => "inventory",
            Domain::Customers => "customers",
        }
    }

    pub fn source_table(self) -> String {
        format!("{}_raw", self.as_str())
    }

    pub fn processed_table(self) -> String {
        format!("{}_processed", self.as_str())
    }

    pub fn source_schema(self) -> TableSchema {
        let schema = TableSchema::new(self.source_table()).column(ID_COLUMN, ColumnType::BigInt);
        match self {
            Domain::Sales => schema
                .column("region", ColumnType::Text)
                .column("amount", ColumnType::Number),
            Domain::Inventory => schema
                .column("product", ColumnType::Text)
                .column("qty", ColumnType::BigInt),
            Domain::Customers => schema
                .column("name", ColumnType::Text)
                .column("email", ColumnType::Text),
        }
    }

    pub fn processed_schema(self) -> TableSchema {
        self.source_schema()
            .renamed(self.processed_table())
            .column(PROCESSED_AT_COLUMN, ColumnType::Timestamp)
    }

    /// The single row seeded into the source table by setup.
    pub fn seed_row(self) -> Row {
        let value = match self {
            Domain::Sales => json!({"id": 1, "region": "west", "amount": 1000}),
            Domain::Inventory => json!({"id": 1, "product": "widget", "qty": 100}),
            Domain::Customers => {
                json!({"id": 1, "name": "Acme Corp", "email": "ops@acme.example"})
            }
        };
        match value {
            serde_json::Value::Object(map) => map,
            _ => Row::new(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sales" => Ok(Domain::Sales),
            "inventory" => Ok(Domain::Inventory),
            "customers" => Ok(Domain::Customers),
            other => Err(CoreError::Validation(format!("unknown domain '{other}'"))),
        }
    }
}

/// Derive a processed row from a source row: same values plus `processed_at`.
pub fn processed_record(source: &Row, processed_at: Timestamp) -> Row {
    let mut row = source.clone();
    row.insert(PROCESSED_AT_COLUMN.to_string(), timestamp_value(processed_at));
    row
}
