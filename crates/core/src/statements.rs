//! Row-level helpers behind the two convenience statements: conditional
//! multi-table insert and insert/merge by column name.
//!
//! Both are pure functions over rows and schemas; the store only ever sees
//! plain inserts and merges on a key column.

use serde_json::Value;

use crate::alert::RowPredicate;
use crate::error::CoreError;
use crate::schema::{Row, TableSchema};

// ---------------------------------------------------------------------------
// Multi-table insert
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Every matching clause receives the row.
    All,
    /// Only the first matching clause receives the row.
    First,
}

pub struct WhenClause {
    pub description: String,
    pub target: String,
    predicate: RowPredicate,
}

/// `INSERT ALL | FIRST WHEN ... THEN INTO ... [ELSE INTO ...]`.
pub struct MultiTableInsert {
    pub mode: InsertMode,
    pub clauses: Vec<WhenClause>,
    pub else_target: Option<String>,
}

impl MultiTableInsert {
    pub fn new(mode: InsertMode) -> Self {
        Self {
            mode,
            clauses: Vec::new(),
            else_target: None,
        }
    }

    pub fn when(
        mut self,
        description: impl Into<String>,
        predicate: RowPredicate,
        target: impl Into<String>,
    ) -> Self {
        self.clauses.push(WhenClause {
            description: description.into(),
            target: target.into(),
            predicate,
        });
        self
    }

    pub fn otherwise(mut self, target: impl Into<String>) -> Self {
        self.else_target = Some(target.into());
        self
    }

    /// Distinct target tables in declaration order, ELSE target last.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        let declared = self
            .clauses
            .iter()
            .map(|c| c.target.as_str())
            .chain(self.else_target.as_deref());
        for target in declared {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    /// Distribute `rows` over the target tables. Every target appears in the
    /// result, possibly with no rows. Rows matching no clause and with no
    /// ELSE target are dropped.
    pub fn route(&self, rows: &[Row]) -> Vec<(String, Vec<Row>)> {
        let mut routed: Vec<(String, Vec<Row>)> = self
            .targets()
            .into_iter()
            .map(|t| (t.to_string(), Vec::new()))
            .collect();

        for row in rows {
            let mut matched = false;
            for clause in &self.clauses {
                if (clause.predicate)(row) {
                    matched = true;
                    push_to(&mut routed, &clause.target, row);
                    if self.mode == InsertMode::First {
                        break;
                    }
                }
            }
            if !matched {
                if let Some(target) = &self.else_target {
                    push_to(&mut routed, target, row);
                }
            }
        }
        routed
    }
}

fn push_to(routed: &mut [(String, Vec<Row>)], target: &str, row: &Row) {
    if let Some((_, rows)) = routed.iter_mut().find(|(t, _)| t == target) {
        rows.push(row.clone());
    }
}

// ---------------------------------------------------------------------------
// By-name alignment
// ---------------------------------------------------------------------------

/// Maps each target column to the source column with the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub target_table: String,
    /// `(target column, source column)`; `None` when the source lacks it.
    pub pairs: Vec<(String, Option<String>)>,
}

/// Match `source` columns to `target` columns by (case-insensitive) name.
///
/// Target columns absent from the source are filled with NULL. A source
/// column the target does not have is an error.
pub fn align_by_name(target: &TableSchema, source: &TableSchema) -> Result<ColumnMapping, CoreError> {
    if let Some(extra) = source
        .column_names()
        .find(|name| target.column_def(name).is_none())
    {
        return Err(CoreError::Validation(format!(
            "column '{extra}' of '{}' has no match by name in '{}'",
            source.name, target.name
        )));
    }

    let pairs = target
        .columns
        .iter()
        .map(|t| {
            let source_col = source.column_def(&t.name).map(|s| s.name.clone());
            (t.name.clone(), source_col)
        })
        .collect();

    Ok(ColumnMapping {
        target_table: target.name.clone(),
        pairs,
    })
}

impl ColumnMapping {
    /// Re-key a source row into target column names.
    pub fn project(&self, row: &Row) -> Row {
        self.pairs
            .iter()
            .map(|(target, source)| {
                let value = source
                    .as_ref()
                    .and_then(|s| row.get(s))
                    .cloned()
                    .unwrap_or(Value::Null);
                (target.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Comparison;
    use crate::schema::ColumnType;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn sale(id: i64, amount: i64) -> Row {
        json!({"id": id, "amount": amount}).as_object().cloned().unwrap()
    }

    fn split() -> MultiTableInsert {
        MultiTableInsert::new(InsertMode::All)
            .when(
                "amount > 5000",
                Comparison::GreaterThan.predicate("amount", 5000.0),
                "high_value_sales",
            )
            .when(
                "amount <= 5000",
                Comparison::LessOrEqual.predicate("amount", 5000.0),
                "standard_sales",
            )
    }

    #[test]
    fn routes_rows_by_condition() {
        let routed = split().route(&[sale(1, 1000), sale(2, 7500), sale(3, 5000)]);
        assert_eq!(routed[0].0, "high_value_sales");
        assert_eq!(routed[0].1, vec![sale(2, 7500)]);
        assert_eq!(routed[1].0, "standard_sales");
        assert_eq!(routed[1].1.len(), 2);
    }

    #[test]
    fn insert_all_duplicates_into_every_match() {
        let stmt = MultiTableInsert::new(InsertMode::All)
            .when("big", Comparison::GreaterThan.predicate("amount", 10.0), "a")
            .when("bigger", Comparison::GreaterThan.predicate("amount", 100.0), "b");
        let routed = stmt.route(&[sale(1, 500)]);
        assert_eq!(routed[0].1.len(), 1);
        assert_eq!(routed[1].1.len(), 1);
    }

    #[test]
    fn insert_first_stops_at_first_match() {
        let stmt = MultiTableInsert::new(InsertMode::First)
            .when("big", Comparison::GreaterThan.predicate("amount", 10.0), "a")
            .when("bigger", Comparison::GreaterThan.predicate("amount", 100.0), "b");
        let routed = stmt.route(&[sale(1, 500)]);
        assert_eq!(routed[0].1.len(), 1);
        assert!(routed[1].1.is_empty());
    }

    #[test]
    fn unmatched_rows_go_to_else_target() {
        let stmt = MultiTableInsert::new(InsertMode::First)
            .when("big", Comparison::GreaterThan.predicate("amount", 10.0), "a")
            .otherwise("rest");
        let routed = stmt.route(&[sale(1, 5)]);
        assert_eq!(stmt.targets(), vec!["a", "rest"]);
        assert!(routed[0].1.is_empty());
        assert_eq!(routed[1].1, vec![sale(1, 5)]);
    }

    fn customers() -> TableSchema {
        TableSchema::new("customers_raw")
            .column("id", ColumnType::BigInt)
            .column("name", ColumnType::Text)
            .column("email", ColumnType::Text)
    }

    #[test]
    fn align_ignores_column_order() {
        let staging = TableSchema::new("customers_staging")
            .column("email", ColumnType::Text)
            .column("ID", ColumnType::BigInt)
            .column("name", ColumnType::Text);
        let mapping = align_by_name(&customers(), &staging).unwrap();
        let row = json!({"email": "a@b.example", "ID": 7, "name": "Ann"})
            .as_object()
            .cloned()
            .unwrap();
        let projected = mapping.project(&row);
        assert_eq!(
            projected.keys().collect::<Vec<_>>(),
            vec!["email", "id", "name"]
        );
        assert_eq!(projected["id"], 7);
        assert_eq!(projected["name"], "Ann");
    }

    #[test]
    fn missing_source_columns_become_null() {
        let staging = TableSchema::new("s")
            .column("id", ColumnType::BigInt)
            .column("name", ColumnType::Text);
        let mapping = align_by_name(&customers(), &staging).unwrap();
        let projected = mapping.project(&json!({"id": 1, "name": "x"}).as_object().cloned().unwrap());
        assert_eq!(projected["email"], Value::Null);
    }

    #[test]
    fn unknown_source_column_is_rejected() {
        let staging = TableSchema::new("s")
            .column("id", ColumnType::BigInt)
            .column("phone", ColumnType::Text);
        assert_matches!(
            align_by_name(&customers(), &staging),
            Err(CoreError::Validation(msg)) if msg.contains("phone")
        );
    }
}
