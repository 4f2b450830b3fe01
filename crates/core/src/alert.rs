//! Alert rule definitions.
//!
//! An [`AlertRule`] pairs a row predicate over a watched table with a
//! schedule and a notification action. The evaluator always conjoins the
//! predicate with `timestamp_column >= watermark`, so a row only ever
//! contributes to a firing once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail};

use crate::domain::PROCESSED_AT_COLUMN;
use crate::error::CoreError;
use crate::schema::{is_valid_identifier, number_of, timestamp_of, Row};
use crate::types::Timestamp;

/// Row predicate shared between the rule definition and the evaluator.
pub type RowPredicate = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// State / schedule
// ---------------------------------------------------------------------------

/// Newly registered rules start suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Suspended,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSchedule {
    /// Condition polled every `interval`.
    Periodic { interval: Duration },
    /// Condition evaluated right after each write to the watched table.
    EventTriggered,
}

impl AlertSchedule {
    pub fn is_periodic(&self) -> bool {
        matches!(self, AlertSchedule::Periodic { .. })
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equal,
}

impl Comparison {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::GreaterThan => lhs > rhs,
            Comparison::GreaterOrEqual => lhs >= rhs,
            Comparison::LessThan => lhs < rhs,
            Comparison::LessOrEqual => lhs <= rhs,
            Comparison::Equal => lhs == rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::GreaterThan => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::LessThan => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Equal => "=",
        }
    }

    /// Predicate comparing a numeric column against `threshold`.
    /// Rows where the column is NULL or missing never match.
    pub fn predicate(self, column: impl Into<String>, threshold: f64) -> RowPredicate {
        let column = column.into();
        Arc::new(move |row: &Row| {
            number_of(row, &column).is_some_and(|value| self.apply(value, threshold))
        })
    }
}

// ---------------------------------------------------------------------------
// AlertCondition
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AlertCondition {
    /// Table whose rows are evaluated.
    pub table: String,
    /// Human-readable form, e.g. `amount > 5000`.
    pub description: String,
    /// Column compared against the watermark.
    pub timestamp_column: String,
    predicate: RowPredicate,
}

impl AlertCondition {
    /// `column <op> threshold` over `table`.
    pub fn threshold(
        table: impl Into<String>,
        column: &str,
        op: Comparison,
        threshold: f64,
    ) -> Self {
        Self {
            table: table.into(),
            description: format!("{column} {} {threshold}", op.symbol()),
            timestamp_column: PROCESSED_AT_COLUMN.to_string(),
            predicate: op.predicate(column, threshold),
        }
    }

    /// Predicate AND `timestamp_column >= watermark`. Rows without a
    /// timestamp never match.
    pub fn matches(&self, row: &Row, watermark: Timestamp) -> bool {
        let fresh = timestamp_of(row, &self.timestamp_column).is_some_and(|ts| ts >= watermark);
        fresh && (self.predicate)(row)
    }
}

impl fmt::Debug for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertCondition")
            .field("table", &self.table)
            .field("description", &self.description)
            .field("timestamp_column", &self.timestamp_column)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// NotifyAction / AlertRule
// ---------------------------------------------------------------------------

/// What to send when an alert fires.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct NotifyAction {
    #[validate(length(min = 1))]
    pub channel: String,
    #[validate(length(min = 1))]
    pub recipients: Vec<String>,
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct AlertRule {
    pub name: String,
    pub condition: AlertCondition,
    pub schedule: AlertSchedule,
    pub action: NotifyAction,
}

impl AlertRule {
    /// Check the rule name, schedule, watched table and action fields.
    ///
    /// Recipients on the email channel must be valid addresses.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !is_valid_identifier(&self.name) {
            return Err(CoreError::Validation(format!(
                "invalid alert name '{}'",
                self.name
            )));
        }
        if !is_valid_identifier(&self.condition.table) {
            return Err(CoreError::Validation(format!(
                "alert '{}' watches invalid table '{}'",
                self.name, self.condition.table
            )));
        }
        if let AlertSchedule::Periodic { interval } = self.schedule {
            if interval.is_zero() {
                return Err(CoreError::Validation(format!(
                    "alert '{}' has a zero polling interval",
                    self.name
                )));
            }
        }
        self.action
            .validate()
            .map_err(|e| CoreError::Validation(format!("alert '{}': {e}", self.name)))?;
        if self.action.channel == crate::channels::CHANNEL_EMAIL {
            if let Some(bad) = self.action.recipients.iter().find(|r| !r.validate_email()) {
                return Err(CoreError::Validation(format!(
                    "alert '{}': invalid recipient address '{bad}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A rendered notification handed to a delivery sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Name of the alert that produced this notification, if any.
    pub alert: Option<String>,
    pub created_at: Timestamp,
}

impl Notification {
    pub fn from_action(action: &NotifyAction, alert: &str, body: String) -> Self {
        Self {
            channel: action.channel.clone(),
            recipients: action.recipients.clone(),
            subject: action.subject.clone(),
            body,
            alert: Some(alert.to_string()),
            created_at: chrono::Utc::now(),
        }
    }
}
