//! Errors raised by the statement submission layer.

use warehouse_core::error::CoreError;

/// Failure of one statement, whichever engine ran it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The statement named a table the engine does not have.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The engine refused the statement (bad row, bad schema, bad key).
    #[error("Statement rejected ({statement}): {reason}")]
    Rejected {
        statement: &'static str,
        reason: String,
    },

    /// Postgres or the connection pool failed underneath the statement.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    /// Shorthand for [`EngineError::Rejected`].
    pub fn rejected(statement: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Rejected {
            statement,
            reason: reason.into(),
        }
    }

    /// Map a core validation failure to a rejection of `statement`.
    pub fn from_core(statement: &'static str, err: CoreError) -> Self {
        EngineError::rejected(statement, err.to_string())
    }
}
