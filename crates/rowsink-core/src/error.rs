//! Error types for rowsink

use thiserror::Error;

/// Core error type for rowsink operations
#[derive(Error, Debug)]
pub enum RowsinkError {
    /// Invalid configuration detected before any connection is opened
    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The database file/name does not exist. Distinct from `Connection`
    /// because callers may offer to create file-based databases.
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// A SQL statement failed; carries the statement for context
    #[error("SQL error: {message} (statement: {statement})")]
    Sql { statement: String, message: String },

    /// A single source row could not be converted or applied
    #[error("Row {row}: {reason}")]
    RowData { row: u64, reason: String },

    /// Failure while removing staging tables or reactivating constraints.
    /// Logged by callers, never allowed to mask the primary outcome.
    #[error("Cleanup error: {0}")]
    Cleanup(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RowsinkError {
    /// Wrap a database error with the statement that triggered it.
    pub fn sql(statement: impl Into<String>, message: impl std::fmt::Display) -> Self {
        RowsinkError::Sql {
            statement: statement.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for rowsink operations
pub type Result<T> = std::result::Result<T, RowsinkError>;
