//! Errors during import

use rowsink_core::RowsinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// Invalid configuration; raised before any connection is opened
    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed; the message carries the statement context
    #[error("SQL error: {0}")]
    Sql(String),

    /// The row source failed to deliver or extract items
    #[error("Source error: {0}")]
    Source(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Import cancelled")]
    Cancelled,
}

impl From<RowsinkError> for ImportError {
    fn from(e: RowsinkError) -> Self {
        match e {
            RowsinkError::Definition(m) => ImportError::Definition(m),
            RowsinkError::Connection(m) => ImportError::Connection(m),
            RowsinkError::DatabaseNotFound(m) => {
                ImportError::Connection(format!("database not found: {}", m))
            }
            RowsinkError::NotSupported(m) => ImportError::NotSupported(m),
            RowsinkError::Cancelled => ImportError::Cancelled,
            other => ImportError::Sql(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
