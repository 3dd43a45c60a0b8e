//! Connection factory for the embedded SQLite backend

use crate::SqliteConnection;
use async_trait::async_trait;
use rowsink_core::{Connection, ConnectionFactory, ConnectionParams, Result, Vendor};
use std::sync::Arc;

/// Factory handed to the import engine for SQLite destinations.
///
/// A missing database file is reported as `DatabaseNotFound` unless the
/// factory was built with `create_if_missing`, so callers can decide whether
/// to create the database.
pub struct SqliteConnectionFactory {
    create_if_missing: bool,
}

impl SqliteConnectionFactory {
    pub fn new() -> Self {
        Self {
            create_if_missing: false,
        }
    }

    pub fn create_if_missing() -> Self {
        Self {
            create_if_missing: true,
        }
    }
}

impl Default for SqliteConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    #[tracing::instrument(skip(self, params), fields(path = %params.database))]
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Connection>> {
        params.validate()?;
        let conn = SqliteConnection::open(&params.database, self.create_if_missing)?;
        tracing::debug!("SQLite connection established");
        Ok(Arc::new(conn))
    }
}
