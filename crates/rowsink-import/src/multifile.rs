//! Sequential multi-source import driver
//!
//! Runs each source's import to completion before starting the next, over a
//! single shared connection. Foreign-key/trigger deactivation wraps the
//! whole batch rather than each source, and reactivation is attempted even
//! when an import in the middle fails.

use crate::definition::ImportDefinition;
use crate::error::Result;
use crate::mapping::ColumnMapping;
use crate::progress::{CancelToken, NoopProgress, ProgressListener};
use crate::source::RowSource;
use crate::worker::{ImportOutcome, ImportWorker};
use rowsink_core::ConnectionFactory;
use rowsink_dialects::dialect_for;
use std::sync::Arc;

pub struct MultiSourceImport<'a> {
    definition: &'a ImportDefinition,
    mapping: &'a ColumnMapping,
    listener: Arc<dyn ProgressListener>,
    cancel: CancelToken,
}

impl<'a> MultiSourceImport<'a> {
    pub fn new(definition: &'a ImportDefinition, mapping: &'a ColumnMapping) -> Result<Self> {
        definition.validate()?;
        Ok(Self {
            definition,
            mapping,
            listener: Arc::new(NoopProgress),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Import every source in order. Returns one outcome per completed
    /// source; cancellation between sources truncates the list.
    pub async fn run(
        &self,
        factory: &dyn ConnectionFactory,
        sources: &mut [Box<dyn RowSource>],
    ) -> Result<Vec<ImportOutcome>> {
        let dialect = dialect_for(self.definition.vendor);
        let table = self.definition.table.clone();
        let conn = factory.connect(&self.definition.connection).await?;

        let mut constraints_disabled = false;
        if self.definition.deactivate_constraints {
            dialect
                .disable_constraints(conn.as_ref(), &[table.clone()])
                .await?;
            constraints_disabled = true;
        }

        let total = sources.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut failure = None;
        for (index, source) in sources.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!(remaining = total - index, "cancelled between sources");
                break;
            }
            let worker = match ImportWorker::new(self.definition, self.mapping) {
                Ok(worker) => worker
                    .without_constraint_management()
                    .with_listener(Arc::clone(&self.listener))
                    .with_cancel_token(self.cancel.clone()),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            match worker.run_on_connection(conn.as_ref(), source.as_mut()).await {
                Ok(outcome) => {
                    let stop = outcome.cancelled;
                    outcomes.push(outcome);
                    if stop {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(source_index = index, error = %e, "source import failed");
                    failure = Some(e);
                    break;
                }
            }
        }

        // Reactivation runs even when an import failed; its own failure is
        // logged and never masks the original error.
        if constraints_disabled {
            if let Err(e) = dialect.enable_constraints(conn.as_ref(), &[table.clone()]).await {
                tracing::error!(error = %e, table = %table, "constraint reactivation failed");
            }
        }
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "failed to close connection");
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ImportMode;
    use crate::source::MemoryRowSource;
    use rowsink_core::{ConnectionParams, Value, Vendor};
    use rowsink_driver_sqlite::SqliteConnectionFactory;

    #[tokio::test]
    async fn test_sources_share_one_connection_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.db");
        let definition = ImportDefinition::new(
            ConnectionParams::file(Vendor::Sqlite, path.to_string_lossy().to_string()),
            "events",
            ImportMode::Insert,
        )
        .with_create_table();
        let mut mapping = ColumnMapping::new();
        mapping.insert("id", "id", None).unwrap();
        let mut sources: Vec<Box<dyn RowSource>> = vec![
            Box::new(MemoryRowSource::from_rows([
                [("id", Value::Int(1))],
                [("id", Value::Int(2))],
            ])),
            Box::new(MemoryRowSource::from_rows([[("id", Value::Int(3))]])),
        ];
        let factory = SqliteConnectionFactory::create_if_missing();
        let driver = MultiSourceImport::new(&definition, &mapping).unwrap();
        let outcomes = driver.run(&factory, &mut sources).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.success));
        assert_eq!(outcomes[0].statistics.rows_inserted, 2);
        assert_eq!(outcomes[1].statistics.rows_inserted, 1);
        // The second source ran against the table the first one created
        assert_eq!(outcomes[1].statistics.destination_row_count, 3);
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.db");
        let definition = ImportDefinition::new(
            ConnectionParams::file(Vendor::Sqlite, path.to_string_lossy().to_string()),
            "events",
            ImportMode::Insert,
        )
        .with_create_table();
        let mut mapping = ColumnMapping::new();
        mapping.insert("id", "id", None).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let mut sources: Vec<Box<dyn RowSource>> = vec![
            Box::new(MemoryRowSource::from_rows([[("id", Value::Int(1))]])),
            Box::new(MemoryRowSource::from_rows([[("id", Value::Int(2))]])),
        ];
        let factory = SqliteConnectionFactory::create_if_missing();
        let driver = MultiSourceImport::new(&definition, &mapping)
            .unwrap()
            .with_cancel_token(token);
        let outcomes = driver.run(&factory, &mut sources).await.unwrap();
        assert!(outcomes.is_empty());
    }
}
