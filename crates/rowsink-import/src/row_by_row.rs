//! Row-by-row import for backends without staging support
//!
//! Wide-column stores cannot host the staging pipeline (no temp tables, no
//! bookkeeping ALTERs). This worker probes each row's key, batches pending
//! INSERTs and UPDATEs separately, and detects collisions against
//! not-yet-flushed inserts through an in-memory key set — on collision the
//! pending batch is flushed so the new rows become visible before the
//! conflicting row is treated as an update.
//!
//! This is strictly weaker than the staging algorithm (no trailing-duplicate
//! winner selection across the whole source); unsupported configurations are
//! rejected at construction.

use crate::definition::{DuplicateMode, ImportDefinition, ImportMode};
use crate::error::{ImportError, Result};
use crate::mapping::ColumnMapping;
use crate::progress::{CancelToken, ImportPhase, NoopProgress, ProgressListener};
use crate::source::RowSource;
use crate::statistics::ImportStatistics;
use crate::worker::ImportOutcome;
use indexmap::IndexMap;
use rowsink_core::{Connection, ConnectionFactory, DbColumnType, Value};
use rowsink_dialects::{Dialect, dialect_for};
use std::collections::HashSet;
use std::sync::Arc;

pub struct RowByRowWorker<'a> {
    definition: &'a ImportDefinition,
    mapping: &'a ColumnMapping,
    listener: Arc<dyn ProgressListener>,
    cancel: CancelToken,
}

struct Statements {
    insert_sql: String,
    update_sql: Option<String>,
    probe_sql: String,
    /// Positions of key columns within the converted parameter row
    key_positions: Vec<usize>,
    /// Positions of non-key columns within the converted parameter row
    data_positions: Vec<usize>,
}

impl<'a> RowByRowWorker<'a> {
    /// Build a worker, rejecting configurations the row-by-row algorithm
    /// cannot honor.
    pub fn new(definition: &'a ImportDefinition, mapping: &'a ColumnMapping) -> Result<Self> {
        definition.validate()?;
        if mapping.is_empty() {
            return Err(ImportError::Definition("empty column mapping".into()));
        }
        if definition.duplicate_mode != DuplicateMode::UpdateAllJoin {
            return Err(ImportError::NotSupported(format!(
                "row-by-row imports only support update_all_join duplicate handling, got {:?}",
                definition.duplicate_mode
            )));
        }
        if !definition.update_with_null_values {
            return Err(ImportError::NotSupported(
                "row-by-row imports cannot skip NULL values on update".into(),
            ));
        }
        if definition.commit_on_full_success_only {
            return Err(ImportError::NotSupported(
                "row-by-row imports cannot guarantee all-or-nothing commits".into(),
            ));
        }
        for key in definition.parsed_keys()? {
            if key.function.is_some() {
                return Err(ImportError::NotSupported(format!(
                    "function-wrapped key column {} is not supported row by row",
                    key.name
                )));
            }
        }
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

    pub async fn run(
        &self,
        factory: &dyn ConnectionFactory,
        source: &mut dyn RowSource,
    ) -> Result<ImportOutcome> {
        self.listener.on_phase(ImportPhase::Connecting);
        let conn = factory.connect(&self.definition.connection).await?;
        let outcome = self.run_on_connection(conn.as_ref(), source).await;
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "failed to close connection");
        }
        outcome
    }

    pub async fn run_on_connection(
        &self,
        conn: &dyn Connection,
        source: &mut dyn RowSource,
    ) -> Result<ImportOutcome> {
        let definition = self.definition;
        let dialect = dialect_for(definition.vendor);
        let table = definition.table.as_str();
        let mut stats = ImportStatistics::new();
        let keys = definition.parsed_keys()?;
        let key_names: Vec<String> = keys.iter().map(|k| k.name.clone()).collect();

        self.listener.on_phase(ImportPhase::CreatingTable);
        if !dialect.table_exists(conn, table).await? {
            if !definition.create_table_if_missing {
                return Err(ImportError::Definition(format!(
                    "destination table {} does not exist",
                    table
                )));
            }
            let scanned = source.scan_property_types(self.mapping)?;
            let mut columns: IndexMap<String, DbColumnType> = IndexMap::new();
            for (destination, mapped) in self.mapping.iter() {
                let ty = scanned
                    .iter()
                    .find(|(property, _)| property.eq_ignore_ascii_case(&mapped.source_property))
                    .map(|(_, ty)| ty.clone())
                    .unwrap_or_else(|| DbColumnType::new(rowsink_core::SimpleColumnType::String));
                columns.insert(destination.to_string(), ty);
            }
            let sql = dialect.create_table_sql(table, &columns, &key_names);
            conn.execute(&sql, &[]).await?;
        }

        self.listener.on_phase(ImportPhase::ResolvingMapping);
        let dest_columns = dialect.table_columns(conn, table).await?;
        self.mapping.validate(&dest_columns, &keys)?;
        let load_columns: Vec<(String, String, DbColumnType)> = self
            .mapping
            .iter()
            .filter_map(|(destination, mapped)| {
                dest_columns
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(destination))
                    .map(|(name, ty)| {
                        (name.clone(), mapped.source_property.clone(), ty.clone())
                    })
            })
            .collect();
        let statements = self.build_statements(dialect, &load_columns, &key_names)?;

        if definition.mode == ImportMode::ClearInsert {
            self.listener.on_phase(ImportPhase::ClearingTable);
            for sql in dialect.clear_table_sql(table, false) {
                conn.execute(&sql, &[]).await?;
            }
        }

        self.listener.on_phase(ImportPhase::LoadingRows);
        let cancelled = self
            .load(conn, source, &load_columns, &statements, &mut stats)
            .await?;

        self.listener.on_phase(ImportPhase::Committing);
        conn.commit().await?;

        match conn
            .query_count(
                &format!("SELECT COUNT(*) FROM {}", dialect.escape_identifier(table)),
                &[],
            )
            .await
        {
            Ok(count) => stats.destination_row_count = count.max(0) as u64,
            Err(e) => tracing::warn!(error = %e, "could not count destination rows"),
        }
        stats.bytes_read = source.bytes_read();
        if let Err(e) = source.close().await {
            tracing::warn!(error = %e, "row source close failed");
        }
        stats.log_summary(table);
        self.listener.on_phase(ImportPhase::Complete);
        Ok(ImportOutcome {
            success: !cancelled,
            cancelled,
            statistics: stats,
        })
    }

    fn build_statements(
        &self,
        dialect: &'static dyn Dialect,
        load_columns: &[(String, String, DbColumnType)],
        key_names: &[String],
    ) -> Result<Statements> {
        let table = dialect.escape_identifier(&self.definition.table);
        let columns: Vec<String> = load_columns
            .iter()
            .map(|(name, _, _)| dialect.escape_identifier(name))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len())
            .map(|i| dialect.placeholder(i))
            .collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let key_positions: Vec<usize> = key_names
            .iter()
            .map(|key| {
                load_columns
                    .iter()
                    .position(|(name, _, _)| name.eq_ignore_ascii_case(key))
                    .ok_or_else(|| {
                        ImportError::Definition(format!("key column {} is not mapped", key))
                    })
            })
            .collect::<Result<_>>()?;
        let data_positions: Vec<usize> = (0..load_columns.len())
            .filter(|i| !key_positions.contains(i))
            .collect();

        let mut probe_conditions = Vec::new();
        for (i, position) in key_positions.iter().enumerate() {
            probe_conditions.push(format!(
                "{} = {}",
                dialect.escape_identifier(&load_columns[*position].0),
                dialect.placeholder(i + 1)
            ));
        }
        let probe_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            table,
            probe_conditions.join(" AND ")
        );

        let update_sql = if data_positions.is_empty() {
            None
        } else {
            let mut assignments = Vec::new();
            let mut index = 0;
            for position in &data_positions {
                index += 1;
                assignments.push(format!(
                    "{} = {}",
                    dialect.escape_identifier(&load_columns[*position].0),
                    dialect.placeholder(index)
                ));
            }
            let mut conditions = Vec::new();
            for position in &key_positions {
                index += 1;
                conditions.push(format!(
                    "{} = {}",
                    dialect.escape_identifier(&load_columns[*position].0),
                    dialect.placeholder(index)
                ));
            }
            Some(format!(
                "UPDATE {} SET {} WHERE {}",
                table,
                assignments.join(", "),
                conditions.join(" AND ")
            ))
        };

        Ok(Statements {
            insert_sql,
            update_sql,
            probe_sql,
            key_positions,
            data_positions,
        })
    }

    /// Canonical signature of a row's key values, for the pending-insert set
    fn key_signature(statements: &Statements, params: &[Value]) -> String {
        statements
            .key_positions
            .iter()
            .map(|p| params[*p].to_string())
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }

    async fn load(
        &self,
        conn: &dyn Connection,
        source: &mut dyn RowSource,
        load_columns: &[(String, String, DbColumnType)],
        statements: &Statements,
        stats: &mut ImportStatistics,
    ) -> Result<bool> {
        let definition = self.definition;
        let total = source.items_to_import();
        let mut pending_inserts: Vec<Vec<Value>> = Vec::new();
        let mut pending_insert_rows: Vec<u64> = Vec::new();
        let mut pending_keys: HashSet<String> = HashSet::new();
        let mut pending_updates: Vec<Vec<Value>> = Vec::new();
        let mut pending_update_rows: Vec<u64> = Vec::new();
        let mut row_index: u64 = 0;
        let mut cancelled = false;

        while let Some(item) = source.next_item().await? {
            stats.rows_read += 1;
            let params = match self.convert_row(&item, load_columns) {
                Ok(params) => params,
                Err(reason) => {
                    stats.record_invalid(row_index, reason);
                    row_index += 1;
                    continue;
                }
            };
            let signature = Self::key_signature(statements, &params);
            let key_params: Vec<Value> = statements
                .key_positions
                .iter()
                .map(|p| params[*p].clone())
                .collect();

            // A row colliding with a pending, unflushed insert forces the
            // flush so the earlier rows become visible first.
            if pending_keys.contains(&signature) {
                self.flush_inserts(
                    conn,
                    statements,
                    &mut pending_inserts,
                    &mut pending_insert_rows,
                    &mut pending_keys,
                    stats,
                )
                .await?;
            }

            let exists = conn.query_count(&statements.probe_sql, &key_params).await? > 0;
            if exists {
                let permits_update =
                    matches!(definition.mode, ImportMode::Update | ImportMode::Upsert);
                if permits_update && statements.update_sql.is_some() {
                    let mut update_params: Vec<Value> = statements
                        .data_positions
                        .iter()
                        .map(|p| params[*p].clone())
                        .collect();
                    update_params.extend(key_params);
                    pending_updates.push(update_params);
                    pending_update_rows.push(row_index);
                }
            } else {
                let permits_insert = matches!(
                    definition.mode,
                    ImportMode::Insert | ImportMode::ClearInsert | ImportMode::Upsert
                );
                if permits_insert {
                    pending_keys.insert(signature);
                    pending_inserts.push(params);
                    pending_insert_rows.push(row_index);
                }
            }
            row_index += 1;

            if pending_inserts.len() >= definition.batch_size {
                self.flush_inserts(
                    conn,
                    statements,
                    &mut pending_inserts,
                    &mut pending_insert_rows,
                    &mut pending_keys,
                    stats,
                )
                .await?;
                self.listener.on_progress(stats.rows_read, total);
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
            }
            if pending_updates.len() >= definition.batch_size {
                self.flush_updates(
                    conn,
                    statements,
                    &mut pending_updates,
                    &mut pending_update_rows,
                    stats,
                )
                .await?;
                self.listener.on_progress(stats.rows_read, total);
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
            }
        }

        self.flush_inserts(
            conn,
            statements,
            &mut pending_inserts,
            &mut pending_insert_rows,
            &mut pending_keys,
            stats,
        )
        .await?;
        self.flush_updates(
            conn,
            statements,
            &mut pending_updates,
            &mut pending_update_rows,
            stats,
        )
        .await?;
        self.listener.on_progress(stats.rows_read, total);
        Ok(cancelled)
    }

    async fn flush_inserts(
        &self,
        conn: &dyn Connection,
        statements: &Statements,
        batch: &mut Vec<Vec<Value>>,
        batch_rows: &mut Vec<u64>,
        pending_keys: &mut HashSet<String>,
        stats: &mut ImportStatistics,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let result = conn.execute_batch(&statements.insert_sql, batch).await?;
        stats.rows_inserted += result.applied;
        stats.rows_valid += result.applied;
        for failure in &result.failures {
            let row = batch_rows.get(failure.index).copied().unwrap_or_default();
            stats.record_invalid(row, failure.message.clone());
        }
        conn.commit().await?;
        batch.clear();
        batch_rows.clear();
        pending_keys.clear();
        Ok(())
    }

    async fn flush_updates(
        &self,
        conn: &dyn Connection,
        statements: &Statements,
        batch: &mut Vec<Vec<Value>>,
        batch_rows: &mut Vec<u64>,
        stats: &mut ImportStatistics,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let Some(update_sql) = &statements.update_sql else {
            batch.clear();
            batch_rows.clear();
            return Ok(());
        };
        let result = conn.execute_batch(update_sql, batch).await?;
        stats.rows_updated += result.applied;
        stats.rows_valid += result.applied;
        for failure in &result.failures {
            let row = batch_rows.get(failure.index).copied().unwrap_or_default();
            stats.record_invalid(row, failure.message.clone());
        }
        conn.commit().await?;
        batch.clear();
        batch_rows.clear();
        Ok(())
    }

    fn convert_row(
        &self,
        item: &IndexMap<String, Value>,
        load_columns: &[(String, String, DbColumnType)],
    ) -> std::result::Result<Vec<Value>, String> {
        let mut params = Vec::with_capacity(load_columns.len());
        for (destination, source_property, column_type) in load_columns {
            let raw = item
                .iter()
                .find(|(property, _)| property.eq_ignore_ascii_case(source_property))
                .map(|(_, value)| value)
                .unwrap_or(&Value::Null);
            let converted = self
                .mapping
                .convert(destination, raw, column_type)
                .map_err(|reason| format!("column {}: {}", destination, reason))?;
            params.push(converted);
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ImportMode;
    use rowsink_core::{ConnectionParams, Vendor};

    fn definition(mode: ImportMode) -> ImportDefinition {
        ImportDefinition::new(
            ConnectionParams::server(Vendor::Cassandra, "node1", "analytics"),
            "analytics.events",
            mode,
        )
        .with_key_columns(["id"])
        .with_duplicate_mode(DuplicateMode::UpdateAllJoin)
    }

    fn mapping() -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        mapping.insert("id", "id", None).unwrap();
        mapping.insert("payload", "payload", None).unwrap();
        mapping
    }

    #[test]
    fn test_accepts_update_all_join_only() {
        let mapping = mapping();
        let good = definition(ImportMode::Upsert);
        assert!(RowByRowWorker::new(&good, &mapping).is_ok());

        let bad = definition(ImportMode::Upsert).with_duplicate_mode(DuplicateMode::UpdateAllDrop);
        assert!(matches!(
            RowByRowWorker::new(&bad, &mapping),
            Err(ImportError::NotSupported(_))
        ));
    }

    #[test]
    fn test_rejects_null_skipping_updates() {
        let mapping = mapping();
        let bad = definition(ImportMode::Upsert).with_update_with_null_values(false);
        assert!(matches!(
            RowByRowWorker::new(&bad, &mapping),
            Err(ImportError::NotSupported(_))
        ));
    }

    #[test]
    fn test_rejects_all_or_nothing_commits() {
        let mapping = mapping();
        let bad = definition(ImportMode::Upsert).with_commit_on_full_success_only(true);
        assert!(matches!(
            RowByRowWorker::new(&bad, &mapping),
            Err(ImportError::NotSupported(_))
        ));
    }

    #[test]
    fn test_rejects_function_wrapped_keys() {
        let mapping = mapping();
        let bad = definition(ImportMode::Upsert).with_key_columns(["UPPER(id)"]);
        assert!(matches!(
            RowByRowWorker::new(&bad, &mapping),
            Err(ImportError::NotSupported(_))
        ));
    }
}
