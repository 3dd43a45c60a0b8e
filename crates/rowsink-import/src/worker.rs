//! The import orchestrator
//!
//! One worker owns one connection and runs the state sequence: connect,
//! deactivate constraints, create table if missing, resolve the mapping,
//! clear (full-replace), load, stage-and-merge or direct-insert, commit or
//! roll back, reactivate constraints, drop staging, collect statistics.
//! Every transactional resource is removed on every exit path.

use crate::definition::{ImportDefinition, ImportMode, KeyColumn};
use crate::error::{ImportError, Result};
use crate::mapping::ColumnMapping;
use crate::merge::{MergeExecutor, MergeSpec};
use crate::progress::{CancelToken, ImportPhase, NoopProgress, ProgressListener};
use crate::row_by_row::RowByRowWorker;
use crate::source::RowSource;
use crate::staging::{SEQUENCE_COLUMN, StagingEngine};
use crate::statistics::ImportStatistics;
use indexmap::IndexMap;
use rowsink_core::{Connection, ConnectionFactory, DbColumnType, Value};
use rowsink_dialects::{Dialect, cap_identifier, dialect_for, is_safe_identifier};
use std::sync::Arc;

/// Result of one import run
#[derive(Debug)]
pub struct ImportOutcome {
    pub success: bool,
    /// The run was cut short cooperatively; non-fatal
    pub cancelled: bool,
    pub statistics: ImportStatistics,
}

/// One destination column with its source property and target type
struct LoadColumn {
    destination: String,
    source_property: String,
    column_type: DbColumnType,
}

struct PipelineResult {
    committed: bool,
    cancelled: bool,
}

pub struct ImportWorker<'a> {
    definition: &'a ImportDefinition,
    mapping: &'a ColumnMapping,
    listener: Arc<dyn ProgressListener>,
    cancel: CancelToken,
    manage_constraints: bool,
}

impl<'a> ImportWorker<'a> {
    /// Build a worker; the definition is validated up front, before any
    /// connection is opened.
    pub fn new(definition: &'a ImportDefinition, mapping: &'a ColumnMapping) -> Result<Self> {
        definition.validate()?;
        if mapping.is_empty() {
            return Err(ImportError::Definition("empty column mapping".into()));
        }
        Ok(Self {
            definition,
            mapping,
            listener: Arc::new(NoopProgress),
            cancel: CancelToken::new(),
            manage_constraints: true,
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

    /// Used by the multi-source driver, which owns the constraint envelope
    pub(crate) fn without_constraint_management(mut self) -> Self {
        self.manage_constraints = false;
        self
    }

    /// Connect through the factory and run the import
    pub async fn run(
        &self,
        factory: &dyn ConnectionFactory,
        source: &mut dyn RowSource,
    ) -> Result<ImportOutcome> {
        let dialect = dialect_for(self.definition.vendor);
        if !dialect.supports_staging() {
            let worker = RowByRowWorker::new(self.definition, self.mapping)?
                .with_listener(Arc::clone(&self.listener))
                .with_cancel_token(self.cancel.clone());
            return worker.run(factory, source).await;
        }
        self.listener.on_phase(ImportPhase::Connecting);
        let conn = factory.connect(&self.definition.connection).await?;
        let outcome = self.run_on_connection(conn.as_ref(), source).await;
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "failed to close connection");
        }
        outcome
    }

    /// Run against an already-open connection (shared by the multi-source
    /// driver). The connection's transaction state is owned by this call.
    pub async fn run_on_connection(
        &self,
        conn: &dyn Connection,
        source: &mut dyn RowSource,
    ) -> Result<ImportOutcome> {
        let dialect = dialect_for(self.definition.vendor);
        if !dialect.supports_staging() {
            let worker = RowByRowWorker::new(self.definition, self.mapping)?
                .with_listener(Arc::clone(&self.listener))
                .with_cancel_token(self.cancel.clone());
            return worker.run_on_connection(conn, source).await;
        }
        let table = self.definition.table.as_str();
        let mut stats = ImportStatistics::new();
        tracing::info!(
            run_id = %stats.run_id,
            table = %table,
            vendor = %self.definition.vendor,
            mode = ?self.definition.mode,
            "import starting"
        );
        conn.set_auto_commit(false).await?;

        let mut constraints_disabled = false;
        if self.manage_constraints && self.definition.deactivate_constraints {
            self.listener.on_phase(ImportPhase::DeactivatingConstraints);
            dialect
                .disable_constraints(conn, &[table.to_string()])
                .await?;
            constraints_disabled = true;
        }

        let result = self.run_pipeline(conn, dialect, source, &mut stats).await;

        // Cleanup runs on every exit path. Failures here are logged and
        // never mask the pipeline result.
        self.listener.on_phase(ImportPhase::CleaningUp);
        if result.is_err() {
            if let Err(e) = conn.rollback().await {
                tracing::warn!(error = %e, "rollback after failure also failed");
            }
        }
        // Cleanup statements persist immediately; the transaction envelope
        // ended with the pipeline's commit or rollback.
        if let Err(e) = conn.set_auto_commit(true).await {
            tracing::warn!(error = %e, "could not restore autocommit for cleanup");
        }
        if constraints_disabled {
            if let Err(e) = dialect.enable_constraints(conn, &[table.to_string()]).await {
                tracing::error!(error = %e, table = %table, "constraint reactivation failed");
            }
        }
        let engine = StagingEngine::new(conn, dialect);
        engine
            .drop_staging(&engine.staging_table_name(table))
            .await;

        match conn.query_count(
            &format!(
                "SELECT COUNT(*) FROM {}",
                dialect.escape_identifier(table)
            ),
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

        let pipeline = result?;
        stats.log_summary(table);
        self.listener.on_phase(ImportPhase::Complete);
        Ok(ImportOutcome {
            success: pipeline.committed && !pipeline.cancelled,
            cancelled: pipeline.cancelled,
            statistics: stats,
        })
    }

    async fn run_pipeline(
        &self,
        conn: &dyn Connection,
        dialect: &'static dyn Dialect,
        source: &mut dyn RowSource,
        stats: &mut ImportStatistics,
    ) -> Result<PipelineResult> {
        let definition = self.definition;
        let table = definition.table.as_str();
        let keys = definition.parsed_keys()?;

        self.listener.on_phase(ImportPhase::CreatingTable);
        if !dialect.table_exists(conn, table).await? {
            if !definition.create_table_if_missing {
                return Err(ImportError::Definition(format!(
                    "destination table {} does not exist",
                    table
                )));
            }
            self.create_destination_table(conn, dialect, source, &keys)
                .await?;
        }

        self.listener.on_phase(ImportPhase::ResolvingMapping);
        let dest_columns = dialect.table_columns(conn, table).await?;
        self.mapping.validate(&dest_columns, &keys)?;
        let load_columns = self.resolve_load_columns(&dest_columns);

        if definition.mode == ImportMode::ClearInsert {
            self.listener.on_phase(ImportPhase::ClearingTable);
            let count_sql = format!(
                "SELECT COUNT(*) FROM {}",
                dialect.escape_identifier(table)
            );
            stats.rows_deleted = conn.query_count(&count_sql, &[]).await?.max(0) as u64;
            let has_auto_increment = dest_columns.values().any(|ty| ty.auto_increment);
            for sql in dialect.clear_table_sql(table, has_auto_increment) {
                conn.execute(&sql, &[]).await?;
            }
        }

        // Fast path: plain inserts need no staging table
        if keys.is_empty()
            && matches!(definition.mode, ImportMode::ClearInsert | ImportMode::Insert)
        {
            self.listener.on_phase(ImportPhase::LoadingRows);
            let cancelled = self
                .load_rows(conn, dialect, source, table, &load_columns, true, stats)
                .await?;
            stats.rows_inserted = stats.rows_valid;
            return self.finalize(conn, stats, cancelled, false).await;
        }

        let engine = StagingEngine::new(conn, dialect);
        let staging = engine.create_staging_table(table).await?;

        if definition.create_new_index_if_needed && !keys.is_empty() {
            let key_names: Vec<String> = keys.iter().map(|k| k.name.clone()).collect();
            // An unknown probe result must not block index creation
            let known = dialect.index_exists(conn, table, &key_names).await?;
            if known != Some(true) {
                let index = cap_identifier(
                    &format!("ix_{}_keys", dialect.unescape_identifier(table)),
                    dialect.max_identifier_length(),
                );
                if dialect.requires_commit_before_ddl() {
                    conn.commit().await?;
                }
                let sql = dialect.create_index_sql(&index, table, &key_names);
                conn.execute(&sql, &[]).await?;
                stats.created_index = Some(index);
            }
        }

        self.listener.on_phase(ImportPhase::LoadingRows);
        let cancelled = self
            .load_rows(conn, dialect, source, &staging, &load_columns, false, stats)
            .await?;
        if cancelled {
            return self.finalize(conn, stats, true, false).await;
        }

        let data_columns: Vec<String> = load_columns
            .iter()
            .map(|c| c.destination.clone())
            .collect();
        let resolution = definition.duplicate_mode.resolution();
        let needs_sequence = resolution.is_some()
            || matches!(definition.mode, ImportMode::Update | ImportMode::Upsert);
        if needs_sequence {
            self.listener.on_phase(ImportPhase::ResolvingDuplicates);
            engine.assign_sequence(&staging, &data_columns).await?;
        }
        if let Some(resolution) = resolution {
            stats.duplicates_removed = engine
                .resolve_duplicates(
                    &staging,
                    &data_columns,
                    &keys,
                    resolution,
                    definition.update_with_null_values,
                )
                .await?;
        }
        if definition.duplicate_mode.checks_against_destination()
            && definition.mode == ImportMode::Insert
        {
            stats.duplicates_removed += engine
                .purge_existing_keys(&staging, table, &keys)
                .await?;
        }

        self.listener.on_phase(ImportPhase::Merging);
        let executor = MergeExecutor::new(conn, dialect);
        let spec = MergeSpec {
            source_table: &staging,
            destination_table: table,
            columns: &data_columns,
            key_columns: &keys,
            sequence_column: SEQUENCE_COLUMN,
            update_with_null_values: definition.update_with_null_values,
            additional_insert_values: &definition.additional_insert_values,
            additional_update_values: &definition.additional_update_values,
        };
        match definition.mode {
            ImportMode::ClearInsert | ImportMode::Insert => {
                stats.rows_inserted = executor.insert_not_existing(&spec).await?;
            }
            ImportMode::Update => {
                stats.rows_updated = self.run_update(&executor, &spec).await?;
            }
            ImportMode::Upsert => {
                stats.rows_updated = self.run_update(&executor, &spec).await?;
                stats.rows_inserted = executor.insert_not_existing(&spec).await?;
            }
        }

        self.finalize(conn, stats, false, true).await
    }

    async fn run_update(
        &self,
        executor: &MergeExecutor<'_>,
        spec: &MergeSpec<'_>,
    ) -> Result<u64> {
        if self.definition.duplicate_mode.updates_first_only() {
            executor.update_first_existing(spec).await
        } else {
            executor.update_all_existing(spec).await
        }
    }

    /// Commit or roll back per the configured discipline. `pending_work`
    /// marks statements issued since the last incremental commit.
    async fn finalize(
        &self,
        conn: &dyn Connection,
        stats: &ImportStatistics,
        cancelled: bool,
        pending_work: bool,
    ) -> Result<PipelineResult> {
        self.listener.on_phase(ImportPhase::Committing);
        if self.definition.commit_on_full_success_only {
            if cancelled || stats.rows_invalid > 0 {
                conn.rollback().await?;
                if stats.rows_invalid > 0 {
                    tracing::warn!(
                        invalid = stats.rows_invalid,
                        "rolled back: import fails as a unit"
                    );
                }
                return Ok(PipelineResult {
                    committed: false,
                    cancelled,
                });
            }
            conn.commit().await?;
            return Ok(PipelineResult {
                committed: true,
                cancelled: false,
            });
        }
        if pending_work {
            conn.commit().await?;
        }
        Ok(PipelineResult {
            committed: true,
            cancelled,
        })
    }

    /// The mapped columns in mapping order, joined with their destination
    /// column types
    fn resolve_load_columns(
        &self,
        dest_columns: &IndexMap<String, DbColumnType>,
    ) -> Vec<LoadColumn> {
        self.mapping
            .iter()
            .filter_map(|(destination, mapped)| {
                dest_columns
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(destination))
                    .map(|(name, ty)| LoadColumn {
                        destination: name.clone(),
                        source_property: mapped.source_property.clone(),
                        column_type: ty.clone(),
                    })
            })
            .collect()
    }

    async fn create_destination_table(
        &self,
        conn: &dyn Connection,
        dialect: &'static dyn Dialect,
        source: &mut dyn RowSource,
        keys: &[KeyColumn],
    ) -> Result<()> {
        let definition = self.definition;
        let mut columns: IndexMap<String, DbColumnType> =
            if let Some(explicit) = &definition.explicit_columns {
                explicit.clone()
            } else {
                let scanned = source.scan_property_types(self.mapping)?;
                let mut derived = IndexMap::new();
                for (destination, mapped) in self.mapping.iter() {
                    if !is_safe_identifier(destination) {
                        return Err(ImportError::Definition(format!(
                            "cannot create a column named {}",
                            destination
                        )));
                    }
                    let ty = scanned
                        .iter()
                        .find(|(property, _)| {
                            property.eq_ignore_ascii_case(&mapped.source_property)
                        })
                        .map(|(_, ty)| ty.clone())
                        .unwrap_or_else(|| {
                            DbColumnType::new(rowsink_core::SimpleColumnType::String)
                        });
                    derived.insert(destination.to_string(), ty);
                }
                derived
            };
        let key_names: Vec<String> = keys.iter().map(|k| k.name.clone()).collect();
        for key in &key_names {
            if let Some((_, ty)) = columns
                .iter_mut()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
            {
                ty.nullable = false;
            }
        }
        if dialect.requires_commit_before_ddl() {
            conn.commit().await?;
        }
        let sql = dialect.create_table_sql(&definition.table, &columns, &key_names);
        tracing::info!(table = %definition.table, "creating destination table");
        conn.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Stream rows from the source into `target` in batches. Returns whether
    /// the run was cancelled. Invalid rows are recorded, never loaded.
    #[allow(clippy::too_many_arguments)]
    async fn load_rows(
        &self,
        conn: &dyn Connection,
        dialect: &'static dyn Dialect,
        source: &mut dyn RowSource,
        target: &str,
        load_columns: &[LoadColumn],
        include_extras: bool,
        stats: &mut ImportStatistics,
    ) -> Result<bool> {
        let definition = self.definition;
        let mut columns: Vec<String> = load_columns
            .iter()
            .map(|c| dialect.escape_identifier(&c.destination))
            .collect();
        let mut values: Vec<String> = (1..=load_columns.len())
            .map(|i| dialect.placeholder(i))
            .collect();
        if include_extras {
            for extra in &definition.additional_insert_values {
                columns.push(dialect.escape_identifier(&extra.column));
                values.push(extra.expression.clone());
            }
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.escape_identifier(target),
            columns.join(", "),
            values.join(", ")
        );

        let total = source.items_to_import();
        let mut batch: Vec<Vec<Value>> = Vec::with_capacity(definition.batch_size);
        let mut batch_rows: Vec<u64> = Vec::with_capacity(definition.batch_size);
        let mut row_index: u64 = 0;
        let mut cancelled = false;

        while let Some(item) = source.next_item().await? {
            stats.rows_read += 1;
            match self.convert_row(&item, load_columns) {
                Ok(params) => {
                    batch.push(params);
                    batch_rows.push(row_index);
                }
                Err(reason) => {
                    tracing::debug!(row = row_index, reason = %reason, "row rejected");
                    stats.record_invalid(row_index, reason);
                }
            }
            row_index += 1;

            if batch.len() >= definition.batch_size {
                self.flush_batch(conn, &sql, &mut batch, &mut batch_rows, stats)
                    .await?;
                self.listener.on_progress(stats.rows_read, total);
                // Cancellation lets the running batch finish, then skips the
                // remaining rows
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
            }
        }
        if !batch.is_empty() {
            self.flush_batch(conn, &sql, &mut batch, &mut batch_rows, stats)
                .await?;
        }
        self.listener.on_progress(stats.rows_read, total);
        if cancelled {
            tracing::info!(rows_read = stats.rows_read, "import cancelled between batches");
        }
        Ok(cancelled)
    }

    async fn flush_batch(
        &self,
        conn: &dyn Connection,
        sql: &str,
        batch: &mut Vec<Vec<Value>>,
        batch_rows: &mut Vec<u64>,
        stats: &mut ImportStatistics,
    ) -> Result<()> {
        let result = conn.execute_batch(sql, batch).await?;
        stats.rows_valid += result.applied;
        for failure in &result.failures {
            let row = batch_rows.get(failure.index).copied().unwrap_or_default();
            stats.record_invalid(row, failure.message.clone());
        }
        if !self.definition.commit_on_full_success_only {
            conn.commit().await?;
        }
        batch.clear();
        batch_rows.clear();
        Ok(())
    }

    fn convert_row(
        &self,
        item: &IndexMap<String, Value>,
        load_columns: &[LoadColumn],
    ) -> std::result::Result<Vec<Value>, String> {
        let mut params = Vec::with_capacity(load_columns.len());
        for column in load_columns {
            let raw = item
                .iter()
                .find(|(property, _)| property.eq_ignore_ascii_case(&column.source_property))
                .map(|(_, value)| value)
                .unwrap_or(&Value::Null);
            let converted = self
                .mapping
                .convert(&column.destination, raw, &column.column_type)
                .map_err(|reason| format!("column {}: {}", column.destination, reason))?;
            params.push(converted);
        }
        Ok(params)
    }
}
