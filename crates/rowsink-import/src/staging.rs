//! Staging table engine and duplicate resolution
//!
//! The engine materializes a deterministic ordering over staged rows through
//! an indexed sequence column, marks each duplicate group's winner (the
//! minimum sequence value, written to a second indexed column), and collapses
//! groups by dropping losers or merging them into the winner.

use crate::definition::{DuplicateResolution, KeyColumn};
use crate::error::Result;
use crate::merge::{MergeExecutor, MergeSpec};
use indexmap::IndexMap;
use rowsink_core::{Connection, DbColumnType, SimpleColumnType};
use rowsink_dialects::{Dialect, SequencePopulation, cap_identifier};

/// Monotonic per-row sequence column added to every staging table
pub const SEQUENCE_COLUMN: &str = "imp_seq";

/// Per-row group-minimum column; the single source of truth for which row
/// wins a duplicate group
pub const GROUP_COLUMN: &str = "imp_grp";

pub struct StagingEngine<'a> {
    conn: &'a dyn Connection,
    dialect: &'static dyn Dialect,
}

impl<'a> StagingEngine<'a> {
    pub fn new(conn: &'a dyn Connection, dialect: &'static dyn Dialect) -> Self {
        Self { conn, dialect }
    }

    pub fn staging_table_name(&self, destination: &str) -> String {
        let bare = self.dialect.unescape_identifier(destination);
        cap_identifier(
            &format!("stg_{}", bare),
            self.dialect.max_identifier_length(),
        )
    }

    fn interim_table_name(&self, staging: &str) -> String {
        cap_identifier(
            &format!("{}_dup", staging),
            self.dialect.max_identifier_length(),
        )
    }

    /// PostgreSQL-class backends refuse DDL inside an open transaction;
    /// close out any pending work first.
    async fn commit_before_ddl(&self) -> Result<()> {
        if self.dialect.requires_commit_before_ddl() {
            self.conn.commit().await?;
        }
        Ok(())
    }

    /// Clone `source`'s column shape (no data, no constraints) into `target`
    async fn clone_table_structure(&self, source: &str, target: &str) -> Result<()> {
        self.commit_before_ddl().await?;
        if let Some(sql) = self.dialect.clone_structure_sql(source, target) {
            self.conn.execute(&sql, &[]).await?;
        } else {
            // No CREATE-AS-SELECT on this backend; re-derive the shape from
            // introspected metadata with every constraint relaxed
            let columns: IndexMap<String, DbColumnType> = self
                .dialect
                .table_columns(self.conn, source)
                .await?
                .into_iter()
                .map(|(name, ty)| (name, ty.relaxed()))
                .collect();
            let sql = self.dialect.create_table_sql(target, &columns, &[]);
            self.conn.execute(&sql, &[]).await?;
        }
        Ok(())
    }

    /// Create the staging table for a destination; returns its name. A stale
    /// staging table from a crashed run is dropped first.
    pub async fn create_staging_table(&self, destination: &str) -> Result<String> {
        let staging = self.staging_table_name(destination);
        self.drop_staging(&staging).await;
        self.clone_table_structure(destination, &staging).await?;
        tracing::debug!(staging = %staging, destination = %destination, "staging table created");
        Ok(staging)
    }

    async fn add_indexed_column(&self, table: &str, column: &str) -> Result<()> {
        self.commit_before_ddl().await?;
        let ty = DbColumnType::new(SimpleColumnType::Integer);
        let sql = self.dialect.add_column_sql(table, column, &ty);
        self.conn.execute(&sql, &[]).await?;
        let index = cap_identifier(
            &format!("ix_{}_{}", self.dialect.unescape_identifier(table), column),
            self.dialect.max_identifier_length(),
        );
        let sql = self
            .dialect
            .create_index_sql(&index, table, &[column.to_string()]);
        self.conn.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Add the sequence column and assign a monotonic value to every row
    pub async fn assign_sequence(&self, staging: &str, data_columns: &[String]) -> Result<()> {
        self.add_indexed_column(staging, SEQUENCE_COLUMN).await?;
        let table = self.dialect.escape_identifier(staging);
        let seq = self.dialect.escape_identifier(SEQUENCE_COLUMN);
        match self.dialect.sequence_population() {
            SequencePopulation::Native(expression) => {
                let sql = format!("UPDATE {} SET {} = {}", table, seq, expression);
                self.conn.execute(&sql, &[]).await?;
            }
            SequencePopulation::AutoIncrementOrReinsert => {
                let columns = self.dialect.table_columns(self.conn, staging).await?;
                let auto = columns
                    .iter()
                    .find(|(_, ty)| ty.auto_increment)
                    .map(|(name, _)| name.clone());
                if let Some(auto) = auto {
                    let sql = format!(
                        "UPDATE {} SET {} = {}",
                        table,
                        seq,
                        self.dialect.escape_identifier(&auto)
                    );
                    self.conn.execute(&sql, &[]).await?;
                } else {
                    self.windowed_reinsert(staging, data_columns).await?;
                }
            }
        }
        Ok(())
    }

    /// Re-insert every row with a `ROW_NUMBER() OVER ()` sequence value, then
    /// delete the unnumbered originals.
    async fn windowed_reinsert(&self, staging: &str, data_columns: &[String]) -> Result<()> {
        let table = self.dialect.escape_identifier(staging);
        let seq = self.dialect.escape_identifier(SEQUENCE_COLUMN);
        let cols: Vec<String> = data_columns
            .iter()
            .map(|c| self.dialect.escape_identifier(c))
            .collect();
        let insert = format!(
            "INSERT INTO {} ({}, {}) SELECT {}, ROW_NUMBER() OVER () FROM {} WHERE {} IS NULL",
            table,
            cols.join(", "),
            seq,
            cols.join(", "),
            table,
            seq
        );
        self.conn.execute(&insert, &[]).await?;
        let delete = format!("DELETE FROM {} WHERE {} IS NULL", table, seq);
        self.conn.execute(&delete, &[]).await?;
        Ok(())
    }

    /// Write each key group's minimum sequence value into the group column
    /// of every row in the group.
    pub async fn mark_duplicates(&self, staging: &str, keys: &[KeyColumn]) -> Result<()> {
        self.add_indexed_column(staging, GROUP_COLUMN).await?;
        let table = self.dialect.escape_identifier(staging);
        let grp = self.dialect.escape_identifier(GROUP_COLUMN);
        let seq = self.dialect.escape_identifier(SEQUENCE_COLUMN);
        // MySQL-class backends refuse an UPDATE reading the updated table;
        // route the subquery through a derived table there.
        let source = if self.dialect.wraps_self_reference_subquery() {
            format!("(SELECT * FROM {}) d", table)
        } else {
            format!("{} d", table)
        };
        let executor = MergeExecutor::new(self.conn, self.dialect);
        let sql = format!(
            "UPDATE {} SET {} = (SELECT MIN(d.{}) FROM {} WHERE {})",
            table,
            grp,
            seq,
            source,
            executor.key_equation(keys, "d", &table)
        );
        tracing::debug!(sql = %sql, "marking duplicate groups");
        self.conn.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Delete every row whose sequence differs from its group's minimum;
    /// returns the number of removed duplicates.
    pub async fn drop_losers(&self, staging: &str) -> Result<u64> {
        let table = self.dialect.escape_identifier(staging);
        let sql = format!(
            "DELETE FROM {} WHERE {} <> {}",
            table,
            self.dialect.escape_identifier(SEQUENCE_COLUMN),
            self.dialect.escape_identifier(GROUP_COLUMN)
        );
        Ok(self.conn.execute(&sql, &[]).await?)
    }

    /// Merge each losing row's non-key columns into its group winner, then
    /// delete the losers. `update_with_null_values` controls whether a
    /// loser's NULL may clobber a winner value.
    pub async fn join_duplicates(
        &self,
        staging: &str,
        data_columns: &[String],
        keys: &[KeyColumn],
        update_with_null_values: bool,
    ) -> Result<u64> {
        let interim = self.interim_table_name(staging);
        self.drop_staging(&interim).await;
        self.clone_table_structure(staging, &interim).await?;

        let mut all_columns: Vec<String> = data_columns.to_vec();
        all_columns.push(SEQUENCE_COLUMN.to_string());
        all_columns.push(GROUP_COLUMN.to_string());
        let cols: Vec<String> = all_columns
            .iter()
            .map(|c| self.dialect.escape_identifier(c))
            .collect();
        let copy = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} WHERE {} <> {}",
            self.dialect.escape_identifier(&interim),
            cols.join(", "),
            cols.join(", "),
            self.dialect.escape_identifier(staging),
            self.dialect.escape_identifier(SEQUENCE_COLUMN),
            self.dialect.escape_identifier(GROUP_COLUMN)
        );
        self.conn.execute(&copy, &[]).await?;

        let executor = MergeExecutor::new(self.conn, self.dialect);
        let spec = MergeSpec {
            source_table: &interim,
            destination_table: staging,
            columns: data_columns,
            key_columns: keys,
            sequence_column: SEQUENCE_COLUMN,
            update_with_null_values,
            additional_insert_values: &[],
            additional_update_values: &[],
        };
        let merged = executor.update_all_existing(&spec).await;
        self.drop_staging(&interim).await;
        merged?;

        self.drop_losers(staging).await
    }

    /// Apply the configured in-source resolution; returns removed duplicates.
    /// The sequence column must already be assigned.
    pub async fn resolve_duplicates(
        &self,
        staging: &str,
        data_columns: &[String],
        keys: &[KeyColumn],
        resolution: DuplicateResolution,
        update_with_null_values: bool,
    ) -> Result<u64> {
        self.mark_duplicates(staging, keys).await?;
        match resolution {
            DuplicateResolution::Drop => self.drop_losers(staging).await,
            DuplicateResolution::Join => {
                self.join_duplicates(staging, data_columns, keys, update_with_null_values)
                    .await
            }
        }
    }

    /// Remove staging rows whose key already exists in the destination;
    /// returns the number of purged rows.
    pub async fn purge_existing_keys(
        &self,
        staging: &str,
        destination: &str,
        keys: &[KeyColumn],
    ) -> Result<u64> {
        let table = self.dialect.escape_identifier(staging);
        let dest = self.dialect.escape_identifier(destination);
        let executor = MergeExecutor::new(self.conn, self.dialect);
        let sql = format!(
            "DELETE FROM {} WHERE EXISTS (SELECT 1 FROM {} b WHERE {})",
            table,
            dest,
            executor.key_equation(keys, "b", &table)
        );
        Ok(self.conn.execute(&sql, &[]).await?)
    }

    /// Best-effort drop of a staging/interim table; failures are logged and
    /// never override the import outcome.
    pub async fn drop_staging(&self, table: &str) {
        let sql = self.dialect.drop_table_sql(table);
        if let Err(e) = self.conn.execute(&sql, &[]).await {
            tracing::debug!(table = %table, error = %e, "staging drop skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rowsink_core::{BatchResult, QueryResult, Row, RowsinkError, Value, Vendor};
    use rowsink_dialects::dialect_for;
    use std::sync::Mutex;

    struct TrackingConnection {
        vendor: Vendor,
        executed: Mutex<Vec<String>>,
    }

    impl TrackingConnection {
        fn new(vendor: Vendor) -> Self {
            Self {
                vendor,
                executed: Mutex::new(Vec::new()),
            }
        }

        fn executed_sql(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connection for TrackingConnection {
        fn vendor(&self) -> Vendor {
            self.vendor
        }

        async fn execute(&self, sql: &str, _params: &[Value]) -> rowsink_core::Result<u64> {
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(2)
        }

        async fn query(&self, sql: &str, _params: &[Value]) -> rowsink_core::Result<QueryResult> {
            if sql.contains("COUNT(*)") {
                let columns = vec!["count".to_string()];
                return Ok(QueryResult {
                    columns: columns.clone(),
                    rows: vec![Row::new(columns, vec![Value::Int(0)])],
                });
            }
            Err(RowsinkError::NotSupported("mock".into()))
        }

        async fn execute_batch(
            &self,
            _sql: &str,
            _rows: &[Vec<Value>],
        ) -> rowsink_core::Result<BatchResult> {
            Err(RowsinkError::NotSupported("mock".into()))
        }

        async fn set_auto_commit(&self, _auto_commit: bool) -> rowsink_core::Result<()> {
            Ok(())
        }

        async fn commit(&self) -> rowsink_core::Result<()> {
            self.executed.lock().unwrap().push("COMMIT".to_string());
            Ok(())
        }

        async fn rollback(&self) -> rowsink_core::Result<()> {
            Ok(())
        }

        async fn close(&self) -> rowsink_core::Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn keys(specs: &[&str]) -> Vec<KeyColumn> {
        specs.iter().map(|s| KeyColumn::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_staging_name_respects_identifier_cap() {
        let conn = TrackingConnection::new(Vendor::Oracle);
        let engine = StagingEngine::new(&conn, dialect_for(Vendor::Oracle));
        let name = engine.staging_table_name("a_table_with_quite_a_long_name_indeed");
        assert!(name.len() <= 30);
    }

    #[tokio::test]
    async fn test_native_sequence_population() {
        let conn = TrackingConnection::new(Vendor::Sqlite);
        let engine = StagingEngine::new(&conn, dialect_for(Vendor::Sqlite));
        engine.assign_sequence("stg_people", &["id".into()]).await.unwrap();
        let sqls = conn.executed_sql();
        assert!(sqls.iter().any(|s| s.contains("ADD COLUMN imp_seq")));
        assert!(sqls.iter().any(|s| s == "UPDATE stg_people SET imp_seq = ROWID"));
    }

    #[tokio::test]
    async fn test_mark_duplicates_groups_by_minimum() {
        let conn = TrackingConnection::new(Vendor::Sqlite);
        let engine = StagingEngine::new(&conn, dialect_for(Vendor::Sqlite));
        engine
            .mark_duplicates("stg_people", &keys(&["id"]))
            .await
            .unwrap();
        let sqls = conn.executed_sql();
        let update = sqls.iter().find(|s| s.starts_with("UPDATE")).unwrap();
        assert_eq!(
            update,
            "UPDATE stg_people SET imp_grp = (SELECT MIN(d.imp_seq) FROM stg_people d \
             WHERE d.id = stg_people.id)"
        );
    }

    #[tokio::test]
    async fn test_mark_duplicates_wraps_subquery_on_mysql() {
        let conn = TrackingConnection::new(Vendor::MySql);
        let engine = StagingEngine::new(&conn, dialect_for(Vendor::MySql));
        engine
            .mark_duplicates("stg_people", &keys(&["id"]))
            .await
            .unwrap();
        let sqls = conn.executed_sql();
        let update = sqls.iter().find(|s| s.starts_with("UPDATE")).unwrap();
        assert!(update.contains("FROM (SELECT * FROM stg_people) d"));
    }

    #[tokio::test]
    async fn test_drop_losers_statement() {
        let conn = TrackingConnection::new(Vendor::Sqlite);
        let engine = StagingEngine::new(&conn, dialect_for(Vendor::Sqlite));
        let removed = engine.drop_losers("stg_people").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            conn.executed_sql()[0],
            "DELETE FROM stg_people WHERE imp_seq <> imp_grp"
        );
    }

    #[tokio::test]
    async fn test_purge_existing_keys_with_function_wrapper() {
        let conn = TrackingConnection::new(Vendor::Sqlite);
        let engine = StagingEngine::new(&conn, dialect_for(Vendor::Sqlite));
        engine
            .purge_existing_keys("stg_people", "people", &keys(&["UPPER(email)"]))
            .await
            .unwrap();
        assert_eq!(
            conn.executed_sql()[0],
            "DELETE FROM stg_people WHERE EXISTS (SELECT 1 FROM people b \
             WHERE UPPER(b.email) = UPPER(stg_people.email))"
        );
    }

    #[tokio::test]
    async fn test_postgres_staging_commits_before_ddl() {
        let conn = TrackingConnection::new(Vendor::PostgreSql);
        let engine = StagingEngine::new(&conn, dialect_for(Vendor::PostgreSql));
        engine.create_staging_table("people").await.unwrap();
        let sqls = conn.executed_sql();
        let commit_pos = sqls.iter().position(|s| s == "COMMIT").unwrap();
        let create_pos = sqls.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
        assert!(commit_pos < create_pos);
        assert!(sqls[create_pos].contains("WITH NO DATA"));
    }

    #[tokio::test]
    async fn test_firebird_staging_falls_back_to_introspection() {
        // Firebird has no CREATE-AS-SELECT; the mock cannot answer the
        // introspection query, so creation must fail with that error rather
        // than attempt a clone statement.
        let conn = TrackingConnection::new(Vendor::Firebird);
        let engine = StagingEngine::new(&conn, dialect_for(Vendor::Firebird));
        let result = engine.create_staging_table("people").await;
        assert!(result.is_err());
        assert!(!conn
            .executed_sql()
            .iter()
            .any(|s| s.contains("AS SELECT")));
    }
}
