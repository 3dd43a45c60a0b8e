//! Set-based merge operations between a source and a destination table
//!
//! All three operations work through correlated subqueries keyed by the
//! staged sequence column and the configured key columns, so they behave
//! identically on every backend the dialect layer supports.

use crate::definition::{KeyColumn, ValueClause};
use crate::error::Result;
use rowsink_core::{Connection, DbColumnType, SimpleColumnType};
use rowsink_dialects::{Dialect, cap_identifier};

/// Sentinel column marking destination rows touched by column-wise updates.
/// Column-by-column updates cannot be summed without double counting, so the
/// sentinel provides the accurate affected-row count.
pub const TOUCHED_COLUMN: &str = "imp_upd";

/// Which source row of a key group feeds an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequencePick {
    /// Highest sequence number: last write wins
    Max,
    /// Lowest sequence number: only the first-seen duplicate applies
    Min,
}

impl SequencePick {
    fn function(&self) -> &'static str {
        match self {
            SequencePick::Max => "MAX",
            SequencePick::Min => "MIN",
        }
    }
}

/// Parameters of one merge operation
#[derive(Debug, Clone)]
pub struct MergeSpec<'a> {
    pub source_table: &'a str,
    pub destination_table: &'a str,
    /// Data columns to transfer, keys included
    pub columns: &'a [String],
    pub key_columns: &'a [KeyColumn],
    /// Sequence column on the source table
    pub sequence_column: &'a str,
    pub update_with_null_values: bool,
    pub additional_insert_values: &'a [ValueClause],
    pub additional_update_values: &'a [ValueClause],
}

impl<'a> MergeSpec<'a> {
    fn non_key_columns(&self) -> Vec<&'a String> {
        self.columns
            .iter()
            .filter(|col| {
                !self
                    .key_columns
                    .iter()
                    .any(|key| key.name.eq_ignore_ascii_case(col))
            })
            .collect()
    }
}

/// Executes merge operations over one connection
pub struct MergeExecutor<'a> {
    conn: &'a dyn Connection,
    dialect: &'static dyn Dialect,
}

impl<'a> MergeExecutor<'a> {
    pub fn new(conn: &'a dyn Connection, dialect: &'static dyn Dialect) -> Self {
        Self { conn, dialect }
    }

    fn qualified(&self, qualifier: &str, column: &str) -> String {
        format!("{}.{}", qualifier, self.dialect.escape_identifier(column))
    }

    /// `F(l.col) = F(r.col) AND …` with escaping and function wrapping
    /// applied to both sides identically
    pub fn key_equation(&self, keys: &[KeyColumn], left: &str, right: &str) -> String {
        keys.iter()
            .map(|key| {
                format!(
                    "{} = {}",
                    key.render(&self.qualified(left, &key.name)),
                    key.render(&self.qualified(right, &key.name))
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Insert every source row whose key is absent from the destination.
    /// With no key columns this degenerates to insert-all.
    pub async fn insert_not_existing(&self, spec: &MergeSpec<'_>) -> Result<u64> {
        let src = self.dialect.escape_identifier(spec.source_table);
        let dest = self.dialect.escape_identifier(spec.destination_table);
        let mut columns: Vec<String> = spec
            .columns
            .iter()
            .map(|col| self.dialect.escape_identifier(col))
            .collect();
        let mut items: Vec<String> = spec
            .columns
            .iter()
            .map(|col| self.qualified("a", col))
            .collect();
        for extra in spec.additional_insert_values {
            columns.push(self.dialect.escape_identifier(&extra.column));
            items.push(extra.expression.clone());
        }
        let mut sql = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} a",
            dest,
            columns.join(", "),
            items.join(", "),
            src
        );
        if !spec.key_columns.is_empty() {
            sql.push_str(&format!(
                " WHERE NOT EXISTS (SELECT 1 FROM {} b WHERE {})",
                dest,
                self.key_equation(spec.key_columns, "a", "b")
            ));
        }
        tracing::debug!(sql = %sql, "insert not existing");
        Ok(self.conn.execute(&sql, &[]).await?)
    }

    /// Update every destination row that has at least one source row with a
    /// matching key; among duplicates the highest sequence number wins.
    pub async fn update_all_existing(&self, spec: &MergeSpec<'_>) -> Result<u64> {
        self.update_existing(spec, SequencePick::Max).await
    }

    /// Like `update_all_existing`, but only the source row with the lowest
    /// sequence number for a key feeds the destination; later duplicates in
    /// the same import are ignored.
    pub async fn update_first_existing(&self, spec: &MergeSpec<'_>) -> Result<u64> {
        self.update_existing(spec, SequencePick::Min).await
    }

    async fn update_existing(&self, spec: &MergeSpec<'_>, pick: SequencePick) -> Result<u64> {
        if spec.update_with_null_values {
            self.update_in_one_statement(spec, pick).await
        } else {
            self.update_column_wise(spec, pick).await
        }
    }

    /// Subselect choosing the sequence value of the feeding source row,
    /// correlated against the destination table
    fn sequence_selector(
        &self,
        spec: &MergeSpec<'_>,
        pick: SequencePick,
        dest: &str,
        non_null_column: Option<&str>,
    ) -> String {
        let src = self.dialect.escape_identifier(spec.source_table);
        let seq = self.dialect.escape_identifier(spec.sequence_column);
        let mut inner = format!(
            "SELECT {}(a2.{}) FROM {} a2 WHERE {}",
            pick.function(),
            seq,
            src,
            self.key_equation(spec.key_columns, "a2", dest)
        );
        if let Some(column) = non_null_column {
            inner.push_str(&format!(" AND {} IS NOT NULL", self.qualified("a2", column)));
        }
        inner
    }

    async fn update_in_one_statement(
        &self,
        spec: &MergeSpec<'_>,
        pick: SequencePick,
    ) -> Result<u64> {
        let src = self.dialect.escape_identifier(spec.source_table);
        let dest = self.dialect.escape_identifier(spec.destination_table);
        let seq = self.dialect.escape_identifier(spec.sequence_column);
        let key_eq = self.key_equation(spec.key_columns, "a", &dest);
        let selector = self.sequence_selector(spec, pick, &dest, None);
        let mut assignments: Vec<String> = spec
            .non_key_columns()
            .iter()
            .map(|col| {
                format!(
                    "{} = (SELECT {} FROM {} a WHERE {} AND a.{} = ({}))",
                    self.dialect.escape_identifier(col),
                    self.qualified("a", col),
                    src,
                    key_eq,
                    seq,
                    selector
                )
            })
            .collect();
        for extra in spec.additional_update_values {
            assignments.push(format!(
                "{} = {}",
                self.dialect.escape_identifier(&extra.column),
                extra.expression
            ));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE EXISTS (SELECT 1 FROM {} a WHERE {})",
            dest,
            assignments.join(", "),
            src,
            key_eq
        );
        tracing::debug!(sql = %sql, "update existing");
        Ok(self.conn.execute(&sql, &[]).await?)
    }

    /// Column-by-column updates that never let a NULL clobber an existing
    /// value, counted through the touched-sentinel column. The sentinel and
    /// its index are removed on every exit path.
    async fn update_column_wise(&self, spec: &MergeSpec<'_>, pick: SequencePick) -> Result<u64> {
        let dest = self.dialect.escape_identifier(spec.destination_table);
        let sentinel = DbColumnType::new(SimpleColumnType::Integer);
        let add_sql =
            self.dialect
                .add_column_sql(spec.destination_table, TOUCHED_COLUMN, &sentinel);
        self.conn.execute(&add_sql, &[]).await?;
        let index_name = cap_identifier(
            &format!("ix_{}_upd", spec.destination_table),
            self.dialect.max_identifier_length(),
        );
        let index_sql = self.dialect.create_index_sql(
            &index_name,
            spec.destination_table,
            &[TOUCHED_COLUMN.to_string()],
        );
        self.conn.execute(&index_sql, &[]).await?;

        let result = self.run_column_wise_updates(spec, pick, &dest).await;

        // The destination schema must be unchanged after the operation,
        // success or failure; cleanup errors are logged, never raised.
        let drop_index = self
            .dialect
            .drop_index_sql(&index_name, spec.destination_table);
        if let Err(e) = self.conn.execute(&drop_index, &[]).await {
            tracing::warn!(error = %e, index = %index_name, "failed to drop sentinel index");
        }
        if let Err(e) = self.drop_sentinel_column(spec).await {
            tracing::warn!(error = %e, table = %spec.destination_table, "failed to drop sentinel column");
        }
        result
    }

    async fn run_column_wise_updates(
        &self,
        spec: &MergeSpec<'_>,
        pick: SequencePick,
        dest: &str,
    ) -> Result<u64> {
        let src = self.dialect.escape_identifier(spec.source_table);
        let seq = self.dialect.escape_identifier(spec.sequence_column);
        let key_eq = self.key_equation(spec.key_columns, "a", dest);
        let touched = self.dialect.escape_identifier(TOUCHED_COLUMN);

        for col in spec.non_key_columns() {
            // Max: latest non-null candidate wins. Min: the first-seen row
            // is the only candidate and applies only where it is non-null.
            let (selector, guard) = match pick {
                SequencePick::Max => {
                    let selector = self.sequence_selector(spec, pick, dest, Some(col.as_str()));
                    let guard = format!(
                        "EXISTS (SELECT 1 FROM {} a WHERE {} AND {} IS NOT NULL)",
                        src,
                        key_eq,
                        self.qualified("a", col)
                    );
                    (selector, guard)
                }
                SequencePick::Min => {
                    let selector = self.sequence_selector(spec, pick, dest, None);
                    let guard = format!(
                        "EXISTS (SELECT 1 FROM {} a WHERE {} AND {} IS NOT NULL AND a.{} = ({}))",
                        src,
                        key_eq,
                        self.qualified("a", col),
                        seq,
                        selector
                    );
                    (selector, guard)
                }
            };
            let sql = format!(
                "UPDATE {} SET {} = (SELECT {} FROM {} a WHERE {} AND a.{} = ({})), {} = 1 WHERE {}",
                dest,
                self.dialect.escape_identifier(col),
                self.qualified("a", col),
                src,
                key_eq,
                seq,
                selector,
                touched,
                guard
            );
            tracing::debug!(sql = %sql, column = %col, "column-wise update");
            self.conn.execute(&sql, &[]).await?;
        }

        if !spec.additional_update_values.is_empty() {
            let assignments: Vec<String> = spec
                .additional_update_values
                .iter()
                .map(|extra| {
                    format!(
                        "{} = {}",
                        self.dialect.escape_identifier(&extra.column),
                        extra.expression
                    )
                })
                .collect();
            let sql = format!(
                "UPDATE {} SET {}, {} = 1 WHERE EXISTS (SELECT 1 FROM {} a WHERE {})",
                dest,
                assignments.join(", "),
                touched,
                src,
                key_eq
            );
            self.conn.execute(&sql, &[]).await?;
        }

        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {} = 1", dest, touched);
        let updated = self.conn.query_count(&count_sql, &[]).await?;
        Ok(updated.max(0) as u64)
    }

    async fn drop_sentinel_column(&self, spec: &MergeSpec<'_>) -> Result<()> {
        let columns = self
            .dialect
            .table_columns(self.conn, spec.destination_table)
            .await?;
        let plan =
            self.dialect
                .drop_column_plan(spec.destination_table, TOUCHED_COLUMN, &columns, &[]);
        for statement in plan {
            self.conn.execute(&statement, &[]).await?;
        }
        Ok(())
    }
}
