//! The vendor dialect contract
//!
//! A [`Dialect`] translates logical operations (create table, clone a table
//! structure, probe an index, escape an identifier, build a connection URL)
//! into vendor-correct SQL and behavior. Callers hold a `&'static dyn
//! Dialect` obtained from [`crate::dialect_for`] and never branch on the
//! vendor themselves.

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rowsink_core::{
    Connection, ConnectionParams, DbColumnType, QueryResult, Result, RowsinkError, Vendor,
};
use std::collections::{HashMap, HashSet};

static SAFE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid regex"));

/// Whether an identifier can be embedded in SQL without quoting
/// (quoting may still be required if the vendor reserves the word)
pub fn is_safe_identifier(identifier: &str) -> bool {
    SAFE_IDENTIFIER.is_match(identifier)
}

/// How a dialect assigns the monotonic per-row sequence numbers that drive
/// duplicate resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePopulation {
    /// The vendor exposes a native per-row number usable as
    /// `UPDATE staging SET seq = <expr>` (SQLite `ROWID`, Oracle `ROWNUM`,
    /// HSQL `ROWNUM()`)
    Native(&'static str),
    /// No native expression. Reuse an auto-increment column when the staging
    /// table carries one, otherwise re-insert every row through
    /// `ROW_NUMBER() OVER ()` and delete the unnumbered originals.
    AutoIncrementOrReinsert,
}

/// Vendor-specific SQL translation.
///
/// Pure SQL-text generation is synchronous; operations that must consult the
/// database catalog are async and take the connection they introspect.
#[async_trait]
pub trait Dialect: Send + Sync {
    fn vendor(&self) -> Vendor;

    // ---- identifiers -------------------------------------------------------

    /// Opening/closing identifier quote characters
    fn identifier_quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Whether the word is reserved and must be quoted
    fn is_reserved(&self, identifier: &str) -> bool;

    /// Case folding applied when an identifier gets quoted. Oracle resolves
    /// unquoted identifiers to upper case, so quoting must upper-case to keep
    /// referring to the same object.
    fn fold_quoted_identifier(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    /// Quote the identifier if the vendor requires it, otherwise pass it
    /// through unchanged. Already-quoted identifiers are left alone.
    fn escape_identifier(&self, identifier: &str) -> String {
        let (open, close) = self.identifier_quotes();
        if identifier.len() >= 2 && identifier.starts_with(open) && identifier.ends_with(close) {
            return identifier.to_string();
        }
        if self.is_reserved(identifier) || !is_safe_identifier(identifier) {
            format!("{}{}{}", open, self.fold_quoted_identifier(identifier), close)
        } else {
            identifier.to_string()
        }
    }

    /// Strip identifier quoting for comparison purposes
    fn unescape_identifier(&self, identifier: &str) -> String {
        let (open, close) = self.identifier_quotes();
        identifier
            .trim()
            .trim_start_matches(open)
            .trim_end_matches(close)
            .to_string()
    }

    /// Maximum identifier length, where the vendor enforces one
    fn max_identifier_length(&self) -> Option<usize> {
        None
    }

    // ---- types and DDL -----------------------------------------------------

    /// The SQL type for a canonical column description
    fn column_type_sql(&self, column: &DbColumnType) -> String;

    /// Keyword appended after the type for auto-increment columns
    /// (`AUTO_INCREMENT`, `AUTOINCREMENT`, `GENERATED … AS IDENTITY`), for
    /// vendors that express it as a suffix
    fn auto_increment_suffix(&self) -> Option<&'static str> {
        None
    }

    /// One column definition inside CREATE TABLE / ALTER TABLE ADD
    fn column_def_sql(&self, name: &str, column: &DbColumnType) -> String {
        let mut sql = format!(
            "{} {}",
            self.escape_identifier(name),
            self.column_type_sql(column)
        );
        if column.auto_increment {
            if let Some(suffix) = self.auto_increment_suffix() {
                sql.push(' ');
                sql.push_str(suffix);
            }
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        sql
    }

    /// Full CREATE TABLE statement from a column map and key columns
    fn create_table_sql(
        &self,
        table: &str,
        columns: &IndexMap<String, DbColumnType>,
        primary_key: &[String],
    ) -> String {
        let mut parts: Vec<String> = columns
            .iter()
            .map(|(name, column)| self.column_def_sql(name, column))
            .collect();
        if !primary_key.is_empty() {
            let keys: Vec<String> = primary_key
                .iter()
                .map(|k| self.escape_identifier(k))
                .collect();
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        format!(
            "CREATE TABLE {} ({})",
            self.escape_identifier(table),
            parts.join(", ")
        )
    }

    /// ALTER TABLE ADD for one nullable-relaxed column
    fn add_column_sql(&self, table: &str, name: &str, column: &DbColumnType) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.escape_identifier(table),
            self.column_def_sql(name, &column.relaxed())
        )
    }

    /// Ordered statement plan removing one column. Executed inside a single
    /// transaction by the caller, so emulations (SQLite) roll back as a unit.
    fn drop_column_plan(
        &self,
        table: &str,
        column: &str,
        _remaining: &IndexMap<String, DbColumnType>,
        _primary_key: &[String],
    ) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.escape_identifier(table),
            self.escape_identifier(column)
        )]
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.escape_identifier(table))
    }

    fn create_index_sql(&self, index_name: &str, table: &str, columns: &[String]) -> String {
        let cols: Vec<String> = columns.iter().map(|c| self.escape_identifier(c)).collect();
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.escape_identifier(index_name),
            self.escape_identifier(table),
            cols.join(", ")
        )
    }

    fn drop_index_sql(&self, index_name: &str, _table: &str) -> String {
        format!("DROP INDEX {}", self.escape_identifier(index_name))
    }

    // ---- staging and capabilities ------------------------------------------

    /// Whether the vendor can host the staging-table pipeline at all
    fn supports_staging(&self) -> bool {
        true
    }

    /// PostgreSQL cannot run DDL inside an open transaction that has seen
    /// failures; any open work must be committed before DDL is issued.
    fn requires_commit_before_ddl(&self) -> bool {
        false
    }

    /// A single statement cloning `source`'s structure (no data) into
    /// `target`, or `None` when the vendor supports no such statement and the
    /// caller must re-derive columns from introspected metadata.
    fn clone_structure_sql(&self, source: &str, target: &str) -> Option<String> {
        Some(format!(
            "CREATE TABLE {} AS SELECT * FROM {} WHERE 1 = 0",
            self.escape_identifier(target),
            self.escape_identifier(source)
        ))
    }

    /// How to assign sequence numbers to staged rows
    fn sequence_population(&self) -> SequencePopulation {
        SequencePopulation::AutoIncrementOrReinsert
    }

    /// MySQL/MariaDB refuse an UPDATE whose subquery reads the updated table;
    /// the subquery must be wrapped in a derived table.
    fn wraps_self_reference_subquery(&self) -> bool {
        false
    }

    /// Parameter placeholder for the 1-based parameter index
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Statements clearing all rows from a table. `reset_auto_increment`
    /// asks vendors whose counters survive a plain DELETE to reset them.
    fn clear_table_sql(&self, table: &str, _reset_auto_increment: bool) -> Vec<String> {
        vec![format!("DELETE FROM {}", self.escape_identifier(table))]
    }

    // ---- constraint toggling -----------------------------------------------

    /// Deactivate foreign keys/triggers for the given tables. Default no-op
    /// for vendors without a usable mechanism.
    async fn disable_constraints(
        &self,
        _conn: &dyn Connection,
        _tables: &[String],
    ) -> Result<()> {
        Ok(())
    }

    /// Reactivate what `disable_constraints` turned off
    async fn enable_constraints(&self, _conn: &dyn Connection, _tables: &[String]) -> Result<()> {
        Ok(())
    }

    // ---- catalog introspection ---------------------------------------------

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool>;

    /// Column metadata for an existing table, in ordinal order
    async fn table_columns(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> Result<IndexMap<String, DbColumnType>>;

    /// Whether an index covering exactly the given column set exists.
    /// `None` means the vendor offers no reliable query; callers must not
    /// block index creation on an unknown answer.
    async fn index_exists(
        &self,
        _conn: &dyn Connection,
        _table: &str,
        _columns: &[String],
    ) -> Result<Option<bool>> {
        Ok(None)
    }

    // ---- connections -------------------------------------------------------

    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Build the vendor connection URL from validated parameters
    fn connection_url(&self, params: &ConnectionParams) -> Result<String> {
        params.validate()?;
        if params.is_embedded() {
            return Ok(format!("{}://{}", self.vendor().id(), params.database));
        }
        let host = params
            .host
            .as_deref()
            .ok_or_else(|| RowsinkError::Definition("hostname required".into()))?;
        let port = params.port.or_else(|| self.default_port());
        let mut url = format!("{}://", self.vendor().id());
        if let Some(user) = &params.username {
            url.push_str(user);
            url.push('@');
        }
        url.push_str(host);
        if let Some(port) = port {
            url.push_str(&format!(":{}", port));
        }
        url.push('/');
        url.push_str(&params.database);
        if params.use_tls {
            url.push_str("?tls=true");
        }
        Ok(url)
    }
}

/// Interpret a two-column (index name, column name) catalog result: does any
/// index cover exactly the wanted column set?
pub(crate) fn result_covers_columns(result: &QueryResult, wanted: &[String]) -> bool {
    let wanted: HashSet<String> = wanted.iter().map(|c| c.to_ascii_lowercase()).collect();
    let mut by_index: HashMap<String, HashSet<String>> = HashMap::new();
    for row in &result.rows {
        let (Some(index), Some(column)) = (row.get(0), row.get(1)) else {
            continue;
        };
        let (Some(index), Some(column)) = (index.as_str(), column.as_str()) else {
            continue;
        };
        by_index
            .entry(index.to_string())
            .or_default()
            .insert(column.trim().to_ascii_lowercase());
    }
    by_index.values().any(|cols| *cols == wanted)
}

/// Truncate a generated identifier to the vendor cap, keeping it unique
/// enough for scratch objects by preserving the tail.
pub fn cap_identifier(identifier: &str, cap: Option<usize>) -> String {
    match cap {
        Some(cap) if identifier.len() > cap => identifier[identifier.len() - cap..].to_string(),
        _ => identifier.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsink_core::{Row, Value};

    #[test]
    fn test_safe_identifier() {
        assert!(is_safe_identifier("customer_id"));
        assert!(is_safe_identifier("A1"));
        assert!(!is_safe_identifier("1st"));
        assert!(!is_safe_identifier("first name"));
        assert!(!is_safe_identifier(""));
    }

    #[test]
    fn test_result_covers_columns() {
        let columns = vec!["index_name".to_string(), "column_name".to_string()];
        let rows = vec![
            Row::new(columns.clone(), vec![
                Value::String("ix_a".into()),
                Value::String("CUSTOMER_ID".into()),
            ]),
            Row::new(columns.clone(), vec![
                Value::String("ix_b".into()),
                Value::String("name".into()),
            ]),
            Row::new(columns.clone(), vec![
                Value::String("ix_b".into()),
                Value::String("city".into()),
            ]),
        ];
        let result = QueryResult { columns, rows };
        assert!(result_covers_columns(&result, &["customer_id".into()]));
        assert!(result_covers_columns(&result, &["city".into(), "name".into()]));
        assert!(!result_covers_columns(&result, &["name".into()]));
    }

    #[test]
    fn test_cap_identifier_keeps_tail() {
        assert_eq!(cap_identifier("short", Some(30)), "short");
        assert_eq!(cap_identifier("abcdefghij", Some(4)), "ghij");
        assert_eq!(cap_identifier("abcdefghij", None), "abcdefghij");
    }
}
