//! Apache Cassandra dialect (CQL)
//!
//! Cassandra cannot host the staging pipeline (no temp tables, no usable
//! ALTER for bookkeeping columns); imports run through the row-by-row worker.
//! This dialect still provides identifier escaping, CQL type mapping and
//! table creation for the create-if-missing path.

use crate::dialect::Dialect;
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct CassandraDialect;

fn simple_type_from_cql(type_name: &str) -> SimpleColumnType {
    match type_name.to_ascii_lowercase().as_str() {
        "bigint" | "int" | "smallint" | "tinyint" | "varint" | "counter" | "boolean" => {
            SimpleColumnType::Integer
        }
        "double" | "float" | "decimal" => SimpleColumnType::Float,
        "date" => SimpleColumnType::Date,
        "timestamp" | "time" => SimpleColumnType::DateTime,
        "blob" => SimpleColumnType::Blob,
        _ => SimpleColumnType::String,
    }
}

/// Split an optionally keyspace-qualified table name
fn split_qualified(table: &str) -> Option<(&str, &str)> {
    let mut parts = table.splitn(2, '.');
    match (parts.next(), parts.next()) {
        (Some(keyspace), Some(name)) if !keyspace.is_empty() && !name.is_empty() => {
            Some((keyspace, name))
        }
        _ => None,
    }
}

#[async_trait]
impl Dialect for CassandraDialect {
    fn vendor(&self) -> Vendor {
        Vendor::Cassandra
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::CASSANDRA, identifier)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(48)
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        match column.simple_type {
            SimpleColumnType::String => "text".to_string(),
            SimpleColumnType::Integer => "bigint".to_string(),
            SimpleColumnType::Float => "double".to_string(),
            SimpleColumnType::Date => "date".to_string(),
            SimpleColumnType::DateTime => "timestamp".to_string(),
            SimpleColumnType::Blob => "blob".to_string(),
            SimpleColumnType::Clob => "text".to_string(),
        }
    }

    /// CQL columns carry no inline NOT NULL or identity clauses
    fn column_def_sql(&self, name: &str, column: &DbColumnType) -> String {
        format!(
            "{} {}",
            self.escape_identifier(name),
            self.column_type_sql(column)
        )
    }

    fn supports_staging(&self) -> bool {
        false
    }

    fn clone_structure_sql(&self, _source: &str, _target: &str) -> Option<String> {
        None
    }

    fn clear_table_sql(&self, table: &str, _reset_auto_increment: bool) -> Vec<String> {
        vec![format!("TRUNCATE {}", self.escape_identifier(table))]
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        let bare = self.unescape_identifier(table);
        let Some((keyspace, name)) = split_qualified(&bare) else {
            // Without a keyspace qualifier the schema tables cannot be
            // filtered; probe the table directly instead.
            let sql = format!("SELECT * FROM {} LIMIT 1", self.escape_identifier(table));
            return Ok(conn.query(&sql, &[]).await.is_ok());
        };
        let count = conn
            .query_count(
                "SELECT COUNT(*) FROM system_schema.tables \
                 WHERE keyspace_name = ? AND table_name = ?",
                &[
                    Value::String(keyspace.to_string()),
                    Value::String(name.to_string()),
                ],
            )
            .await?;
        Ok(count > 0)
    }

    async fn table_columns(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> Result<IndexMap<String, DbColumnType>> {
        let bare = self.unescape_identifier(table);
        let (keyspace, name) = split_qualified(&bare).ok_or_else(|| {
            RowsinkError::NotSupported(
                "Cassandra introspection requires a keyspace-qualified table name".into(),
            )
        })?;
        let result = conn
            .query(
                "SELECT column_name, type, kind FROM system_schema.columns \
                 WHERE keyspace_name = ? AND table_name = ?",
                &[
                    Value::String(keyspace.to_string()),
                    Value::String(name.to_string()),
                ],
            )
            .await?;
        let mut columns = IndexMap::new();
        for row in &result.rows {
            let name = row
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| RowsinkError::Other("malformed column metadata row".into()))?
                .to_string();
            let type_name = row.get(1).and_then(Value::as_str).unwrap_or_default();
            let kind = row.get(2).and_then(Value::as_str).unwrap_or_default();
            let mut column = DbColumnType::new(simple_type_from_cql(type_name));
            column.nullable = !kind.eq_ignore_ascii_case("partition_key");
            columns.insert(name, column);
        }
        if columns.is_empty() {
            return Err(RowsinkError::sql(
                format!("introspection of {}", table),
                "table has no columns or does not exist",
            ));
        }
        Ok(columns)
    }

    fn default_port(&self) -> Option<u16> {
        Some(9042)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_unsupported() {
        assert!(!CassandraDialect.supports_staging());
        assert!(CassandraDialect.clone_structure_sql("a", "b").is_none());
    }

    #[test]
    fn test_cql_types_are_lowercase() {
        let col = DbColumnType::new(SimpleColumnType::String);
        assert_eq!(CassandraDialect.column_type_sql(&col), "text");
        let col = DbColumnType::new(SimpleColumnType::Clob);
        assert_eq!(CassandraDialect.column_type_sql(&col), "text");
    }

    #[test]
    fn test_column_def_has_no_constraints() {
        let col = DbColumnType::new(SimpleColumnType::Integer).not_null();
        assert_eq!(CassandraDialect.column_def_sql("id", &col), "id bigint");
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("ks.events"), Some(("ks", "events")));
        assert_eq!(split_qualified("events"), None);
    }
}
