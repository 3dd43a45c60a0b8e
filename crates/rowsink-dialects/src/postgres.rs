//! PostgreSQL dialect

use crate::dialect::{Dialect, result_covers_columns};
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct PostgresDialect;

fn simple_type_from_postgres(type_name: &str) -> SimpleColumnType {
    match type_name.to_ascii_lowercase().as_str() {
        "text" => SimpleColumnType::Clob,
        "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8" | "serial" | "bigserial" => {
            SimpleColumnType::Integer
        }
        "real" | "double precision" | "numeric" | "decimal" | "float4" | "float8" => {
            SimpleColumnType::Float
        }
        "date" => SimpleColumnType::Date,
        "timestamp" | "timestamp without time zone" | "timestamp with time zone" | "time"
        | "time without time zone" => SimpleColumnType::DateTime,
        "bytea" => SimpleColumnType::Blob,
        _ => SimpleColumnType::String,
    }
}

#[async_trait]
impl Dialect for PostgresDialect {
    fn vendor(&self) -> Vendor {
        Vendor::PostgreSql
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::POSTGRES, identifier)
    }

    /// PostgreSQL folds unquoted identifiers to lower case; quoting must
    /// lower-case to keep addressing the same object.
    fn fold_quoted_identifier(&self, identifier: &str) -> String {
        identifier.to_ascii_lowercase()
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(63)
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        if column.auto_increment && column.simple_type == SimpleColumnType::Integer {
            return "BIGSERIAL".to_string();
        }
        match column.simple_type {
            SimpleColumnType::String => format!("VARCHAR({})", column.size.unwrap_or(255)),
            SimpleColumnType::Integer => "BIGINT".to_string(),
            SimpleColumnType::Float => "DOUBLE PRECISION".to_string(),
            SimpleColumnType::Date => "DATE".to_string(),
            SimpleColumnType::DateTime => "TIMESTAMP".to_string(),
            SimpleColumnType::Blob => "BYTEA".to_string(),
            SimpleColumnType::Clob => "TEXT".to_string(),
        }
    }

    fn requires_commit_before_ddl(&self) -> bool {
        true
    }

    fn clone_structure_sql(&self, source: &str, target: &str) -> Option<String> {
        Some(format!(
            "CREATE TABLE {} AS SELECT * FROM {} WITH NO DATA",
            self.escape_identifier(target),
            self.escape_identifier(source)
        ))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn clear_table_sql(&self, table: &str, _reset_auto_increment: bool) -> Vec<String> {
        vec![format!("TRUNCATE TABLE {}", self.escape_identifier(table))]
    }

    async fn disable_constraints(&self, conn: &dyn Connection, tables: &[String]) -> Result<()> {
        for table in tables {
            let sql = format!(
                "ALTER TABLE {} DISABLE TRIGGER ALL",
                self.escape_identifier(table)
            );
            conn.execute(&sql, &[]).await?;
        }
        Ok(())
    }

    async fn enable_constraints(&self, conn: &dyn Connection, tables: &[String]) -> Result<()> {
        for table in tables {
            let sql = format!(
                "ALTER TABLE {} ENABLE TRIGGER ALL",
                self.escape_identifier(table)
            );
            conn.execute(&sql, &[]).await?;
        }
        Ok(())
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        let bare = self.unescape_identifier(table).to_ascii_lowercase();
        let count = conn
            .query_count(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1",
                &[Value::String(bare)],
            )
            .await?;
        Ok(count > 0)
    }

    async fn table_columns(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> Result<IndexMap<String, DbColumnType>> {
        let bare = self.unescape_identifier(table).to_ascii_lowercase();
        let result = conn
            .query(
                "SELECT column_name, data_type, is_nullable, character_maximum_length, \
                 column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[Value::String(bare)],
            )
            .await?;
        let mut columns = IndexMap::new();
        for row in &result.rows {
            let name = row
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| RowsinkError::Other("malformed column metadata row".into()))?
                .to_string();
            let data_type = row.get(1).and_then(Value::as_str).unwrap_or_default();
            let nullable = row
                .get(2)
                .and_then(Value::as_str)
                .map(|v| v.eq_ignore_ascii_case("YES"))
                .unwrap_or(true);
            let size = row.get(3).and_then(Value::as_i64).map(|v| v as u32);
            let auto_increment = row
                .get(4)
                .and_then(Value::as_str)
                .map(|v| v.starts_with("nextval("))
                .unwrap_or(false);
            let mut column = DbColumnType::new(simple_type_from_postgres(data_type));
            column.nullable = nullable;
            column.auto_increment = auto_increment;
            if column.simple_type.is_sized() {
                column.size = size;
            }
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

    async fn index_exists(
        &self,
        conn: &dyn Connection,
        table: &str,
        columns: &[String],
    ) -> Result<Option<bool>> {
        let bare = self.unescape_identifier(table).to_ascii_lowercase();
        let result = conn
            .query(
                "SELECT i.relname, a.attname \
                 FROM pg_class t \
                 JOIN pg_index ix ON t.oid = ix.indrelid \
                 JOIN pg_class i ON i.oid = ix.indexrelid \
                 JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
                 WHERE t.relname = $1",
                &[Value::String(bare)],
            )
            .await?;
        Ok(Some(result_covers_columns(&result, columns)))
    }

    fn default_port(&self) -> Option<u16> {
        Some(5432)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_word_quoted_lowercase() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.escape_identifier("User"), "\"user\"");
        assert_eq!(dialect.escape_identifier("customer_id"), "customer_id");
    }

    #[test]
    fn test_blob_maps_to_bytea() {
        let dialect = PostgresDialect;
        let col = DbColumnType::new(SimpleColumnType::Blob);
        assert_eq!(dialect.column_type_sql(&col), "BYTEA");
    }

    #[test]
    fn test_auto_increment_renders_bigserial() {
        let dialect = PostgresDialect;
        let col = DbColumnType::new(SimpleColumnType::Integer).auto_increment();
        assert_eq!(dialect.column_type_sql(&col), "BIGSERIAL");
    }

    #[test]
    fn test_clone_structure_uses_with_no_data() {
        let sql = PostgresDialect.clone_structure_sql("orders", "stg_orders").unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE stg_orders AS SELECT * FROM orders WITH NO DATA"
        );
    }

    #[test]
    fn test_ddl_needs_prior_commit() {
        assert!(PostgresDialect.requires_commit_before_ddl());
    }

    #[test]
    fn test_numbered_placeholders() {
        assert_eq!(PostgresDialect.placeholder(2), "$2");
    }
}
