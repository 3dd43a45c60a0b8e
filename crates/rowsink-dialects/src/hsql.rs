//! HSQLDB dialect

use crate::dialect::{Dialect, SequencePopulation, result_covers_columns};
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct HsqlDialect;

fn simple_type_from_hsql(type_name: &str) -> SimpleColumnType {
    let upper = type_name.to_ascii_uppercase();
    match upper.as_str() {
        "CLOB" | "LONGVARCHAR" => SimpleColumnType::Clob,
        "BIGINT" | "INTEGER" | "SMALLINT" | "TINYINT" | "BOOLEAN" => SimpleColumnType::Integer,
        "DOUBLE" | "FLOAT" | "REAL" | "DECIMAL" | "NUMERIC" => SimpleColumnType::Float,
        "DATE" => SimpleColumnType::Date,
        "BLOB" | "BINARY" | "VARBINARY" | "LONGVARBINARY" => SimpleColumnType::Blob,
        _ if upper.starts_with("TIMESTAMP") || upper.starts_with("TIME") => {
            SimpleColumnType::DateTime
        }
        _ => SimpleColumnType::String,
    }
}

#[async_trait]
impl Dialect for HsqlDialect {
    fn vendor(&self) -> Vendor {
        Vendor::Hsql
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::HSQL, identifier)
    }

    fn fold_quoted_identifier(&self, identifier: &str) -> String {
        identifier.to_ascii_uppercase()
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(128)
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        match column.simple_type {
            SimpleColumnType::String => format!("VARCHAR({})", column.size.unwrap_or(255)),
            SimpleColumnType::Integer => "BIGINT".to_string(),
            SimpleColumnType::Float => "DOUBLE".to_string(),
            SimpleColumnType::Date => "DATE".to_string(),
            SimpleColumnType::DateTime => "TIMESTAMP".to_string(),
            SimpleColumnType::Blob => "BLOB".to_string(),
            SimpleColumnType::Clob => "CLOB".to_string(),
        }
    }

    fn auto_increment_suffix(&self) -> Option<&'static str> {
        Some("GENERATED BY DEFAULT AS IDENTITY")
    }

    fn clone_structure_sql(&self, source: &str, target: &str) -> Option<String> {
        Some(format!(
            "CREATE TABLE {} AS (SELECT * FROM {}) WITH NO DATA",
            self.escape_identifier(target),
            self.escape_identifier(source)
        ))
    }

    fn sequence_population(&self) -> SequencePopulation {
        SequencePopulation::Native("ROWNUM()")
    }

    fn clear_table_sql(&self, table: &str, _reset_auto_increment: bool) -> Vec<String> {
        vec![format!(
            "TRUNCATE TABLE {} RESTART IDENTITY AND COMMIT NO CHECK",
            self.escape_identifier(table)
        )]
    }

    async fn disable_constraints(&self, conn: &dyn Connection, _tables: &[String]) -> Result<()> {
        conn.execute("SET DATABASE REFERENTIAL INTEGRITY FALSE", &[])
            .await?;
        Ok(())
    }

    async fn enable_constraints(&self, conn: &dyn Connection, _tables: &[String]) -> Result<()> {
        conn.execute("SET DATABASE REFERENTIAL INTEGRITY TRUE", &[])
            .await?;
        Ok(())
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        let bare = self.unescape_identifier(table).to_ascii_uppercase();
        let count = conn
            .query_count(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = ?",
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
        let bare = self.unescape_identifier(table).to_ascii_uppercase();
        let result = conn
            .query(
                "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, CHARACTER_MAXIMUM_LENGTH, \
                 IS_IDENTITY \
                 FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
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
                .map(|v| v.eq_ignore_ascii_case("YES"))
                .unwrap_or(false);
            let mut column = DbColumnType::new(simple_type_from_hsql(data_type));
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
        let bare = self.unescape_identifier(table).to_ascii_uppercase();
        let result = conn
            .query(
                "SELECT INDEX_NAME, COLUMN_NAME FROM INFORMATION_SCHEMA.SYSTEM_INDEXINFO \
                 WHERE TABLE_NAME = ? ORDER BY INDEX_NAME, ORDINAL_POSITION",
                &[Value::String(bare)],
            )
            .await?;
        Ok(Some(result_covers_columns(&result, columns)))
    }

    fn default_port(&self) -> Option<u16> {
        Some(9001)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_rownum_function() {
        assert_eq!(
            HsqlDialect.sequence_population(),
            SequencePopulation::Native("ROWNUM()")
        );
    }

    #[test]
    fn test_clone_structure_parenthesized_select() {
        let sql = HsqlDialect.clone_structure_sql("orders", "stg_orders").unwrap();
        assert!(sql.contains("AS (SELECT * FROM orders) WITH NO DATA"));
    }

    #[test]
    fn test_reserved_word_quoted() {
        assert_eq!(HsqlDialect.escape_identifier("rownum"), "\"ROWNUM\"");
    }
}
