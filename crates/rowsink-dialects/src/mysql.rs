//! MySQL dialect

use crate::dialect::{Dialect, result_covers_columns};
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct MySqlDialect;

/// MySQL type-name classification, shared with MariaDB
pub(crate) fn simple_type_from_mysql(type_name: &str) -> SimpleColumnType {
    match type_name.to_ascii_lowercase().as_str() {
        "text" | "tinytext" | "mediumtext" | "longtext" => SimpleColumnType::Clob,
        "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "bit" | "year" => {
            SimpleColumnType::Integer
        }
        "float" | "double" | "decimal" | "numeric" => SimpleColumnType::Float,
        "date" => SimpleColumnType::Date,
        "datetime" | "timestamp" | "time" => SimpleColumnType::DateTime,
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
            SimpleColumnType::Blob
        }
        _ => SimpleColumnType::String,
    }
}

pub(crate) async fn mysql_table_exists(conn: &dyn Connection, table: &str) -> Result<bool> {
    let count = conn
        .query_count(
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            &[Value::String(table.to_string())],
        )
        .await?;
    Ok(count > 0)
}

pub(crate) async fn mysql_table_columns(
    conn: &dyn Connection,
    table: &str,
) -> Result<IndexMap<String, DbColumnType>> {
    let result = conn
        .query(
            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, CHARACTER_MAXIMUM_LENGTH, EXTRA \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
            &[Value::String(table.to_string())],
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
            .map(|v| v.to_ascii_lowercase().contains("auto_increment"))
            .unwrap_or(false);
        let mut column = DbColumnType::new(simple_type_from_mysql(data_type));
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

pub(crate) async fn mysql_index_exists(
    conn: &dyn Connection,
    table: &str,
    columns: &[String],
) -> Result<Option<bool>> {
    let result = conn
        .query(
            "SELECT INDEX_NAME, COLUMN_NAME FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            &[Value::String(table.to_string())],
        )
        .await?;
    Ok(Some(result_covers_columns(&result, columns)))
}

#[async_trait]
impl Dialect for MySqlDialect {
    fn vendor(&self) -> Vendor {
        Vendor::MySql
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('`', '`')
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::MYSQL, identifier)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(64)
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        match column.simple_type {
            SimpleColumnType::String => format!("VARCHAR({})", column.size.unwrap_or(255)),
            SimpleColumnType::Integer => "BIGINT".to_string(),
            SimpleColumnType::Float => "DOUBLE".to_string(),
            SimpleColumnType::Date => "DATE".to_string(),
            SimpleColumnType::DateTime => "DATETIME".to_string(),
            SimpleColumnType::Blob => "LONGBLOB".to_string(),
            SimpleColumnType::Clob => "LONGTEXT".to_string(),
        }
    }

    fn auto_increment_suffix(&self) -> Option<&'static str> {
        Some("AUTO_INCREMENT")
    }

    fn wraps_self_reference_subquery(&self) -> bool {
        true
    }

    fn drop_index_sql(&self, index_name: &str, table: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.escape_identifier(index_name),
            self.escape_identifier(table)
        )
    }

    fn clear_table_sql(&self, table: &str, _reset_auto_increment: bool) -> Vec<String> {
        // TRUNCATE also resets AUTO_INCREMENT counters
        vec![format!("TRUNCATE TABLE {}", self.escape_identifier(table))]
    }

    async fn disable_constraints(&self, conn: &dyn Connection, _tables: &[String]) -> Result<()> {
        conn.execute("SET FOREIGN_KEY_CHECKS = 0", &[]).await?;
        Ok(())
    }

    async fn enable_constraints(&self, conn: &dyn Connection, _tables: &[String]) -> Result<()> {
        conn.execute("SET FOREIGN_KEY_CHECKS = 1", &[]).await?;
        Ok(())
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        mysql_table_exists(conn, table).await
    }

    async fn table_columns(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> Result<IndexMap<String, DbColumnType>> {
        mysql_table_columns(conn, table).await
    }

    async fn index_exists(
        &self,
        conn: &dyn Connection,
        table: &str,
        columns: &[String],
    ) -> Result<Option<bool>> {
        mysql_index_exists(conn, table, columns).await
    }

    fn default_port(&self) -> Option<u16> {
        Some(3306)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_word_gets_backticks() {
        let dialect = MySqlDialect;
        assert_eq!(dialect.escape_identifier("select"), "`select`");
        assert_eq!(dialect.escape_identifier("customer_id"), "customer_id");
    }

    #[test]
    fn test_unsafe_identifier_gets_backticks() {
        let dialect = MySqlDialect;
        assert_eq!(dialect.escape_identifier("first name"), "`first name`");
    }

    #[test]
    fn test_blob_maps_to_longblob() {
        let dialect = MySqlDialect;
        let col = DbColumnType::new(SimpleColumnType::Blob);
        assert_eq!(dialect.column_type_sql(&col), "LONGBLOB");
    }

    #[test]
    fn test_sized_string() {
        let dialect = MySqlDialect;
        let col = DbColumnType::new(SimpleColumnType::String).with_size(40);
        assert_eq!(dialect.column_type_sql(&col), "VARCHAR(40)");
    }

    #[test]
    fn test_clear_table_uses_truncate() {
        let dialect = MySqlDialect;
        let sql = dialect.clear_table_sql("orders", true);
        assert_eq!(sql, vec!["TRUNCATE TABLE orders".to_string()]);
    }

    #[test]
    fn test_self_reference_wrap_required() {
        assert!(MySqlDialect.wraps_self_reference_subquery());
    }
}
