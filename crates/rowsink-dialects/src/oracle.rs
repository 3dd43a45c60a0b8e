//! Oracle dialect

use crate::dialect::{Dialect, SequencePopulation, result_covers_columns};
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct OracleDialect;

fn simple_type_from_oracle(type_name: &str, scale: Option<i64>) -> SimpleColumnType {
    let upper = type_name.to_ascii_uppercase();
    if upper.starts_with("TIMESTAMP") {
        return SimpleColumnType::DateTime;
    }
    match upper.as_str() {
        "NUMBER" => match scale {
            Some(0) | None => SimpleColumnType::Integer,
            _ => SimpleColumnType::Float,
        },
        "BINARY_DOUBLE" | "BINARY_FLOAT" | "FLOAT" => SimpleColumnType::Float,
        "DATE" => SimpleColumnType::Date,
        "BLOB" | "RAW" | "LONG RAW" => SimpleColumnType::Blob,
        "CLOB" | "NCLOB" | "LONG" => SimpleColumnType::Clob,
        _ => SimpleColumnType::String,
    }
}

#[async_trait]
impl Dialect for OracleDialect {
    fn vendor(&self) -> Vendor {
        Vendor::Oracle
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::ORACLE, identifier)
    }

    /// Oracle resolves unquoted identifiers to upper case; quoting must
    /// upper-case to keep addressing the same object.
    fn fold_quoted_identifier(&self, identifier: &str) -> String {
        identifier.to_ascii_uppercase()
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(30)
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        match column.simple_type {
            SimpleColumnType::String => format!("VARCHAR2({})", column.size.unwrap_or(255)),
            SimpleColumnType::Integer => "NUMBER(19, 0)".to_string(),
            SimpleColumnType::Float => "BINARY_DOUBLE".to_string(),
            SimpleColumnType::Date => "DATE".to_string(),
            SimpleColumnType::DateTime => "TIMESTAMP".to_string(),
            SimpleColumnType::Blob => "BLOB".to_string(),
            SimpleColumnType::Clob => "CLOB".to_string(),
        }
    }

    fn auto_increment_suffix(&self) -> Option<&'static str> {
        Some("GENERATED BY DEFAULT AS IDENTITY")
    }

    fn add_column_sql(&self, table: &str, name: &str, column: &DbColumnType) -> String {
        // Oracle takes ADD (col type), without the COLUMN keyword
        format!(
            "ALTER TABLE {} ADD ({})",
            self.escape_identifier(table),
            self.column_def_sql(name, &column.relaxed())
        )
    }

    fn sequence_population(&self) -> SequencePopulation {
        SequencePopulation::Native("ROWNUM")
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn clear_table_sql(&self, table: &str, _reset_auto_increment: bool) -> Vec<String> {
        vec![format!("TRUNCATE TABLE {}", self.escape_identifier(table))]
    }

    async fn disable_constraints(&self, conn: &dyn Connection, tables: &[String]) -> Result<()> {
        for table in tables {
            let bare = self.unescape_identifier(table).to_ascii_uppercase();
            let result = conn
                .query(
                    "SELECT CONSTRAINT_NAME FROM USER_CONSTRAINTS \
                     WHERE TABLE_NAME = :1 AND CONSTRAINT_TYPE = 'R'",
                    &[Value::String(bare)],
                )
                .await?;
            for row in &result.rows {
                if let Some(name) = row.get(0).and_then(Value::as_str) {
                    let sql = format!(
                        "ALTER TABLE {} DISABLE CONSTRAINT {}",
                        self.escape_identifier(table),
                        self.escape_identifier(name)
                    );
                    conn.execute(&sql, &[]).await?;
                }
            }
            let sql = format!(
                "ALTER TABLE {} DISABLE ALL TRIGGERS",
                self.escape_identifier(table)
            );
            conn.execute(&sql, &[]).await?;
        }
        Ok(())
    }

    async fn enable_constraints(&self, conn: &dyn Connection, tables: &[String]) -> Result<()> {
        for table in tables {
            let bare = self.unescape_identifier(table).to_ascii_uppercase();
            let result = conn
                .query(
                    "SELECT CONSTRAINT_NAME FROM USER_CONSTRAINTS \
                     WHERE TABLE_NAME = :1 AND CONSTRAINT_TYPE = 'R'",
                    &[Value::String(bare)],
                )
                .await?;
            for row in &result.rows {
                if let Some(name) = row.get(0).and_then(Value::as_str) {
                    let sql = format!(
                        "ALTER TABLE {} ENABLE CONSTRAINT {}",
                        self.escape_identifier(table),
                        self.escape_identifier(name)
                    );
                    conn.execute(&sql, &[]).await?;
                }
            }
            let sql = format!(
                "ALTER TABLE {} ENABLE ALL TRIGGERS",
                self.escape_identifier(table)
            );
            conn.execute(&sql, &[]).await?;
        }
        Ok(())
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        let bare = self.unescape_identifier(table).to_ascii_uppercase();
        let count = conn
            .query_count(
                "SELECT COUNT(*) FROM USER_TABLES WHERE TABLE_NAME = :1",
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
                "SELECT COLUMN_NAME, DATA_TYPE, NULLABLE, CHAR_LENGTH, DATA_SCALE, \
                 IDENTITY_COLUMN \
                 FROM USER_TAB_COLUMNS WHERE TABLE_NAME = :1 ORDER BY COLUMN_ID",
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
                .map(|v| v.eq_ignore_ascii_case("Y"))
                .unwrap_or(true);
            let size = row.get(3).and_then(Value::as_i64).filter(|v| *v > 0);
            let scale = row.get(4).and_then(Value::as_i64);
            let auto_increment = row
                .get(5)
                .and_then(Value::as_str)
                .map(|v| v.eq_ignore_ascii_case("YES"))
                .unwrap_or(false);
            let mut column = DbColumnType::new(simple_type_from_oracle(data_type, scale));
            column.nullable = nullable;
            column.auto_increment = auto_increment;
            if column.simple_type.is_sized() {
                column.size = size.map(|v| v as u32);
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
                "SELECT INDEX_NAME, COLUMN_NAME FROM USER_IND_COLUMNS \
                 WHERE TABLE_NAME = :1 ORDER BY INDEX_NAME, COLUMN_POSITION",
                &[Value::String(bare)],
            )
            .await?;
        Ok(Some(result_covers_columns(&result, columns)))
    }

    fn default_port(&self) -> Option<u16> {
        Some(1521)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_word_quoted_uppercase() {
        let dialect = OracleDialect;
        assert_eq!(dialect.escape_identifier("select"), "\"SELECT\"");
        assert_eq!(dialect.escape_identifier("rownum"), "\"ROWNUM\"");
        assert_eq!(dialect.escape_identifier("customer_id"), "customer_id");
    }

    #[test]
    fn test_integer_maps_to_number() {
        let dialect = OracleDialect;
        let col = DbColumnType::new(SimpleColumnType::Integer);
        assert_eq!(dialect.column_type_sql(&col), "NUMBER(19, 0)");
    }

    #[test]
    fn test_number_scale_classification() {
        assert_eq!(simple_type_from_oracle("NUMBER", Some(0)), SimpleColumnType::Integer);
        assert_eq!(simple_type_from_oracle("NUMBER", Some(4)), SimpleColumnType::Float);
        assert_eq!(
            simple_type_from_oracle("TIMESTAMP(6)", None),
            SimpleColumnType::DateTime
        );
    }

    #[test]
    fn test_native_rownum_sequence() {
        assert_eq!(
            OracleDialect.sequence_population(),
            SequencePopulation::Native("ROWNUM")
        );
    }

    #[test]
    fn test_placeholder_style() {
        assert_eq!(OracleDialect.placeholder(3), ":3");
    }

    #[test]
    fn test_identifier_cap() {
        assert_eq!(OracleDialect.max_identifier_length(), Some(30));
    }
}
