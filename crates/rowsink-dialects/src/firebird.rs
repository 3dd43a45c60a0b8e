//! Firebird dialect

use crate::dialect::{Dialect, result_covers_columns};
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct FirebirdDialect;

/// RDB$FIELDS stores numeric type codes
fn simple_type_from_firebird(field_type: i64, sub_type: i64) -> SimpleColumnType {
    match field_type {
        7 | 8 | 16 if sub_type == 0 => SimpleColumnType::Integer,
        7 | 8 | 16 => SimpleColumnType::Float, // NUMERIC/DECIMAL stored on integer base types
        10 | 27 => SimpleColumnType::Float,
        12 => SimpleColumnType::Date,
        13 | 35 => SimpleColumnType::DateTime,
        261 if sub_type == 1 => SimpleColumnType::Clob,
        261 => SimpleColumnType::Blob,
        _ => SimpleColumnType::String,
    }
}

#[async_trait]
impl Dialect for FirebirdDialect {
    fn vendor(&self) -> Vendor {
        Vendor::Firebird
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::FIREBIRD, identifier)
    }

    fn fold_quoted_identifier(&self, identifier: &str) -> String {
        identifier.to_ascii_uppercase()
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(31)
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        match column.simple_type {
            SimpleColumnType::String => format!("VARCHAR({})", column.size.unwrap_or(255)),
            SimpleColumnType::Integer => "BIGINT".to_string(),
            SimpleColumnType::Float => "DOUBLE PRECISION".to_string(),
            SimpleColumnType::Date => "DATE".to_string(),
            SimpleColumnType::DateTime => "TIMESTAMP".to_string(),
            SimpleColumnType::Blob => "BLOB SUB_TYPE BINARY".to_string(),
            SimpleColumnType::Clob => "BLOB SUB_TYPE TEXT".to_string(),
        }
    }

    fn auto_increment_suffix(&self) -> Option<&'static str> {
        Some("GENERATED BY DEFAULT AS IDENTITY")
    }

    fn add_column_sql(&self, table: &str, name: &str, column: &DbColumnType) -> String {
        // Firebird takes ADD without the COLUMN keyword
        format!(
            "ALTER TABLE {} ADD {}",
            self.escape_identifier(table),
            self.column_def_sql(name, &column.relaxed())
        )
    }

    /// Firebird supports no CREATE-AS-SELECT; staging shape comes from
    /// introspected metadata.
    fn clone_structure_sql(&self, _source: &str, _target: &str) -> Option<String> {
        None
    }

    /// DDL inside an open transaction is unreliable; commit first.
    fn requires_commit_before_ddl(&self) -> bool {
        true
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        let bare = self.unescape_identifier(table).to_ascii_uppercase();
        let count = conn
            .query_count(
                "SELECT COUNT(*) FROM RDB$RELATIONS WHERE TRIM(RDB$RELATION_NAME) = ?",
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
                "SELECT TRIM(rf.RDB$FIELD_NAME), f.RDB$FIELD_TYPE, \
                 COALESCE(f.RDB$FIELD_SUB_TYPE, 0), f.RDB$CHARACTER_LENGTH, \
                 COALESCE(rf.RDB$NULL_FLAG, 0), rf.RDB$IDENTITY_TYPE \
                 FROM RDB$RELATION_FIELDS rf \
                 JOIN RDB$FIELDS f ON rf.RDB$FIELD_SOURCE = f.RDB$FIELD_NAME \
                 WHERE TRIM(rf.RDB$RELATION_NAME) = ? \
                 ORDER BY rf.RDB$FIELD_POSITION",
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
            let field_type = row.get(1).and_then(Value::as_i64).unwrap_or(37);
            let sub_type = row.get(2).and_then(Value::as_i64).unwrap_or(0);
            let size = row.get(3).and_then(Value::as_i64).map(|v| v as u32);
            let not_null = row.get(4).and_then(Value::as_i64).unwrap_or(0) != 0;
            let auto_increment = row.get(5).map(|v| !v.is_null()).unwrap_or(false);
            let mut column = DbColumnType::new(simple_type_from_firebird(field_type, sub_type));
            column.nullable = !not_null;
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
                "SELECT TRIM(i.RDB$INDEX_NAME), TRIM(s.RDB$FIELD_NAME) \
                 FROM RDB$INDICES i \
                 JOIN RDB$INDEX_SEGMENTS s ON i.RDB$INDEX_NAME = s.RDB$INDEX_NAME \
                 WHERE TRIM(i.RDB$RELATION_NAME) = ? \
                 ORDER BY i.RDB$INDEX_NAME, s.RDB$FIELD_POSITION",
                &[Value::String(bare)],
            )
            .await?;
        Ok(Some(result_covers_columns(&result, columns)))
    }

    fn default_port(&self) -> Option<u16> {
        Some(3050)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_codes() {
        assert_eq!(simple_type_from_firebird(16, 0), SimpleColumnType::Integer);
        assert_eq!(simple_type_from_firebird(16, 1), SimpleColumnType::Float);
        assert_eq!(simple_type_from_firebird(27, 0), SimpleColumnType::Float);
        assert_eq!(simple_type_from_firebird(261, 0), SimpleColumnType::Blob);
        assert_eq!(simple_type_from_firebird(261, 1), SimpleColumnType::Clob);
        assert_eq!(simple_type_from_firebird(37, 0), SimpleColumnType::String);
    }

    #[test]
    fn test_no_create_as_select() {
        assert!(FirebirdDialect.clone_structure_sql("a", "b").is_none());
        assert!(FirebirdDialect.requires_commit_before_ddl());
    }

    #[test]
    fn test_blob_subtypes() {
        let blob = DbColumnType::new(SimpleColumnType::Blob);
        let clob = DbColumnType::new(SimpleColumnType::Clob);
        assert_eq!(FirebirdDialect.column_type_sql(&blob), "BLOB SUB_TYPE BINARY");
        assert_eq!(FirebirdDialect.column_type_sql(&clob), "BLOB SUB_TYPE TEXT");
    }
}
