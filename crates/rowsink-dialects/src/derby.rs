//! Apache Derby dialect

use crate::dialect::Dialect;
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct DerbyDialect;

/// Derby renders column types as declaration strings ("VARCHAR(20) NOT NULL")
/// in SYS.SYSCOLUMNS; classification goes by type prefix.
fn simple_type_from_derby(declared: &str) -> SimpleColumnType {
    let upper = declared.to_ascii_uppercase();
    if upper.starts_with("CLOB") || upper.starts_with("LONG VARCHAR") {
        SimpleColumnType::Clob
    } else if upper.starts_with("BLOB") || upper.starts_with("CHAR () FOR BIT DATA")
        || upper.contains("FOR BIT DATA")
    {
        SimpleColumnType::Blob
    } else if upper.starts_with("BIGINT") || upper.starts_with("INTEGER")
        || upper.starts_with("SMALLINT")
    {
        SimpleColumnType::Integer
    } else if upper.starts_with("DOUBLE") || upper.starts_with("REAL")
        || upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC")
        || upper.starts_with("FLOAT")
    {
        SimpleColumnType::Float
    } else if upper.starts_with("TIMESTAMP") {
        SimpleColumnType::DateTime
    } else if upper.starts_with("DATE") {
        SimpleColumnType::Date
    } else {
        SimpleColumnType::String
    }
}

fn declared_size(declared: &str) -> Option<u32> {
    let open = declared.find('(')?;
    let close = declared.find(')')?;
    declared.get(open + 1..close)?.trim().parse().ok()
}

#[async_trait]
impl Dialect for DerbyDialect {
    fn vendor(&self) -> Vendor {
        Vendor::Derby
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::DERBY, identifier)
    }

    /// Derby folds unquoted identifiers to upper case
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
            "CREATE TABLE {} AS SELECT * FROM {} WITH NO DATA",
            self.escape_identifier(target),
            self.escape_identifier(source)
        ))
    }

    fn drop_column_plan(
        &self,
        table: &str,
        column: &str,
        _remaining: &IndexMap<String, DbColumnType>,
        _primary_key: &[String],
    ) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} DROP COLUMN {} RESTRICT",
            self.escape_identifier(table),
            self.escape_identifier(column)
        )]
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        let bare = self.unescape_identifier(table).to_ascii_uppercase();
        let count = conn
            .query_count(
                "SELECT COUNT(*) FROM SYS.SYSTABLES WHERE TABLENAME = ?",
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
                "SELECT C.COLUMNNAME, CAST(C.COLUMNDATATYPE AS VARCHAR(128)), \
                 C.AUTOINCREMENTVALUE \
                 FROM SYS.SYSCOLUMNS C \
                 JOIN SYS.SYSTABLES T ON C.REFERENCEID = T.TABLEID \
                 WHERE T.TABLENAME = ? ORDER BY C.COLUMNNUMBER",
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
            let declared = row.get(1).and_then(Value::as_str).unwrap_or_default();
            let auto_increment = row.get(2).map(|v| !v.is_null()).unwrap_or(false);
            let mut column = DbColumnType::new(simple_type_from_derby(declared));
            column.nullable = !declared.to_ascii_uppercase().contains("NOT NULL");
            column.auto_increment = auto_increment;
            if column.simple_type.is_sized() {
                column.size = declared_size(declared);
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

    // Derby offers no reliable index-by-column catalog query through plain
    // SQL, so the probe stays unknown and callers must not rely on it.

    fn default_port(&self) -> Option<u16> {
        Some(1527)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SequencePopulation;

    #[test]
    fn test_reserved_word_quoted_uppercase() {
        let dialect = DerbyDialect;
        assert_eq!(dialect.escape_identifier("year"), "\"YEAR\"");
        assert_eq!(dialect.escape_identifier("customer_id"), "customer_id");
    }

    #[test]
    fn test_declared_type_classification() {
        assert_eq!(
            simple_type_from_derby("VARCHAR(20) NOT NULL"),
            SimpleColumnType::String
        );
        assert_eq!(simple_type_from_derby("BIGINT"), SimpleColumnType::Integer);
        assert_eq!(simple_type_from_derby("TIMESTAMP"), SimpleColumnType::DateTime);
        assert_eq!(
            simple_type_from_derby("CHAR (16) FOR BIT DATA"),
            SimpleColumnType::Blob
        );
    }

    #[test]
    fn test_no_native_row_number() {
        // Derby goes through the windowed re-insert path
        assert_eq!(
            DerbyDialect.sequence_population(),
            SequencePopulation::AutoIncrementOrReinsert
        );
    }

    #[test]
    fn test_drop_column_uses_restrict() {
        let plan = DerbyDialect.drop_column_plan("t", "c", &IndexMap::new(), &[]);
        assert_eq!(plan, vec!["ALTER TABLE t DROP COLUMN c RESTRICT".to_string()]);
    }
}
