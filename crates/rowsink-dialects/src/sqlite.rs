//! SQLite dialect

use crate::dialect::{Dialect, SequencePopulation};
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct SqliteDialect;

/// SQLite declared types are free-form; classification goes by affinity-style
/// keyword matching on the declared type.
fn simple_type_from_sqlite(declared: &str) -> SimpleColumnType {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("CLOB") {
        SimpleColumnType::Clob
    } else if upper.contains("INT") {
        SimpleColumnType::Integer
    } else if upper.contains("CHAR") || upper.contains("TEXT") {
        SimpleColumnType::String
    } else if upper.contains("BLOB") || upper.is_empty() {
        SimpleColumnType::Blob
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB")
        || upper.contains("DEC") || upper.contains("NUM")
    {
        SimpleColumnType::Float
    } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        SimpleColumnType::DateTime
    } else if upper.contains("DATE") {
        SimpleColumnType::Date
    } else {
        SimpleColumnType::String
    }
}

/// Pull a `(255)`-style length out of a declared type
fn declared_size(declared: &str) -> Option<u32> {
    let open = declared.find('(')?;
    let close = declared.find(')')?;
    declared.get(open + 1..close)?.trim().parse().ok()
}

#[async_trait]
impl Dialect for SqliteDialect {
    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::SQLITE, identifier)
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        match column.simple_type {
            SimpleColumnType::String => match column.size {
                Some(size) => format!("VARCHAR({})", size),
                None => "TEXT".to_string(),
            },
            SimpleColumnType::Integer => "INTEGER".to_string(),
            SimpleColumnType::Float => "REAL".to_string(),
            SimpleColumnType::Date => "DATE".to_string(),
            SimpleColumnType::DateTime => "DATETIME".to_string(),
            SimpleColumnType::Blob => "BLOB".to_string(),
            SimpleColumnType::Clob => "CLOB".to_string(),
        }
    }

    /// Only valid on INTEGER columns; SQLite ties AUTOINCREMENT to the
    /// rowid-aliased primary key.
    fn auto_increment_suffix(&self) -> Option<&'static str> {
        Some("PRIMARY KEY AUTOINCREMENT")
    }

    fn sequence_population(&self) -> SequencePopulation {
        SequencePopulation::Native("ROWID")
    }

    /// SQLite has no DROP COLUMN; emulate by rename, recreate without the
    /// column, copy, drop. The caller runs the plan in one transaction so a
    /// failure anywhere rolls the whole emulation back.
    fn drop_column_plan(
        &self,
        table: &str,
        column: &str,
        remaining: &IndexMap<String, DbColumnType>,
        primary_key: &[String],
    ) -> Vec<String> {
        let bare = self.unescape_identifier(table);
        let old = format!("{}_drop_old", bare);
        let kept: Vec<String> = remaining
            .keys()
            .filter(|name| !name.eq_ignore_ascii_case(column))
            .map(|name| self.escape_identifier(name))
            .collect();
        let kept_defs: IndexMap<String, DbColumnType> = remaining
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(column))
            .map(|(name, ty)| (name.clone(), ty.clone()))
            .collect();
        vec![
            format!(
                "ALTER TABLE {} RENAME TO {}",
                self.escape_identifier(table),
                self.escape_identifier(&old)
            ),
            self.create_table_sql(table, &kept_defs, primary_key),
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                self.escape_identifier(table),
                kept.join(", "),
                kept.join(", "),
                self.escape_identifier(&old)
            ),
            format!("DROP TABLE {}", self.escape_identifier(&old)),
        ]
    }

    fn clear_table_sql(&self, table: &str, reset_auto_increment: bool) -> Vec<String> {
        let mut statements = vec![format!("DELETE FROM {}", self.escape_identifier(table))];
        if reset_auto_increment {
            // AUTOINCREMENT counters live in sqlite_sequence and survive DELETE
            statements.push(format!(
                "DELETE FROM sqlite_sequence WHERE name = '{}'",
                self.unescape_identifier(table)
            ));
        }
        statements
    }

    async fn disable_constraints(&self, conn: &dyn Connection, _tables: &[String]) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = OFF", &[]).await?;
        Ok(())
    }

    async fn enable_constraints(&self, conn: &dyn Connection, _tables: &[String]) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON", &[]).await?;
        Ok(())
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        let bare = self.unescape_identifier(table);
        let count = conn
            .query_count(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?)",
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
        // PRAGMA takes no bind parameters; the table name is embedded escaped
        let sql = format!("PRAGMA table_info({})", self.escape_identifier(table));
        let result = conn.query(&sql, &[]).await?;
        let mut columns = IndexMap::new();
        for row in &result.rows {
            let name = row
                .get_by_name("name")
                .and_then(Value::as_str)
                .ok_or_else(|| RowsinkError::Other("malformed table_info row".into()))?
                .to_string();
            let declared = row
                .get_by_name("type")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let not_null = row
                .get_by_name("notnull")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                != 0;
            let pk = row.get_by_name("pk").and_then(Value::as_i64).unwrap_or(0) != 0;
            let mut column = DbColumnType::new(simple_type_from_sqlite(declared));
            column.nullable = !not_null;
            // An INTEGER PRIMARY KEY aliases the rowid and behaves as an
            // auto-increment column for sequencing purposes
            column.auto_increment = pk && column.simple_type == SimpleColumnType::Integer;
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

    async fn index_exists(
        &self,
        conn: &dyn Connection,
        table: &str,
        columns: &[String],
    ) -> Result<Option<bool>> {
        let wanted: std::collections::HashSet<String> =
            columns.iter().map(|c| c.to_ascii_lowercase()).collect();
        let list_sql = format!("PRAGMA index_list({})", self.escape_identifier(table));
        let indexes = conn.query(&list_sql, &[]).await?;
        for row in &indexes.rows {
            let Some(index_name) = row.get_by_name("name").and_then(Value::as_str) else {
                continue;
            };
            let info_sql = format!("PRAGMA index_info({})", self.escape_identifier(index_name));
            let info = conn.query(&info_sql, &[]).await?;
            let covered: std::collections::HashSet<String> = info
                .rows
                .iter()
                .filter_map(|r| r.get_by_name("name").and_then(Value::as_str))
                .map(|c| c.to_ascii_lowercase())
                .collect();
            if covered == wanted {
                return Ok(Some(true));
            }
        }
        Ok(Some(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_declared_type_classification() {
        assert_eq!(simple_type_from_sqlite("VARCHAR(80)"), SimpleColumnType::String);
        assert_eq!(simple_type_from_sqlite("INTEGER"), SimpleColumnType::Integer);
        assert_eq!(simple_type_from_sqlite("BLOB"), SimpleColumnType::Blob);
        assert_eq!(simple_type_from_sqlite("CLOB"), SimpleColumnType::Clob);
        assert_eq!(simple_type_from_sqlite("DATETIME"), SimpleColumnType::DateTime);
        assert_eq!(simple_type_from_sqlite("DATE"), SimpleColumnType::Date);
    }

    #[test]
    fn test_declared_size_extraction() {
        assert_eq!(declared_size("VARCHAR(40)"), Some(40));
        assert_eq!(declared_size("TEXT"), None);
    }

    #[test]
    fn test_drop_column_plan_is_rename_recreate_copy_drop() {
        let dialect = SqliteDialect;
        let mut columns = IndexMap::new();
        columns.insert("id".to_string(), DbColumnType::new(SimpleColumnType::Integer));
        columns.insert("name".to_string(), DbColumnType::new(SimpleColumnType::String));
        columns.insert("extra".to_string(), DbColumnType::new(SimpleColumnType::String));
        let plan = dialect.drop_column_plan("people", "extra", &columns, &[]);
        assert_eq!(plan.len(), 4);
        assert!(plan[0].starts_with("ALTER TABLE people RENAME TO"));
        assert!(plan[1].starts_with("CREATE TABLE people"));
        assert!(!plan[1].contains("extra"));
        assert!(plan[2].starts_with("INSERT INTO people"));
        assert!(plan[3].starts_with("DROP TABLE"));
    }

    #[test]
    fn test_clear_table_resets_sequence_when_asked() {
        let dialect = SqliteDialect;
        let sql = dialect.clear_table_sql("users", true);
        assert_eq!(sql.len(), 2);
        assert!(sql[0].starts_with("DELETE FROM"));
        assert!(sql[1].contains("sqlite_sequence"));
        assert_eq!(dialect.clear_table_sql("users", false).len(), 1);
    }

    #[test]
    fn test_native_rowid_sequence() {
        assert_eq!(
            SqliteDialect.sequence_population(),
            SequencePopulation::Native("ROWID")
        );
    }
}
