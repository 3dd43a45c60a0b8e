//! Microsoft SQL Server dialect

use crate::dialect::{Dialect, result_covers_columns};
use crate::reserved;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{
    Connection, DbColumnType, Result, RowsinkError, SimpleColumnType, Value, Vendor,
};

pub struct MsSqlDialect;

fn simple_type_from_mssql(type_name: &str) -> SimpleColumnType {
    match type_name.to_ascii_lowercase().as_str() {
        "text" | "ntext" => SimpleColumnType::Clob,
        "int" | "bigint" | "smallint" | "tinyint" | "bit" => SimpleColumnType::Integer,
        "float" | "real" | "decimal" | "numeric" | "money" | "smallmoney" => {
            SimpleColumnType::Float
        }
        "date" => SimpleColumnType::Date,
        "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" | "time" => {
            SimpleColumnType::DateTime
        }
        "binary" | "varbinary" | "image" => SimpleColumnType::Blob,
        _ => SimpleColumnType::String,
    }
}

#[async_trait]
impl Dialect for MsSqlDialect {
    fn vendor(&self) -> Vendor {
        Vendor::MsSql
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('[', ']')
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        reserved::is_reserved_in(&reserved::MSSQL, identifier)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        Some(128)
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        match column.simple_type {
            SimpleColumnType::String => format!("NVARCHAR({})", column.size.unwrap_or(255)),
            SimpleColumnType::Integer => "BIGINT".to_string(),
            SimpleColumnType::Float => "FLOAT".to_string(),
            SimpleColumnType::Date => "DATE".to_string(),
            SimpleColumnType::DateTime => "DATETIME2".to_string(),
            SimpleColumnType::Blob => "VARBINARY(MAX)".to_string(),
            SimpleColumnType::Clob => "NVARCHAR(MAX)".to_string(),
        }
    }

    fn auto_increment_suffix(&self) -> Option<&'static str> {
        Some("IDENTITY(1,1)")
    }

    fn add_column_sql(&self, table: &str, name: &str, column: &DbColumnType) -> String {
        // T-SQL takes ADD without the COLUMN keyword
        format!(
            "ALTER TABLE {} ADD {}",
            self.escape_identifier(table),
            self.column_def_sql(name, &column.relaxed())
        )
    }

    fn clone_structure_sql(&self, source: &str, target: &str) -> Option<String> {
        Some(format!(
            "SELECT * INTO {} FROM {} WHERE 1 = 0",
            self.escape_identifier(target),
            self.escape_identifier(source)
        ))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn drop_index_sql(&self, index_name: &str, table: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.escape_identifier(index_name),
            self.escape_identifier(table)
        )
    }

    fn clear_table_sql(&self, table: &str, _reset_auto_increment: bool) -> Vec<String> {
        vec![format!("TRUNCATE TABLE {}", self.escape_identifier(table))]
    }

    async fn disable_constraints(&self, conn: &dyn Connection, tables: &[String]) -> Result<()> {
        for table in tables {
            let escaped = self.escape_identifier(table);
            conn.execute(
                &format!("ALTER TABLE {} NOCHECK CONSTRAINT ALL", escaped),
                &[],
            )
            .await?;
            conn.execute(&format!("DISABLE TRIGGER ALL ON {}", escaped), &[])
                .await?;
        }
        Ok(())
    }

    async fn enable_constraints(&self, conn: &dyn Connection, tables: &[String]) -> Result<()> {
        for table in tables {
            let escaped = self.escape_identifier(table);
            conn.execute(
                &format!("ALTER TABLE {} WITH CHECK CHECK CONSTRAINT ALL", escaped),
                &[],
            )
            .await?;
            conn.execute(&format!("ENABLE TRIGGER ALL ON {}", escaped), &[])
                .await?;
        }
        Ok(())
    }

    async fn table_exists(&self, conn: &dyn Connection, table: &str) -> Result<bool> {
        let bare = self.unescape_identifier(table);
        let count = conn
            .query_count(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = @p1",
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
        let bare = self.unescape_identifier(table);
        let result = conn
            .query(
                "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, CHARACTER_MAXIMUM_LENGTH, \
                 COLUMNPROPERTY(OBJECT_ID(TABLE_NAME), COLUMN_NAME, 'IsIdentity') \
                 FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = @p1 \
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
            let size = row.get(3).and_then(Value::as_i64).filter(|v| *v > 0);
            let auto_increment = row.get(4).and_then(Value::as_i64).unwrap_or(0) != 0;
            let mut column = DbColumnType::new(simple_type_from_mssql(data_type));
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
        let bare = self.unescape_identifier(table);
        let result = conn
            .query(
                "SELECT i.name, c.name \
                 FROM sys.indexes i \
                 JOIN sys.index_columns ic \
                   ON i.object_id = ic.object_id AND i.index_id = ic.index_id \
                 JOIN sys.columns c \
                   ON ic.object_id = c.object_id AND ic.column_id = c.column_id \
                 WHERE i.object_id = OBJECT_ID(@p1) \
                 ORDER BY i.name, ic.key_ordinal",
                &[Value::String(bare)],
            )
            .await?;
        Ok(Some(result_covers_columns(&result, columns)))
    }

    fn default_port(&self) -> Option<u16> {
        Some(1433)
    }
}
