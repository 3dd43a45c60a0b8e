//! MariaDB dialect
//!
//! MariaDB speaks MySQL's dialect for everything this engine generates; only
//! the vendor identity (and thus URLs/diagnostics) differs.

use crate::dialect::Dialect;
use crate::mysql::{MySqlDialect, mysql_index_exists, mysql_table_columns, mysql_table_exists};
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{Connection, DbColumnType, Result, Vendor};

pub struct MariaDbDialect;

const INNER: MySqlDialect = MySqlDialect;

#[async_trait]
impl Dialect for MariaDbDialect {
    fn vendor(&self) -> Vendor {
        Vendor::MariaDb
    }

    fn identifier_quotes(&self) -> (char, char) {
        INNER.identifier_quotes()
    }

    fn is_reserved(&self, identifier: &str) -> bool {
        INNER.is_reserved(identifier)
    }

    fn max_identifier_length(&self) -> Option<usize> {
        INNER.max_identifier_length()
    }

    fn column_type_sql(&self, column: &DbColumnType) -> String {
        INNER.column_type_sql(column)
    }

    fn auto_increment_suffix(&self) -> Option<&'static str> {
        INNER.auto_increment_suffix()
    }

    fn wraps_self_reference_subquery(&self) -> bool {
        INNER.wraps_self_reference_subquery()
    }

    fn clear_table_sql(&self, table: &str, reset_auto_increment: bool) -> Vec<String> {
        INNER.clear_table_sql(table, reset_auto_increment)
    }

    fn drop_index_sql(&self, index_name: &str, table: &str) -> String {
        INNER.drop_index_sql(index_name, table)
    }

    async fn disable_constraints(&self, conn: &dyn Connection, tables: &[String]) -> Result<()> {
        INNER.disable_constraints(conn, tables).await
    }

    async fn enable_constraints(&self, conn: &dyn Connection, tables: &[String]) -> Result<()> {
        INNER.enable_constraints(conn, tables).await
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
        INNER.default_port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mariadb_matches_mysql_escaping() {
        assert_eq!(MariaDbDialect.escape_identifier("select"), "`select`");
    }

    #[test]
    fn test_vendor_identity_differs() {
        assert_eq!(MariaDbDialect.vendor(), Vendor::MariaDb);
    }
}
