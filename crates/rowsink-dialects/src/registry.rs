//! Vendor-to-dialect lookup

use crate::{
    CassandraDialect, DerbyDialect, Dialect, FirebirdDialect, HsqlDialect, MariaDbDialect,
    MsSqlDialect, MySqlDialect, OracleDialect, PostgresDialect, SqliteDialect,
};
use rowsink_core::Vendor;

static ORACLE: OracleDialect = OracleDialect;
static MYSQL: MySqlDialect = MySqlDialect;
static MARIADB: MariaDbDialect = MariaDbDialect;
static POSTGRES: PostgresDialect = PostgresDialect;
static SQLITE: SqliteDialect = SqliteDialect;
static DERBY: DerbyDialect = DerbyDialect;
static HSQL: HsqlDialect = HsqlDialect;
static FIREBIRD: FirebirdDialect = FirebirdDialect;
static MSSQL: MsSqlDialect = MsSqlDialect;
static CASSANDRA: CassandraDialect = CassandraDialect;

/// The dialect implementation for a vendor. The only place in the codebase
/// that matches on `Vendor` for behavior.
pub fn dialect_for(vendor: Vendor) -> &'static dyn Dialect {
    match vendor {
        Vendor::Oracle => &ORACLE,
        Vendor::MySql => &MYSQL,
        Vendor::MariaDb => &MARIADB,
        Vendor::PostgreSql => &POSTGRES,
        Vendor::Sqlite => &SQLITE,
        Vendor::Derby => &DERBY,
        Vendor::Hsql => &HSQL,
        Vendor::Firebird => &FIREBIRD,
        Vendor::MsSql => &MSSQL,
        Vendor::Cassandra => &CASSANDRA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_vendor_has_a_dialect() {
        for vendor in Vendor::ALL {
            assert_eq!(dialect_for(vendor).vendor(), vendor);
        }
    }

    #[test]
    fn test_reserved_word_escaping_per_vendor() {
        assert_eq!(
            dialect_for(Vendor::MySql).escape_identifier("select"),
            "`select`"
        );
        assert_eq!(
            dialect_for(Vendor::Oracle).escape_identifier("select"),
            "\"SELECT\""
        );
    }

    #[test]
    fn test_connection_urls() {
        use rowsink_core::ConnectionParams;
        let params = ConnectionParams::server(Vendor::PostgreSql, "db1", "imports")
            .with_credentials("loader", "secret");
        let url = dialect_for(Vendor::PostgreSql).connection_url(&params).unwrap();
        assert_eq!(url, "postgres://loader@db1:5432/imports");

        let params = ConnectionParams::file(Vendor::Sqlite, "/data/imports.db");
        let url = dialect_for(Vendor::Sqlite).connection_url(&params).unwrap();
        assert_eq!(url, "sqlite:///data/imports.db");
    }
}
