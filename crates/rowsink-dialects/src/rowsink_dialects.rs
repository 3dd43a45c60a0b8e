//! Per-vendor SQL dialect implementations
//!
//! Everything above this crate talks to the [`Dialect`] trait; no caller
//! inspects vendor identity directly. Each vendor module owns its reserved
//! words, type mapping, DDL generation quirks and catalog introspection.

mod cassandra;
mod derby;
mod dialect;
mod firebird;
mod hsql;
mod mariadb;
mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod registry;
mod reserved;
mod sqlite;

pub use cassandra::CassandraDialect;
pub use derby::DerbyDialect;
pub use dialect::{Dialect, SequencePopulation, cap_identifier, is_safe_identifier};
pub use firebird::FirebirdDialect;
pub use hsql::HsqlDialect;
pub use mariadb::MariaDbDialect;
pub use mssql::MsSqlDialect;
pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use registry::dialect_for;
pub use sqlite::SqliteDialect;
