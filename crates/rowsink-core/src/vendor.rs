//! The closed set of supported database vendors

use serde::{Deserialize, Serialize};

/// Database vendors rowsink can import into.
///
/// Orchestration and merge code never match on this enum; vendor behavior is
/// reached exclusively through the dialect trait in `rowsink-dialects`. The
/// enum exists for configuration, connection-parameter validation and
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Oracle,
    MySql,
    MariaDb,
    PostgreSql,
    Sqlite,
    Derby,
    Hsql,
    Firebird,
    MsSql,
    Cassandra,
}

impl Vendor {
    /// All supported vendors
    pub const ALL: [Vendor; 10] = [
        Vendor::Oracle,
        Vendor::MySql,
        Vendor::MariaDb,
        Vendor::PostgreSql,
        Vendor::Sqlite,
        Vendor::Derby,
        Vendor::Hsql,
        Vendor::Firebird,
        Vendor::MsSql,
        Vendor::Cassandra,
    ];

    /// Stable identifier (used in config files and URLs)
    pub fn id(&self) -> &'static str {
        match self {
            Vendor::Oracle => "oracle",
            Vendor::MySql => "mysql",
            Vendor::MariaDb => "mariadb",
            Vendor::PostgreSql => "postgres",
            Vendor::Sqlite => "sqlite",
            Vendor::Derby => "derby",
            Vendor::Hsql => "hsql",
            Vendor::Firebird => "firebird",
            Vendor::MsSql => "mssql",
            Vendor::Cassandra => "cassandra",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Vendor::Oracle => "Oracle",
            Vendor::MySql => "MySQL",
            Vendor::MariaDb => "MariaDB",
            Vendor::PostgreSql => "PostgreSQL",
            Vendor::Sqlite => "SQLite",
            Vendor::Derby => "Apache Derby",
            Vendor::Hsql => "HSQLDB",
            Vendor::Firebird => "Firebird",
            Vendor::MsSql => "Microsoft SQL Server",
            Vendor::Cassandra => "Apache Cassandra",
        }
    }

    /// Whether the database is addressed as a local file rather than a host.
    ///
    /// HSQL runs both embedded and as a server; it counts as file-based only
    /// when no host is configured, which `ConnectionParams::validate` checks.
    pub fn is_file_based(&self) -> bool {
        matches!(self, Vendor::Sqlite | Vendor::Derby)
    }

    /// Whether the vendor can host the staging-table pipeline. Backends
    /// without temp-table/ALTER support fall back to the row-by-row worker.
    pub fn supports_staging(&self) -> bool {
        !matches!(self, Vendor::Cassandra)
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Vendor {
    type Err = crate::RowsinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Vendor::ALL
            .iter()
            .copied()
            .find(|v| v.id() == lowered)
            .ok_or_else(|| crate::RowsinkError::Definition(format!("unknown vendor: {}", s)))
    }
}
