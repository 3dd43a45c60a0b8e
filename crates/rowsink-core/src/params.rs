//! Connection parameters and their per-vendor validation

use crate::{Result, RowsinkError, Vendor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters for opening a database connection.
///
/// Validation happens before any connection attempt: file-based vendors
/// (SQLite, Derby, embedded HSQL) reject hostname/username/password, and
/// server vendors require a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub vendor: Vendor,
    /// Host address; `None` for file-based databases
    #[serde(default)]
    pub host: Option<String>,
    /// Port; `None` means the vendor default
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name, or file path for file-based vendors
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Password (kept out of Debug-formatted logs by callers)
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub trust_store_path: Option<PathBuf>,
    #[serde(default)]
    pub trust_store_password: Option<String>,
}

impl ConnectionParams {
    /// Create parameters for a file-based database
    pub fn file(vendor: Vendor, path: impl Into<String>) -> Self {
        Self {
            vendor,
            host: None,
            port: None,
            database: path.into(),
            username: None,
            password: None,
            use_tls: false,
            trust_store_path: None,
            trust_store_password: None,
        }
    }

    /// Create parameters for a server database
    pub fn server(
        vendor: Vendor,
        host: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            vendor,
            host: Some(host.into()),
            port: None,
            database: database.into(),
            username: None,
            password: None,
            use_tls: false,
            trust_store_path: None,
            trust_store_password: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_tls(mut self, trust_store: Option<PathBuf>, password: Option<String>) -> Self {
        self.use_tls = true;
        self.trust_store_path = trust_store;
        self.trust_store_password = password;
        self
    }

    /// Whether this parameter set addresses an embedded/file database
    pub fn is_embedded(&self) -> bool {
        self.vendor.is_file_based() || (self.vendor == Vendor::Hsql && self.host.is_none())
    }

    /// Validate the parameter combination for the vendor
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(RowsinkError::Definition(format!(
                "{}: database name/path must not be empty",
                self.vendor
            )));
        }
        if self.is_embedded() {
            if self.host.is_some() || self.port.is_some() {
                return Err(RowsinkError::Definition(format!(
                    "{}: file-based databases take a path, not a host/port",
                    self.vendor
                )));
            }
            if self.username.is_some() || self.password.is_some() {
                return Err(RowsinkError::Definition(format!(
                    "{}: file-based databases do not accept credentials",
                    self.vendor
                )));
            }
            if self.use_tls {
                return Err(RowsinkError::Definition(format!(
                    "{}: TLS does not apply to file-based databases",
                    self.vendor
                )));
            }
        } else if self.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err(RowsinkError::Definition(format!(
                "{}: a hostname is required",
                self.vendor
            )));
        }
        if !self.use_tls && (self.trust_store_path.is_some() || self.trust_store_password.is_some())
        {
            return Err(RowsinkError::Definition(
                "trust store settings require TLS to be enabled".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_vendor_rejects_host() {
        let mut params = ConnectionParams::file(Vendor::Sqlite, "/tmp/test.db");
        assert!(params.validate().is_ok());
        params.host = Some("localhost".into());
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_file_vendor_rejects_credentials() {
        let params =
            ConnectionParams::file(Vendor::Derby, "/tmp/db").with_credentials("sa", "secret");
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_server_vendor_requires_host() {
        let params = ConnectionParams {
            host: None,
            ..ConnectionParams::server(Vendor::PostgreSql, "db1", "imports")
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_embedded_hsql_is_hostless() {
        let params = ConnectionParams::file(Vendor::Hsql, "/data/hsql/imports");
        assert!(params.is_embedded());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_trust_store_requires_tls() {
        let mut params = ConnectionParams::server(Vendor::MySql, "db1", "imports");
        params.trust_store_path = Some("/certs/store".into());
        assert!(params.validate().is_err());
    }
}
