//! SQLite connection implementation

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags};
use rowsink_core::{
    BatchFailure, BatchResult, Connection, QueryResult, Result, Row, RowsinkError, Value, Vendor,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// SQLite connection wrapper.
///
/// rusqlite is synchronous; statements run under a mutex on the calling
/// task. Transaction state is driven through explicit BEGIN/COMMIT/ROLLBACK
/// so DDL and DML can share one envelope.
pub struct SqliteConnection {
    conn: Mutex<RusqliteConnection>,
    auto_commit: AtomicBool,
    closed: AtomicBool,
}

impl SqliteConnection {
    /// Open a SQLite database. `create` controls whether a missing file is
    /// created or reported as not found.
    pub fn open(path: &str, create: bool) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                RowsinkError::Connection(format!("failed to open in-memory database: {}", e))
            })?
        } else {
            if !create && !std::path::Path::new(path).exists() {
                return Err(RowsinkError::DatabaseNotFound(path.to_string()));
            }
            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            if create {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            RusqliteConnection::open_with_flags(path, flags).map_err(|e| {
                RowsinkError::Connection(format!(
                    "failed to open SQLite database at '{}': {}",
                    path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| RowsinkError::Connection(format!("failed to enable foreign keys: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            auto_commit: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        })
    }

    fn guard_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(RowsinkError::Connection("connection is closed".into()));
        }
        Ok(())
    }

    /// Open an implicit transaction when autocommit is off and none is
    /// running yet
    fn ensure_transaction(&self, conn: &RusqliteConnection) -> Result<()> {
        if !self.auto_commit.load(Ordering::SeqCst) && conn.is_autocommit() {
            conn.execute_batch("BEGIN")
                .map_err(|e| RowsinkError::sql("BEGIN", e))?;
        }
        Ok(())
    }

    fn bind_value(value: &Value) -> rusqlite::types::Value {
        use rusqlite::types::Value as Sql;
        match value {
            Value::Null => Sql::Null,
            Value::Bool(v) => Sql::Integer(*v as i64),
            Value::Int(v) => Sql::Integer(*v),
            Value::Float(v) => Sql::Real(*v),
            Value::String(v) => Sql::Text(v.clone()),
            Value::Bytes(v) => Sql::Blob(v.clone()),
            Value::Date(v) => Sql::Text(v.format("%Y-%m-%d").to_string()),
            Value::DateTime(v) => Sql::Text(v.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    fn read_value(value: rusqlite::types::ValueRef<'_>) -> Value {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(v) => {
                let text = String::from_utf8_lossy(v).to_string();
                if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                    // Round-trip declared DATE columns; plain text that merely
                    // looks like a date keeps its textual form downstream
                    if text.len() == 10 {
                        return Value::Date(date);
                    }
                }
                if let Ok(ts) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S") {
                    return Value::DateTime(ts);
                }
                Value::String(text)
            }
            ValueRef::Blob(v) => Value::Bytes(v.to_vec()),
        }
    }

    fn params_from(values: &[Value]) -> Vec<rusqlite::types::Value> {
        values.iter().map(Self::bind_value).collect()
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.guard_open()?;
        let conn = self.conn.lock();
        self.ensure_transaction(&conn)?;
        let bound = Self::params_from(params);
        let affected = conn
            .execute(sql, rusqlite::params_from_iter(bound))
            .map_err(|e| RowsinkError::sql(sql, e))?;
        Ok(affected as u64)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.guard_open()?;
        let conn = self.conn.lock();
        self.ensure_transaction(&conn)?;
        let mut statement = conn.prepare(sql).map_err(|e| RowsinkError::sql(sql, e))?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        let bound = Self::params_from(params);
        let mut rows = statement
            .query(rusqlite::params_from_iter(bound))
            .map_err(|e| RowsinkError::sql(sql, e))?;
        let mut result = QueryResult {
            columns: columns.clone(),
            rows: Vec::new(),
        };
        while let Some(row) = rows.next().map_err(|e| RowsinkError::sql(sql, e))? {
            let values: Vec<Value> = (0..columns.len())
                .map(|i| {
                    row.get_ref(i)
                        .map(Self::read_value)
                        .unwrap_or(Value::Null)
                })
                .collect();
            result.rows.push(Row::new(columns.clone(), values));
        }
        Ok(result)
    }

    async fn execute_batch(&self, sql: &str, rows: &[Vec<Value>]) -> Result<BatchResult> {
        self.guard_open()?;
        let conn = self.conn.lock();
        self.ensure_transaction(&conn)?;
        let mut statement = conn.prepare(sql).map_err(|e| RowsinkError::sql(sql, e))?;
        let mut result = BatchResult::default();
        for (index, row) in rows.iter().enumerate() {
            let bound = Self::params_from(row);
            match statement.execute(rusqlite::params_from_iter(bound)) {
                Ok(_) => result.applied += 1,
                Err(e) => result.failures.push(BatchFailure {
                    index,
                    message: e.to_string(),
                }),
            }
        }
        Ok(result)
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.guard_open()?;
        let previous = self.auto_commit.swap(auto_commit, Ordering::SeqCst);
        if auto_commit && !previous {
            // Leaving manual mode closes out any open transaction
            let conn = self.conn.lock();
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")
                    .map_err(|e| RowsinkError::sql("COMMIT", e))?;
            }
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.guard_open()?;
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")
                .map_err(|e| RowsinkError::sql("COMMIT", e))?;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.guard_open()?;
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")
                .map_err(|e| RowsinkError::sql("ROLLBACK", e))?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback on close failed");
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> SqliteConnection {
        SqliteConnection::open(":memory:", true).unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let conn = memory();
        conn.execute("CREATE TABLE t (id INTEGER, name TEXT)", &[])
            .await
            .unwrap();
        let affected = conn
            .execute(
                "INSERT INTO t (id, name) VALUES (?, ?)",
                &[Value::Int(1), Value::String("ada".into())],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);
        let result = conn.query("SELECT id, name FROM t", &[]).await.unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.rows[0].get_by_name("name"), Some(&Value::String("ada".into())));
    }

    #[tokio::test]
    async fn test_batch_reports_per_row_failures() {
        let conn = memory();
        conn.execute("CREATE TABLE t (id INTEGER NOT NULL)", &[])
            .await
            .unwrap();
        let rows = vec![
            vec![Value::Int(1)],
            vec![Value::Null],
            vec![Value::Int(3)],
        ];
        let result = conn
            .execute_batch("INSERT INTO t (id) VALUES (?)", &rows)
            .await
            .unwrap();
        assert_eq!(result.applied, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 1);
    }

    #[tokio::test]
    async fn test_manual_transaction_rollback() {
        let conn = memory();
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        conn.set_auto_commit(false).await.unwrap();
        conn.execute("INSERT INTO t (id) VALUES (1)", &[]).await.unwrap();
        conn.rollback().await.unwrap();
        let count = conn.query_count("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_commit_without_transaction_is_noop() {
        let conn = memory();
        conn.commit().await.unwrap();
        conn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_reported_as_not_found() {
        let result = SqliteConnection::open("/no/such/place/data.db", false);
        assert!(matches!(result, Err(RowsinkError::DatabaseNotFound(_))));
    }

    #[tokio::test]
    async fn test_date_round_trip() {
        let conn = memory();
        conn.execute("CREATE TABLE t (d DATE)", &[]).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        conn.execute("INSERT INTO t (d) VALUES (?)", &[Value::Date(date)])
            .await
            .unwrap();
        let result = conn.query("SELECT d FROM t", &[]).await.unwrap();
        assert_eq!(result.rows[0].get(0), Some(&Value::Date(date)));
    }
}
