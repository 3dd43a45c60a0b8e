//! Connection and connection-factory traits

use crate::{BatchResult, ConnectionParams, QueryResult, Result, Value, Vendor};
use async_trait::async_trait;
use std::sync::Arc;

/// A database connection owned by exactly one import worker.
///
/// Transaction control is explicit (`set_auto_commit`/`commit`/`rollback`)
/// rather than scoped, because an import interleaves DDL and DML in one
/// envelope and several vendors force commits around DDL; a scoped
/// transaction object cannot span those commit points.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The vendor this connection talks to
    fn vendor(&self) -> Vendor;

    /// Execute a statement that modifies data or schema; returns affected rows
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute one parameterized statement against many parameter rows.
    ///
    /// Each row is applied independently and reported in the result, so a
    /// failing row does not abort the remainder of the batch. Callers decide
    /// whether failures are fatal.
    async fn execute_batch(&self, sql: &str, rows: &[Vec<Value>]) -> Result<BatchResult>;

    /// Toggle autocommit. With autocommit off, work accumulates until
    /// `commit` or `rollback`.
    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;

    /// Commit the open transaction, if any
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction, if any
    async fn rollback(&self) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Convenience for scalar queries such as `SELECT COUNT(*)`
    async fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        let result = self.query(sql, params).await?;
        Ok(result.scalar().cloned())
    }

    /// Convenience for count queries; errors if the result is not numeric
    async fn query_count(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let value = self.query_scalar(sql, params).await?;
        value
            .as_ref()
            .and_then(Value::as_i64)
            .ok_or_else(|| crate::RowsinkError::sql(sql, "expected a numeric scalar result"))
    }
}

/// Factory for opening connections to one vendor.
///
/// Implementations are injected by the embedding application; the import
/// engine never loads drivers from a global registry.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// The vendor this factory connects to
    fn vendor(&self) -> Vendor;

    /// Open a new connection
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Connection>>;

    /// Probe connectivity without keeping the connection
    async fn test_connection(&self, params: &ConnectionParams) -> Result<()> {
        let conn = self.connect(params).await?;
        conn.close().await
    }
}
