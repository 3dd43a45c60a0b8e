//! Core value and metadata types for rowsink

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A database value as it travels from a row source into a destination table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string (also carries CLOB payloads)
    String(String),
    /// Binary data (BLOB payloads)
    Bytes(Vec<u8>),
    /// Date (year, month, day)
    Date(NaiveDate),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
        }
    }
}

/// A row from a query result
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
    /// Column names (shared per result set)
    columns: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name (case-insensitive, vendors disagree on
    /// result-set column casing)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Get column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Convert to a HashMap
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Result of a query that returns rows
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First value of the first row, for scalar queries like `SELECT COUNT(*)`
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.get(0))
    }
}

/// A single row failure inside a batched statement execution
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Index of the failing row within the submitted batch
    pub index: usize,
    /// Driver error message
    pub message: String,
}

/// Outcome of a batched statement execution.
///
/// Drivers apply each parameter row independently so that incremental-commit
/// imports can record individual row failures without losing the rest of the
/// batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Number of rows applied successfully
    pub applied: u64,
    /// Per-row failures, in batch order
    pub failures: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn all_applied(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The canonical cross-vendor column type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimpleColumnType {
    String,
    Integer,
    Float,
    Date,
    DateTime,
    Blob,
    Clob,
}

impl SimpleColumnType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Blob => "Blob",
            Self::Clob => "Clob",
        }
    }

    /// Whether values of this type carry a character/numeric size
    pub fn is_sized(&self) -> bool {
        matches!(self, Self::String)
    }
}

/// Canonical cross-vendor column description, produced by dialect
/// introspection and consumed by table creation and value binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbColumnType {
    /// Simple type classification
    pub simple_type: SimpleColumnType,
    /// Whether the column accepts NULL
    pub nullable: bool,
    /// Character length or numeric precision, where applicable
    pub size: Option<u32>,
    /// Whether the column is auto-increment
    pub auto_increment: bool,
}

impl DbColumnType {
    pub fn new(simple_type: SimpleColumnType) -> Self {
        Self {
            simple_type,
            nullable: true,
            size: None,
            auto_increment: false,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// The same column shape with constraints relaxed, as used for staging
    /// table columns
    pub fn relaxed(&self) -> Self {
        Self {
            simple_type: self.simple_type,
            nullable: true,
            size: self.size,
            auto_increment: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_value_coercions() {
        assert_eq!(Value::String("42".into()).as_i64(), Some(42));
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Bytes(vec![1]).as_i64(), None);
    }

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::new(vec!["ID".into()], vec![Value::Int(7)]);
        assert_eq!(row.get_by_name("id"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_relaxed_strips_constraints() {
        let col = DbColumnType::new(SimpleColumnType::Integer)
            .not_null()
            .auto_increment();
        let relaxed = col.relaxed();
        assert!(relaxed.nullable);
        assert!(!relaxed.auto_increment);
        assert_eq!(relaxed.simple_type, SimpleColumnType::Integer);
    }
}
