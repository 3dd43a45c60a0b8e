//! The row source contract
//!
//! Format-specific readers (CSV, JSON, XML, spreadsheets, SQL scripts) live
//! outside this crate and plug in through [`RowSource`]. The engine only
//! needs a stream of property-name → value maps plus a few bulk operations.

use crate::error::{ImportError, Result};
use crate::mapping::ColumnMapping;
use async_trait::async_trait;
use indexmap::IndexMap;
use rowsink_core::{DbColumnType, SimpleColumnType, Value};
use std::path::PathBuf;

/// A sequential supplier of source rows
#[async_trait]
pub trait RowSource: Send {
    /// Estimated number of items this source will deliver
    fn items_to_import(&self) -> u64;

    /// The property names the source exposes, in source order
    fn property_names(&self) -> Vec<String>;

    /// The next row, or `None` at end of stream
    async fn next_item(&mut self) -> Result<Option<IndexMap<String, Value>>>;

    /// Scan the source and derive a column type per property covered by the
    /// mapping, for table auto-creation. May rewind or re-read the source.
    fn scan_property_types(
        &mut self,
        mapping: &ColumnMapping,
    ) -> Result<IndexMap<String, DbColumnType>>;

    /// Bytes consumed so far
    fn bytes_read(&self) -> u64;

    /// Extract the rows at the given 0-based indices into a sibling file
    /// whose name carries the suffix; returns the file path.
    fn extract_items(&self, indices: &[u64], suffix: &str) -> Result<PathBuf>;

    /// Release underlying resources
    async fn close(&mut self) -> Result<()>;
}

/// In-memory row source for tests and embedding
pub struct MemoryRowSource {
    rows: Vec<IndexMap<String, Value>>,
    cursor: usize,
    bytes: u64,
}

impl MemoryRowSource {
    pub fn new(rows: Vec<IndexMap<String, Value>>) -> Self {
        Self {
            rows,
            cursor: 0,
            bytes: 0,
        }
    }

    /// Build a source from `(property, value)` tuples per row
    pub fn from_rows<R, P>(rows: R) -> Self
    where
        R: IntoIterator<Item = P>,
        P: IntoIterator<Item = (&'static str, Value)>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect::<IndexMap<String, Value>>()
            })
            .collect();
        Self::new(rows)
    }
}

/// Widen an observed value into the column type scan
fn widen(current: Option<DbColumnType>, value: &Value) -> Option<DbColumnType> {
    let observed = match value {
        Value::Null => return current,
        Value::Bool(_) | Value::Int(_) => DbColumnType::new(SimpleColumnType::Integer),
        Value::Float(_) => DbColumnType::new(SimpleColumnType::Float),
        Value::Date(_) => DbColumnType::new(SimpleColumnType::Date),
        Value::DateTime(_) => DbColumnType::new(SimpleColumnType::DateTime),
        Value::Bytes(_) => DbColumnType::new(SimpleColumnType::Blob),
        Value::String(s) => {
            DbColumnType::new(SimpleColumnType::String).with_size((s.len() as u32).max(1))
        }
    };
    match current {
        None => Some(observed),
        Some(current) => {
            let merged = match (current.simple_type, observed.simple_type) {
                (a, b) if a == b => DbColumnType {
                    size: current.size.max(observed.size),
                    ..current
                },
                (SimpleColumnType::Integer, SimpleColumnType::Float)
                | (SimpleColumnType::Float, SimpleColumnType::Integer) => {
                    DbColumnType::new(SimpleColumnType::Float)
                }
                (SimpleColumnType::Date, SimpleColumnType::DateTime)
                | (SimpleColumnType::DateTime, SimpleColumnType::Date) => {
                    DbColumnType::new(SimpleColumnType::DateTime)
                }
                // Mixed shapes degrade to text wide enough for everything
                _ => DbColumnType::new(SimpleColumnType::String)
                    .with_size(current.size.unwrap_or(255).max(observed.size.unwrap_or(255))),
            };
            Some(merged)
        }
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    fn items_to_import(&self) -> u64 {
        self.rows.len() as u64
    }

    fn property_names(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn next_item(&mut self) -> Result<Option<IndexMap<String, Value>>> {
        let Some(row) = self.rows.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        self.bytes += row.values().map(|v| v.to_string().len() as u64).sum::<u64>();
        Ok(Some(row.clone()))
    }

    fn scan_property_types(
        &mut self,
        mapping: &ColumnMapping,
    ) -> Result<IndexMap<String, DbColumnType>> {
        let mapped: Vec<&str> = mapping.iter().map(|(_, m)| m.source_property.as_str()).collect();
        let mut types: IndexMap<String, Option<DbColumnType>> = IndexMap::new();
        for row in &self.rows {
            for (property, value) in row {
                if !mapped.iter().any(|m| m.eq_ignore_ascii_case(property)) {
                    continue;
                }
                let slot = types.entry(property.clone()).or_insert(None);
                *slot = widen(slot.take(), value);
            }
        }
        Ok(types
            .into_iter()
            .map(|(property, ty)| {
                (
                    property,
                    ty.unwrap_or_else(|| DbColumnType::new(SimpleColumnType::String)),
                )
            })
            .collect())
    }

    fn bytes_read(&self) -> u64 {
        self.bytes
    }

    fn extract_items(&self, indices: &[u64], suffix: &str) -> Result<PathBuf> {
        let path = std::env::temp_dir().join(format!("rowsink_{}_{}.jsonl", uuid::Uuid::new_v4(), suffix));
        let mut lines = String::new();
        for &index in indices {
            let Some(row) = self.rows.get(index as usize) else {
                continue;
            };
            let map: std::collections::BTreeMap<&str, String> = row
                .iter()
                .map(|(k, v)| (k.as_str(), v.to_string()))
                .collect();
            let line = serde_json::to_string(&map)
                .map_err(|e| ImportError::Source(format!("cannot serialize row {}: {}", index, e)))?;
            lines.push_str(&line);
            lines.push('\n');
        }
        std::fs::write(&path, lines)
            .map_err(|e| ImportError::Source(format!("cannot write extract file: {}", e)))?;
        Ok(path)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
