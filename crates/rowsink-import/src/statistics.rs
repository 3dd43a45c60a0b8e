//! Import run statistics

use serde::Serialize;
use uuid::Uuid;

/// How many invalid-row reasons are surfaced in reports. The full index list
/// stays available for erroneous-row extraction.
pub const REPORTED_INVALID_ROWS: usize = 50;

/// One rejected source row
#[derive(Debug, Clone, Serialize)]
pub struct InvalidRow {
    /// 0-based index of the row within the source
    pub index: u64,
    pub reason: String,
}

/// Counters collected over one import run
#[derive(Debug, Clone, Serialize)]
pub struct ImportStatistics {
    /// Identifier of this import run
    pub run_id: Uuid,
    pub rows_read: u64,
    pub rows_valid: u64,
    pub rows_invalid: u64,
    /// All rejected rows, in source order
    pub invalid_rows: Vec<InvalidRow>,
    pub duplicates_removed: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    /// Rows removed by a full-replace import before loading
    pub rows_deleted: u64,
    /// Destination row count after the run
    pub destination_row_count: u64,
    /// Name of the key-column index created as a side effect, if any
    pub created_index: Option<String>,
    pub bytes_read: u64,
}

impl ImportStatistics {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            rows_read: 0,
            rows_valid: 0,
            rows_invalid: 0,
            invalid_rows: Vec::new(),
            duplicates_removed: 0,
            rows_inserted: 0,
            rows_updated: 0,
            rows_deleted: 0,
            destination_row_count: 0,
            created_index: None,
            bytes_read: 0,
        }
    }

    pub fn record_invalid(&mut self, index: u64, reason: impl Into<String>) {
        self.rows_invalid += 1;
        self.invalid_rows.push(InvalidRow {
            index,
            reason: reason.into(),
        });
    }

    /// The reportable prefix of invalid rows
    pub fn reported_invalid(&self) -> &[InvalidRow] {
        let n = self.invalid_rows.len().min(REPORTED_INVALID_ROWS);
        &self.invalid_rows[..n]
    }

    /// All invalid row indices, for erroneous-row extraction
    pub fn invalid_indices(&self) -> Vec<u64> {
        self.invalid_rows.iter().map(|r| r.index).collect()
    }

    /// Mirror the run summary into the log
    pub fn log_summary(&self, table: &str) {
        tracing::info!(
            run_id = %self.run_id,
            table = %table,
            rows_read = self.rows_read,
            rows_valid = self.rows_valid,
            rows_invalid = self.rows_invalid,
            duplicates_removed = self.duplicates_removed,
            inserted = self.rows_inserted,
            updated = self.rows_updated,
            deleted = self.rows_deleted,
            destination_rows = self.destination_row_count,
            "import finished"
        );
        for invalid in self.reported_invalid() {
            tracing::warn!(row = invalid.index, reason = %invalid.reason, "invalid row");
        }
    }
}

impl Default for ImportStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_prefix_is_capped() {
        let mut stats = ImportStatistics::new();
        for i in 0..80 {
            stats.record_invalid(i, "bad value");
        }
        assert_eq!(stats.rows_invalid, 80);
        assert_eq!(stats.reported_invalid().len(), REPORTED_INVALID_ROWS);
        assert_eq!(stats.invalid_indices().len(), 80);
    }
}
