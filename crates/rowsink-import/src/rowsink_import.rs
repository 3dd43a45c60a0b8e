//! Import orchestration and merge engine
//!
//! The pipeline stages source rows into a shadow table, detects and resolves
//! duplicate keys, and applies insert/update/upsert against the destination
//! under transactional or best-effort commit discipline. Vendor differences
//! live entirely behind the dialect layer.

mod definition;
mod error;
mod mapping;
mod merge;
mod multifile;
mod progress;
mod row_by_row;
mod source;
mod staging;
mod statistics;
mod worker;

pub use definition::{
    DuplicateMode, DuplicateResolution, ImportDefinition, ImportMode, KeyColumn, ValueClause,
};
pub use error::{ImportError, Result};
pub use mapping::{ColumnMapping, FormatDirective, MappedColumn};
pub use merge::{MergeExecutor, MergeSpec, TOUCHED_COLUMN};
pub use multifile::MultiSourceImport;
pub use progress::{CancelToken, ImportPhase, NoopProgress, ProgressListener};
pub use row_by_row::RowByRowWorker;
pub use source::{MemoryRowSource, RowSource};
pub use staging::{GROUP_COLUMN, SEQUENCE_COLUMN, StagingEngine};
pub use statistics::{ImportStatistics, InvalidRow, REPORTED_INVALID_ROWS};
pub use worker::{ImportOutcome, ImportWorker};
