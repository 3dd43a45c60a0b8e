//! Import definitions
//!
//! An [`ImportDefinition`] captures everything one import run needs besides
//! the row source: target vendor/connection/table, the mode matrix, key
//! columns and the transaction discipline. It validates as a whole before
//! any connection is opened and is treated as immutable afterwards.

use crate::error::{ImportError, Result};
use indexmap::IndexMap;
use rowsink_core::{ConnectionParams, DbColumnType, Vendor};
use serde::{Deserialize, Serialize};

/// Effect of the import on the destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Clear the destination, then insert everything
    ClearInsert,
    /// Insert only; existing keys are left alone
    Insert,
    /// Update only; unknown keys are left alone
    Update,
    /// Update existing keys, insert unknown ones
    Upsert,
}

/// Strategy for source rows sharing the same key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMode {
    /// No duplicate handling at all
    #[default]
    NoCheck,
    /// Deduplicate within the source, keep the earliest row per key
    CheckSourceOnlyDrop,
    /// Deduplicate within the source, merging duplicates into the earliest row
    CheckSourceOnlyJoin,
    /// Only the first-seen duplicate updates the destination
    UpdateFirstDrop,
    UpdateFirstJoin,
    /// Every duplicate feeds the destination, last write wins
    UpdateAllDrop,
    UpdateAllJoin,
    /// Collapse the source to unique keys before applying the import mode
    MakeUniqueDrop,
    MakeUniqueJoin,
}

/// What happens to the losing rows of a duplicate group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateResolution {
    /// Delete losers, keep the earliest row untouched
    Drop,
    /// Merge loser column values into the winner, then delete losers
    Join,
}

impl DuplicateMode {
    /// The in-source resolution strategy, `None` for `NoCheck`
    pub fn resolution(&self) -> Option<DuplicateResolution> {
        match self {
            DuplicateMode::NoCheck => None,
            DuplicateMode::CheckSourceOnlyDrop
            | DuplicateMode::UpdateFirstDrop
            | DuplicateMode::UpdateAllDrop
            | DuplicateMode::MakeUniqueDrop => Some(DuplicateResolution::Drop),
            DuplicateMode::CheckSourceOnlyJoin
            | DuplicateMode::UpdateFirstJoin
            | DuplicateMode::UpdateAllJoin
            | DuplicateMode::MakeUniqueJoin => Some(DuplicateResolution::Join),
        }
    }

    /// Whether destination updates are restricted to the first-seen duplicate
    pub fn updates_first_only(&self) -> bool {
        matches!(
            self,
            DuplicateMode::UpdateFirstDrop | DuplicateMode::UpdateFirstJoin
        )
    }

    /// Whether staging rows whose key already exists in the destination are
    /// purged before an insert-mode merge
    pub fn checks_against_destination(&self) -> bool {
        matches!(
            self,
            DuplicateMode::CheckSourceOnlyDrop | DuplicateMode::CheckSourceOnlyJoin
        )
    }
}

/// A key column, optionally wrapped in a SQL function (`UPPER(col)`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: String,
    pub function: Option<String>,
}

impl KeyColumn {
    /// Parse a `col` or `FUNC(col)` specification
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ImportError::Definition("empty key column".into()));
        }
        if let Some(open) = spec.find('(') {
            let close = spec
                .rfind(')')
                .ok_or_else(|| ImportError::Definition(format!("unbalanced key column: {}", spec)))?;
            if close != spec.len() - 1 || close <= open + 1 {
                return Err(ImportError::Definition(format!(
                    "malformed key column: {}",
                    spec
                )));
            }
            let function = spec[..open].trim();
            let name = spec[open + 1..close].trim();
            if function.is_empty() || name.is_empty() {
                return Err(ImportError::Definition(format!(
                    "malformed key column: {}",
                    spec
                )));
            }
            Ok(Self {
                name: name.to_string(),
                function: Some(function.to_string()),
            })
        } else {
            Ok(Self {
                name: spec.to_string(),
                function: None,
            })
        }
    }

    /// Render the key expression for a qualified column reference
    /// (`UPPER(a.col)` or `a.col`)
    pub fn render(&self, qualified_column: &str) -> String {
        match &self.function {
            Some(function) => format!("{}({})", function, qualified_column),
            None => qualified_column.to_string(),
        }
    }
}

/// A literal value clause appended to generated INSERT or UPDATE statements,
/// e.g. `imported_at` = `CURRENT_TIMESTAMP`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueClause {
    pub column: String,
    /// Literal SQL expression, embedded verbatim
    pub expression: String,
}

fn default_batch_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

/// Complete configuration of one import run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDefinition {
    pub vendor: Vendor,
    pub connection: ConnectionParams,
    /// Destination table name
    pub table: String,
    pub mode: ImportMode,
    #[serde(default)]
    pub duplicate_mode: DuplicateMode,
    /// Key column specifications, each optionally function-wrapped
    #[serde(default)]
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub create_table_if_missing: bool,
    /// All-or-nothing transaction discipline vs. incremental batch commits
    #[serde(default)]
    pub commit_on_full_success_only: bool,
    /// Whether NULL source values may overwrite destination values
    #[serde(default = "default_true")]
    pub update_with_null_values: bool,
    /// Create a supporting key index when none is detected
    #[serde(default)]
    pub create_new_index_if_needed: bool,
    /// Deactivate foreign keys/triggers for the duration of the run
    #[serde(default)]
    pub deactivate_constraints: bool,
    #[serde(default)]
    pub additional_insert_values: Vec<ValueClause>,
    #[serde(default)]
    pub additional_update_values: Vec<ValueClause>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Explicit structure for table auto-creation; when absent the row
    /// source's property types are scanned instead
    #[serde(default)]
    pub explicit_columns: Option<IndexMap<String, DbColumnType>>,
}

impl ImportDefinition {
    pub fn new(connection: ConnectionParams, table: impl Into<String>, mode: ImportMode) -> Self {
        Self {
            vendor: connection.vendor,
            connection,
            table: table.into(),
            mode,
            duplicate_mode: DuplicateMode::NoCheck,
            key_columns: Vec::new(),
            create_table_if_missing: false,
            commit_on_full_success_only: false,
            update_with_null_values: true,
            create_new_index_if_needed: false,
            deactivate_constraints: false,
            additional_insert_values: Vec::new(),
            additional_update_values: Vec::new(),
            batch_size: default_batch_size(),
            explicit_columns: None,
        }
    }

    pub fn with_duplicate_mode(mut self, mode: DuplicateMode) -> Self {
        self.duplicate_mode = mode;
        self
    }

    pub fn with_key_columns<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_create_table(mut self) -> Self {
        self.create_table_if_missing = true;
        self
    }

    pub fn with_commit_on_full_success_only(mut self, value: bool) -> Self {
        self.commit_on_full_success_only = value;
        self
    }

    pub fn with_update_with_null_values(mut self, value: bool) -> Self {
        self.update_with_null_values = value;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Load a definition from TOML
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| ImportError::Definition(format!("invalid definition file: {}", e)))
    }

    /// The parsed key columns
    pub fn parsed_keys(&self) -> Result<Vec<KeyColumn>> {
        self.key_columns.iter().map(|s| KeyColumn::parse(s)).collect()
    }

    /// Validate the whole definition. Runs before any connection is opened.
    pub fn validate(&self) -> Result<()> {
        self.connection
            .validate()
            .map_err(|e| ImportError::Definition(e.to_string()))?;
        if self.connection.vendor != self.vendor {
            return Err(ImportError::Definition(format!(
                "definition vendor {} does not match connection vendor {}",
                self.vendor, self.connection.vendor
            )));
        }
        if self.table.trim().is_empty() {
            return Err(ImportError::Definition(
                "destination table must not be empty".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ImportError::Definition("batch size must be positive".into()));
        }
        let keys = self.parsed_keys()?;
        if keys.is_empty() && matches!(self.mode, ImportMode::Update | ImportMode::Upsert) {
            return Err(ImportError::Definition(format!(
                "{:?} mode requires key columns",
                self.mode
            )));
        }
        if keys.is_empty() && self.duplicate_mode != DuplicateMode::NoCheck {
            return Err(ImportError::Definition(
                "duplicate handling requires key columns".into(),
            ));
        }
        if self.duplicate_mode.checks_against_destination()
            && !matches!(self.mode, ImportMode::Insert | ImportMode::ClearInsert)
        {
            return Err(ImportError::Definition(
                "check-source-only duplicate modes only combine with insert modes".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for key in &keys {
            if !seen.insert(key.name.to_ascii_lowercase()) {
                return Err(ImportError::Definition(format!(
                    "duplicate key column: {}",
                    key.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_definition(mode: ImportMode) -> ImportDefinition {
        ImportDefinition::new(
            ConnectionParams::file(Vendor::Sqlite, ":memory:"),
            "people",
            mode,
        )
    }

    #[test]
    fn test_key_column_parse_plain() {
        let key = KeyColumn::parse("customer_id").unwrap();
        assert_eq!(key.name, "customer_id");
        assert_eq!(key.function, None);
        assert_eq!(key.render("a.customer_id"), "a.customer_id");
    }

    #[test]
    fn test_key_column_parse_wrapped() {
        let key = KeyColumn::parse("UPPER(email)").unwrap();
        assert_eq!(key.name, "email");
        assert_eq!(key.function.as_deref(), Some("UPPER"));
        assert_eq!(key.render("b.email"), "UPPER(b.email)");
    }

    #[test]
    fn test_key_column_parse_malformed() {
        assert!(KeyColumn::parse("UPPER(email").is_err());
        assert!(KeyColumn::parse("(email)").is_err());
        assert!(KeyColumn::parse("").is_err());
    }

    #[test]
    fn test_update_requires_keys() {
        let definition = sqlite_definition(ImportMode::Update);
        assert!(definition.validate().is_err());
        let definition = definition.with_key_columns(["id"]);
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn test_duplicate_mode_requires_keys() {
        let definition =
            sqlite_definition(ImportMode::Insert).with_duplicate_mode(DuplicateMode::UpdateAllJoin);
        assert!(definition.validate().is_err());
    }

    #[test]
    fn test_check_source_only_rejects_update_mode() {
        let definition = sqlite_definition(ImportMode::Update)
            .with_key_columns(["id"])
            .with_duplicate_mode(DuplicateMode::CheckSourceOnlyDrop);
        assert!(definition.validate().is_err());
    }

    #[test]
    fn test_duplicate_key_columns_rejected() {
        let definition = sqlite_definition(ImportMode::Insert)
            .with_key_columns(["id", "UPPER(ID)"])
            .with_duplicate_mode(DuplicateMode::CheckSourceOnlyDrop);
        assert!(definition.validate().is_err());
    }

    #[test]
    fn test_resolution_classification() {
        assert_eq!(DuplicateMode::NoCheck.resolution(), None);
        assert_eq!(
            DuplicateMode::UpdateAllDrop.resolution(),
            Some(DuplicateResolution::Drop)
        );
        assert_eq!(
            DuplicateMode::MakeUniqueJoin.resolution(),
            Some(DuplicateResolution::Join)
        );
        assert!(DuplicateMode::UpdateFirstJoin.updates_first_only());
        assert!(DuplicateMode::CheckSourceOnlyDrop.checks_against_destination());
    }

    #[test]
    fn test_toml_roundtrip() {
        let text = r#"
            vendor = "sqlite"
            table = "people"
            mode = "upsert"
            duplicate_mode = "update_all_join"
            key_columns = ["id"]
            commit_on_full_success_only = true

            [connection]
            vendor = "sqlite"
            database = ":memory:"
        "#;
        let definition = ImportDefinition::from_toml_str(text).unwrap();
        assert_eq!(definition.mode, ImportMode::Upsert);
        assert_eq!(definition.duplicate_mode, DuplicateMode::UpdateAllJoin);
        assert!(definition.commit_on_full_success_only);
        assert!(definition.update_with_null_values);
        assert_eq!(definition.batch_size, 1000);
        definition.validate().unwrap();
    }
}
