//! Column mapping and value conversion
//!
//! A [`ColumnMapping`] resolves destination columns to source properties,
//! optionally through a format directive. Mappings come either from code or
//! from the one-entry-per-line mini-language:
//!
//! ```text
//! name="customer_name"
//! price="unit_price" ,
//! joined="member_since" %d.%m.%Y
//! photo="photo_path" file
//! mail="contact" email
//! ```

use crate::definition::KeyColumn;
use crate::error::{ImportError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rowsink_core::{DbColumnType, SimpleColumnType, Value};

static MAPPING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*([^=\s]+)\s*=\s*"([^"]*)"\s*(.*?)\s*$"#).expect("valid regex")
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid regex")
});

/// Per-column formatting applied while binding source values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatDirective {
    /// Decimal separator of numeric source text (`.` or `,`); the other
    /// character is treated as a grouping separator and stripped
    DecimalSeparator(char),
    /// chrono strftime pattern for date/datetime source text
    DateTimePattern(String),
    Lowercase,
    Uppercase,
    /// The source value is a path; the referenced file becomes the column
    /// value (bytes for Blob, text for Clob)
    FileReference,
    /// Trim, lower-case and validate as an e-mail address
    EmailNormalize,
}

impl FormatDirective {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "" => None,
            "." => Some(FormatDirective::DecimalSeparator('.')),
            "," => Some(FormatDirective::DecimalSeparator(',')),
            "lc" => Some(FormatDirective::Lowercase),
            "uc" => Some(FormatDirective::Uppercase),
            "file" => Some(FormatDirective::FileReference),
            "email" => Some(FormatDirective::EmailNormalize),
            pattern => Some(FormatDirective::DateTimePattern(pattern.to_string())),
        }
    }
}

/// One resolved mapping entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedColumn {
    pub source_property: String,
    pub directive: Option<FormatDirective>,
}

/// Ordered destination-column → source-property mapping
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    entries: IndexMap<String, MappedColumn>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry. Destination columns are unique case-insensitively.
    pub fn insert(
        &mut self,
        destination: impl Into<String>,
        source_property: impl Into<String>,
        directive: Option<FormatDirective>,
    ) -> Result<()> {
        let destination = destination.into();
        if self
            .entries
            .keys()
            .any(|existing| existing.eq_ignore_ascii_case(&destination))
        {
            return Err(ImportError::Definition(format!(
                "duplicate mapping for column {}",
                destination
            )));
        }
        self.entries.insert(
            destination,
            MappedColumn {
                source_property: source_property.into(),
                directive,
            },
        );
        Ok(())
    }

    /// Parse the mapping mini-language; `#` starts a comment line
    pub fn parse(text: &str) -> Result<Self> {
        let mut mapping = Self::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let captures = MAPPING_LINE.captures(line).ok_or_else(|| {
                ImportError::Definition(format!("invalid mapping line {}: {}", line_no + 1, line))
            })?;
            let directive = FormatDirective::parse(&captures[3]);
            mapping.insert(&captures[1], &captures[2], directive)?;
        }
        if mapping.is_empty() {
            return Err(ImportError::Definition("empty column mapping".into()));
        }
        Ok(mapping)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Destination columns in mapping order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, destination: &str) -> Option<&MappedColumn> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(destination))
            .map(|(_, mapped)| mapped)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappedColumn)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check completeness against the destination table and the key columns:
    /// every mapped column must exist, every key column must be mapped.
    pub fn validate(
        &self,
        table_columns: &IndexMap<String, DbColumnType>,
        key_columns: &[KeyColumn],
    ) -> Result<()> {
        for destination in self.columns() {
            if !table_columns
                .keys()
                .any(|col| col.eq_ignore_ascii_case(destination))
            {
                return Err(ImportError::Definition(format!(
                    "mapped column {} does not exist in the destination table",
                    destination
                )));
            }
        }
        for key in key_columns {
            if self.get(&key.name).is_none() {
                return Err(ImportError::Definition(format!(
                    "key column {} is not mapped",
                    key.name
                )));
            }
        }
        Ok(())
    }

    /// Convert one source value for a destination column. Returns the reason
    /// string on failure; callers attach the row index.
    pub fn convert(
        &self,
        destination: &str,
        raw: &Value,
        target: &DbColumnType,
    ) -> std::result::Result<Value, String> {
        let directive = self.get(destination).and_then(|m| m.directive.as_ref());
        let shaped = apply_directive(raw, directive, target.simple_type)?;
        coerce(shaped, target.simple_type)
    }
}

fn apply_directive(
    raw: &Value,
    directive: Option<&FormatDirective>,
    target: SimpleColumnType,
) -> std::result::Result<Value, String> {
    let Some(directive) = directive else {
        return Ok(raw.clone());
    };
    match directive {
        FormatDirective::Lowercase => Ok(map_text(raw, |s| s.to_lowercase())),
        FormatDirective::Uppercase => Ok(map_text(raw, |s| s.to_uppercase())),
        FormatDirective::EmailNormalize => {
            let text = match raw {
                Value::String(s) => s.trim().to_lowercase(),
                Value::Null => return Ok(Value::Null),
                other => other.to_string().trim().to_lowercase(),
            };
            if EMAIL.is_match(&text) {
                Ok(Value::String(text))
            } else {
                Err(format!("invalid e-mail address: {}", text))
            }
        }
        FormatDirective::DecimalSeparator(separator) => match raw {
            Value::String(s) => {
                let grouping = if *separator == ',' { '.' } else { ',' };
                let normalized: String = s
                    .trim()
                    .chars()
                    .filter(|c| *c != grouping)
                    .map(|c| if c == *separator { '.' } else { c })
                    .collect();
                normalized
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| format!("not a number: {}", s))
            }
            other => Ok(other.clone()),
        },
        FormatDirective::DateTimePattern(pattern) => match raw {
            Value::String(s) => {
                let text = s.trim();
                if target == SimpleColumnType::Date {
                    NaiveDate::parse_from_str(text, pattern)
                        .map(Value::Date)
                        .map_err(|_| format!("date '{}' does not match pattern {}", text, pattern))
                } else {
                    NaiveDateTime::parse_from_str(text, pattern)
                        .map(Value::DateTime)
                        .or_else(|_| {
                            NaiveDate::parse_from_str(text, pattern)
                                .map(|d| Value::DateTime(d.and_hms_opt(0, 0, 0).unwrap_or_default()))
                        })
                        .map_err(|_| {
                            format!("timestamp '{}' does not match pattern {}", text, pattern)
                        })
                }
            }
            other => Ok(other.clone()),
        },
        FormatDirective::FileReference => match raw {
            Value::String(path) => {
                // Contents are read into an owned buffer at bind time and
                // dropped with the batch; no handle outlives the flush.
                if target == SimpleColumnType::Clob {
                    std::fs::read_to_string(path)
                        .map(Value::String)
                        .map_err(|e| format!("cannot read file {}: {}", path, e))
                } else {
                    std::fs::read(path)
                        .map(Value::Bytes)
                        .map_err(|e| format!("cannot read file {}: {}", path, e))
                }
            }
            Value::Null => Ok(Value::Null),
            other => Err(format!("file directive needs a path, got {}", other)),
        },
    }
}

fn map_text(raw: &Value, f: impl Fn(&str) -> String) -> Value {
    match raw {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

/// Coerce a shaped value to the destination column type
fn coerce(value: Value, target: SimpleColumnType) -> std::result::Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match target {
        SimpleColumnType::Integer => match &value {
            Value::Int(_) => Ok(value),
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("not an integer: {}", s)),
            other => Err(format!("cannot convert {} to integer", other)),
        },
        SimpleColumnType::Float => match &value {
            Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("not a number: {}", s)),
            other => Err(format!("cannot convert {} to float", other)),
        },
        SimpleColumnType::Date => match &value {
            Value::Date(_) => Ok(value),
            Value::DateTime(dt) => Ok(Value::Date(dt.date())),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| format!("not an ISO date: {}", s)),
            other => Err(format!("cannot convert {} to date", other)),
        },
        SimpleColumnType::DateTime => match &value {
            Value::DateTime(_) => Ok(value),
            Value::Date(d) => Ok(Value::DateTime(d.and_hms_opt(0, 0, 0).unwrap_or_default())),
            Value::String(s) => {
                let text = s.trim();
                NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
                    .map(Value::DateTime)
                    .or_else(|_| {
                        NaiveDate::parse_from_str(text, "%Y-%m-%d")
                            .map(|d| Value::DateTime(d.and_hms_opt(0, 0, 0).unwrap_or_default()))
                    })
                    .map_err(|_| format!("not an ISO timestamp: {}", s))
            }
            other => Err(format!("cannot convert {} to timestamp", other)),
        },
        SimpleColumnType::Blob => match &value {
            Value::Bytes(_) => Ok(value),
            Value::String(s) => Ok(Value::Bytes(s.clone().into_bytes())),
            other => Err(format!("cannot convert {} to blob", other)),
        },
        SimpleColumnType::String | SimpleColumnType::Clob => match &value {
            Value::String(_) => Ok(value),
            Value::Bytes(_) => Err("binary data needs a blob column".to_string()),
            other => Ok(Value::String(other.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowsink_core::SimpleColumnType;

    fn column(simple_type: SimpleColumnType) -> DbColumnType {
        DbColumnType::new(simple_type)
    }

    #[test]
    fn test_parse_mini_language() {
        let text = r#"
            # customer master import
            name="customer_name"
            price="unit_price" ,
            joined="member_since" %d.%m.%Y
            mail="contact" email
            city="town" lc
        "#;
        let mapping = ColumnMapping::parse(text).unwrap();
        assert_eq!(mapping.len(), 5);
        assert_eq!(
            mapping.get("price").unwrap().directive,
            Some(FormatDirective::DecimalSeparator(','))
        );
        assert_eq!(
            mapping.get("joined").unwrap().directive,
            Some(FormatDirective::DateTimePattern("%d.%m.%Y".into()))
        );
        assert_eq!(mapping.get("name").unwrap().directive, None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ColumnMapping::parse("name customer").is_err());
        assert!(ColumnMapping::parse("").is_err());
    }

    #[test]
    fn test_duplicate_destination_rejected_case_insensitively() {
        let mut mapping = ColumnMapping::new();
        mapping.insert("Name", "a", None).unwrap();
        assert!(mapping.insert("name", "b", None).is_err());
    }

    #[test]
    fn test_validate_against_table_and_keys() {
        let mut mapping = ColumnMapping::new();
        mapping.insert("id", "id", None).unwrap();
        mapping.insert("name", "name", None).unwrap();
        let mut table = IndexMap::new();
        table.insert("id".to_string(), column(SimpleColumnType::Integer));
        table.insert("name".to_string(), column(SimpleColumnType::String));
        let keys = vec![KeyColumn::parse("id").unwrap()];
        mapping.validate(&table, &keys).unwrap();

        let keys = vec![KeyColumn::parse("email").unwrap()];
        assert!(mapping.validate(&table, &keys).is_err());

        mapping.insert("bogus", "x", None).unwrap();
        assert!(mapping.validate(&table, &[]).is_err());
    }

    #[test]
    fn test_decimal_separator_conversion() {
        let mut mapping = ColumnMapping::new();
        mapping
            .insert("price", "p", Some(FormatDirective::DecimalSeparator(',')))
            .unwrap();
        let value = mapping
            .convert(
                "price",
                &Value::String("1.234,56".into()),
                &column(SimpleColumnType::Float),
            )
            .unwrap();
        assert_eq!(value, Value::Float(1234.56));
    }

    #[test]
    fn test_date_pattern_conversion() {
        let mut mapping = ColumnMapping::new();
        mapping
            .insert(
                "joined",
                "j",
                Some(FormatDirective::DateTimePattern("%d.%m.%Y".into())),
            )
            .unwrap();
        let value = mapping
            .convert(
                "joined",
                &Value::String("24.12.2019".into()),
                &column(SimpleColumnType::Date),
            )
            .unwrap();
        assert_eq!(
            value,
            Value::Date(NaiveDate::from_ymd_opt(2019, 12, 24).unwrap())
        );
    }

    #[test]
    fn test_email_normalization() {
        let mut mapping = ColumnMapping::new();
        mapping
            .insert("mail", "m", Some(FormatDirective::EmailNormalize))
            .unwrap();
        let target = column(SimpleColumnType::String);
        let ok = mapping
            .convert("mail", &Value::String("  Jo@Example.COM ".into()), &target)
            .unwrap();
        assert_eq!(ok, Value::String("jo@example.com".into()));
        assert!(mapping
            .convert("mail", &Value::String("not-an-address".into()), &target)
            .is_err());
    }

    #[test]
    fn test_type_coercions() {
        let mapping = ColumnMapping::new();
        assert_eq!(
            mapping
                .convert("x", &Value::String("42".into()), &column(SimpleColumnType::Integer))
                .unwrap(),
            Value::Int(42)
        );
        assert!(mapping
            .convert("x", &Value::String("nope".into()), &column(SimpleColumnType::Integer))
            .is_err());
        assert_eq!(
            mapping
                .convert("x", &Value::Null, &column(SimpleColumnType::Integer))
                .unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_file_directive_reads_contents() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "payload").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let mut mapping = ColumnMapping::new();
        mapping
            .insert("doc", "d", Some(FormatDirective::FileReference))
            .unwrap();
        let blob = mapping
            .convert("doc", &Value::String(path.clone()), &column(SimpleColumnType::Blob))
            .unwrap();
        assert_eq!(blob, Value::Bytes(b"payload".to_vec()));
        let clob = mapping
            .convert("doc", &Value::String(path), &column(SimpleColumnType::Clob))
            .unwrap();
        assert_eq!(clob, Value::String("payload".into()));
    }

    #[test]
    fn test_missing_file_is_a_row_error() {
        let mut mapping = ColumnMapping::new();
        mapping
            .insert("doc", "d", Some(FormatDirective::FileReference))
            .unwrap();
        assert!(mapping
            .convert(
                "doc",
                &Value::String("/no/such/file".into()),
                &column(SimpleColumnType::Blob)
            )
            .is_err());
    }
}
