//! Column mapping: source column → target field name + target type.
//!
//! The mapping is an ordered list, one entry per source column. Its order
//! fixes both the column order of the generated schema statement and the
//! positional order rows are packed into for insertion. Entries are derived
//! from the header row and edited through [`set_field()`] / [`set_type()`],
//! which are pure: they return an updated list and never touch the input.
//!
//! Deliberately absent: type inference from cell contents. Every column
//! defaults to [`FieldType::String`] and the user opts into anything
//! narrower. Guessing types from sampled data trades predictability for
//! convenience and belongs in a separate opt-in component if ever added.

use std::{fmt, fs::File, io::BufReader, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{error::ImportError, parser::Row};

/// Target column types, a fixed injective mapping onto the store's type
/// grammar (see [`FieldType::type_literal`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum FieldType {
    String,
    Integer,
    Decimal,
    Date,
    Text,
    Boolean,
}

impl FieldType {
    pub fn type_literal(&self) -> &'static str {
        match self {
            FieldType::String => "VARCHAR(255)",
            FieldType::Integer => "INT",
            FieldType::Decimal => "DECIMAL(10,2)",
            FieldType::Date => "DATE",
            FieldType::Text => "TEXT",
            FieldType::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_literal())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Header cell this entry was derived from. Immutable once set.
    pub source_column: String,
    /// Identifier-safe target column name, unique across the mapping.
    pub target_field: String,
    pub target_type: FieldType,
}

static IDENTIFIER_PATTERN: OnceLock<Regex> = OnceLock::new();

fn identifier_pattern() -> &'static Regex {
    IDENTIFIER_PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

pub fn validate_identifier(name: &str) -> Result<(), ImportError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(ImportError::InvalidIdentifier(name.to_string()))
    }
}

/// Lower-cases a header cell, collapses whitespace runs to `_`, replaces
/// anything else outside `[a-z0-9_]`, and prefixes a leading digit so the
/// result satisfies the identifier pattern. May return an empty string for
/// headers with no usable characters; [`derive_default_mapping()`] handles
/// that case.
fn normalize_header(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_underscore = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_underscore = true;
            continue;
        }
        if pending_underscore {
            out.push('_');
            pending_underscore = false;
        }
        match c {
            'a'..='z' | '0'..='9' | '_' => out.push(c),
            'A'..='Z' => out.push(c.to_ascii_lowercase()),
            _ => out.push('_'),
        }
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Derives the default mapping from a header row: normalized field names,
/// every type STRING. Headers that collide after normalization (or come out
/// empty) are disambiguated with a `_<column index>` suffix so no two source
/// columns ever merge silently.
pub fn derive_default_mapping(header: &Row) -> Vec<ColumnMapping> {
    let mut used: Vec<String> = Vec::with_capacity(header.len());
    header
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let mut field = normalize_header(cell);
            if field.is_empty() {
                field = format!("column_{idx}");
            }
            while used.iter().any(|existing| existing == &field) {
                field.push_str(&format!("_{idx}"));
            }
            used.push(field.clone());
            ColumnMapping {
                source_column: cell.clone(),
                target_field: field,
                target_type: FieldType::String,
            }
        })
        .collect()
}

/// Renames the target field at `index`. Rejects names that are empty, fail
/// the identifier pattern, or duplicate another entry's target field. The
/// input mapping is never mutated.
pub fn set_field(
    mapping: &[ColumnMapping],
    index: usize,
    new_name: &str,
) -> Result<Vec<ColumnMapping>, ImportError> {
    if index >= mapping.len() {
        return Err(ImportError::InvalidIdentifier(format!(
            "no column at index {index}"
        )));
    }
    validate_identifier(new_name)?;
    let duplicate = mapping
        .iter()
        .enumerate()
        .any(|(i, entry)| i != index && entry.target_field == new_name);
    if duplicate {
        return Err(ImportError::InvalidIdentifier(new_name.to_string()));
    }
    let mut updated = mapping.to_vec();
    updated[index].target_field = new_name.to_string();
    Ok(updated)
}

/// Changes the target type at `index`. Type validity is carried by the
/// [`FieldType`] enum itself; only the index is checked.
pub fn set_type(
    mapping: &[ColumnMapping],
    index: usize,
    new_type: FieldType,
) -> Result<Vec<ColumnMapping>, ImportError> {
    if index >= mapping.len() {
        return Err(ImportError::InvalidIdentifier(format!(
            "no column at index {index}"
        )));
    }
    let mut updated = mapping.to_vec();
    updated[index].target_type = new_type;
    Ok(updated)
}

pub fn save_mapping(path: &Path, mapping: &[ColumnMapping]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating mapping file {path:?}"))?;
    serde_yaml::to_writer(file, mapping).context("Writing mapping YAML")
}

pub fn load_mapping(path: &Path) -> Result<Vec<ColumnMapping>> {
    let file = File::open(path).with_context(|| format!("Opening mapping file {path:?}"))?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader).context("Parsing mapping YAML")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn normalize_header_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize_header("First Name"), "first_name");
        assert_eq!(normalize_header("  Unit   Price  "), "unit_price");
        assert_eq!(normalize_header("Qty (kg)"), "qty__kg_");
        assert_eq!(normalize_header("2024 Total"), "_2024_total");
    }

    #[test]
    fn derive_default_mapping_defaults_to_string() {
        let mapping = derive_default_mapping(&header(&["Name", "Age"]));
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping[0].target_field, "name");
        assert_eq!(mapping[1].target_field, "age");
        assert!(mapping.iter().all(|m| m.target_type == FieldType::String));
    }

    #[test]
    fn derive_default_mapping_disambiguates_collisions() {
        let mapping = derive_default_mapping(&header(&["First Name", "first  name", "FIRST NAME"]));
        let fields: Vec<&str> = mapping.iter().map(|m| m.target_field.as_str()).collect();
        assert_eq!(fields, vec!["first_name", "first_name_1", "first_name_2"]);
    }

    #[test]
    fn derive_default_mapping_names_empty_headers() {
        let mapping = derive_default_mapping(&header(&["", "!!!"]));
        assert_eq!(mapping[0].target_field, "column_0");
        assert_eq!(mapping[1].target_field, "___");
    }

    #[test]
    fn set_field_rejects_duplicates_and_bad_identifiers() {
        let mapping = derive_default_mapping(&header(&["a", "b"]));
        assert!(matches!(
            set_field(&mapping, 1, "a"),
            Err(ImportError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            set_field(&mapping, 1, ""),
            Err(ImportError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            set_field(&mapping, 1, "has space"),
            Err(ImportError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            set_field(&mapping, 9, "fine"),
            Err(ImportError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn set_field_only_changes_the_target_entry() {
        let mapping = derive_default_mapping(&header(&["a", "b", "c"]));
        let updated = set_field(&mapping, 1, "renamed").unwrap();
        assert_eq!(updated[1].target_field, "renamed");
        assert_eq!(updated[0], mapping[0]);
        assert_eq!(updated[2], mapping[2]);
        // Original untouched.
        assert_eq!(mapping[1].target_field, "b");
    }

    #[test]
    fn set_type_is_pure() {
        let mapping = derive_default_mapping(&header(&["a"]));
        let updated = set_type(&mapping, 0, FieldType::Integer).unwrap();
        assert_eq!(updated[0].target_type, FieldType::Integer);
        assert_eq!(mapping[0].target_type, FieldType::String);
    }
}
