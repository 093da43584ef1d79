//! SQL statement synthesis for the target store (MySQL grammar).
//!
//! Identifiers are never interpolated raw: every table/column name must pass
//! the `[A-Za-z_][A-Za-z0-9_]*` allow-list and is backtick-quoted afterwards.
//! Values never appear in statements built here: inserts are parameterized
//! templates and rows travel separately through the gateway.

use itertools::Itertools;

use crate::{
    error::ImportError,
    mapping::{ColumnMapping, validate_identifier},
};

/// Validates a target table name. One optional `database.` qualifier is
/// accepted; each segment must pass the identifier allow-list.
fn validate_table_name(table: &str) -> Result<Vec<&str>, ImportError> {
    let segments: Vec<&str> = table.split('.').collect();
    if segments.len() > 2 {
        return Err(ImportError::InvalidIdentifier(table.to_string()));
    }
    for segment in &segments {
        validate_identifier(segment)?;
    }
    Ok(segments)
}

fn quote_table_name(table: &str) -> Result<String, ImportError> {
    let segments = validate_table_name(table)?;
    Ok(segments.iter().map(|s| format!("`{s}`")).join("."))
}

/// Builds the idempotent schema-creation statement. Column clauses appear in
/// mapping order; an empty mapping is rejected.
pub fn build_create_table(table: &str, mapping: &[ColumnMapping]) -> Result<String, ImportError> {
    if mapping.is_empty() {
        return Err(ImportError::EmptyMapping);
    }
    let table = quote_table_name(table)?;
    for entry in mapping {
        validate_identifier(&entry.target_field)?;
    }
    let columns = mapping
        .iter()
        .map(|entry| format!("  `{}` {}", entry.target_field, entry.target_type.type_literal()))
        .join(",\n");
    Ok(format!("CREATE TABLE IF NOT EXISTS {table} (\n{columns}\n);"))
}

/// Builds the parameterized insert template with one positional placeholder
/// per mapped column, in mapping order.
pub fn build_insert_template(table: &str, mapping: &[ColumnMapping]) -> Result<String, ImportError> {
    if mapping.is_empty() {
        return Err(ImportError::EmptyMapping);
    }
    let table = quote_table_name(table)?;
    for entry in mapping {
        validate_identifier(&entry.target_field)?;
    }
    let columns = mapping
        .iter()
        .map(|entry| format!("`{}`", entry.target_field))
        .join(", ");
    let placeholders = mapping.iter().map(|_| "?").join(", ");
    Ok(format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders})"
    ))
}
