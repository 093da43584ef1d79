use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::mapping::FieldType;

#[derive(Debug, Parser)]
#[command(author, version, about = "Map CSV files onto relational tables and generate bulk-load SQL", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Preview the first few data rows of a CSV file in a formatted table
    Preview(PreviewArgs),
    /// Derive a column mapping from the header row and save it to a .mapping file
    Mapping(MappingArgs),
    /// Print the CREATE TABLE statement for a mapping
    Schema(SchemaArgs),
    /// Run the two-phase import and write the batched bulk-load SQL script
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Input CSV file to preview ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of data rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct MappingArgs {
    /// Input CSV file whose header drives the mapping ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination .mapping YAML file
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
    /// Rename a target field, e.g. `--rename 0=customer_id`
    #[arg(long = "rename", value_parser = parse_rename, action = clap::ArgAction::Append)]
    pub renames: Vec<(usize, String)>,
    /// Override a target type, e.g. `--retype 2=integer`
    #[arg(long = "retype", value_parser = parse_retype, action = clap::ArgAction::Append)]
    pub retypes: Vec<(usize, FieldType)>,
    /// Render the resulting mapping as a table to stdout
    #[arg(long = "table")]
    pub table: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Saved .mapping file to build the statement from
    #[arg(short = 'm', long = "mapping", conflicts_with = "input")]
    pub mapping: Option<PathBuf>,
    /// Input CSV file to derive a default mapping from instead
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    /// Target table name (optionally `database.table` qualified)
    #[arg(short = 't', long = "table", default_value = "csv_import")]
    pub table: String,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Input CSV file to import ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination SQL script file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Saved .mapping file (defaults to a mapping derived from the header)
    #[arg(short = 'm', long = "mapping")]
    pub mapping: Option<PathBuf>,
    /// Target table name (optionally `database.table` qualified)
    #[arg(short = 't', long = "table", default_value = "csv_import")]
    pub table: String,
    /// Rows per batched insert submission
    #[arg(long = "batch-size", default_value_t = crate::import::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// YAML file with store credentials (host, user, password, database, port)
    #[arg(long = "credentials")]
    pub credentials: Option<PathBuf>,
    /// Write a JSON report of per-row failures to this path
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

fn split_assignment(value: &str) -> Result<(usize, &str), String> {
    let (index, rest) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected INDEX=VALUE, got '{value}'"))?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("'{index}' is not a column index"))?;
    Ok((index, rest.trim()))
}

pub fn parse_rename(value: &str) -> Result<(usize, String), String> {
    let (index, name) = split_assignment(value)?;
    Ok((index, name.to_string()))
}

pub fn parse_retype(value: &str) -> Result<(usize, FieldType), String> {
    let (index, type_name) = split_assignment(value)?;
    let field_type = FieldType::from_str(type_name, true)?;
    Ok((index, field_type))
}
