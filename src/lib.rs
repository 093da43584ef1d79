pub mod cli;
pub mod error;
pub mod gateway;
pub mod import;
pub mod io_utils;
pub mod mapping;
pub mod parser;
pub mod preview;
pub mod statement;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};

use crate::{
    cli::{Cli, Commands},
    error::FailureReason,
    gateway::{Credentials, ScriptGateway, StoreGateway},
    import::{ImportObserver, ImportOptions, ImportOrchestrator},
    mapping::ColumnMapping,
    parser::Row,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_import", log::LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Preview(args) => preview::execute(&args),
        Commands::Mapping(args) => handle_mapping(&args),
        Commands::Schema(args) => handle_schema(&args),
        Commands::Import(args) => handle_import(&args),
    }
}

fn load_rows(
    input: &std::path::Path,
    delimiter: Option<u8>,
    encoding_label: Option<&str>,
) -> Result<Vec<Row>> {
    let delimiter = io_utils::resolve_input_delimiter(input, delimiter);
    let encoding = io_utils::resolve_encoding(encoding_label)?;
    let bytes = io_utils::read_input(input)?;
    let rows = parser::parse_bytes(&bytes, encoding, delimiter)
        .with_context(|| format!("Parsing {input:?}"))?;
    Ok(rows)
}

fn derive_mapping_from_input(
    input: &std::path::Path,
    delimiter: Option<u8>,
    encoding_label: Option<&str>,
) -> Result<Vec<ColumnMapping>> {
    let rows = load_rows(input, delimiter, encoding_label)?;
    let Some(header) = rows.first() else {
        bail!("Input {input:?} is empty; cannot derive a mapping");
    };
    Ok(mapping::derive_default_mapping(header))
}

fn handle_mapping(args: &cli::MappingArgs) -> Result<()> {
    let mut columns =
        derive_mapping_from_input(&args.input, args.delimiter, args.input_encoding.as_deref())?;
    for (index, name) in &args.renames {
        columns = mapping::set_field(&columns, *index, name)
            .with_context(|| format!("Renaming column {index}"))?;
    }
    for (index, field_type) in &args.retypes {
        columns = mapping::set_type(&columns, *index, *field_type)
            .with_context(|| format!("Retyping column {index}"))?;
    }
    mapping::save_mapping(&args.mapping, &columns)
        .with_context(|| format!("Writing mapping to {:?}", args.mapping))?;
    if args.table {
        print_mapping_table(&columns);
    }
    info!(
        "Mapping for {} column(s) written to {:?}",
        columns.len(),
        args.mapping
    );
    Ok(())
}

fn print_mapping_table(columns: &[ColumnMapping]) {
    let headers = vec![
        "#".to_string(),
        "source".to_string(),
        "field".to_string(),
        "type".to_string(),
    ];
    let rows: Vec<Vec<String>> = columns
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            vec![
                idx.to_string(),
                entry.source_column.clone(),
                entry.target_field.clone(),
                entry.target_type.type_literal().to_string(),
            ]
        })
        .collect();
    table::print_table(&headers, &rows);
}

fn handle_schema(args: &cli::SchemaArgs) -> Result<()> {
    let columns = match (&args.mapping, &args.input) {
        (Some(path), _) => mapping::load_mapping(path)?,
        (None, Some(input)) => {
            derive_mapping_from_input(input, args.delimiter, args.input_encoding.as_deref())?
        }
        (None, None) => bail!("Either --mapping or --input is required"),
    };
    let sql = statement::build_create_table(&args.table, &columns)?;
    println!("{sql}");
    Ok(())
}

/// Logs per-batch progress while an import runs.
struct ProgressLogger;

impl ImportObserver for ProgressLogger {
    fn on_progress(&mut self, fraction: f64) {
        info!("Progress: {:.1}%", fraction * 100.0);
    }
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let rows = load_rows(&args.input, args.delimiter, args.input_encoding.as_deref())?;
    let Some((header, data_rows)) = rows.split_first() else {
        bail!("Input {:?} is empty; nothing to import", args.input);
    };
    let columns = match &args.mapping {
        Some(path) => mapping::load_mapping(path)?,
        None => mapping::derive_default_mapping(header),
    };
    let credentials = match &args.credentials {
        Some(path) => gateway::load_credentials(path)?,
        None => default_credentials(&args.table),
    };

    let gateway = ScriptGateway::new(&args.output);
    gateway.test_connection(&credentials)?;
    let orchestrator = ImportOrchestrator::new(
        gateway,
        ImportOptions {
            batch_size: args.batch_size.max(1),
        },
    );
    let job = orchestrator.start(
        &columns,
        data_rows,
        &args.table,
        &credentials,
        &mut ProgressLogger,
    )?;

    if let Some(report) = &args.report {
        let file = std::fs::File::create(report)
            .with_context(|| format!("Creating report file {report:?}"))?;
        serde_json::to_writer_pretty(file, &job.failures).context("Writing failure report")?;
    }
    for failure in &job.failures {
        match &failure.reason {
            FailureReason::ShapeMismatch => {
                warn!("Row {}: cell count mismatch, skipped", failure.row_index)
            }
            FailureReason::BatchFailed(message) => {
                warn!("Row {}: {message}", failure.row_index)
            }
        }
    }
    if let Some(error) = &job.error {
        bail!("Import failed: {error}");
    }
    info!(
        "Imported {} of {} row(s) into '{}' ({} failure(s)); script written to {:?}",
        job.rows_processed - job.failures.len(),
        job.total_rows,
        args.table,
        job.failures.len(),
        args.output
    );
    Ok(())
}

/// Placeholder credentials for script generation when none are supplied; a
/// `database.table` qualifier carries the database name through.
fn default_credentials(table: &str) -> Credentials {
    let database = table
        .split_once('.')
        .map(|(db, _)| db.to_string())
        .unwrap_or_else(|| "csv_import".to_string());
    Credentials {
        host: "localhost".to_string(),
        user: "root".to_string(),
        password: String::new(),
        database,
        port: None,
    }
}
