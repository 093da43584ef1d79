//! Store gateway: the narrow interface the import pipeline drives.
//!
//! The orchestrator never talks to a SQL driver directly. It opens one
//! [`StoreSession`] per job through a [`StoreGateway`] and submits
//! statements through it; the session is released when dropped, on every
//! exit path. The crate ships one concrete gateway, [`ScriptGateway`],
//! which renders everything it receives into a loadable SQL script so the
//! CLI works without a live server. A real driver-backed gateway plugs in
//! behind the same trait.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::{error::ImportError, parser::Row};

/// Opaque connection parameters, passed through unchanged and never cached
/// beyond the current run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

pub fn load_credentials(path: &Path) -> Result<Credentials> {
    let file = File::open(path).with_context(|| format!("Opening credentials file {path:?}"))?;
    let reader = BufReader::new(file);
    serde_yaml::from_reader(reader).context("Parsing credentials YAML")
}

/// A row the store rejected inside one batch, by offset into that batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRowError {
    pub offset: usize,
    pub message: String,
}

pub trait StoreGateway {
    /// Single-attempt reachability/auth check. No retry on failure.
    fn test_connection(&self, credentials: &Credentials) -> Result<(), ImportError>;

    /// Acquires the store connection for one job. Released on drop.
    fn open(&self, credentials: &Credentials) -> Result<Box<dyn StoreSession>, ImportError>;
}

pub trait StoreSession {
    /// Executes a standalone statement (schema creation).
    fn execute(&mut self, statement: &str) -> Result<(), ImportError>;

    /// Executes a parameterized statement once per row. Returns per-row
    /// errors when the store can attribute failures; a wholesale failure is
    /// an `Err` instead.
    fn execute_batch(
        &mut self,
        statement: &str,
        rows: &[Row],
    ) -> Result<Vec<BatchRowError>, ImportError>;
}

/// Renders received statements into a SQL script file. Placeholders in
/// batch templates are substituted with escaped string literals, which is
/// safe here because the rendered output is a script, not a live statement.
pub struct ScriptGateway {
    output: PathBuf,
}

impl ScriptGateway {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl StoreGateway for ScriptGateway {
    fn test_connection(&self, _credentials: &Credentials) -> Result<(), ImportError> {
        // Reachability for a script target means the file is creatable.
        File::create(&self.output)
            .map(|_| ())
            .map_err(|err| ImportError::ConnectionFailed(err.to_string()))
    }

    fn open(&self, credentials: &Credentials) -> Result<Box<dyn StoreSession>, ImportError> {
        let file = File::create(&self.output)
            .map_err(|err| ImportError::ConnectionFailed(err.to_string()))?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "-- Bulk load script for `{}`@{} generated {}",
            credentials.database,
            credentials.host,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )
        .map_err(|err| ImportError::ConnectionFailed(err.to_string()))?;
        Ok(Box::new(ScriptSession { writer }))
    }
}

struct ScriptSession {
    writer: BufWriter<File>,
}

impl StoreSession for ScriptSession {
    fn execute(&mut self, statement: &str) -> Result<(), ImportError> {
        writeln!(self.writer, "{statement}")
            .map_err(|err| ImportError::ConnectionFailed(err.to_string()))
    }

    fn execute_batch(
        &mut self,
        statement: &str,
        rows: &[Row],
    ) -> Result<Vec<BatchRowError>, ImportError> {
        for row in rows {
            let rendered = render_placeholders(statement, row)?;
            writeln!(self.writer, "{rendered};")
                .map_err(|err| ImportError::BatchFailed(err.to_string()))?;
        }
        Ok(Vec::new())
    }
}

/// Substitutes each `?` in a builder-generated template with the matching
/// cell as an escaped single-quoted literal.
fn render_placeholders(template: &str, row: &Row) -> Result<String, ImportError> {
    let slots = template.matches('?').count();
    if slots != row.len() {
        return Err(ImportError::BatchFailed(format!(
            "template has {slots} placeholder(s) but row has {} cell(s)",
            row.len()
        )));
    }
    let mut rendered =
        String::with_capacity(template.len() + row.iter().map(String::len).sum::<usize>());
    for (idx, fragment) in template.split('?').enumerate() {
        if idx > 0 {
            if let Some(cell) = row.get(idx - 1) {
                rendered.push_str(&quote_literal(cell));
            }
        }
        rendered.push_str(fragment);
    }
    Ok(rendered)
}

fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
