//! Tabular text parsing: raw bytes/text to ordered rows of string cells.
//!
//! The parser has no header concept; the first row is only treated as a
//! header by callers (see [`crate::mapping`]). Quoting follows RFC 4180:
//! double-quoted fields may embed delimiters, quotes (doubled), and
//! newlines. Unbalanced quoting is rejected up front rather than silently
//! swallowing the rest of the file into one cell.

use anyhow::{Context, Result};
use csv::QuoteStyle;
use encoding_rs::Encoding;

use crate::error::ImportError;

pub const DEFAULT_DELIMITER: u8 = b',';

/// One record from the source file: an ordered sequence of string cells.
pub type Row = Vec<String>;

/// Decodes `bytes` with `encoding` and parses the result. Entry point for
/// callers that hold a raw file buffer rather than a `&str`.
pub fn parse_bytes(
    bytes: &[u8],
    encoding: &'static Encoding,
    delimiter: u8,
) -> Result<Vec<Row>, ImportError> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ImportError::MalformedInput(format!(
            "input is not valid {}",
            encoding.name()
        )));
    }
    parse_text_with_delimiter(&text, delimiter)
}

/// Parses comma-delimited text into rows. Empty input yields an empty
/// sequence; a trailing newline is tolerated.
pub fn parse_text(raw: &str) -> Result<Vec<Row>, ImportError> {
    parse_text_with_delimiter(raw, DEFAULT_DELIMITER)
}

pub fn parse_text_with_delimiter(raw: &str, delimiter: u8) -> Result<Vec<Row>, ImportError> {
    ensure_balanced_quotes(raw, delimiter as char)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ImportError::MalformedInput(err.to_string()))?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }
    Ok(rows)
}

/// Serializes rows back to delimited text with every cell quoted, the
/// inverse of [`parse_text`] for well-formed input.
pub fn write_text(rows: &[Row]) -> Result<String> {
    write_text_with_delimiter(rows, DEFAULT_DELIMITER)
}

pub fn write_text_with_delimiter(rows: &[Row], delimiter: u8) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row).context("Writing CSV record")?;
    }
    let bytes = writer.into_inner().context("Flushing CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Scans the raw text with a small RFC 4180 state machine and fails when the
/// input ends inside an open quoted field. The `csv` reader itself is
/// permissive here and would fold the remainder of the file into one cell.
fn ensure_balanced_quotes(raw: &str, delimiter: char) -> Result<(), ImportError> {
    use QuoteState::*;

    let mut state = FieldStart;
    for ch in raw.chars() {
        let breaks_field = ch == delimiter || ch == '\n' || ch == '\r';
        state = match (state, ch) {
            (FieldStart, '"') => Quoted,
            (FieldStart, _) if breaks_field => FieldStart,
            (FieldStart, _) => Unquoted,
            (Unquoted, _) if breaks_field => FieldStart,
            (Unquoted, _) => Unquoted,
            (Quoted, '"') => QuoteInQuoted,
            (Quoted, _) => Quoted,
            (QuoteInQuoted, '"') => Quoted,
            (QuoteInQuoted, _) if breaks_field => FieldStart,
            (QuoteInQuoted, _) => Unquoted,
        };
    }
    if state == Quoted {
        return Err(ImportError::MalformedInput(
            "unbalanced quote: input ends inside a quoted field".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_text_splits_cells_on_commas() {
        let rows = parse_text("a,b,c\n1,2,3\n").unwrap();
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]);
    }

    #[test]
    fn parse_text_handles_quoted_delimiters_and_newlines() {
        let rows = parse_text("\"x,y\",\"line1\nline2\",\"he said \"\"hi\"\"\"\n").unwrap();
        assert_eq!(
            rows,
            vec![vec!["x,y", "line1\nline2", "he said \"hi\""]]
        );
    }

    #[test]
    fn parse_text_empty_input_yields_no_rows() {
        assert!(parse_text("").unwrap().is_empty());
    }

    #[test]
    fn parse_text_rejects_unbalanced_quotes() {
        let err = parse_text("a,\"unterminated\nb,c\n").unwrap_err();
        assert!(matches!(err, ImportError::MalformedInput(_)));
    }

    #[test]
    fn parse_bytes_decodes_before_parsing() {
        let rows = parse_bytes(b"a,b\n", encoding_rs::UTF_8, b',').unwrap();
        assert_eq!(rows, vec![vec!["a", "b"]]);
    }

    #[test]
    fn write_text_round_trips_awkward_cells() {
        let rows = vec![vec!["a,b".to_string(), "c\nd".to_string(), "\"".to_string()]];
        let text = write_text(&rows).unwrap();
        assert_eq!(parse_text(&text).unwrap(), rows);
    }
}
