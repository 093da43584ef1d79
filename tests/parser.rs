use csv_import::error::ImportError;
use csv_import::parser::{
    Row, parse_bytes, parse_text, parse_text_with_delimiter, write_text,
};
use proptest::prelude::*;

fn rows(cells: &[&[&str]]) -> Vec<Row> {
    cells
        .iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}

#[test]
fn parse_text_splits_header_and_data_rows() {
    let parsed = parse_text("name,age\nAlice,30\nBob,25\n").unwrap();
    assert_eq!(
        parsed,
        rows(&[&["name", "age"], &["Alice", "30"], &["Bob", "25"]])
    );
}

#[test]
fn parse_text_without_trailing_newline() {
    let parsed = parse_text("a,b\n1,2").unwrap();
    assert_eq!(parsed, rows(&[&["a", "b"], &["1", "2"]]));
}

#[test]
fn parse_text_preserves_embedded_delimiters_quotes_and_newlines() {
    let parsed = parse_text("\"last, first\",\"say \"\"hi\"\"\",\"two\nlines\"\n").unwrap();
    assert_eq!(parsed, rows(&[&["last, first", "say \"hi\"", "two\nlines"]]));
}

#[test]
fn parse_text_empty_input_is_an_empty_sequence() {
    assert!(parse_text("").unwrap().is_empty());
    assert!(parse_text("\n").unwrap().is_empty());
}

#[test]
fn parse_text_keeps_uneven_row_widths() {
    // Shape checking belongs to the import step, not the parser.
    let parsed = parse_text("a,b,c\n1,2\n").unwrap();
    assert_eq!(parsed[1], vec!["1".to_string(), "2".to_string()]);
}

#[test]
fn parse_text_rejects_unterminated_quote() {
    let err = parse_text("a,b\n\"open,2\n").unwrap_err();
    assert!(matches!(err, ImportError::MalformedInput(_)));
}

#[test]
fn parse_text_with_delimiter_honours_semicolons() {
    let parsed = parse_text_with_delimiter("a;b\n\"x;y\";2\n", b';').unwrap();
    assert_eq!(parsed, rows(&[&["a", "b"], &["x;y", "2"]]));
}

#[test]
fn parse_bytes_rejects_undecodable_input() {
    let err = parse_bytes(&[0xff, 0xfe, b'a'], encoding_rs::UTF_8, b',').unwrap_err();
    assert!(matches!(err, ImportError::MalformedInput(_)));
}

proptest! {
    /// `parse_text` is a left-inverse of `write_text` for arbitrary cell
    /// values, including delimiters, quotes, and newlines.
    #[test]
    fn parse_round_trips_serialized_rows(
        cells in proptest::collection::vec(
            proptest::collection::vec("[ -~\n]{0,12}", 1..5),
            1..8,
        )
    ) {
        let original: Vec<Row> = cells;
        let text = write_text(&original).unwrap();
        let parsed = parse_text(&text).unwrap();
        prop_assert_eq!(parsed, original);
    }
}
