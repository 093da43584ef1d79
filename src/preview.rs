use anyhow::Result;
use log::info;

use crate::{cli::PreviewArgs, io_utils, parser, table};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let bytes = io_utils::read_input(&args.input)?;
    let rows = parser::parse_bytes(&bytes, encoding, delimiter)?;

    let Some((header, data_rows)) = rows.split_first() else {
        info!("'{}' is empty", args.input.display());
        return Ok(());
    };
    let shown: Vec<Vec<String>> = data_rows.iter().take(args.rows).cloned().collect();
    table::print_table(header, &shown);
    info!(
        "Displayed {} of {} data row(s) from '{}'",
        shown.len(),
        data_rows.len(),
        args.input.display()
    );
    Ok(())
}
