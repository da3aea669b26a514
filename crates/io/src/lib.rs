//! File collaborators for the reconciliation engine: turning statement files
//! into [`RawTable`]s and writing results back out.

pub mod csv;
pub mod error;
pub mod export;
pub mod layout;
pub mod xlsx;

use std::path::Path;

use polrec_recon::{RawTable, SourceSchema};

pub use error::IoError;
pub use export::{
    write_csv, write_json, write_records, write_records_csv, write_records_xlsx, write_result,
    write_xlsx,
};
pub use layout::{table_from_grid, Grid};

/// Lower-cased file extension, empty when absent.
pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Read the raw cell grid of a statement file, dispatching on extension.
pub fn read_grid(path: &Path, sheet: Option<&str>) -> Result<Grid, IoError> {
    match extension(path).as_str() {
        "csv" | "tsv" | "txt" => csv::read_grid(path),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => xlsx::read_grid(path, sheet),
        "pdf" => Err(IoError::Unsupported {
            path: path.to_path_buf(),
            reason: "PDF statements are not parsed; extract the table to CSV or xlsx first"
                .into(),
        }),
        _ => Err(IoError::Unsupported {
            path: path.to_path_buf(),
            reason: "expected .csv, .tsv, .xlsx, .xls, .xlsb or .ods".into(),
        }),
    }
}

/// Load a statement file as the raw table the given source's schema expects,
/// applying that source's ingestion layout.
pub fn load_table(
    path: &Path,
    schema: &SourceSchema,
    sheet: Option<&str>,
) -> Result<RawTable, IoError> {
    let grid = read_grid(path, sheet)?;
    let table = table_from_grid(grid, &schema.layout, &schema.columns.identifier);
    log::debug!(
        "{}: {} rows, {} columns for source {}",
        path.display(),
        table.len(),
        table.columns.len(),
        schema.source_id
    );
    Ok(table)
}
