// Excel ingestion (xlsx, xlsm, xls, xlsb, ods)

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use polrec_recon::RawValue;

use crate::error::IoError;
use crate::layout::Grid;

/// Read one worksheet into a cell grid. `sheet` selects by name
/// (case-insensitive); `None` takes the first sheet.
///
/// The grid is anchored at A1 even when the used range starts lower, so
/// layout `header_row` offsets count from the top of the sheet.
pub fn read_grid(path: &Path, sheet: Option<&str>) -> Result<Grid, IoError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| IoError::Excel {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let name = match sheet {
        Some(wanted) => sheet_names
            .iter()
            .find(|n| n.trim().eq_ignore_ascii_case(wanted.trim()))
            .cloned()
            .ok_or_else(|| IoError::SheetNotFound {
                path: path.to_path_buf(),
                sheet: wanted.to_string(),
                available: sheet_names.clone(),
            })?,
        None => sheet_names.first().cloned().ok_or_else(|| IoError::NoSheets {
            path: path.to_path_buf(),
        })?,
    };

    let range = workbook.worksheet_range(&name).map_err(|e| IoError::Excel {
        path: path.to_path_buf(),
        message: format!("failed to read sheet '{}': {}", name, e),
    })?;

    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut grid: Grid = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![RawValue::Null; start_col as usize];
        cells.extend(row.iter().map(cell_value));
        grid.push(cells);
    }

    log::debug!(
        "{}: read {} rows from sheet '{}'",
        path.display(),
        grid.len(),
        name
    );
    Ok(grid)
}

fn cell_value(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Null,
        Data::String(s) => {
            if s.trim().is_empty() {
                RawValue::Null
            } else {
                RawValue::Text(s.clone())
            }
        }
        Data::Float(n) => RawValue::Float(*n),
        Data::Int(n) => RawValue::Int(*n),
        Data::Bool(b) => RawValue::Bool(*b),
        // #N/A, #REF! and friends carry no usable value
        Data::Error(_) => RawValue::Null,
        // Serial number; dates are never identifiers or amounts here
        Data::DateTime(dt) => RawValue::Float(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn write_fixture(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Statement").unwrap();
        sheet.write_string(0, 0, "Policy No").unwrap();
        sheet.write_string(0, 1, "Total Commission").unwrap();
        sheet.write_number(1, 0, 123456789.0).unwrap();
        sheet.write_number(1, 1, 420.5).unwrap();
        sheet.write_string(2, 0, "P-2").unwrap();
        sheet.write_boolean(2, 1, true).unwrap();

        let other = workbook.add_worksheet().set_name("Notes").unwrap();
        other.write_string(3, 2, "footer").unwrap();
        workbook.save(path).unwrap();
    }

    #[test]
    fn reads_first_sheet_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.xlsx");
        write_fixture(&path);

        let grid = read_grid(&path, None).unwrap();
        assert_eq!(grid[0][0], RawValue::Text("Policy No".into()));
        assert_eq!(grid[1][0].as_text().as_deref(), Some("123456789"));
        assert_eq!(grid[1][1], RawValue::Float(420.5));
        assert_eq!(grid[2][1], RawValue::Bool(true));
    }

    #[test]
    fn named_sheet_is_anchored_at_a1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.xlsx");
        write_fixture(&path);

        let grid = read_grid(&path, Some("notes")).unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[3][2], RawValue::Text("footer".into()));
        assert_eq!(grid[3][0], RawValue::Null);
    }

    #[test]
    fn unknown_sheet_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.xlsx");
        write_fixture(&path);

        let err = read_grid(&path, Some("Payout")).unwrap_err();
        match err {
            IoError::SheetNotFound { available, .. } => {
                assert_eq!(available, vec!["Statement".to_string(), "Notes".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn corrupt_workbook_is_excel_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(read_grid(&path, None), Err(IoError::Excel { .. })));
    }
}
