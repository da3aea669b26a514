// Grid → RawTable, applying a source's ingestion layout.

use std::collections::HashSet;

use polrec_recon::model::fold_name;
use polrec_recon::{ColumnSpec, RawRow, RawTable, RawValue, TableLayout};

/// Rows of cells as read from a file, before headers are applied.
pub type Grid = Vec<Vec<RawValue>>;

/// Build a table from a raw grid.
///
/// - Row `layout.header_row` holds the headers; rows above it are discarded.
/// - The first `layout.skip_columns` cells of every row are discarded.
/// - Blank headers become `column_<n>` (1-based position after skipping);
///   repeated headers get `.1`, `.2`, … suffixes, compared case-insensitively.
/// - Entirely blank rows are skipped.
/// - With `stop_at_blank_identifier`, the table ends at the first row whose
///   identifier cell is blank.
pub fn table_from_grid(grid: Grid, layout: &TableLayout, identifier: &ColumnSpec) -> RawTable {
    let mut rows = grid.into_iter().skip(layout.header_row);
    let Some(header_cells) = rows.next() else {
        return RawTable::default();
    };

    let headers = header_names(header_cells.into_iter().skip(layout.skip_columns));
    let mut table = RawTable::new(headers.clone());
    let identifier_column = layout
        .stop_at_blank_identifier
        .then(|| table.resolve_column(&identifier.aliases).map(str::to_string))
        .flatten();

    for cells in rows {
        let cells: Vec<RawValue> = cells.into_iter().skip(layout.skip_columns).collect();
        if cells.iter().all(RawValue::is_blank) {
            continue;
        }

        let mut row = RawRow::new();
        for (idx, header) in headers.iter().enumerate() {
            row.insert(header.clone(), cells.get(idx).cloned().unwrap_or(RawValue::Null));
        }

        if let Some(column) = &identifier_column {
            if row.get(column).map_or(true, RawValue::is_blank) {
                log::debug!(
                    "stopping at first blank '{}' after {} rows",
                    column,
                    table.len()
                );
                break;
            }
        }
        table.push(row);
    }
    table
}

fn header_names(cells: impl Iterator<Item = RawValue>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    for (idx, cell) in cells.enumerate() {
        let base = cell
            .as_text()
            .unwrap_or_else(|| format!("column_{}", idx + 1));
        let mut name = base.clone();
        let mut n = 1;
        while !seen.insert(fold_name(&name)) {
            name = format!("{base}.{n}");
            n += 1;
        }
        headers.push(name);
    }
    headers
}
