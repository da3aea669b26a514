// CSV/TSV ingestion and export

use std::collections::HashMap;
use std::path::Path;

use polrec_recon::RawValue;

use crate::error::IoError;
use crate::layout::Grid;

/// Read a delimited file into a cell grid. `.tsv` forces tab; anything else
/// is sniffed.
pub fn read_grid(path: &Path) -> Result<Grid, IoError> {
    let content = read_file_as_utf8(path)?;
    let is_tsv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
    let delimiter = if is_tsv { b'\t' } else { sniff_delimiter(&content) };
    grid_from_str(&content, delimiter).map_err(|e| IoError::csv(path, e))
}

/// Cells stay text; the normalizer decides what is an amount. Empty fields
/// become `Null`.
pub fn grid_from_str(content: &str, delimiter: u8) -> Result<Grid, csv::Error> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        RawValue::Null
                    } else {
                        RawValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(grid)
}

/// Lines sampled when sniffing; insurer statements put a few title rows
/// above the header.
const SNIFF_LINES: usize = 20;

/// Pick the field delimiter of an insurer export.
///
/// Each candidate is scored on its best-supported field count among the
/// sampled non-blank lines (lines with that count times the count), so a
/// statement title or reporting-period line above the header does not decide
/// the outcome. Single-field splits never score. Comma wins ties.
pub fn sniff_delimiter(content: &str) -> u8 {
    const CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
    let sample: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let mut best = (b',', 0usize);
    for delimiter in CANDIDATES {
        let mut tally: HashMap<usize, usize> = HashMap::new();
        for line in &sample {
            *tally.entry(field_count(line, delimiter)).or_default() += 1;
        }
        let score = tally
            .into_iter()
            .filter(|&(fields, _)| fields > 1)
            .map(|(fields, lines)| fields * lines)
            .max()
            .unwrap_or(0);
        if score > best.1 {
            best = (delimiter, score);
        }
    }
    best.0
}

fn field_count(line: &str, delimiter: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |record| record.len())
}

/// Read file and convert to UTF-8 if needed. Insurer portals commonly hand out
/// Windows-1252 exports.
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            log::debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Write a header plus string rows.
pub(crate) fn write_rows(
    path: &Path,
    header: &[&str],
    rows: impl IntoIterator<Item = Vec<String>>,
) -> Result<(), IoError> {
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| IoError::csv(path, e))?;
    writer.write_record(header).map_err(|e| IoError::csv(path, e))?;
    for row in rows {
        writer.write_record(&row).map_err(|e| IoError::csv(path, e))?;
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}
