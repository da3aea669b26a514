// Reconciliation output: multi-sheet xlsx, flat CSV, JSON.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use polrec_recon::{
    CanonicalRecord, MatchStatus, ReconResult, ReconciledRow, SummaryCounts,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::error::IoError;

pub const SHEET_RECONCILIATION: &str = "Reconciliation";
pub const SHEET_NOT_IN_BANK: &str = "Not Found in Bank";
pub const SHEET_NOT_IN_BROKER: &str = "Not Found in Broker";
pub const SHEET_SUMMARY: &str = "Summary";

const ROW_HEADER: [&str; 16] = [
    "Status",
    "Match Basis",
    "Insurer",
    "Canonical Id",
    "Bank Policy Reference",
    "Broker Policy Reference",
    "Bank Customer Name",
    "Broker Customer Name",
    "Bank Commission",
    "Broker Commission",
    "Commission Delta",
    "Difference",
    "Bank Premium",
    "Broker Premium",
    "Bank Insurance Nature",
    "Broker Insurance Nature",
];

const RECORD_HEADER: [&str; 8] = [
    "Source",
    "Insurer",
    "Policy Reference",
    "Canonical Id",
    "Customer Name",
    "Total Commission",
    "Premium",
    "Insurance Nature",
];

const MONEY_FORMAT: &str = "#,##0.00";

// ---------------------------------------------------------------------------
// Cell model shared by the xlsx and CSV writers
// ---------------------------------------------------------------------------

enum Cell {
    Text(String),
    Money(Decimal),
    Empty,
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    fn opt_text(value: Option<impl ToString>) -> Self {
        value.map_or(Self::Empty, |v| Self::Text(v.to_string()))
    }

    fn opt_money(value: Option<Decimal>) -> Self {
        value.map_or(Self::Empty, Self::Money)
    }

    fn to_csv(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Money(d) => d.to_string(),
            Self::Empty => String::new(),
        }
    }
}

/// Bank and broker values side by side; the absent side's cells are empty.
fn row_cells(row: &ReconciledRow) -> Vec<Cell> {
    let bank = row.bank.as_ref();
    let broker = row.broker.as_ref();
    vec![
        Cell::text(row.match_status.label()),
        Cell::opt_text(row.match_basis),
        Cell::opt_text(row.insurer()),
        Cell::text(row.canonical_id()),
        Cell::opt_text(bank.map(|r| &r.policy_reference)),
        Cell::opt_text(broker.map(|r| &r.policy_reference)),
        Cell::opt_text(bank.map(|r| &r.customer_name)),
        Cell::opt_text(broker.map(|r| &r.customer_name)),
        Cell::opt_money(bank.map(|r| r.total_commission)),
        Cell::opt_money(broker.map(|r| r.total_commission)),
        Cell::Money(row.commission_delta),
        Cell::text(row.difference.to_string()),
        Cell::opt_money(bank.and_then(|r| r.premium_amount)),
        Cell::opt_money(broker.and_then(|r| r.premium_amount)),
        Cell::opt_text(bank.and_then(|r| r.insurance_nature)),
        Cell::opt_text(broker.and_then(|r| r.insurance_nature)),
    ]
}

fn record_cells(record: &CanonicalRecord) -> Vec<Cell> {
    vec![
        Cell::text(&record.source),
        Cell::opt_text(record.display_name.as_ref()),
        Cell::text(&record.policy_reference),
        Cell::text(&record.canonical_id),
        Cell::text(&record.customer_name),
        Cell::Money(record.total_commission),
        Cell::opt_money(record.premium_amount),
        Cell::opt_text(record.insurance_nature),
    ]
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

struct Formats {
    header: Format,
    money: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            money: Format::new().set_num_format(MONEY_FORMAT),
        }
    }
}

fn write_table(
    worksheet: &mut Worksheet,
    formats: &Formats,
    first_row: u32,
    header: &[&str],
    rows: impl IntoIterator<Item = Vec<Cell>>,
) -> Result<u32, rust_xlsxwriter::XlsxError> {
    for (col, title) in header.iter().enumerate() {
        worksheet.write_string_with_format(first_row, col as u16, *title, &formats.header)?;
    }

    let mut row_idx = first_row + 1;
    for cells in rows {
        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(s) => {
                    worksheet.write_string(row_idx, col, s)?;
                }
                // Excel keeps 15 significant digits; commissions are far below that
                Cell::Money(d) => {
                    worksheet.write_number_with_format(
                        row_idx,
                        col,
                        d.to_f64().unwrap_or_default(),
                        &formats.money,
                    )?;
                }
                Cell::Empty => {}
            }
        }
        row_idx += 1;
    }
    Ok(row_idx)
}

fn counts_cells(label: &str, counts: &SummaryCounts) -> Vec<Cell> {
    vec![
        Cell::text(label),
        Cell::text(counts.total.to_string()),
        Cell::text(counts.matched.to_string()),
        Cell::text(counts.broker_only.to_string()),
        Cell::text(counts.bank_only.to_string()),
        Cell::text(counts.commission_mismatches.to_string()),
        Cell::Money(counts.net_commission_delta),
    ]
}

fn write_summary_sheet(
    worksheet: &mut Worksheet,
    formats: &Formats,
    result: &ReconResult,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    let s = &result.summary;
    let totals = vec![
        vec![Cell::text("Total Records"), Cell::text(s.total.to_string())],
        vec![Cell::text("Matched"), Cell::text(s.matched.to_string())],
        vec![Cell::text(SHEET_NOT_IN_BANK), Cell::text(s.broker_only.to_string())],
        vec![Cell::text(SHEET_NOT_IN_BROKER), Cell::text(s.bank_only.to_string())],
        vec![
            Cell::text("Commission Mismatches"),
            Cell::text(s.commission_mismatches.to_string()),
        ],
        vec![Cell::text("Net Commission Delta"), Cell::Money(s.net_commission_delta)],
        vec![
            Cell::text("Excluded Broker Records"),
            Cell::text(result.excluded_broker_records.to_string()),
        ],
        vec![Cell::text("Commission Tolerance"), Cell::Money(result.meta.commission_tolerance)],
        vec![Cell::text("Run At"), Cell::text(&result.meta.run_at)],
    ];
    let next = write_table(worksheet, formats, 0, &["Metric", "Value"], totals)?;

    let per_insurer = result
        .by_insurer
        .iter()
        .map(|(insurer, counts)| counts_cells(insurer, counts));
    let next = write_table(
        worksheet,
        formats,
        next + 1,
        &[
            "Insurer",
            "Total",
            "Matched",
            SHEET_NOT_IN_BANK,
            SHEET_NOT_IN_BROKER,
            "Mismatches",
            "Net Delta",
        ],
        per_insurer,
    )?;

    if !result.failures.is_empty() {
        let failures = result
            .failures
            .iter()
            .map(|f| vec![Cell::text(&f.source_id), Cell::text(&f.error)]);
        write_table(worksheet, formats, next + 1, &["Skipped Source", "Error"], failures)?;
    }

    worksheet.set_column_width(0, 40)?;
    Ok(())
}

/// Workbook with the full row set, the two one-sided views and a summary.
pub fn write_xlsx(result: &ReconResult, path: &Path) -> Result<(), IoError> {
    build_xlsx(result, path).map_err(|e| IoError::xlsx(path, e))
}

fn build_xlsx(result: &ReconResult, path: &Path) -> Result<(), rust_xlsxwriter::XlsxError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();

    let views: [(&str, Option<MatchStatus>); 3] = [
        (SHEET_RECONCILIATION, None),
        (SHEET_NOT_IN_BANK, Some(MatchStatus::BrokerOnly)),
        (SHEET_NOT_IN_BROKER, Some(MatchStatus::BankOnly)),
    ];
    for (name, filter) in views {
        let worksheet = workbook.add_worksheet().set_name(name)?;
        let rows = result
            .rows
            .iter()
            .filter(|r| filter.map_or(true, |status| r.match_status == status))
            .map(row_cells);
        write_table(worksheet, &formats, 0, &ROW_HEADER, rows)?;
        worksheet.set_freeze_panes(1, 0)?;
    }

    let summary = workbook.add_worksheet().set_name(SHEET_SUMMARY)?;
    write_summary_sheet(summary, &formats, result)?;

    workbook.save(path)
}

/// Canonical bank records as a single-sheet workbook.
pub fn write_records_xlsx(records: &[CanonicalRecord], path: &Path) -> Result<(), IoError> {
    build_records_xlsx(records, path).map_err(|e| IoError::xlsx(path, e))
}

fn build_records_xlsx(
    records: &[CanonicalRecord],
    path: &Path,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name("Records")?;
    write_table(worksheet, &formats, 0, &RECORD_HEADER, records.iter().map(record_cells))?;
    workbook.save(path)
}

// ---------------------------------------------------------------------------
// CSV / JSON
// ---------------------------------------------------------------------------

pub fn write_csv(rows: &[ReconciledRow], path: &Path) -> Result<(), IoError> {
    crate::csv::write_rows(
        path,
        &ROW_HEADER,
        rows.iter()
            .map(|r| row_cells(r).iter().map(Cell::to_csv).collect()),
    )
}

pub fn write_records_csv(records: &[CanonicalRecord], path: &Path) -> Result<(), IoError> {
    crate::csv::write_rows(
        path,
        &RECORD_HEADER,
        records
            .iter()
            .map(|r| record_cells(r).iter().map(Cell::to_csv).collect()),
    )
}

pub fn write_json(result: &ReconResult, path: &Path) -> Result<(), IoError> {
    let file = File::create(path).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), result)?;
    Ok(())
}

/// Pick the writer from the extension: `.xlsx`, `.csv` or `.json`.
pub fn write_result(result: &ReconResult, path: &Path) -> Result<(), IoError> {
    match crate::extension(path).as_str() {
        "xlsx" => write_xlsx(result, path),
        "csv" => write_csv(&result.rows, path),
        "json" => write_json(result, path),
        _ => Err(IoError::Unsupported {
            path: path.to_path_buf(),
            reason: "output must be .xlsx, .csv or .json".into(),
        }),
    }
}

/// Canonical records writer picked by extension: `.xlsx` or `.csv`.
pub fn write_records(records: &[CanonicalRecord], path: &Path) -> Result<(), IoError> {
    match crate::extension(path).as_str() {
        "xlsx" => write_records_xlsx(records, path),
        "csv" => write_records_csv(records, path),
        _ => Err(IoError::Unsupported {
            path: path.to_path_buf(),
            reason: "output must be .xlsx or .csv".into(),
        }),
    }
}
