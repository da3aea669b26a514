use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// A single cell as delivered by the ingestion layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Null, or text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed textual form. Whole floats render without a fractional part,
    /// since spreadsheets store long policy numbers as floats.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null | Self::Bool(_) => None,
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Int(n) => Some(n.to_string()),
            Self::Float(f) => format_float(*f),
        }
    }

    /// Monetary reading of the cell. Unparsable values are `None`.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Null | Self::Bool(_) => None,
            Self::Int(n) => Some(Decimal::from(*n)),
            Self::Float(f) => Decimal::from_f64(*f).map(|d| d.normalize()),
            Self::Text(s) => parse_amount(s),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

fn format_float(f: f64) -> Option<String> {
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        Some(format!("{}", f as i64))
    } else {
        Some(format!("{f}"))
    }
}

const CURRENCY_PREFIXES: [&str; 6] = ["INR", "RS.", "RS", "₹", "$", "€"];

/// Parse a spreadsheet money string: thousands separators, currency
/// prefixes, leading/trailing signs and accounting parentheses.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let mut negative = false;
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        negative = true;
        text = inner.trim();
    }
    if let Some(rest) = text.strip_suffix('-') {
        negative = !negative;
        text = rest.trim();
    }
    if let Some(rest) = text.strip_prefix('-') {
        negative = !negative;
        text = rest.trim();
    }

    let upper = text.to_uppercase();
    for prefix in CURRENCY_PREFIXES {
        if upper.starts_with(prefix) {
            text = text.get(prefix.len()..)?.trim();
            break;
        }
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()?;
    Some(if negative { -value } else { value })
}

/// Fold a column name for comparison: surrounding whitespace and case are ignored.
pub fn fold_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// One raw row: an ordered mapping of raw column name to cell value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, RawValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`RawRow::insert`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set a cell, replacing an existing cell with the same column name.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<RawValue>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, RawValue)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (String, RawValue)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

/// Rows of one upload plus the column space they were extracted with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column space is the union of the rows' columns, first-seen order.
    pub fn from_rows(rows: Vec<RawRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for column in row.columns() {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn push(&mut self, row: RawRow) {
        self.rows.push(row);
    }

    /// First alias present in the column space, as spelled in the table.
    pub fn resolve_column(&self, aliases: &[String]) -> Option<&str> {
        aliases.iter().find_map(|alias| {
            let folded = fold_name(alias);
            self.columns
                .iter()
                .find(|c| fold_name(c) == folded)
                .map(String::as_str)
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One upload handed to the pipeline: a bank source id and its rows.
#[derive(Debug, Clone)]
pub struct SourceUpload {
    pub source_id: String,
    pub table: RawTable,
}

impl SourceUpload {
    pub fn new(source_id: impl Into<String>, table: RawTable) -> Self {
        Self {
            source_id: source_id.into(),
            table,
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsuranceNature {
    Regular,
    Endorsement,
}

impl std::fmt::Display for InsuranceNature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular => write!(f, "REGULAR"),
            Self::Endorsement => write!(f, "ENDORSEMENT"),
        }
    }
}

/// Normalized record shared by bank-side and broker-side data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Original identifier, trimmed.
    pub policy_reference: String,
    /// Rule-canonicalized, alphanumeric-only identifier. Never empty.
    pub canonical_id: String,
    pub customer_name: String,
    pub total_commission: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_nature: Option<InsuranceNature>,
    pub source: String,
    /// Broker-facing legal name of the insurer. Bank records get it from the
    /// aggregator; broker records carry their own bank-name field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl CanonicalRecord {
    pub fn is_endorsement(&self) -> bool {
        self.insurance_nature == Some(InsuranceNature::Endorsement)
    }
}

// ---------------------------------------------------------------------------
// Reconciliation output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Matched,
    BankOnly,
    BrokerOnly,
}

impl MatchStatus {
    /// Status for a row given which sides contributed. `None` when neither did.
    pub fn from_sides(has_bank: bool, has_broker: bool) -> Option<Self> {
        match (has_bank, has_broker) {
            (true, true) => Some(Self::Matched),
            (true, false) => Some(Self::BankOnly),
            (false, true) => Some(Self::BrokerOnly),
            (false, false) => None,
        }
    }

    /// Label used on exported sheets.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Matched => "Matched",
            Self::BankOnly => "Not Found in Broker",
            Self::BrokerOnly => "Not Found in Bank",
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "MATCHED"),
            Self::BankOnly => write!(f, "BANK_ONLY"),
            Self::BrokerOnly => write!(f, "BROKER_ONLY"),
        }
    }
}

/// Which join produced a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchBasis {
    /// Regular records, joined on canonical identifier.
    PolicyReference,
    /// Endorsements, joined on (customer name, premium).
    CustomerPremium,
}

impl std::fmt::Display for MatchBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PolicyReference => write!(f, "POLICY_REFERENCE"),
            Self::CustomerPremium => write!(f, "CUSTOMER_PREMIUM"),
        }
    }
}

/// Categorical reading of the commission delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DifferenceFlag {
    Positive,
    Negative,
    NoDifference,
}

impl DifferenceFlag {
    /// `NoDifference` when |delta| <= tolerance.
    pub fn from_delta(delta: Decimal, tolerance: Decimal) -> Self {
        if delta.abs() <= tolerance.abs() {
            Self::NoDifference
        } else if delta.is_sign_positive() {
            Self::Positive
        } else {
            Self::Negative
        }
    }
}

impl std::fmt::Display for DifferenceFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "Positive"),
            Self::Negative => write!(f, "Negative"),
            Self::NoDifference => write!(f, "No Difference"),
        }
    }
}

/// One reconciled output row. At least one side is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<CanonicalRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<CanonicalRecord>,
    pub match_status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_basis: Option<MatchBasis>,
    /// bank commission minus broker commission, absent sides counting as zero.
    pub commission_delta: Decimal,
    pub difference: DifferenceFlag,
}

impl ReconciledRow {
    /// Broker-facing insurer name of whichever side is present.
    pub fn insurer(&self) -> Option<&str> {
        self.bank
            .as_ref()
            .and_then(|r| r.display_name.as_deref())
            .or_else(|| self.broker.as_ref().and_then(|r| r.display_name.as_deref()))
    }

    pub fn canonical_id(&self) -> &str {
        self.bank
            .as_ref()
            .or(self.broker.as_ref())
            .map(|r| r.canonical_id.as_str())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Summary + run output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub total: usize,
    pub matched: usize,
    pub bank_only: usize,
    pub broker_only: usize,
    /// Matched rows whose delta falls outside the tolerance.
    pub commission_mismatches: usize,
    pub net_commission_delta: Decimal,
}

/// Per-upload normalization counters. Dropped rows are counted, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub source_id: String,
    pub input_rows: usize,
    pub blank_identifier: usize,
    pub empty_canonical_id: usize,
    pub unparsed_commission: usize,
    pub duplicates_merged: usize,
    pub retained: usize,
}

impl NormalizeStats {
    pub fn new(source_id: impl Into<String>, input_rows: usize) -> Self {
        Self {
            source_id: source_id.into(),
            input_rows,
            ..Self::default()
        }
    }

    pub fn dropped(&self) -> usize {
        self.blank_identifier + self.empty_canonical_id
    }
}

/// A source whose contribution was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub engine_version: String,
    pub run_at: String,
    pub commission_tolerance: Decimal,
    pub bank_records: usize,
    pub broker_records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: SummaryCounts,
    pub by_insurer: BTreeMap<String, SummaryCounts>,
    pub relevant_insurers: Vec<String>,
    /// Broker records for insurers absent from this run; not reported as rows.
    pub excluded_broker_records: usize,
    pub sources: Vec<NormalizeStats>,
    pub broker: NormalizeStats,
    pub failures: Vec<SourceFailure>,
    pub rows: Vec<ReconciledRow>,
}
