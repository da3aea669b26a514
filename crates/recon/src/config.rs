use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::fold_name;
use crate::rules::IdentifierRule;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Source registry as written in TOML.
///
/// ```toml
/// [matching]
/// commission_tolerance = 0.5
///
/// [broker.columns]
/// identifier    = "PolicyNumber"
/// customer_name = "cName"
/// commission    = "NetCommision"
/// bank_name     = ["p_insurerName", "Bank Name"]
///
/// [sources.GO-DIGIT]
/// display_name = "GO DIGIT GENERAL INSURANCE LIMITED"
/// rule = { kind = "segment_before_delimiter", delimiter = "/" }
///
/// [sources.GO-DIGIT.columns]
/// identifier    = "policy number"
/// customer_name = "policy holder"
/// commission    = "IRDA_AMT"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    pub broker: BrokerConfig,
    pub sources: BTreeMap<String, SourceConfig>,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// |delta| at or below this is reported as no difference.
    #[serde(default)]
    pub commission_tolerance: Decimal,
    /// Spellings of the insurance-nature flag that mean ENDORSEMENT.
    #[serde(default = "default_endorsement_aliases")]
    pub endorsement_aliases: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            commission_tolerance: Decimal::ZERO,
            endorsement_aliases: default_endorsement_aliases(),
        }
    }
}

fn default_endorsement_aliases() -> Vec<String> {
    ["ENDORSEMENT", "ENDORSMENT", "ENDO"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Column aliases inherited by every bank source that does not name its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub columns: DefaultColumns,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultColumns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_nature: Option<ColumnSpec>,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Legal name as it appears in the broker's bank-name column.
    pub display_name: String,
    pub columns: ColumnMapping,
    #[serde(default)]
    pub rule: IdentifierRule,
    #[serde(default)]
    pub dedup: DedupPolicy,
    #[serde(default)]
    pub layout: TableLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_id")]
    pub source_id: String,
    #[serde(default = "default_broker_name")]
    pub display_name: String,
    pub columns: ColumnMapping,
    /// Fallback for rows whose bank name matches no registered source.
    #[serde(default)]
    pub rule: IdentifierRule,
    #[serde(default)]
    pub dedup: DedupPolicy,
    #[serde(default)]
    pub layout: TableLayout,
}

fn default_broker_id() -> String {
    "BROKER".into()
}

fn default_broker_name() -> String {
    "Broker".into()
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub identifier: ColumnSpec,
    pub customer_name: ColumnSpec,
    pub commission: ColumnSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_nature: Option<ColumnSpec>,
    /// Broker only: the insurer legal-name column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<ColumnSpec>,
}

impl ColumnMapping {
    fn specs(&self) -> impl Iterator<Item = (&'static str, &ColumnSpec)> {
        [
            ("identifier", Some(&self.identifier)),
            ("customer_name", Some(&self.customer_name)),
            ("commission", Some(&self.commission)),
            ("premium", self.premium.as_ref()),
            ("insurance_nature", self.insurance_nature.as_ref()),
            ("bank_name", self.bank_name.as_ref()),
        ]
        .into_iter()
        .filter_map(|(field, spec)| spec.map(|s| (field, s)))
    }
}

/// Raw column name(s) for one canonical field. The first alias present in an
/// upload wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ColumnSpecRepr")]
pub struct ColumnSpec {
    pub aliases: Vec<String>,
    pub optional: bool,
}

impl ColumnSpec {
    pub fn new<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            aliases: aliases.into_iter().map(Into::into).collect(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Name reported when the column is missing.
    pub fn primary(&self) -> &str {
        self.aliases.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnSpecRepr {
    Single(String),
    Aliases(Vec<String>),
    Detailed {
        aliases: Vec<String>,
        #[serde(default)]
        optional: bool,
    },
}

impl From<ColumnSpecRepr> for ColumnSpec {
    fn from(repr: ColumnSpecRepr) -> Self {
        match repr {
            ColumnSpecRepr::Single(name) => ColumnSpec::new([name]),
            ColumnSpecRepr::Aliases(aliases) => ColumnSpec::new(aliases),
            ColumnSpecRepr::Detailed { aliases, optional } => ColumnSpec { aliases, optional },
        }
    }
}

// ---------------------------------------------------------------------------
// Dedup + Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Keep the first record per canonical id, input order.
    #[default]
    FirstWins,
    /// Collapse rows sharing (canonical id, customer, source), summing money.
    GroupAndSum,
}

impl std::fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstWins => write!(f, "first_wins"),
            Self::GroupAndSum => write!(f, "group_and_sum"),
        }
    }
}

/// Where the table sits inside an uploaded sheet. Used by ingestion only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    /// 0-based row holding the headers.
    #[serde(default)]
    pub header_row: usize,
    /// Leading columns to discard.
    #[serde(default)]
    pub skip_columns: usize,
    /// Cut the table at the first row with a blank identifier.
    #[serde(default)]
    pub stop_at_blank_identifier: bool,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RegistryConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: RegistryConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.sources.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one source is required".into(),
            ));
        }

        if self.matching.commission_tolerance.is_sign_negative() {
            return Err(ReconError::ConfigValidation(format!(
                "matching.commission_tolerance must be >= 0, got {}",
                self.matching.commission_tolerance
            )));
        }

        let broker_id = fold_name(&self.broker.source_id);
        if broker_id.is_empty() {
            return Err(ReconError::ConfigValidation(
                "broker.source_id must not be empty".into(),
            ));
        }
        validate_columns("broker", &self.broker.columns)?;
        if self.broker.columns.bank_name.is_none() {
            return Err(ReconError::ConfigValidation(
                "broker: columns.bank_name is required".into(),
            ));
        }
        validate_rule("broker", &self.broker.rule)?;

        for (field, spec) in [
            ("premium", self.defaults.columns.premium.as_ref()),
            ("insurance_nature", self.defaults.columns.insurance_nature.as_ref()),
        ] {
            if let Some(spec) = spec {
                validate_spec("defaults", field, spec)?;
            }
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for (source_id, source) in &self.sources {
            let folded_id = fold_name(source_id);
            if folded_id.is_empty() {
                return Err(ReconError::ConfigValidation(
                    "source ids must not be empty".into(),
                ));
            }
            if folded_id == broker_id {
                return Err(ReconError::ConfigValidation(format!(
                    "source '{source_id}' collides with the broker source id"
                )));
            }
            if !ids.insert(folded_id) {
                return Err(ReconError::ConfigValidation(format!(
                    "source '{source_id}' is defined more than once (ids are case-insensitive)"
                )));
            }

            let display = fold_name(&source.display_name);
            if display.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "source '{source_id}': display_name must not be empty"
                )));
            }
            if !names.insert(display) {
                return Err(ReconError::ConfigValidation(format!(
                    "source '{source_id}': display_name '{}' is used by another source",
                    source.display_name
                )));
            }

            validate_columns(source_id, &source.columns)?;
            validate_rule(source_id, &source.rule)?;
        }

        Ok(())
    }
}

fn validate_columns(owner: &str, columns: &ColumnMapping) -> Result<(), ReconError> {
    for (field, spec) in columns.specs() {
        validate_spec(owner, field, spec)?;
    }
    Ok(())
}

fn validate_spec(owner: &str, field: &str, spec: &ColumnSpec) -> Result<(), ReconError> {
    if spec.aliases.is_empty() || spec.aliases.iter().any(|a| a.trim().is_empty()) {
        return Err(ReconError::ConfigValidation(format!(
            "{owner}: columns.{field} needs at least one non-blank column name"
        )));
    }
    Ok(())
}

fn validate_rule(owner: &str, rule: &IdentifierRule) -> Result<(), ReconError> {
    rule.validate()
        .map_err(|msg| ReconError::ConfigValidation(format!("{owner}: {msg}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
