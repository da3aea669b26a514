use std::collections::BTreeMap;

use log::warn;
use rust_decimal::Decimal;

use crate::config::{
    ColumnMapping, ColumnSpec, DedupPolicy, MatchingConfig, RegistryConfig, TableLayout,
};
use crate::error::ReconError;
use crate::model::fold_name;
use crate::rules::IdentifierRule;

/// Registry shipped with the crate.
pub const BUILTIN_TOML: &str = include_str!("builtin_registry.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Bank,
    Broker,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bank => write!(f, "bank"),
            Self::Broker => write!(f, "broker"),
        }
    }
}

/// Resolved, immutable description of one source.
#[derive(Debug, Clone)]
pub struct SourceSchema {
    pub source_id: String,
    pub display_name: String,
    pub kind: SourceKind,
    pub columns: ColumnMapping,
    pub identifier_rule: IdentifierRule,
    pub dedup: DedupPolicy,
    pub layout: TableLayout,
    pub endorsement_aliases: Vec<String>,
    /// Broker only: folded insurer display name -> that insurer's rule.
    pub insurer_rules: BTreeMap<String, IdentifierRule>,
}

impl SourceSchema {
    /// Column specs an upload must carry, in canonical field order.
    pub fn required_columns(&self) -> Vec<&ColumnSpec> {
        let c = &self.columns;
        [
            Some(&c.identifier),
            Some(&c.customer_name),
            Some(&c.commission),
            c.bank_name.as_ref(),
            c.premium.as_ref(),
            c.insurance_nature.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter(|spec| !spec.optional)
        .collect()
    }

    /// Rule for a broker row carrying `bank_name`; the schema's own rule when
    /// the name belongs to no registered insurer.
    pub fn rule_for_insurer(&self, bank_name: &str) -> &IdentifierRule {
        self.insurer_rules
            .get(&fold_name(bank_name))
            .unwrap_or(&self.identifier_rule)
    }

    pub fn is_broker(&self) -> bool {
        self.kind == SourceKind::Broker
    }
}

/// Lookup table of every configured source plus the broker.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    matching: MatchingConfig,
    sources: BTreeMap<String, SourceSchema>,
    broker: SourceSchema,
}

impl SourceRegistry {
    /// The embedded registry.
    pub fn builtin() -> Result<Self, ReconError> {
        Self::from_toml(BUILTIN_TOML)
    }

    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        Ok(Self::from_config(RegistryConfig::from_toml(input)?))
    }

    /// Build from an already validated config.
    pub fn from_config(config: RegistryConfig) -> Self {
        let RegistryConfig {
            matching,
            defaults,
            broker,
            sources,
        } = config;

        let mut insurer_rules = BTreeMap::new();
        let mut schemas = BTreeMap::new();
        for (source_id, source) in sources {
            let mut columns = source.columns;
            if columns.premium.is_none() {
                columns.premium = defaults.columns.premium.clone();
            }
            if columns.insurance_nature.is_none() {
                columns.insurance_nature = defaults.columns.insurance_nature.clone();
            }
            insurer_rules.insert(fold_name(&source.display_name), source.rule.clone());
            schemas.insert(
                fold_name(&source_id),
                SourceSchema {
                    source_id: source_id.trim().to_string(),
                    display_name: source.display_name.trim().to_string(),
                    kind: SourceKind::Bank,
                    columns,
                    identifier_rule: source.rule,
                    dedup: source.dedup,
                    layout: source.layout,
                    endorsement_aliases: matching.endorsement_aliases.clone(),
                    insurer_rules: BTreeMap::new(),
                },
            );
        }

        let broker = SourceSchema {
            source_id: broker.source_id.trim().to_string(),
            display_name: broker.display_name,
            kind: SourceKind::Broker,
            columns: broker.columns,
            identifier_rule: broker.rule,
            dedup: broker.dedup,
            layout: broker.layout,
            endorsement_aliases: matching.endorsement_aliases.clone(),
            insurer_rules,
        };

        Self {
            matching,
            sources: schemas,
            broker,
        }
    }

    /// Schema for `source_id` (case-insensitive), including the broker.
    pub fn lookup(&self, source_id: &str) -> Result<&SourceSchema, ReconError> {
        let key = fold_name(source_id);
        if key == fold_name(&self.broker.source_id) {
            return Ok(&self.broker);
        }
        self.sources
            .get(&key)
            .ok_or_else(|| ReconError::UnknownSource {
                source_id: source_id.to_string(),
            })
    }

    /// Like [`lookup`](Self::lookup) but refuses the broker.
    pub fn lookup_bank(&self, source_id: &str) -> Result<&SourceSchema, ReconError> {
        self.sources
            .get(&fold_name(source_id))
            .ok_or_else(|| ReconError::UnknownSource {
                source_id: source_id.to_string(),
            })
    }

    pub fn broker(&self) -> &SourceSchema {
        &self.broker
    }

    /// Bank schemas ordered by source id.
    pub fn sources(&self) -> impl Iterator<Item = &SourceSchema> {
        self.sources.values()
    }

    pub fn commission_tolerance(&self) -> Decimal {
        self.matching.commission_tolerance
    }

    /// Broker-facing legal name for a short source code. Unknown codes pass
    /// through unchanged; such a source can never match a broker row.
    pub fn map_display_name(&self, short_name: &str) -> String {
        match self.sources.get(&fold_name(short_name)) {
            Some(schema) => schema.display_name.clone(),
            None => {
                warn!("no display name mapped for source '{short_name}'; using it verbatim");
                short_name.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_loads() {
        let registry = SourceRegistry::builtin().unwrap();
        assert_eq!(registry.sources().count(), 16);
        assert_eq!(registry.broker().source_id, "BROKER");
        assert_eq!(registry.commission_tolerance(), Decimal::ZERO);
    }

    #[test]
    fn lookup_is_case_insensitive_and_reports_unknown() {
        let registry = SourceRegistry::builtin().unwrap();
        assert_eq!(registry.lookup("hdfc").unwrap().source_id, "HDFC");
        assert_eq!(registry.lookup(" tata aig ").unwrap().source_id, "TATA AIG");
        assert!(registry.lookup("broker").unwrap().is_broker());
        assert!(registry.lookup_bank("BROKER").is_err());

        let err = registry.lookup("ACME").unwrap_err();
        assert_eq!(
            err,
            ReconError::UnknownSource {
                source_id: "ACME".into()
            }
        );
    }

    #[test]
    fn display_names_map_and_pass_through() {
        let registry = SourceRegistry::builtin().unwrap();
        assert_eq!(
            registry.map_display_name("GO-DIGIT"),
            "GO DIGIT GENERAL INSURANCE LIMITED"
        );
        assert_eq!(
            registry.map_display_name("united pdf"),
            "UNITED INDIA INSURANCE COMPANY LIMITED"
        );
        assert_eq!(registry.map_display_name("Unmapped Co"), "Unmapped Co");
    }

    #[test]
    fn bank_sources_inherit_default_optional_columns() {
        let registry = SourceRegistry::builtin().unwrap();
        let hdfc = registry.lookup("HDFC").unwrap();
        let premium = hdfc.columns.premium.as_ref().unwrap();
        assert!(premium.optional);
        assert!(premium.aliases.iter().any(|a| a == "PREMIUM BANK"));

        let required: Vec<&str> = hdfc.required_columns().iter().map(|c| c.primary()).collect();
        assert_eq!(required, vec!["Certificate_Num", "Customer_Name", "TOTAL_COMM"]);
    }

    #[test]
    fn broker_requires_bank_name_and_routes_rules_by_insurer() {
        let registry = SourceRegistry::builtin().unwrap();
        let broker = registry.broker();
        let required: Vec<&str> = broker.required_columns().iter().map(|c| c.primary()).collect();
        assert_eq!(
            required,
            vec!["PolicyNumber", "cName", "NetCommision", "p_insurerName"]
        );
        assert_eq!(
            broker.rule_for_insurer("go digit general insurance limited"),
            &IdentifierRule::SegmentBeforeDelimiter { delimiter: '/' }
        );
        assert_eq!(
            broker.rule_for_insurer("TATA AIG GENERAL INSURANCE COMPANY LIMITED"),
            &IdentifierRule::FixedPrefix {
                length: 10,
                strip_leading_zero: false
            }
        );
        assert_eq!(broker.rule_for_insurer("SOMEONE ELSE"), &IdentifierRule::Identity);
    }

    #[test]
    fn builtin_layouts_and_dedup() {
        let registry = SourceRegistry::builtin().unwrap();
        let united = registry.lookup("UNITED PDF").unwrap();
        assert_eq!(united.layout.header_row, 1);
        assert_eq!(united.layout.skip_columns, 1);
        let new_india = registry.lookup("THE NEW INDIA PDF").unwrap();
        assert_eq!(new_india.dedup, DedupPolicy::GroupAndSum);
        assert!(new_india.layout.stop_at_blank_identifier);
    }
}
