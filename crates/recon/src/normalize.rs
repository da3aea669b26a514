use std::collections::HashMap;

use log::{debug, warn};
use rust_decimal::Decimal;

use crate::config::{ColumnSpec, DedupPolicy};
use crate::error::ReconError;
use crate::model::{
    fold_name, CanonicalRecord, InsuranceNature, NormalizeStats, RawRow, RawTable, RawValue,
};
use crate::registry::SourceSchema;
use crate::rules::canonicalize;

/// Output of one normalizer call.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<CanonicalRecord>,
    pub stats: NormalizeStats,
}

/// Raw column names resolved against one table's column space.
struct ResolvedColumns<'a> {
    identifier: &'a str,
    customer_name: &'a str,
    commission: &'a str,
    premium: Option<&'a str>,
    insurance_nature: Option<&'a str>,
    bank_name: Option<&'a str>,
}

/// Normalize one upload into canonical records.
///
/// Fails only when a required column is absent, which includes a table with
/// no header row at all. Rows with a blank identifier or an identifier that
/// canonicalizes to nothing are dropped and counted.
pub fn normalize(table: &RawTable, schema: &SourceSchema) -> Result<Normalized, ReconError> {
    let columns = resolve_columns(table, schema)?;
    let mut stats = NormalizeStats::new(&schema.source_id, table.rows.len());
    let endorsement_aliases: Vec<String> =
        schema.endorsement_aliases.iter().map(|a| fold_name(a)).collect();

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        if let Some(record) = normalize_row(row, schema, &columns, &endorsement_aliases, &mut stats)
        {
            records.push(record);
        }
    }

    // broker endorsements join on identity, so a shared policy id is expected
    let exempt = |r: &CanonicalRecord| schema.is_broker() && r.is_endorsement();
    let before = records.len();
    let records = match schema.dedup {
        DedupPolicy::FirstWins => dedup_first_wins(records, exempt),
        DedupPolicy::GroupAndSum => group_and_sum(records, exempt),
    };
    stats.duplicates_merged = before - records.len();
    stats.retained = records.len();

    debug!(
        "normalized {}: {} rows in, {} retained, {} duplicates merged",
        schema.source_id, stats.input_rows, stats.retained, stats.duplicates_merged
    );
    if stats.dropped() > 0 {
        warn!(
            "{}: dropped {} row(s) ({} blank identifier, {} empty canonical id)",
            schema.source_id,
            stats.dropped(),
            stats.blank_identifier,
            stats.empty_canonical_id
        );
    }
    if stats.unparsed_commission > 0 {
        warn!(
            "{}: {} commission value(s) could not be read and count as zero",
            schema.source_id, stats.unparsed_commission
        );
    }

    Ok(Normalized { records, stats })
}

fn resolve_columns<'a>(
    table: &'a RawTable,
    schema: &SourceSchema,
) -> Result<ResolvedColumns<'a>, ReconError> {
    let mut missing = Vec::new();
    let mut required = |spec: &ColumnSpec| -> &'a str {
        match table.resolve_column(&spec.aliases) {
            Some(name) => name,
            None => {
                missing.push(spec.primary().to_string());
                ""
            }
        }
    };

    let c = &schema.columns;
    let identifier = required(&c.identifier);
    let customer_name = required(&c.customer_name);
    let commission = required(&c.commission);

    let mut optional = |spec: Option<&ColumnSpec>| -> Option<&'a str> {
        let spec = spec?;
        let found = table.resolve_column(&spec.aliases);
        if found.is_none() && !spec.optional {
            missing.push(spec.primary().to_string());
        }
        found
    };
    let bank_name = optional(c.bank_name.as_ref());
    let premium = optional(c.premium.as_ref());
    let insurance_nature = optional(c.insurance_nature.as_ref());

    if !missing.is_empty() {
        return Err(ReconError::SchemaMismatch {
            source_id: schema.source_id.clone(),
            missing,
        });
    }

    Ok(ResolvedColumns {
        identifier,
        customer_name,
        commission,
        premium,
        insurance_nature,
        bank_name,
    })
}

fn normalize_row(
    row: &RawRow,
    schema: &SourceSchema,
    columns: &ResolvedColumns<'_>,
    endorsement_aliases: &[String],
    stats: &mut NormalizeStats,
) -> Option<CanonicalRecord> {
    let Some(policy_reference) = row.get(columns.identifier).and_then(RawValue::as_text) else {
        stats.blank_identifier += 1;
        return None;
    };

    let bank_name = columns
        .bank_name
        .and_then(|col| row.get(col))
        .and_then(RawValue::as_text);
    let rule = match (&bank_name, schema.is_broker()) {
        (Some(name), true) => schema.rule_for_insurer(name),
        _ => &schema.identifier_rule,
    };

    let canonical_id = canonicalize(&policy_reference, rule);
    if canonical_id.is_empty() {
        stats.empty_canonical_id += 1;
        return None;
    }

    let total_commission = match row.get(columns.commission).and_then(RawValue::as_decimal) {
        Some(amount) => amount.abs(),
        None => {
            stats.unparsed_commission += 1;
            Decimal::ZERO
        }
    };
    let premium_amount = columns
        .premium
        .and_then(|col| row.get(col))
        .and_then(RawValue::as_decimal)
        .map(|p| p.abs());
    let insurance_nature = columns
        .insurance_nature
        .and_then(|col| row.get(col))
        .and_then(RawValue::as_text)
        .map(|text| classify_nature(&text, endorsement_aliases));

    Some(CanonicalRecord {
        policy_reference,
        canonical_id,
        customer_name: text_upper(row.get(columns.customer_name)),
        total_commission,
        premium_amount,
        insurance_nature,
        source: schema.source_id.clone(),
        display_name: if schema.is_broker() { bank_name } else { None },
    })
}

fn text_upper(value: Option<&RawValue>) -> String {
    value
        .and_then(RawValue::as_text)
        .map(|s| s.to_uppercase())
        .unwrap_or_default()
}

fn classify_nature(text: &str, endorsement_aliases: &[String]) -> InsuranceNature {
    let folded = fold_name(text);
    if endorsement_aliases.iter().any(|a| *a == folded) {
        InsuranceNature::Endorsement
    } else {
        InsuranceNature::Regular
    }
}

/// Keep the first record per (insurer, canonical id). Bank uploads carry no
/// insurer yet, so this is per canonical id for them. `exempt` records are
/// always kept.
fn dedup_first_wins(
    records: Vec<CanonicalRecord>,
    exempt: impl Fn(&CanonicalRecord) -> bool,
) -> Vec<CanonicalRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            if exempt(r) {
                return true;
            }
            let insurer = r.display_name.as_deref().map(fold_name);
            seen.insert((insurer, r.canonical_id.clone()))
        })
        .collect()
}

/// Collapse rows sharing (canonical id, customer, source), summing the
/// monetary fields. The first row of each group is the representative and
/// groups keep first-seen order. Sums saturate at the `Decimal` bounds.
fn group_and_sum(
    records: Vec<CanonicalRecord>,
    exempt: impl Fn(&CanonicalRecord) -> bool,
) -> Vec<CanonicalRecord> {
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();
    let mut out: Vec<CanonicalRecord> = Vec::new();
    for record in records {
        if exempt(&record) {
            out.push(record);
            continue;
        }
        let key = (
            record.canonical_id.clone(),
            record.customer_name.clone(),
            record.source.clone(),
        );
        match index.get(&key) {
            Some(&i) => {
                let group = &mut out[i];
                group.total_commission =
                    sum_money(group, group.total_commission, record.total_commission);
                group.premium_amount = match (group.premium_amount, record.premium_amount) {
                    (Some(a), Some(b)) => Some(sum_money(group, a, b)),
                    (a, b) => a.or(b),
                };
            }
            None => {
                index.insert(key, out.len());
                out.push(record);
            }
        }
    }
    out
}

fn sum_money(group: &CanonicalRecord, a: Decimal, b: Decimal) -> Decimal {
    a.checked_add(b).unwrap_or_else(|| {
        warn!(
            "{}: amount for '{}' overflows; capped at {}",
            group.source,
            group.canonical_id,
            Decimal::MAX
        );
        a.saturating_add(b)
    })
}
