use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};

use crate::aggregate::aggregate;
use crate::classify::classify;
use crate::error::ReconError;
use crate::matcher::{match_on_customer_premium, match_on_identifier};
use crate::model::{
    fold_name, CanonicalRecord, MatchBasis, NormalizeStats, RawTable, ReconMeta, ReconResult,
    ReconciledRow, SourceFailure, SourceUpload,
};
use crate::normalize::{normalize, Normalized};
use crate::registry::SourceRegistry;
use crate::summary::{summarize, summarize_by_insurer};

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub rows: Vec<ReconciledRow>,
    /// Display names present on the bank side, sorted.
    pub relevant_insurers: Vec<String>,
    /// Broker records dropped because their insurer is not in this run.
    pub excluded_broker_records: usize,
}

/// Reconcile the aggregated bank table against the broker table.
///
/// Broker records for insurers absent from the bank side are excluded and
/// only counted. Regular records join on canonical id, endorsements on
/// (customer name, premium). Rows come out as identifier joins, then
/// endorsement joins, then leftover bank records.
pub fn reconcile(
    registry: &SourceRegistry,
    bank: &[CanonicalRecord],
    broker: &[CanonicalRecord],
) -> Reconciliation {
    let tolerance = registry.commission_tolerance();

    let bank: Vec<CanonicalRecord> = bank
        .iter()
        .cloned()
        .map(|mut r| {
            if r.display_name.is_none() {
                r.display_name = Some(registry.map_display_name(&r.source));
            }
            r
        })
        .collect();

    let mut relevant: BTreeMap<String, String> = BTreeMap::new();
    for record in &bank {
        if let Some(name) = &record.display_name {
            relevant
                .entry(fold_name(name))
                .or_insert_with(|| name.clone());
        }
    }

    let mut seen_insurers = BTreeSet::new();
    let mut excluded_broker_records = 0;
    let mut regular = Vec::new();
    let mut endorsements = Vec::new();
    for record in broker {
        let insurer = record.display_name.as_deref().map(fold_name);
        match insurer {
            Some(key) if relevant.contains_key(&key) => {
                seen_insurers.insert(key);
                if record.is_endorsement() {
                    endorsements.push(record);
                } else {
                    regular.push(record);
                }
            }
            _ => excluded_broker_records += 1,
        }
    }

    for (key, name) in &relevant {
        if !seen_insurers.contains(key) {
            warn!("no broker records for '{name}'; its bank records will all be unmatched");
        }
    }

    let mut consumed = vec![false; bank.len()];
    let regular_matches = match_on_identifier(&regular, &bank, &mut consumed);
    let endorsement_matches = match_on_customer_premium(&endorsements, &bank, &mut consumed);

    let mut rows = Vec::with_capacity(broker.len() + bank.len());
    let joined = regular
        .iter()
        .zip(regular_matches)
        .map(|(b, m)| (b, m, MatchBasis::PolicyReference))
        .chain(
            endorsements
                .iter()
                .zip(endorsement_matches)
                .map(|(b, m)| (b, m, MatchBasis::CustomerPremium)),
        );
    for (broker_record, bank_index, basis) in joined {
        let bank_record = bank_index.map(|i| bank[i].clone());
        rows.extend(classify(
            bank_record,
            Some((*broker_record).clone()),
            Some(basis),
            tolerance,
        ));
    }

    for (record, _) in bank.iter().zip(&consumed).filter(|(_, used)| !**used) {
        rows.extend(classify(Some(record.clone()), None, None, tolerance));
    }

    Reconciliation {
        rows,
        relevant_insurers: relevant.into_values().collect(),
        excluded_broker_records,
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Normalized bank-side uploads, keyed by source id.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub records: BTreeMap<String, Vec<CanonicalRecord>>,
    pub stats: Vec<NormalizeStats>,
    pub failures: Vec<SourceFailure>,
}

impl SourceBatch {
    /// Append one normalized upload. Repeat uploads of a source accumulate.
    pub fn push(&mut self, source_id: &str, normalized: Normalized) {
        self.records
            .entry(source_id.to_string())
            .or_default()
            .extend(normalized.records);
        self.stats.push(normalized.stats);
    }

    pub fn push_failure(&mut self, source_id: &str, error: &ReconError) {
        warn!("skipping upload for '{source_id}': {error}");
        self.failures.push(SourceFailure {
            source_id: source_id.to_string(),
            error: error.to_string(),
        });
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

fn normalize_upload<'r>(
    registry: &'r SourceRegistry,
    upload: &SourceUpload,
) -> Result<(&'r str, Normalized), ReconError> {
    let schema = registry.lookup_bank(&upload.source_id)?;
    let normalized = normalize(&upload.table, schema)?;
    Ok((schema.source_id.as_str(), normalized))
}

#[cfg(feature = "parallel")]
fn normalize_all<'r>(
    registry: &'r SourceRegistry,
    uploads: &[SourceUpload],
) -> Vec<Result<(&'r str, Normalized), ReconError>> {
    use rayon::prelude::*;
    uploads
        .par_iter()
        .map(|upload| normalize_upload(registry, upload))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn normalize_all<'r>(
    registry: &'r SourceRegistry,
    uploads: &[SourceUpload],
) -> Vec<Result<(&'r str, Normalized), ReconError>> {
    uploads
        .iter()
        .map(|upload| normalize_upload(registry, upload))
        .collect()
}

/// Normalize every bank upload. A failing upload is recorded and skipped;
/// the others still contribute.
pub fn normalize_sources(registry: &SourceRegistry, uploads: &[SourceUpload]) -> SourceBatch {
    let mut batch = SourceBatch::default();
    for (upload, result) in uploads.iter().zip(normalize_all(registry, uploads)) {
        match result {
            Ok((source_id, normalized)) => batch.push(source_id, normalized),
            Err(e) => batch.push_failure(&upload.source_id, &e),
        }
    }
    batch
}

/// Full run from raw tables. Only a broker-side failure is fatal.
pub fn run(
    registry: &SourceRegistry,
    uploads: &[SourceUpload],
    broker_table: &RawTable,
) -> Result<ReconResult, ReconError> {
    let batch = normalize_sources(registry, uploads);
    let broker = normalize(broker_table, registry.broker())?;
    Ok(run_normalized(registry, batch, broker))
}

/// Aggregate, reconcile and summarize already-normalized inputs.
pub fn run_normalized(
    registry: &SourceRegistry,
    batch: SourceBatch,
    broker: Normalized,
) -> ReconResult {
    let SourceBatch {
        records,
        stats,
        failures,
    } = batch;

    let bank = aggregate(registry, records);
    let reconciliation = reconcile(registry, &bank, &broker.records);
    let summary = summarize(&reconciliation.rows);
    let by_insurer = summarize_by_insurer(&reconciliation.rows);

    info!(
        "reconciled {} bank and {} broker records: {} matched, {} bank-only, {} broker-only, {} broker records excluded",
        bank.len(),
        broker.records.len(),
        summary.matched,
        summary.bank_only,
        summary.broker_only,
        reconciliation.excluded_broker_records
    );

    ReconResult {
        meta: ReconMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            commission_tolerance: registry.commission_tolerance(),
            bank_records: bank.len(),
            broker_records: broker.records.len(),
        },
        summary,
        by_insurer,
        relevant_insurers: reconciliation.relevant_insurers,
        excluded_broker_records: reconciliation.excluded_broker_records,
        sources: stats,
        broker: broker.stats,
        failures,
        rows: reconciliation.rows,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InsuranceNature, MatchStatus, RawRow, RawValue};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn registry() -> SourceRegistry {
        SourceRegistry::builtin().unwrap()
    }

    fn record(id: &str, source: &str, commission: &str) -> CanonicalRecord {
        CanonicalRecord {
            policy_reference: id.into(),
            canonical_id: id.into(),
            customer_name: "CUSTOMER".into(),
            total_commission: dec(commission),
            premium_amount: None,
            insurance_nature: None,
            source: source.into(),
            display_name: None,
        }
    }

    fn broker_record(id: &str, insurer: &str, commission: &str) -> CanonicalRecord {
        CanonicalRecord {
            source: "BROKER".into(),
            display_name: Some(insurer.into()),
            ..record(id, "BROKER", commission)
        }
    }

    const SBI: &str = "SBI GENERAL INSURANCE COMPANY LIMITED";
    const CARE: &str = "CARE HEALTH INSURANCE LIMITED";

    #[test]
    fn regular_records_join_on_canonical_id() {
        let reg = registry();
        let bank = vec![record("A1", "SBI", "100"), record("A2", "SBI", "50")];
        let broker = vec![broker_record("A1", SBI, "90"), broker_record("A3", SBI, "5")];
        let out = reconcile(&reg, &bank, &broker);

        assert_eq!(out.rows.len(), 3);
        assert_eq!(out.rows[0].match_status, MatchStatus::Matched);
        assert_eq!(out.rows[0].commission_delta, dec("10"));
        assert_eq!(out.rows[0].match_basis, Some(MatchBasis::PolicyReference));
        assert_eq!(out.rows[0].insurer(), Some(SBI));
        assert_eq!(out.rows[1].match_status, MatchStatus::BrokerOnly);
        assert_eq!(out.rows[1].commission_delta, dec("-5"));
        assert_eq!(out.rows[2].match_status, MatchStatus::BankOnly);
        assert_eq!(out.rows[2].commission_delta, dec("50"));
        assert_eq!(out.rows[2].match_basis, None);
        assert_eq!(out.relevant_insurers, vec![SBI.to_string()]);
    }

    #[test]
    fn broker_records_for_other_insurers_are_excluded() {
        let reg = registry();
        let bank = vec![record("A1", "SBI", "100")];
        let broker = vec![
            broker_record("A1", SBI, "100"),
            broker_record("C1", CARE, "1"),
            broker_record("C2", CARE, "1"),
        ];
        let out = reconcile(&reg, &bank, &broker);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.excluded_broker_records, 2);
        assert_eq!(out.rows.len() + out.excluded_broker_records, broker.len());
    }

    #[test]
    fn insurer_names_compare_case_insensitively() {
        let reg = registry();
        let bank = vec![record("A1", "SBI", "1")];
        let broker = vec![broker_record("A1", &SBI.to_lowercase(), "1")];
        let out = reconcile(&reg, &bank, &broker);
        assert_eq!(out.rows[0].match_status, MatchStatus::Matched);
    }

    #[test]
    fn endorsements_join_on_customer_and_premium() {
        let reg = registry();
        let mut bank_endo = record("NEWID1", "SBI", "30");
        bank_endo.customer_name = "RAVI".into();
        bank_endo.premium_amount = Some(dec("1000.00"));

        let mut broker_endo = broker_record("OLDID9", SBI, "30");
        broker_endo.customer_name = "RAVI".into();
        broker_endo.premium_amount = Some(dec("1000"));
        broker_endo.insurance_nature = Some(InsuranceNature::Endorsement);

        let out = reconcile(&reg, &[bank_endo], &[broker_endo]);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].match_status, MatchStatus::Matched);
        assert_eq!(out.rows[0].match_basis, Some(MatchBasis::CustomerPremium));
        assert_eq!(out.rows[0].commission_delta, Decimal::ZERO);
    }

    #[test]
    fn endorsement_without_identity_match_is_broker_only() {
        let reg = registry();
        let bank = vec![record("X1", "SBI", "10")];
        let mut endo = broker_record("X1", SBI, "10");
        endo.insurance_nature = Some(InsuranceNature::Endorsement);
        let out = reconcile(&reg, &bank, &[endo]);
        // Endorsements never fall back to the identifier join.
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].match_status, MatchStatus::BrokerOnly);
        assert_eq!(out.rows[1].match_status, MatchStatus::BankOnly);
    }

    #[test]
    fn empty_sides_degrade() {
        let reg = registry();
        let bank = vec![record("A", "SBI", "1"), record("B", "CARE", "2")];
        let out = reconcile(&reg, &bank, &[]);
        assert_eq!(out.rows.len(), 2);
        assert!(out.rows.iter().all(|r| r.match_status == MatchStatus::BankOnly));

        let out = reconcile(&reg, &[], &[broker_record("A", SBI, "1")]);
        assert!(out.rows.is_empty());
        assert_eq!(out.excluded_broker_records, 1);
    }

    fn digit_upload(rows: Vec<RawRow>) -> SourceUpload {
        SourceUpload::new("GO-DIGIT", RawTable::from_rows(rows))
    }

    fn digit_row(id: &str, comm: &str) -> RawRow {
        RawRow::new()
            .with("policy number", id)
            .with("policy holder", "Suresh")
            .with("IRDA_AMT", comm)
    }

    fn broker_table(rows: Vec<(&str, &str, &str)>) -> RawTable {
        RawTable::from_rows(
            rows.into_iter()
                .map(|(id, bank, comm)| {
                    RawRow::new()
                        .with("PolicyNumber", id)
                        .with("cName", "Suresh")
                        .with("NetCommision", comm)
                        .with("p_insurerName", bank)
                })
                .collect(),
        )
    }

    #[test]
    fn run_end_to_end_with_segment_rule() {
        let reg = registry();
        let uploads = vec![digit_upload(vec![digit_row("123456789/01", "250")])];
        let broker = broker_table(vec![(
            "123456789",
            "GO DIGIT GENERAL INSURANCE LIMITED",
            "250",
        )]);
        let result = run(&reg, &uploads, &broker).unwrap();
        assert_eq!(result.summary.total, 1);
        assert_eq!(result.summary.matched, 1);
        assert_eq!(result.rows[0].commission_delta, Decimal::ZERO);
        assert_eq!(result.meta.bank_records, 1);
        assert!(result.failures.is_empty());
        assert_eq!(result.by_insurer["GO DIGIT GENERAL INSURANCE LIMITED"].matched, 1);
    }

    #[test]
    fn failing_source_does_not_abort_others() {
        let reg = registry();
        let bad = SourceUpload::new(
            "HDFC",
            RawTable::from_rows(vec![RawRow::new().with("Certificate_Num", "1")]),
        );
        let unknown = SourceUpload::new("ACME", RawTable::default());
        let good = digit_upload(vec![digit_row("55", "1")]);
        let batch = normalize_sources(&reg, &[bad, unknown, good]);

        assert_eq!(batch.failures.len(), 2);
        assert_eq!(batch.failures[0].source_id, "HDFC");
        assert!(batch.failures[0].error.contains("Customer_Name"));
        assert_eq!(batch.failures[1].source_id, "ACME");
        assert_eq!(batch.record_count(), 1);
        assert_eq!(batch.records["GO-DIGIT"][0].canonical_id, "55");
    }

    #[test]
    fn repeat_uploads_for_a_source_accumulate() {
        let reg = registry();
        let batch = normalize_sources(
            &reg,
            &[
                digit_upload(vec![digit_row("1", "1")]),
                digit_upload(vec![digit_row("2", "1"), digit_row("1", "1")]),
            ],
        );
        let ids: Vec<&str> = batch.records["GO-DIGIT"]
            .iter()
            .map(|r| r.canonical_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2", "1"]);
        assert_eq!(batch.stats.len(), 2);
    }

    #[test]
    fn broker_schema_mismatch_is_fatal() {
        let reg = registry();
        let broker = RawTable::from_rows(vec![RawRow::new().with("PolicyNumber", "1")]);
        let err = run(&reg, &[], &broker).unwrap_err();
        match err {
            ReconError::SchemaMismatch { source_id, missing } => {
                assert_eq!(source_id, "BROKER");
                assert!(missing.contains(&"NetCommision".to_string()));
                assert!(missing.contains(&"p_insurerName".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_broker_insurer_is_excluded() {
        let reg = registry();
        let uploads = vec![digit_upload(vec![digit_row("9", "1")])];
        let mut broker = broker_table(vec![("9", "GO DIGIT GENERAL INSURANCE LIMITED", "1")]);
        broker
            .rows
            .push(RawRow::new().with("PolicyNumber", "10").with("p_insurerName", RawValue::Null));
        let result = run(&reg, &uploads, &broker).unwrap();
        assert_eq!(result.summary.matched, 1);
        assert_eq!(result.excluded_broker_records, 1);
    }
}
