use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use polrec_recon::{
    run, DifferenceFlag, MatchBasis, MatchStatus, RawRow, RawTable, RawValue, ReconError,
    ReconResult, SourceRegistry, SourceUpload,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn load_csv(name: &str) -> RawTable {
    let path = fixtures_dir().join(name);
    let mut reader = csv::Reader::from_path(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    let mut table = RawTable::new(headers.clone());
    for record in reader.records() {
        let record = record.unwrap();
        table.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), RawValue::from(v)))
                .collect::<RawRow>(),
        );
    }
    table
}

fn fixture_registry() -> SourceRegistry {
    let toml = std::fs::read_to_string(fixtures_dir().join("two-insurer.registry.toml")).unwrap();
    SourceRegistry::from_toml(&toml).unwrap()
}

fn fixture_run() -> ReconResult {
    let registry = fixture_registry();
    let uploads = vec![
        SourceUpload::new("ALPHA", load_csv("alpha.csv")),
        SourceUpload::new("beta", load_csv("beta.csv")),
    ];
    run(&registry, &uploads, &load_csv("broker.csv")).unwrap()
}

fn row_for<'a>(result: &'a ReconResult, canonical_id: &str) -> &'a polrec_recon::ReconciledRow {
    result
        .rows
        .iter()
        .find(|r| r.canonical_id() == canonical_id)
        .unwrap_or_else(|| panic!("no row for {canonical_id}"))
}

// -------------------------------------------------------------------------
// Fixture run
// -------------------------------------------------------------------------

#[test]
fn fixture_summary() {
    let result = fixture_run();

    assert_eq!(result.meta.bank_records, 7);
    assert_eq!(result.meta.broker_records, 8);
    assert_eq!(result.summary.total, 8);
    assert_eq!(result.summary.matched, 5);
    assert_eq!(result.summary.bank_only, 2);
    assert_eq!(result.summary.broker_only, 1);
    assert_eq!(result.summary.commission_mismatches, 1);
    assert_eq!(result.summary.net_commission_delta, dec("127.50"));
    assert_eq!(result.excluded_broker_records, 2);
    assert!(result.failures.is_empty());

    assert_eq!(
        result.relevant_insurers,
        vec![
            "ALPHA GENERAL INSURANCE LIMITED".to_string(),
            "BETA HEALTH INSURANCE LIMITED".to_string(),
        ]
    );
}

#[test]
fn fixture_normalization_stats() {
    let result = fixture_run();
    let alpha = &result.sources[0];
    assert_eq!(alpha.source_id, "ALPHA");
    assert_eq!(alpha.input_rows, 5);
    assert_eq!(alpha.blank_identifier, 1);
    assert_eq!(alpha.retained, 4);

    let beta = &result.sources[1];
    assert_eq!(beta.source_id, "BETA");
    assert_eq!(beta.duplicates_merged, 1);
    assert_eq!(beta.retained, 3);

    assert_eq!(result.broker.retained, 8);
}

#[test]
fn fixture_regular_rows() {
    let result = fixture_run();

    let exact = row_for(&result, "A1001");
    assert_eq!(exact.match_status, MatchStatus::Matched);
    assert_eq!(exact.difference, DifferenceFlag::NoDifference);

    let short_paid = row_for(&result, "A1002");
    assert_eq!(short_paid.match_status, MatchStatus::Matched);
    assert_eq!(short_paid.commission_delta, dec("50.00"));
    assert_eq!(short_paid.difference, DifferenceFlag::Positive);

    let ghost = row_for(&result, "A1099");
    assert_eq!(ghost.match_status, MatchStatus::BrokerOnly);
    assert_eq!(ghost.commission_delta, dec("-10"));

    let credit = row_for(&result, "A1003");
    assert_eq!(credit.match_status, MatchStatus::BankOnly);
    assert_eq!(credit.commission_delta, dec("75.00"));
}

#[test]
fn fixture_endorsement_matches_on_identity() {
    let result = fixture_run();
    let endo = result
        .rows
        .iter()
        .find(|r| r.match_basis == Some(MatchBasis::CustomerPremium))
        .unwrap();
    assert_eq!(endo.match_status, MatchStatus::Matched);
    assert_eq!(endo.bank.as_ref().unwrap().canonical_id, "A1004");
    assert_eq!(endo.broker.as_ref().unwrap().canonical_id, "ZZ9");
}

#[test]
fn fixture_grouped_and_padded_identifiers() {
    let result = fixture_run();

    let grouped = row_for(&result, "000000123");
    assert_eq!(grouped.match_status, MatchStatus::Matched);
    assert_eq!(grouped.bank.as_ref().unwrap().total_commission, dec("150"));
    assert_eq!(grouped.commission_delta, Decimal::ZERO);

    let truncated = row_for(&result, "456789012");
    assert_eq!(truncated.match_status, MatchStatus::Matched);
    assert_eq!(truncated.commission_delta, dec("0.50"));
    assert_eq!(truncated.difference, DifferenceFlag::NoDifference);

    assert_eq!(row_for(&result, "000000077").match_status, MatchStatus::BankOnly);
}

#[test]
fn fixture_by_insurer() {
    let result = fixture_run();
    let alpha = &result.by_insurer["ALPHA GENERAL INSURANCE LIMITED"];
    assert_eq!(alpha.total, 5);
    assert_eq!(alpha.matched, 3);
    let beta = &result.by_insurer["BETA HEALTH INSURANCE LIMITED"];
    assert_eq!(beta.total, 3);
    assert_eq!(beta.bank_only, 1);
    assert!(!result.by_insurer.contains_key("GAMMA INSURANCE LIMITED"));
}

#[test]
fn fixture_result_json_shape() {
    let result = fixture_run();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["summary"]["matched"], 5);
    assert_eq!(json["meta"]["bank_records"], 7);
    let short_paid = json["rows"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["bank"]["canonical_id"] == "A1002")
        .unwrap();
    assert_eq!(short_paid["match_status"], "MATCHED");
    assert_eq!(short_paid["match_basis"], "POLICY_REFERENCE");
    assert_eq!(short_paid["difference"], "POSITIVE");
}

// -------------------------------------------------------------------------
// Scenarios against the built-in registry
// -------------------------------------------------------------------------

#[test]
fn go_digit_segment_rule_matches_broker() {
    let registry = SourceRegistry::builtin().unwrap();
    let bank = RawTable::from_rows(vec![RawRow::new()
        .with("policy number", "123456789/01")
        .with("policy holder", "Suresh")
        .with("IRDA_AMT", 420.0)]);
    let broker = RawTable::from_rows(vec![RawRow::new()
        .with("PolicyNumber", 123456789i64)
        .with("cName", "SURESH")
        .with("NetCommision", 420i64)
        .with("p_insurerName", "GO DIGIT GENERAL INSURANCE LIMITED")]);

    let result = run(&registry, &[SourceUpload::new("GO-DIGIT", bank)], &broker).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].match_status, MatchStatus::Matched);
    assert_eq!(result.rows[0].commission_delta, Decimal::ZERO);
}

#[test]
fn endorsement_sharing_base_policy_id_still_reconciles() {
    let registry = SourceRegistry::builtin().unwrap();
    let bank = RawTable::from_rows(vec![
        RawRow::new()
            .with("policy number", "D123/00")
            .with("policy holder", "Suresh")
            .with("IRDA_AMT", "10")
            .with("TOTAL PREMIUM", "1000"),
        RawRow::new()
            .with("policy number", "E555/01")
            .with("policy holder", "Suresh")
            .with("IRDA_AMT", "4")
            .with("TOTAL PREMIUM", "200"),
    ]);
    let broker_row = |id: &str, commission: &str, premium: &str, nature: &str| {
        RawRow::new()
            .with("PolicyNumber", id)
            .with("cName", "SURESH")
            .with("NetCommision", commission)
            .with("TotalPremium", premium)
            .with("InsuranceNature", nature)
            .with("p_insurerName", "GO DIGIT GENERAL INSURANCE LIMITED")
    };
    let broker = RawTable::from_rows(vec![
        broker_row("D123/00", "10", "1000", "Regular"),
        broker_row("D123/01", "4", "200", "Endorsment"),
    ]);

    let result = run(&registry, &[SourceUpload::new("GO-DIGIT", bank)], &broker).unwrap();
    assert_eq!(result.broker.retained, 2);
    assert_eq!(result.broker.duplicates_merged, 0);
    assert_eq!(result.summary.total, 2);
    assert_eq!(result.summary.matched, 2);
    let endo = result
        .rows
        .iter()
        .find(|r| r.match_basis == Some(MatchBasis::CustomerPremium))
        .unwrap();
    assert_eq!(endo.bank.as_ref().unwrap().canonical_id, "E555");
}

#[test]
fn bank_only_source_without_broker_rows() {
    let registry = SourceRegistry::builtin().unwrap();
    let bank = RawTable::from_rows(
        (1..=4)
            .map(|i| {
                RawRow::new()
                    .with("Policy No", format!("SBI-{i}"))
                    .with("Insured Name", "x")
                    .with("Total Commission", i as i64)
            })
            .collect(),
    );
    let broker = RawTable::from_rows(vec![RawRow::new()
        .with("PolicyNumber", "C-1")
        .with("cName", "y")
        .with("NetCommision", "1")
        .with("p_insurerName", "CARE HEALTH INSURANCE LIMITED")]);

    let result = run(&registry, &[SourceUpload::new("SBI", bank)], &broker).unwrap();
    assert_eq!(result.summary.bank_only, 4);
    assert_eq!(result.summary.matched, 0);
    assert_eq!(result.summary.broker_only, 0);
    assert_eq!(result.excluded_broker_records, 1);
}

#[test]
fn schema_mismatch_names_missing_column() {
    let registry = SourceRegistry::builtin().unwrap();
    let schema = registry.lookup("RELIANCE").unwrap();
    let table = RawTable::from_rows(vec![RawRow::new()
        .with("PolicyNumber", "1")
        .with("FinalIRDAComm", "1")]);
    let err = polrec_recon::normalize(&table, schema).unwrap_err();
    assert_eq!(
        err,
        ReconError::SchemaMismatch {
            source_id: "RELIANCE".into(),
            missing: vec!["InsuredName".into()],
        }
    );
    assert!(err.to_string().contains("InsuredName"));
}

#[test]
fn custom_registry_validation_errors_surface() {
    let err = SourceRegistry::from_toml("[broker.columns]\nidentifier = \"a\"\n").unwrap_err();
    assert!(matches!(err, ReconError::ConfigParse(_)));
}
