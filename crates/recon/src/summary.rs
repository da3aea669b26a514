use std::collections::BTreeMap;

use crate::model::{DifferenceFlag, MatchStatus, ReconciledRow, SummaryCounts};

/// Key used for rows whose insurer name is blank.
pub const UNKNOWN_INSURER: &str = "UNKNOWN";

impl SummaryCounts {
    fn add(&mut self, row: &ReconciledRow) {
        self.total += 1;
        match row.match_status {
            MatchStatus::Matched => {
                self.matched += 1;
                if row.difference != DifferenceFlag::NoDifference {
                    self.commission_mismatches += 1;
                }
            }
            MatchStatus::BankOnly => self.bank_only += 1,
            MatchStatus::BrokerOnly => self.broker_only += 1,
        }
        // capped at the Decimal bounds rather than overflowing
        self.net_commission_delta = self
            .net_commission_delta
            .saturating_add(row.commission_delta);
    }

    /// No one-sided rows and no matched row outside tolerance.
    pub fn is_clean(&self) -> bool {
        self.bank_only == 0 && self.broker_only == 0 && self.commission_mismatches == 0
    }
}

/// Count rows per match status.
pub fn summarize(rows: &[ReconciledRow]) -> SummaryCounts {
    let mut counts = SummaryCounts::default();
    for row in rows {
        counts.add(row);
    }
    counts
}

/// Counts per broker-facing insurer name.
pub fn summarize_by_insurer(rows: &[ReconciledRow]) -> BTreeMap<String, SummaryCounts> {
    let mut by_insurer: BTreeMap<String, SummaryCounts> = BTreeMap::new();
    for row in rows {
        let insurer = row.insurer().unwrap_or(UNKNOWN_INSURER);
        by_insurer.entry(insurer.to_string()).or_default().add(row);
    }
    by_insurer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::model::CanonicalRecord;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn rec(insurer: Option<&str>, commission: i64) -> CanonicalRecord {
        CanonicalRecord {
            policy_reference: "P".into(),
            canonical_id: "P".into(),
            customer_name: "A".into(),
            total_commission: Decimal::from(commission),
            premium_amount: None,
            insurance_nature: None,
            source: "X".into(),
            display_name: insurer.map(String::from),
        }
    }

    fn rows() -> Vec<ReconciledRow> {
        let row = |bank, broker| classify(bank, broker, None, Decimal::ZERO).unwrap();
        vec![
            row(Some(rec(Some("SBI"), 10)), Some(rec(Some("SBI"), 10))),
            row(Some(rec(Some("SBI"), 12)), Some(rec(Some("SBI"), 10))),
            row(Some(rec(Some("SBI"), 5)), None),
            row(None, Some(rec(Some("CARE"), 7))),
            row(None, Some(rec(None, 1))),
        ]
    }

    #[test]
    fn summary_counts() {
        let summary = summarize(&rows());
        assert_eq!(summary.total, 5);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.bank_only, 1);
        assert_eq!(summary.broker_only, 2);
        assert_eq!(summary.commission_mismatches, 1);
        assert_eq!(summary.net_commission_delta, Decimal::from(-1));
        assert!(!summary.is_clean());
    }

    #[test]
    fn summary_by_insurer() {
        let by = summarize_by_insurer(&rows());
        assert_eq!(by.len(), 3);
        assert_eq!(by["SBI"].total, 3);
        assert_eq!(by["SBI"].matched, 2);
        assert_eq!(by["CARE"].broker_only, 1);
        assert_eq!(by[UNKNOWN_INSURER].total, 1);
    }

    #[test]
    fn net_delta_saturates_on_huge_amounts() {
        let huge = Decimal::from_str("50000000000000000000000000000").unwrap();
        let row = |commission| {
            let mut bank = rec(Some("SBI"), 0);
            bank.total_commission = commission;
            classify(Some(bank), None, None, Decimal::ZERO).unwrap()
        };
        let summary = summarize(&[row(huge), row(huge)]);
        assert_eq!(summary.bank_only, 2);
        assert_eq!(summary.net_commission_delta, Decimal::MAX);
    }

    #[test]
    fn empty_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary, SummaryCounts::default());
        assert!(summary.is_clean());
    }
}
