use rust_decimal::Decimal;

use crate::model::{CanonicalRecord, DifferenceFlag, MatchBasis, MatchStatus, ReconciledRow};

/// Build one reconciled row from whichever sides contributed.
///
/// The delta is bank minus broker with an absent side counting as zero, so
/// bank-only rows carry `+bank` and broker-only rows `-broker`. Returns
/// `None` when neither side is present.
pub fn classify(
    bank: Option<CanonicalRecord>,
    broker: Option<CanonicalRecord>,
    basis: Option<MatchBasis>,
    tolerance: Decimal,
) -> Option<ReconciledRow> {
    let match_status = MatchStatus::from_sides(bank.is_some(), broker.is_some())?;
    let commission = |r: &Option<CanonicalRecord>| {
        r.as_ref().map(|r| r.total_commission).unwrap_or(Decimal::ZERO)
    };
    let commission_delta = commission(&bank) - commission(&broker);

    Some(ReconciledRow {
        bank,
        broker,
        match_status,
        match_basis: basis,
        commission_delta,
        difference: DifferenceFlag::from_delta(commission_delta, tolerance),
    })
}
