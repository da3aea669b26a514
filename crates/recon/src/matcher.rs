use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use rust_decimal::Decimal;

use crate::model::CanonicalRecord;

/// Bank-side index for one join key. Each bank record can be claimed once;
/// candidates sharing a key are handed out in input order.
struct BankIndex<K> {
    buckets: HashMap<K, VecDeque<usize>>,
}

impl<K: Eq + Hash> BankIndex<K> {
    fn build<F>(bank: &[CanonicalRecord], key_fn: F) -> Self
    where
        F: Fn(&CanonicalRecord) -> Option<K>,
    {
        let mut buckets: HashMap<K, VecDeque<usize>> = HashMap::new();
        for (i, record) in bank.iter().enumerate() {
            if let Some(key) = key_fn(record) {
                buckets.entry(key).or_default().push_back(i);
            }
        }
        Self { buckets }
    }

    fn claim(&mut self, key: &K, consumed: &mut [bool]) -> Option<usize> {
        let bucket = self.buckets.get_mut(key)?;
        while let Some(i) = bucket.pop_front() {
            if !consumed[i] {
                consumed[i] = true;
                return Some(i);
            }
        }
        None
    }
}

/// Join broker records to bank records on canonical identifier.
///
/// Returns, per broker record, the index of the bank record it matched.
/// Claimed bank records are flagged in `consumed`.
pub fn match_on_identifier(
    broker: &[&CanonicalRecord],
    bank: &[CanonicalRecord],
    consumed: &mut [bool],
) -> Vec<Option<usize>> {
    let mut index = BankIndex::build(bank, |r| Some(r.canonical_id.clone()));
    broker
        .iter()
        .map(|b| index.claim(&b.canonical_id, consumed))
        .collect()
}

/// Composite identity key for endorsements. Records without a premium
/// have no key and never match.
pub fn customer_premium_key(record: &CanonicalRecord) -> Option<(String, Decimal)> {
    let premium = record.premium_amount?;
    Some((record.customer_name.clone(), premium.normalize()))
}

/// Join broker endorsements to bank records on (customer name, premium).
/// When several bank records share the key the first unclaimed one wins.
pub fn match_on_customer_premium(
    broker: &[&CanonicalRecord],
    bank: &[CanonicalRecord],
    consumed: &mut [bool],
) -> Vec<Option<usize>> {
    let mut index = BankIndex::build(bank, customer_premium_key);
    broker
        .iter()
        .map(|b| {
            customer_premium_key(b).and_then(|key| index.claim(&key, consumed))
        })
        .collect()
}
