use crate::model::CanonicalRecord;
use crate::registry::SourceRegistry;

/// Union per-source record sets into the bank-side table.
///
/// Each record is tagged with its source id and the broker-facing display
/// name of that source. Order within a source is preserved; nothing is
/// deduplicated across sources.
pub fn aggregate<I>(registry: &SourceRegistry, records_by_source: I) -> Vec<CanonicalRecord>
where
    I: IntoIterator<Item = (String, Vec<CanonicalRecord>)>,
{
    let mut out = Vec::new();
    for (source_id, records) in records_by_source {
        let display_name = registry.map_display_name(&source_id);
        out.extend(records.into_iter().map(|mut record| {
            record.source = source_id.clone();
            record.display_name = Some(display_name.clone());
            record
        }));
    }
    out
}
