//! Human-readable summaries (stderr) and JSON (stdout).

use std::io::Write;

use polrec_recon::{NormalizeStats, ReconResult};
use serde::Serialize;

use crate::CliError;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}").map_err(|e| CliError::io(e.to_string()))
}

pub fn print_stats(stats: &NormalizeStats) {
    eprintln!(
        "{}: {} rows read, {} kept, {} dropped (blank id {}, empty canonical id {}), {} merged, {} unparsed commission",
        stats.source_id,
        stats.input_rows,
        stats.retained,
        stats.blank_identifier + stats.empty_canonical_id,
        stats.blank_identifier,
        stats.empty_canonical_id,
        stats.duplicates_merged,
        stats.unparsed_commission,
    );
}

pub fn print_summary(result: &ReconResult) {
    for stats in &result.sources {
        print_stats(stats);
    }
    print_stats(&result.broker);
    for failure in &result.failures {
        eprintln!("skipped {}: {}", failure.source_id, failure.error);
    }

    let s = &result.summary;
    eprintln!(
        "reconciled {} rows: {} matched, {} not found in broker, {} not found in bank",
        s.total, s.matched, s.bank_only, s.broker_only,
    );
    eprintln!(
        "commission: {} mismatch(es) beyond tolerance {}, net delta {}",
        s.commission_mismatches, result.meta.commission_tolerance, s.net_commission_delta,
    );
    if result.excluded_broker_records > 0 {
        eprintln!(
            "excluded {} broker record(s) for insurers without a bank upload",
            result.excluded_broker_records
        );
    }

    if result.by_insurer.len() > 1 {
        let width = result
            .by_insurer
            .keys()
            .map(|k| k.chars().count())
            .max()
            .unwrap_or(0);
        for (insurer, counts) in &result.by_insurer {
            eprintln!(
                "  {insurer:<width$}  {:>5} rows  {:>5} matched  {:>5} bank-only  {:>5} broker-only  delta {}",
                counts.total,
                counts.matched,
                counts.bank_only,
                counts.broker_only,
                counts.net_commission_delta,
            );
        }
    }
}
