//! `polrec run` and `polrec normalize`.

use std::path::{Path, PathBuf};

use polrec_recon::{
    normalize, normalize_sources, run_normalized, Normalized, ReconResult, SourceRegistry,
    SourceUpload,
};

use crate::exit_codes::EXIT_SCHEMA_MISMATCH;
use crate::output::{print_json, print_stats, print_summary};
use crate::{BankArg, CliError, Context};

/// Read a statement for a registered bank source.
pub fn load_upload(
    ctx: &Context,
    registry: &SourceRegistry,
    source_id: &str,
    file: &Path,
) -> Result<SourceUpload, CliError> {
    let schema = registry.lookup_bank(source_id).map_err(CliError::recon)?;
    let table = polrec_io::load_table(file, schema, ctx.sheet()).map_err(CliError::file)?;
    Ok(SourceUpload::new(schema.source_id.clone(), table))
}

/// Read and normalize the broker export. Any failure here is fatal.
pub fn load_broker(
    ctx: &Context,
    registry: &SourceRegistry,
    file: &Path,
) -> Result<Normalized, CliError> {
    let schema = registry.broker();
    let table = polrec_io::load_table(file, schema, ctx.sheet()).map_err(CliError::file)?;
    normalize(&table, schema).map_err(CliError::recon)
}

/// Write, print and gate a finished run.
pub fn finish(
    ctx: &Context,
    result: &ReconResult,
    output: Option<PathBuf>,
    json: bool,
    fail_on_diff: bool,
) -> Result<(), CliError> {
    if let Some(requested) = output {
        let path = ctx.output_path(&requested);
        polrec_io::write_result(result, &path).map_err(CliError::file)?;
        eprintln!("wrote {}", path.display());
    }

    if json {
        print_json(result)?;
    }
    print_summary(result);

    if fail_on_diff && !result.summary.is_clean() {
        return Err(CliError::diffs());
    }
    Ok(())
}

pub fn cmd_run(
    ctx: &Context,
    bank: Vec<BankArg>,
    broker: PathBuf,
    output: Option<PathBuf>,
    json: bool,
    fail_on_diff: bool,
) -> Result<(), CliError> {
    let registry = ctx.registry()?;

    let uploads = bank
        .iter()
        .map(|arg| load_upload(ctx, &registry, &arg.source_id, &arg.file))
        .collect::<Result<Vec<_>, _>>()?;

    let batch = normalize_sources(&registry, &uploads);
    if batch.stats.is_empty() && !batch.failures.is_empty() {
        let detail: Vec<String> = batch
            .failures
            .iter()
            .map(|f| f.error.clone())
            .collect();
        return Err(CliError {
            code: EXIT_SCHEMA_MISMATCH,
            message: format!("no bank statement could be normalized: {}", detail.join("; ")),
            hint: None,
        });
    }

    let broker = load_broker(ctx, &registry, &broker)?;
    let result = run_normalized(&registry, batch, broker);
    finish(ctx, &result, output, json, fail_on_diff)
}

pub fn cmd_normalize(
    ctx: &Context,
    source: String,
    file: PathBuf,
    output: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let upload = load_upload(ctx, &registry, &source, &file)?;
    let schema = registry.lookup_bank(&upload.source_id).map_err(CliError::recon)?;
    let mut normalized = normalize(&upload.table, schema).map_err(CliError::recon)?;
    for record in &mut normalized.records {
        record.display_name = Some(schema.display_name.clone());
    }

    if let Some(requested) = output {
        let path = ctx.output_path(&requested);
        polrec_io::write_records(&normalized.records, &path).map_err(CliError::file)?;
        eprintln!("wrote {}", path.display());
    }
    if json {
        print_json(&normalized.records)?;
    }
    print_stats(&normalized.stats);
    Ok(())
}
