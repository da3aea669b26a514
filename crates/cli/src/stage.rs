//! `polrec stage`: the multi-step upload workflow. Normalized records are
//! persisted between invocations in the session file.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use polrec_config::StagedSession;
use polrec_recon::{normalize, run_normalized};

use crate::exit_codes::EXIT_DIFFS;
use crate::output::{print_json, print_stats};
use crate::run::{finish, load_broker, load_upload};
use crate::{CliError, Context};

#[derive(Subcommand)]
pub enum StageCommands {
    /// Normalize a bank statement and add it to the session
    #[command(after_help = "\
Examples:
  polrec stage add --source HDFC hdfc-april.xlsx
  polrec stage add --source HDFC hdfc-may.xlsx")]
    Add {
        /// Registered source id
        #[arg(long)]
        source: String,

        /// Statement file
        file: PathBuf,
    },

    /// List staged uploads
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop every staged upload of one source
    Remove {
        /// Registered source id
        #[arg(long)]
        source: String,
    },

    /// Discard the session
    Clear,

    /// Reconcile everything staged against a broker export
    #[command(after_help = "\
Examples:
  polrec stage reconcile --broker broker.xlsx -o result.xlsx
  polrec stage reconcile --broker broker.xlsx --json --keep")]
    Reconcile {
        /// Broker export
        #[arg(long, value_name = "FILE")]
        broker: PathBuf,

        /// Write results (.xlsx, .csv or .json)
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print the full result as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Exit 1 when any row is one-sided or outside tolerance
        #[arg(long)]
        fail_on_diff: bool,

        /// Keep the session after reconciling
        #[arg(long)]
        keep: bool,
    },
}

pub fn cmd_stage(ctx: &Context, cmd: StageCommands) -> Result<(), CliError> {
    let path = StagedSession::path();
    match cmd {
        StageCommands::Add { source, file } => cmd_stage_add(ctx, &path, source, file),
        StageCommands::List { json } => cmd_stage_list(&path, json),
        StageCommands::Remove { source } => cmd_stage_remove(&path, source),
        StageCommands::Clear => {
            let existed = StagedSession::clear_at(&path).map_err(CliError::config)?;
            eprintln!(
                "{}",
                if existed { "session cleared" } else { "no staged session" }
            );
            Ok(())
        }
        StageCommands::Reconcile { broker, output, json, fail_on_diff, keep } => {
            cmd_stage_reconcile(ctx, &path, broker, output, json, fail_on_diff, keep)
        }
    }
}

fn load_session(path: &Path) -> Result<StagedSession, CliError> {
    StagedSession::load_from(path)
        .map_err(CliError::config)
        .map_err(|e| e.with_hint("run `polrec stage clear` to start over"))
}

fn cmd_stage_add(ctx: &Context, path: &Path, source: String, file: PathBuf) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let upload = load_upload(ctx, &registry, &source, &file)?;
    let schema = registry.lookup_bank(&upload.source_id).map_err(CliError::recon)?;
    let normalized = normalize(&upload.table, schema).map_err(CliError::recon)?;
    print_stats(&normalized.stats);

    let mut session = load_session(path)?;
    session.stage(&schema.source_id, &file, normalized);
    session.save_to(path).map_err(CliError::config)?;
    eprintln!(
        "staged {} upload(s), {} record(s)",
        session.uploads.len(),
        session.record_count()
    );
    Ok(())
}

fn cmd_stage_list(path: &Path, json: bool) -> Result<(), CliError> {
    let session = load_session(path)?;
    if json {
        return print_json(&session.uploads);
    }
    if session.is_empty() {
        eprintln!("no staged uploads");
        return Ok(());
    }
    for upload in &session.uploads {
        println!(
            "{}\t{}\t{} records\t{}",
            upload.source_id,
            upload.file.display(),
            upload.records.len(),
            upload.staged_at
        );
    }
    Ok(())
}

fn cmd_stage_remove(path: &Path, source: String) -> Result<(), CliError> {
    let mut session = load_session(path)?;
    let removed = session.unstage(&source);
    if removed == 0 {
        return Err(CliError::usage(format!("nothing staged for source '{source}'"))
            .with_hint("see `polrec stage list`"));
    }
    session.save_to(path).map_err(CliError::config)?;
    eprintln!("removed {removed} upload(s) for {source}");
    Ok(())
}

fn cmd_stage_reconcile(
    ctx: &Context,
    path: &Path,
    broker: PathBuf,
    output: Option<PathBuf>,
    json: bool,
    fail_on_diff: bool,
    keep: bool,
) -> Result<(), CliError> {
    let session = load_session(path)?;
    if session.is_empty() {
        return Err(CliError::usage("no staged uploads to reconcile")
            .with_hint("stage statements first with `polrec stage add --source ID FILE`"));
    }

    let registry = ctx.registry()?;
    let broker = load_broker(ctx, &registry, &broker)?;
    let result = run_normalized(&registry, session.to_batch(), broker);
    let outcome = finish(ctx, &result, output, json, fail_on_diff);

    // a failed write keeps the session for a retry
    let completed = match &outcome {
        Ok(()) => true,
        Err(e) => e.code == EXIT_DIFFS,
    };
    if completed && !keep {
        StagedSession::clear_at(path).map_err(CliError::config)?;
    }
    outcome
}
