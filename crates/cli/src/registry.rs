//! `polrec sources`, `polrec registry`, `polrec canonicalize`.

use std::path::PathBuf;

use clap::Subcommand;
use polrec_config::settings::load_registry_file;
use polrec_recon::registry::BUILTIN_TOML;
use polrec_recon::{canonicalize, SourceSchema};
use serde::Serialize;

use crate::output::print_json;
use crate::{CliError, Context};

#[derive(Subcommand)]
pub enum RegistryCommands {
    /// Parse and validate a registry file without running anything
    #[command(after_help = "\
Examples:
  polrec registry validate insurers.toml")]
    Validate {
        /// Registry TOML file
        file: PathBuf,
    },

    /// Print the registry in use
    Show,
}

#[derive(Serialize)]
struct SourceSummary<'a> {
    source_id: &'a str,
    kind: String,
    display_name: &'a str,
    rule: String,
    dedup: String,
    required_columns: Vec<&'a str>,
}

impl<'a> SourceSummary<'a> {
    fn new(schema: &'a SourceSchema) -> Self {
        Self {
            source_id: &schema.source_id,
            kind: schema.kind.to_string(),
            display_name: &schema.display_name,
            rule: schema.identifier_rule.to_string(),
            dedup: schema.dedup.to_string(),
            required_columns: schema
                .required_columns()
                .into_iter()
                .map(|spec| spec.primary())
                .collect(),
        }
    }
}

pub fn cmd_sources(ctx: &Context, json: bool) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let summaries: Vec<SourceSummary> = registry
        .sources()
        .chain(std::iter::once(registry.broker()))
        .map(SourceSummary::new)
        .collect();

    if json {
        return print_json(&summaries);
    }

    let width = summaries
        .iter()
        .map(|s| s.source_id.chars().count())
        .max()
        .unwrap_or(0);
    for s in &summaries {
        println!(
            "{:<width$}  {:<6}  {}  [{}; {}]",
            s.source_id, s.kind, s.display_name, s.rule, s.dedup
        );
    }
    Ok(())
}

pub fn cmd_registry(ctx: &Context, cmd: RegistryCommands) -> Result<(), CliError> {
    match cmd {
        RegistryCommands::Validate { file } => {
            let registry = load_registry_file(&file).map_err(CliError::config)?;
            eprintln!(
                "valid: {} source(s), broker '{}', commission tolerance {}",
                registry.sources().count(),
                registry.broker().source_id,
                registry.commission_tolerance()
            );
            Ok(())
        }
        RegistryCommands::Show => {
            let contents = match ctx.registry_path() {
                Some(path) => {
                    // reject what `run` would reject
                    ctx.registry()?;
                    std::fs::read_to_string(path).map_err(|e| {
                        CliError::io(format!("cannot read {}: {e}", path.display()))
                    })?
                }
                None => BUILTIN_TOML.to_string(),
            };
            print!("{contents}");
            Ok(())
        }
    }
}

pub fn cmd_canonicalize(
    ctx: &Context,
    source: String,
    insurer: Option<String>,
    values: Vec<String>,
) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let schema = registry.lookup(&source).map_err(CliError::recon)?;
    let rule = match (&insurer, schema.is_broker()) {
        (Some(insurer), true) => schema.rule_for_insurer(insurer),
        (Some(_), false) => {
            return Err(CliError::usage("--insurer only applies to the broker source")
                .with_hint(format!("use --source {}", registry.broker().source_id)))
        }
        (None, _) => &schema.identifier_rule,
    };

    for value in &values {
        let canonical = canonicalize(value, rule);
        if canonical.is_empty() {
            println!("{value}\t(dropped: empty canonical id)");
        } else {
            println!("{value}\t{canonical}");
        }
    }
    Ok(())
}
