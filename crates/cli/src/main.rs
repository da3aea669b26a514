// polrec: reconcile insurer commission statements against a broker export

mod exit_codes;
mod output;
mod registry;
mod run;
mod stage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use polrec_config::{ConfigError, Settings};
use polrec_io::IoError;
use polrec_recon::{ReconError, SourceRegistry};

use exit_codes::*;
use registry::RegistryCommands;
use stage::StageCommands;

#[derive(Parser)]
#[command(name = "polrec")]
#[command(about = "Reconcile insurer commission statements against a broker export")]
#[command(version)]
#[command(long_version = long_version())]
struct Cli {
    /// Source registry TOML (default: settings file, then the built-in registry)
    #[arg(long, global = true, value_name = "FILE")]
    registry: Option<PathBuf>,

    /// Worksheet to read from Excel inputs (default: first sheet)
    #[arg(long, global = true)]
    sheet: Option<String>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize bank statements and a broker export, then reconcile them
    #[command(after_help = "\
Examples:
  polrec run --bank HDFC=hdfc.xlsx --bank ICICI=icici.csv --broker broker.xlsx
  polrec run --bank GO-DIGIT=digit.xlsx --broker broker.xlsx -o result.xlsx
  polrec run --bank SBI=sbi.csv --broker broker.csv --json --fail-on-diff")]
    Run {
        /// Bank statement for a source, as SOURCE_ID=FILE (repeatable)
        #[arg(long = "bank", value_name = "ID=FILE", required = true, value_parser = parse_bank_arg)]
        bank: Vec<BankArg>,

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
    },

    /// Normalize one bank statement into canonical records
    #[command(after_help = "\
Examples:
  polrec normalize --source TATA-AIG tata.xlsx
  polrec normalize --source HDFC hdfc.xlsx -o hdfc.canonical.csv")]
    Normalize {
        /// Registered source id
        #[arg(long)]
        source: String,

        /// Statement file
        file: PathBuf,

        /// Write canonical records (.xlsx or .csv)
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print records as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Stage uploads one at a time, then reconcile them together
    #[command(subcommand)]
    Stage(StageCommands),

    /// List registered sources
    Sources {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or validate a source registry
    #[command(subcommand)]
    Registry(RegistryCommands),

    /// Show the canonical identifier of raw values under a source's rule
    #[command(after_help = "\
Examples:
  polrec canonicalize --source GO-DIGIT 'D123456789/01'
  polrec canonicalize --source BROKER 12345 --insurer 'TATA AIG GENERAL INSURANCE COMPANY LIMITED'")]
    Canonicalize {
        /// Registered source id (or the broker id)
        #[arg(long)]
        source: String,

        /// For the broker: the insurer whose rule applies
        #[arg(long)]
        insurer: Option<String>,

        /// Raw identifier values
        #[arg(required = true)]
        values: Vec<String>,
    },
}

/// One `--bank ID=FILE` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankArg {
    pub source_id: String,
    pub file: PathBuf,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("POLREC_GIT_HASH"), ")",
        "\nengine:  polrec-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("POLREC_TARGET"),
    )
}

fn parse_bank_arg(raw: &str) -> Result<BankArg, String> {
    let (id, file) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SOURCE_ID=FILE, got '{raw}'"))?;
    let (id, file) = (id.trim(), file.trim());
    if id.is_empty() || file.is_empty() {
        return Err(format!("expected SOURCE_ID=FILE, got '{raw}'"));
    }
    Ok(BankArg {
        source_id: id.to_string(),
        file: PathBuf::from(file),
    })
}

// ============================================================================
// Shared state
// ============================================================================

/// Settings plus the global flags that override them.
pub struct Context {
    pub settings: Settings,
    registry_override: Option<PathBuf>,
    sheet: Option<String>,
}

impl Context {
    pub fn registry(&self) -> Result<SourceRegistry, CliError> {
        self.settings
            .load_registry(self.registry_override.as_deref())
            .map_err(CliError::config)
    }

    /// Path of the registry in use, `None` for the built-in one.
    pub fn registry_path(&self) -> Option<&Path> {
        self.registry_override
            .as_deref()
            .or(self.settings.registry.as_deref())
    }

    pub fn sheet(&self) -> Option<&str> {
        self.sheet.as_deref().or(self.settings.sheet.as_deref())
    }

    pub fn output_path(&self, requested: &Path) -> PathBuf {
        self.settings.output_path(requested)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Differences found under `--fail-on-diff`. The summary was already
    /// printed, so the message stays empty.
    pub fn diffs() -> Self {
        Self { code: EXIT_DIFFS, message: String::new(), hint: None }
    }

    pub fn recon(err: ReconError) -> Self {
        let (code, hint) = match &err {
            ReconError::UnknownSource { .. } => (
                EXIT_UNKNOWN_SOURCE,
                Some("run `polrec sources` to list registered source ids".to_string()),
            ),
            ReconError::SchemaMismatch { .. } => (
                EXIT_SCHEMA_MISMATCH,
                Some("check the header row, or the source's layout.header_row in the registry".to_string()),
            ),
            ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => {
                (EXIT_INVALID_REGISTRY, None)
            }
        };
        Self { code, message: err.to_string(), hint }
    }

    pub fn file(err: IoError) -> Self {
        let hint = match &err {
            IoError::SheetNotFound { .. } => Some("pick a sheet with --sheet".to_string()),
            _ => None,
        };
        Self { code: EXIT_IO, message: err.to_string(), hint }
    }

    pub fn config(err: ConfigError) -> Self {
        let code = match &err {
            ConfigError::Registry { .. } => EXIT_INVALID_REGISTRY,
            _ => EXIT_IO,
        };
        Self { code, message: err.to_string(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Logging
// ============================================================================

/// `RUST_LOG` wins, then `-v`, then the settings file, then `warn`.
fn init_logging(verbose: bool, settings_level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let fallback = if verbose {
        "debug"
    } else {
        settings_level.unwrap_or("warn")
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = Settings::try_load();
    init_logging(
        cli.verbose,
        loaded.as_ref().ok().and_then(|s| s.log_level.as_deref()),
    );
    let settings = loaded.unwrap_or_else(|e| {
        log::warn!("{}; using default settings", e);
        Settings::default()
    });

    let ctx = Context {
        settings,
        registry_override: cli.registry,
        sheet: cli.sheet,
    };

    let result = match cli.command {
        Commands::Run { bank, broker, output, json, fail_on_diff } => {
            run::cmd_run(&ctx, bank, broker, output, json, fail_on_diff)
        }
        Commands::Normalize { source, file, output, json } => {
            run::cmd_normalize(&ctx, source, file, output, json)
        }
        Commands::Stage(cmd) => stage::cmd_stage(&ctx, cmd),
        Commands::Sources { json } => registry::cmd_sources(&ctx, json),
        Commands::Registry(cmd) => registry::cmd_registry(&ctx, cmd),
        Commands::Canonicalize { source, insurer, values } => {
            registry::cmd_canonicalize(&ctx, source, insurer, values)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}
