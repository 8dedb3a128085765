// sedes CLI - consolidated school-site table from ISED, connectivity and rector sources

mod consolidate;
mod exit_codes;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use sedes_consolidate::ConsolidateError;

use exit_codes::{consolidate_exit_code, EXIT_IO, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "sedes")]
#[command(about = "Consolidate school-site records into one spatially validated panel")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Emit log events as JSON lines on stderr
    #[arg(long, global = true, env = "SEDES_LOG_JSON")]
    log_json: bool,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a consolidation from a TOML config file
    #[command(after_help = "\
Examples:
  sedes run sedes.toml
  sedes run sedes.toml --json > report.json
  sedes run sedes.toml --output out/sedes_2024.csv
  sedes run sedes.toml --output out/sedes.geojson")]
    Run {
        /// Path to the run config (.toml)
        config: PathBuf,

        /// Write the master table here instead of the configured output file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print the run report as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Check config, headers and layer attributes without running
    #[command(after_help = "\
Examples:
  sedes validate sedes.toml")]
    Validate {
        /// Path to the run config (.toml)
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  sedes-consolidate ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  sedes-consolidate ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json, cli.quiet);

    let result = match cli.command {
        Commands::Run { config, output, json } => consolidate::cmd_run(config, output, json, cli.quiet),
        Commands::Validate { config } => consolidate::cmd_validate(config),
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

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Create error from a consolidation error with proper exit code.
    pub fn consolidate(err: ConsolidateError) -> Self {
        let code = consolidate_exit_code(&err);
        let hint = match &err {
            ConsolidateError::MissingColumn { source, .. } => {
                Some(format!("check the column names configured for '{source}'"))
            }
            ConsolidateError::MissingAttribute { attribute, .. } => {
                Some(format!("set the layer's attribute names in the config (looked for '{attribute}')"))
            }
            ConsolidateError::UnsupportedCrs { .. } => {
                Some("reproject the layer to EPSG:4326 or EPSG:3857 before the run".to_string())
            }
            ConsolidateError::CodeTooWide { .. } | ConsolidateError::CodeNotNumeric { .. } => {
                Some("municipality codes are 5 digits, department codes 2".to_string())
            }
            ConsolidateError::DuplicateColumn(_) => {
                Some("give each source a distinct prefix or drop the clashing column".to_string())
            }
            ConsolidateError::DuplicatePanelKey { .. } => {
                Some("a source repeats (site, year); check its site and year columns".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ConsolidateError> for CliError {
    fn from(err: ConsolidateError) -> Self {
        Self::consolidate(err)
    }
}
