//! `sedes run` / `sedes validate`: config-driven consolidation.

use std::path::{Path, PathBuf};

use sedes_consolidate::{ConsolidateConfig, ConsolidateError, ConsolidationResult};
use sedes_io::load::resolve;
use sedes_io::report::write_report;
use sedes_io::{check_inputs, load_inputs, write_outputs, OutputRecord, RunReport};

use crate::exit_codes::{ConsolidateErrorOutput, EXIT_CONFIG, EXIT_SCHEMA};
use crate::CliError;

fn cli_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

/// Parse errors stay `ConsolidateError` so `run --json` can report them structured.
fn load_config(config_path: &Path) -> Result<ConsolidateConfig, Failure> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        Failure::Cli(cli_err(EXIT_CONFIG, format!("cannot read config {}: {e}", config_path.display())))
    })?;
    Ok(ConsolidateConfig::from_toml(&config_str)?)
}

/// Input and output paths resolve against the config file's directory.
fn base_dir(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or_else(|| Path::new("."))
}

pub fn cmd_run(config_path: PathBuf, output: Option<PathBuf>, json_output: bool, quiet: bool) -> Result<(), CliError> {
    let outcome = run_pipeline(&config_path, output.as_deref(), json_output);
    match outcome {
        Err(Failure::Consolidate(err)) if json_output => {
            let structured = ConsolidateErrorOutput::from_consolidate_error(&err);
            if let Ok(line) = serde_json::to_string(&structured) {
                eprintln!("{line}");
            }
            // Already reported as JSON
            Err(cli_err(structured.exit_code, ""))
        }
        Err(failure) => Err(failure.into()),
        Ok((result, outputs)) => {
            if !quiet {
                print_summary(&result, &outputs);
            }
            Ok(())
        }
    }
}

#[derive(Debug)]
enum Failure {
    Consolidate(ConsolidateError),
    Cli(CliError),
}

impl From<ConsolidateError> for Failure {
    fn from(err: ConsolidateError) -> Self {
        Failure::Consolidate(err)
    }
}

impl From<Failure> for CliError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Consolidate(err) => CliError::consolidate(err),
            Failure::Cli(err) => err,
        }
    }
}

fn run_pipeline(
    config_path: &Path,
    output: Option<&Path>,
    json_output: bool,
) -> Result<(ConsolidationResult, Vec<OutputRecord>), Failure> {
    let config = load_config(config_path)?;
    let base = base_dir(config_path);

    tracing::info!(config = %config_path.display(), name = %config.name, "consolidation started");

    let (inputs, fingerprints) = load_inputs(&config, base)?;
    let result = sedes_consolidate::run(&config, inputs)?;
    let outputs = write_outputs(&result, &config, base, output)?;

    let report = RunReport { result: &result, inputs: &fingerprints, outputs: &outputs };

    if let Some(ref report_file) = config.output.report {
        let path = resolve(base, report_file);
        write_report(&report, &path)
            .map_err(|e| Failure::Cli(CliError::io(format!("cannot write report {}: {e}", path.display()))))?;
        tracing::info!(path = %path.display(), "run report written");
    }

    if json_output {
        let json_str = serde_json::to_string_pretty(&report)
            .map_err(|e| Failure::Cli(CliError::io(format!("JSON serialization error: {e}"))))?;
        println!("{json_str}");
    }

    Ok((result, outputs))
}

/// Human summary to stderr.
fn print_summary(result: &ConsolidationResult, outputs: &[OutputRecord]) {
    let s = &result.summary;
    let audit = &result.audit;
    eprintln!(
        "{}: {} rows, {} sites, {} establishments, {} municipalities, {} departments",
        result.meta.config_name,
        s.total_rows,
        s.unique_sites,
        s.unique_establishments,
        s.unique_municipalities,
        s.unique_departments,
    );
    eprintln!(
        "coordinates: {} outside declared municipality, {} imputed, {} without coordinates",
        audit.validation.outside_municipality, audit.imputation.imputed, audit.imputation.unimputable,
    );
    if !s.year_distribution.is_empty() {
        let years: Vec<String> = s.year_distribution.iter().map(|(y, n)| format!("{y}={n}")).collect();
        eprintln!("years: {}", years.join(", "));
    }
    for out in outputs {
        eprintln!("wrote {} ({} rows)", out.path, out.rows);
    }
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let defects = check_inputs(&config, base_dir(&config_path))?;

    if defects.is_empty() {
        eprintln!("{}: config and inputs OK", config.name);
        return Ok(());
    }

    for defect in &defects {
        eprintln!("defect: {defect}");
    }
    let noun = if defects.len() == 1 { "defect" } else { "defects" };
    Err(cli_err(EXIT_SCHEMA, format!("{} schema {noun} found", defects.len()))
        .with_hint("fix the column and attribute names in the config, then rerun validate"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_dir_of_bare_file_name() {
        assert_eq!(base_dir(Path::new("sedes.toml")), Path::new(""));
        assert_eq!(base_dir(Path::new("runs/2024/sedes.toml")), Path::new("runs/2024"));
    }

    #[test]
    fn test_unreadable_config_is_config_error() {
        let err = load_config(Path::new("/nonexistent/sedes.toml")).unwrap_err();
        let Failure::Cli(err) = err else { panic!("expected a CLI failure, got {err:?}") };
        assert_eq!(err.code, EXIT_CONFIG);
        assert!(err.message.contains("cannot read config"));
    }

    #[test]
    fn test_run_reads_config_through_load_config() {
        let failure = run_pipeline(Path::new("/nonexistent/sedes.toml"), None, false).unwrap_err();
        let err = CliError::from(failure);
        assert_eq!(err.code, EXIT_CONFIG);
        assert!(err.message.contains("cannot read config /nonexistent/sedes.toml"));
    }

    #[test]
    fn test_malformed_config_stays_structured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sedes.toml");
        std::fs::write(&path, "name = \n").unwrap();
        let failure = load_config(&path).unwrap_err();
        let Failure::Consolidate(err) = failure else { panic!("expected a parse failure, got {failure:?}") };
        assert_eq!(ConsolidateErrorOutput::from_consolidate_error(&err).exit_code, EXIT_CONFIG);
    }
}
