//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: batch jobs branch on them.
//!
//! # Exit Codes
//!
//! | Code | Domain      | Description                                        |
//! |------|-------------|----------------------------------------------------|
//! | 0    | Universal   | Success                                            |
//! | 1    | Universal   | General error (unspecified)                        |
//! | 2    | Universal   | CLI usage error (bad args)                         |
//! | 3    | config      | Config file unreadable, unparseable or invalid     |
//! | 4    | schema      | Missing column, attribute or unsupported CRS       |
//! | 5    | values      | Malformed administrative code, year or coordinate  |
//! | 6    | reference   | Duplicate key in a reference table                 |
//! | 7    | io          | Input unreadable or output unwritable              |
//! | 8    | integrity   | Duplicate panel key or output column after merge   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant below
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Map the error variant in `consolidate_exit_code`

use sedes_consolidate::ConsolidateError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Consolidation (3-8)
// =============================================================================

/// Config file could not be read, parsed or validated.
pub const EXIT_CONFIG: u8 = 3;

/// A source lacks a configured column, a layer lacks a configured
/// attribute, or a layer is in a reference frame we cannot reproject.
/// Also returned by `validate` when it finds any defect.
pub const EXIT_SCHEMA: u8 = 4;

/// A code is too wide or non-numeric, or a year/coordinate cell
/// cannot be parsed.
pub const EXIT_VALUE_FORMAT: u8 = 5;

/// A municipality or department layer repeats a code.
pub const EXIT_REFERENCE_DUPLICATE: u8 = 6;

/// An input file could not be read or an output could not be written.
pub const EXIT_IO: u8 = 7;

/// The merged table repeats a (site, year) key or a column name.
pub const EXIT_INTEGRITY: u8 = 8;

// =============================================================================
// Consolidation Error Types
// =============================================================================

/// Map a ConsolidateError to its exit code.
pub fn consolidate_exit_code(err: &ConsolidateError) -> u8 {
    match err {
        ConsolidateError::ConfigParse(_) | ConsolidateError::ConfigValidation(_) => EXIT_CONFIG,
        ConsolidateError::MissingColumn { .. }
        | ConsolidateError::MissingAttribute { .. }
        | ConsolidateError::UnsupportedCrs { .. } => EXIT_SCHEMA,
        ConsolidateError::CodeTooWide { .. }
        | ConsolidateError::CodeNotNumeric { .. }
        | ConsolidateError::ValueParse { .. } => EXIT_VALUE_FORMAT,
        ConsolidateError::DuplicateReferenceKey { .. } => EXIT_REFERENCE_DUPLICATE,
        ConsolidateError::Io(_) => EXIT_IO,
        ConsolidateError::DuplicatePanelKey { .. } | ConsolidateError::DuplicateColumn(_) => EXIT_INTEGRITY,
    }
}

/// Stable machine-readable name of an error variant.
pub fn error_kind(err: &ConsolidateError) -> &'static str {
    match err {
        ConsolidateError::ConfigParse(_) => "config_parse",
        ConsolidateError::ConfigValidation(_) => "config_validation",
        ConsolidateError::MissingColumn { .. } => "missing_column",
        ConsolidateError::MissingAttribute { .. } => "missing_attribute",
        ConsolidateError::CodeTooWide { .. } => "code_too_wide",
        ConsolidateError::CodeNotNumeric { .. } => "code_not_numeric",
        ConsolidateError::DuplicateReferenceKey { .. } => "duplicate_reference_key",
        ConsolidateError::ValueParse { .. } => "value_parse",
        ConsolidateError::UnsupportedCrs { .. } => "unsupported_crs",
        ConsolidateError::DuplicatePanelKey { .. } => "duplicate_panel_key",
        ConsolidateError::DuplicateColumn(_) => "duplicate_column",
        ConsolidateError::Io(_) => "io_error",
    }
}

/// Structured error output for `--json` runs.
/// Designed for both human-readable and machine-parseable output.
#[derive(Debug, serde::Serialize)]
pub struct ConsolidateErrorOutput {
    pub error: String,
    pub message: String,
    pub exit_code: u8,
}

impl ConsolidateErrorOutput {
    pub fn from_consolidate_error(err: &ConsolidateError) -> Self {
        Self {
            error: error_kind(err).to_string(),
            message: err.to_string(),
            exit_code: consolidate_exit_code(err),
        }
    }
}
