//! Administrative (DANE-style) code standardisation.
//!
//! Codes are compared as fixed-width text, never as numbers: department
//! codes are 2 characters, municipality codes 5, left-padded with `0`.
//! Over-wide values are rejected, never truncated.

use crate::error::ConsolidateError;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Department,
    Municipality,
}

impl CodeKind {
    pub fn width(self) -> usize {
        match self {
            Self::Department => 2,
            Self::Municipality => 5,
        }
    }
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Department => write!(f, "department"),
            Self::Municipality => write!(f, "municipality"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeDefect {
    TooWide,
    NotNumeric,
}

/// Canonical fixed-width text for a raw code.
///
/// A zero fraction (`5001.0`, left behind by spreadsheet exports) is
/// accepted and dropped. Already-canonical values pass through unchanged.
pub fn canonical_code(raw: &str, kind: CodeKind) -> Result<String, CodeDefect> {
    let trimmed = raw.trim();
    let digits = match trimmed.split_once('.') {
        Some((int, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => int,
        Some(_) => return Err(CodeDefect::NotNumeric),
        None => trimmed,
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodeDefect::NotNumeric);
    }

    let width = kind.width();
    if digits.len() > width {
        return Err(CodeDefect::TooWide);
    }

    Ok(format!("{digits:0>width$}"))
}

/// Map a [`CodeDefect`] to the fatal error for a given location.
pub fn defect_error(
    defect: CodeDefect,
    kind: CodeKind,
    source: &str,
    column: &str,
    row: usize,
    value: &str,
) -> ConsolidateError {
    match defect {
        CodeDefect::TooWide => ConsolidateError::CodeTooWide {
            source: source.to_string(),
            column: column.to_string(),
            row,
            value: value.to_string(),
            width: kind.width(),
        },
        CodeDefect::NotNumeric => ConsolidateError::CodeNotNumeric {
            source: source.to_string(),
            column: column.to_string(),
            row,
            value: value.to_string(),
        },
    }
}

/// Rewrite one column of a table to canonical codes, in place.
///
/// Null cells stay null. Row count never changes. Returns how many cells
/// were rewritten (zero on a second application). Row numbers in errors are
/// 1-based data rows, header excluded.
pub fn standardize_column(
    table: &mut Table,
    column: &str,
    kind: CodeKind,
) -> Result<usize, ConsolidateError> {
    let idx = table.require(column)?;
    let mut rewritten = 0;

    for (row_idx, row) in table.rows.iter_mut().enumerate() {
        let Some(value) = row[idx].as_deref() else {
            continue;
        };
        let canonical = canonical_code(value, kind)
            .map_err(|d| defect_error(d, kind, &table.name, column, row_idx + 1, value))?;
        if canonical != value {
            row[idx] = Some(canonical);
            rewritten += 1;
        }
    }

    Ok(rewritten)
}
