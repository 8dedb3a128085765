use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::SiteColumns;
use crate::error::ConsolidateError;
use crate::table::{Cell, Table};

// ---------------------------------------------------------------------------
// Site rows
// ---------------------------------------------------------------------------

/// Known zone categories. Zone text is carried through as reported; this
/// only classifies it for the audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Rural,
    Urbana,
}

impl Zone {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RURAL" => Some(Self::Rural),
            "URBANA" => Some(Self::Urbana),
            _ => None,
        }
    }
}

/// One (site, year) row of the primary source, site attributes only.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteYearRecord {
    pub site_code: String,
    pub year: i32,
    pub establishment_id: Cell,
    pub establishment_name: Cell,
    pub site_name: Cell,
    /// As reported.
    pub zone: Cell,
    pub address: Cell,
    /// Declared municipality, canonical 5-digit form.
    pub municipality_code: Cell,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl SiteYearRecord {
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn clear_coordinates(&mut self) {
        self.latitude = None;
        self.longitude = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractOutcome {
    pub input_rows: usize,
    /// Rows without a site code, left out of every later stage.
    pub skipped_rows: usize,
    /// Rows whose zone is neither RURAL nor URBANA. Kept as reported.
    pub unrecognised_zones: usize,
}

/// Extract site rows from the (already standardised) primary source.
///
/// Rows without a site code are skipped and counted; a missing or
/// unparseable year is fatal, as is an unparseable coordinate. Zone text is
/// kept verbatim; values outside the known categories are counted.
pub fn extract_sites(
    table: &Table,
    columns: &SiteColumns,
) -> Result<(Vec<SiteYearRecord>, ExtractOutcome), ConsolidateError> {
    let site_idx = table.require(&columns.site_code)?;
    let year_idx = table.require(&columns.year)?;
    let est_idx = table.require(&columns.establishment_id)?;
    let est_name_idx = table.require(&columns.establishment_name)?;
    let name_idx = table.require(&columns.site_name)?;
    let zone_idx = table.require(&columns.zone)?;
    let address_idx = table.require(&columns.address)?;
    let mpio_idx = table.require(&columns.municipality_code)?;
    let lat_idx = table.require(&columns.latitude)?;
    let lon_idx = table.require(&columns.longitude)?;

    let mut records = Vec::with_capacity(table.len());
    let mut outcome = ExtractOutcome { input_rows: table.len(), ..Default::default() };

    for (row_idx, row) in table.rows.iter().enumerate() {
        let Some(site_code) = row[site_idx].clone() else {
            outcome.skipped_rows += 1;
            continue;
        };
        let year = parse_year(row[year_idx].as_deref()).ok_or_else(|| ConsolidateError::ValueParse {
            source: table.name.clone(),
            column: columns.year.clone(),
            row: row_idx + 1,
            value: row[year_idx].clone().unwrap_or_default(),
        })?;

        let coordinate = |idx: usize, column: &str| -> Result<Option<f64>, ConsolidateError> {
            match row[idx].as_deref() {
                None => Ok(None),
                Some(raw) => parse_coordinate(raw).map(Some).ok_or_else(|| ConsolidateError::ValueParse {
                    source: table.name.clone(),
                    column: column.to_string(),
                    row: row_idx + 1,
                    value: raw.to_string(),
                }),
            }
        };
        let latitude = coordinate(lat_idx, &columns.latitude)?;
        let longitude = coordinate(lon_idx, &columns.longitude)?;

        let zone = row[zone_idx].clone();
        if let Some(raw) = zone.as_deref().filter(|z| Zone::parse(z).is_none()) {
            outcome.unrecognised_zones += 1;
            tracing::debug!(site = %site_code, value = raw, "unrecognised zone value");
        }

        records.push(SiteYearRecord {
            site_code,
            year,
            establishment_id: row[est_idx].clone(),
            establishment_name: row[est_name_idx].clone(),
            site_name: row[name_idx].clone(),
            zone,
            address: row[address_idx].clone(),
            municipality_code: row[mpio_idx].clone(),
            latitude,
            longitude,
        });
    }

    if outcome.skipped_rows > 0 {
        tracing::warn!(source = %table.name, skipped = outcome.skipped_rows, "rows without site code skipped");
    }
    if outcome.unrecognised_zones > 0 {
        tracing::warn!(source = %table.name, rows = outcome.unrecognised_zones, "zone values outside RURAL/URBANA");
    }

    Ok((records, outcome))
}

/// Parse a reporting year; spreadsheet floats such as `2022.0` are accepted.
pub fn parse_year(raw: Option<&str>) -> Option<i32> {
    let raw = raw?.trim();
    let int = match raw.split_once('.') {
        Some((int, frac)) if frac.bytes().all(|b| b == b'0') => int,
        Some(_) => return None,
        None => raw,
    };
    int.parse().ok()
}

/// Parse a decimal-degree coordinate; a decimal comma is accepted.
/// Non-finite values do not parse.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let value: f64 = if raw.contains(',') && !raw.contains('.') {
        raw.replacen(',', ".", 1).parse().ok()?
    } else {
        raw.parse().ok()?
    };
    value.is_finite().then_some(value)
}

// ---------------------------------------------------------------------------
// Reference entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Establishment {
    pub establishment_id: String,
    pub name: Cell,
    pub municipality_code: Cell,
}

/// Unique establishments of the primary source, first occurrence per id wins.
///
/// Taken from the raw rows (before identity homogenisation), in source order.
pub fn extract_establishments(records: &[SiteYearRecord]) -> BTreeMap<String, Establishment> {
    let mut establishments = BTreeMap::new();
    for record in records {
        let Some(ref id) = record.establishment_id else {
            continue;
        };
        establishments.entry(id.clone()).or_insert_with(|| Establishment {
            establishment_id: id.clone(),
            name: record.establishment_name.clone(),
            municipality_code: record.municipality_code.clone(),
        });
    }
    establishments
}

// ---------------------------------------------------------------------------
// Output identity
// ---------------------------------------------------------------------------

/// Unit of identity of the master table: one row per (site, reporting year).
///
/// `year` is `None` only for a site with no primary-source rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PanelKey {
    pub site_code: String,
    pub year: Option<i32>,
}

impl PanelKey {
    pub fn new(site_code: impl Into<String>, year: Option<i32>) -> Self {
        Self { site_code: site_code.into(), year }
    }
}
