//! Output assembly: column order, panel-key integrity, run summary and the
//! sink seam persistence goes through.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::consolidate::ConsolidatedSite;
use crate::error::ConsolidateError;
use crate::indicators::Panel;
use crate::model::PanelKey;
use crate::table::Cell;

/// Identity and geography columns, leftmost in every output.
pub const IDENTITY_COLUMNS: [&str; 14] = [
    "site_code",
    "site_name",
    "establishment_id",
    "establishment_name",
    "reporting_year",
    "zone",
    "address",
    "latitude",
    "longitude",
    "declared_municipality_code",
    "municipality_code",
    "municipality_name",
    "department_code",
    "department_name",
];

// ---------------------------------------------------------------------------
// Master table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterRow {
    pub key: PanelKey,
    pub cells: Vec<Cell>,
}

/// Final output: identity columns, then indicator columns in source order.
/// Column names and row keys are unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterTable {
    pub columns: Vec<String>,
    pub rows: Vec<MasterRow>,
}

impl MasterTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn get<'a>(&self, row: &'a MasterRow, column: &str) -> Option<&'a str> {
        self.position(column).and_then(|i| row.cells.get(i)).and_then(|c| c.as_deref())
    }

    /// `(longitude, latitude)` of a row, when both are present.
    pub fn coordinates(&self, row: &MasterRow) -> Option<(f64, f64)> {
        let lon = self.get(row, "longitude")?.parse().ok()?;
        let lat = self.get(row, "latitude")?.parse().ok()?;
        Some((lon, lat))
    }
}

fn render_coordinate(value: Option<f64>) -> Cell {
    value.map(|v| v.to_string())
}

fn identity_cells(site: &ConsolidatedSite, year: Option<i32>) -> Vec<Cell> {
    vec![
        Some(site.site_code.clone()),
        site.site_name.clone(),
        site.establishment_id.clone(),
        site.establishment_name.clone(),
        year.map(|y| y.to_string()),
        site.zone.clone(),
        site.address.clone(),
        render_coordinate(site.latitude),
        render_coordinate(site.longitude),
        site.declared_municipality_code.clone(),
        site.municipality_code.clone(),
        site.municipality_name.clone(),
        site.department_code.clone(),
        site.department_name.clone(),
    ]
}

fn check_columns(columns: &[String]) -> Result<(), ConsolidateError> {
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(ConsolidateError::DuplicateColumn(column.clone()));
        }
    }
    Ok(())
}

/// Lay the merged panel out as the master table. Values are copied as-is.
///
/// A repeated column name or (site, year) key is an integrity violation.
pub fn assemble(panel: Panel<'_>) -> Result<MasterTable, ConsolidateError> {
    let columns: Vec<String> = IDENTITY_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(panel.columns)
        .collect();
    check_columns(&columns)?;

    let mut keys = HashSet::with_capacity(panel.rows.len());
    let mut rows = Vec::with_capacity(panel.rows.len());
    for row in panel.rows {
        if !keys.insert(row.key.clone()) {
            return Err(ConsolidateError::DuplicatePanelKey {
                site_code: row.key.site_code,
                year: row.key.year,
            });
        }
        let mut cells = identity_cells(row.site, row.key.year);
        cells.extend(row.indicators);
        rows.push(MasterRow { key: row.key, cells });
    }

    Ok(MasterTable { columns, rows })
}

/// One row per site, identity and geography only.
pub fn site_roster(sites: &[ConsolidatedSite]) -> MasterTable {
    let columns = IDENTITY_COLUMNS
        .iter()
        .filter(|c| **c != "reporting_year")
        .map(|c| c.to_string())
        .collect();
    let year_idx = IDENTITY_COLUMNS.iter().position(|c| *c == "reporting_year").unwrap_or(0);

    let rows = sites
        .iter()
        .map(|site| {
            let mut cells = identity_cells(site, None);
            cells.remove(year_idx);
            MasterRow { key: PanelKey::new(site.site_code.clone(), None), cells }
        })
        .collect();
    MasterTable { columns, rows }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_rows: usize,
    pub unique_sites: usize,
    pub unique_establishments: usize,
    pub unique_municipalities: usize,
    pub unique_departments: usize,
    /// Output rows per reporting year.
    pub year_distribution: BTreeMap<i32, usize>,
    /// Output rows of sites with no primary-source year.
    pub rows_without_year: usize,
}

/// Diagnostic counts over the master table.
pub fn compute_summary(table: &MasterTable) -> RunSummary {
    let distinct = |column: &str| -> usize {
        table
            .rows
            .iter()
            .filter_map(|row| table.get(row, column))
            .collect::<BTreeSet<_>>()
            .len()
    };

    let mut year_distribution = BTreeMap::new();
    let mut rows_without_year = 0;
    for row in &table.rows {
        match row.key.year {
            Some(year) => *year_distribution.entry(year).or_insert(0) += 1,
            None => rows_without_year += 1,
        }
    }

    RunSummary {
        total_rows: table.len(),
        unique_sites: table.rows.iter().map(|r| r.key.site_code.as_str()).collect::<BTreeSet<_>>().len(),
        unique_establishments: distinct("establishment_id"),
        unique_municipalities: distinct("municipality_code"),
        unique_departments: distinct("department_code"),
        year_distribution,
        rows_without_year,
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for an assembled table. Constructed once per run by the
/// caller and passed in; the engine holds no persistence state.
pub trait Sink {
    /// Write the table; returns the number of rows persisted.
    fn write(&mut self, table: &MasterTable) -> Result<usize, ConsolidateError>;
}

/// Sink that keeps tables in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub tables: Vec<MasterTable>,
}

impl Sink for MemorySink {
    fn write(&mut self, table: &MasterTable) -> Result<usize, ConsolidateError> {
        self.tables.push(table.clone());
        Ok(table.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::PanelRow;

    fn site(code: &str, est: &str, mpio: &str) -> ConsolidatedSite {
        ConsolidatedSite {
            site_code: code.into(),
            site_name: Some(format!("Sede {code}")),
            establishment_id: Some(est.into()),
            establishment_name: None,
            zone: Some("URBANA".into()),
            address: None,
            latitude: Some(6.25),
            longitude: Some(-75.5),
            declared_municipality_code: Some(mpio.into()),
            municipality_code: Some(mpio.into()),
            municipality_name: None,
            department_code: Some(mpio[..2].to_string()),
            department_name: None,
        }
    }

    #[test]
    fn identity_columns_come_first() {
        let s1 = site("S1", "E1", "05001");
        let panel = Panel {
            columns: vec!["ised_coverage".into(), "conect_coverage".into()],
            rows: vec![PanelRow {
                key: PanelKey::new("S1", Some(2022)),
                site: &s1,
                indicators: vec![Some("0.9".into()), None],
            }],
        };
        let table = assemble(panel).unwrap();
        assert_eq!(&table.columns[..14], &IDENTITY_COLUMNS.map(String::from)[..]);
        assert_eq!(table.columns[14], "ised_coverage");
        let row = &table.rows[0];
        assert_eq!(table.get(row, "reporting_year"), Some("2022"));
        assert_eq!(table.get(row, "zone"), Some("URBANA"));
        assert_eq!(table.get(row, "ised_coverage"), Some("0.9"));
        assert_eq!(table.get(row, "conect_coverage"), None);
        assert_eq!(table.coordinates(row), Some((-75.5, 6.25)));
    }

    #[test]
    fn duplicate_panel_key_is_rejected() {
        let s1 = site("S1", "E1", "05001");
        let row = PanelRow { key: PanelKey::new("S1", Some(2022)), site: &s1, indicators: vec![] };
        let panel = Panel { columns: vec![], rows: vec![row.clone(), row] };
        let err = assemble(panel).unwrap_err();
        assert_eq!(
            err,
            ConsolidateError::DuplicatePanelKey { site_code: "S1".into(), year: Some(2022) }
        );
    }

    #[test]
    fn indicator_colliding_with_identity_is_rejected() {
        let s1 = site("S1", "E1", "05001");
        let panel = Panel {
            columns: vec!["site_name".into()],
            rows: vec![PanelRow { key: PanelKey::new("S1", None), site: &s1, indicators: vec![None] }],
        };
        assert_eq!(assemble(panel).unwrap_err(), ConsolidateError::DuplicateColumn("site_name".into()));
    }

    #[test]
    fn summary_counts_distinct_keys_and_years() {
        let s1 = site("S1", "E1", "05001");
        let s2 = site("S2", "E1", "08001");
        let panel = Panel {
            columns: vec![],
            rows: vec![
                PanelRow { key: PanelKey::new("S1", Some(2022)), site: &s1, indicators: vec![] },
                PanelRow { key: PanelKey::new("S1", Some(2023)), site: &s1, indicators: vec![] },
                PanelRow { key: PanelKey::new("S2", Some(2023)), site: &s2, indicators: vec![] },
            ],
        };
        let summary = compute_summary(&assemble(panel).unwrap());
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.unique_sites, 2);
        assert_eq!(summary.unique_establishments, 1);
        assert_eq!(summary.unique_municipalities, 2);
        assert_eq!(summary.unique_departments, 2);
        assert_eq!(summary.year_distribution, BTreeMap::from([(2022, 1), (2023, 2)]));
    }

    #[test]
    fn roster_has_no_year_column() {
        let sites = vec![site("S1", "E1", "05001")];
        let roster = site_roster(&sites);
        assert_eq!(roster.columns.len(), 13);
        assert!(roster.position("reporting_year").is_none());
        assert_eq!(roster.get(&roster.rows[0], "municipality_code"), Some("05001"));
        assert_eq!(roster.get(&roster.rows[0], "declared_municipality_code"), Some("05001"));

        let mut sink = MemorySink::default();
        assert_eq!(sink.write(&roster).unwrap(), 1);
        assert_eq!(sink.tables.len(), 1);
    }
}
