//! Site deduplication and reference-data joins.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::geometry::{DepartmentIndex, MunicipalityIndex};
use crate::model::{Establishment, SiteYearRecord};
use crate::table::Cell;

/// One row per site with its reference geography attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedSite {
    pub site_code: String,
    pub site_name: Cell,
    pub establishment_id: Cell,
    pub establishment_name: Cell,
    pub zone: Cell,
    pub address: Cell,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Municipality the site itself reports; the one its coordinates were
    /// validated and imputed against.
    pub declared_municipality_code: Cell,
    /// Municipality of the site's establishment; drives the geography joins.
    pub municipality_code: Cell,
    pub municipality_name: Cell,
    pub department_code: Cell,
    pub department_name: Cell,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidateOutcome {
    pub input_rows: usize,
    pub sites: usize,
    /// Rows collapsed into another row of the same site.
    pub duplicate_rows_dropped: usize,
    /// Sites whose establishment id matched no establishment.
    pub unmatched_establishments: usize,
    /// Sites whose municipality code matched no municipality.
    pub unmatched_municipalities: usize,
    /// Sites whose department code matched no department.
    pub unmatched_departments: usize,
}

/// Keep one row per site: the latest year, and among same-year rows the last
/// encountered. Same policy as [`crate::homogenize::latest_establishment`].
/// Output is sorted by site code.
pub fn deduplicate_sites(rows: Vec<SiteYearRecord>) -> Vec<SiteYearRecord> {
    let mut rows = rows;
    rows.sort_by(|a, b| (&a.site_code, a.year).cmp(&(&b.site_code, b.year)));

    let mut latest: BTreeMap<String, SiteYearRecord> = BTreeMap::new();
    for row in rows {
        latest.insert(row.site_code.clone(), row);
    }
    latest.into_values().collect()
}

/// Deduplicate, then left-join establishment, municipality and department
/// attributes. Every deduplicated site survives; unmatched attributes are
/// null. Reference tables are unique by construction, so no row fans out.
pub fn consolidate(
    rows: Vec<SiteYearRecord>,
    establishments: &BTreeMap<String, Establishment>,
    municipalities: &MunicipalityIndex,
    departments: &DepartmentIndex,
) -> (Vec<ConsolidatedSite>, ConsolidateOutcome) {
    let mut outcome = ConsolidateOutcome { input_rows: rows.len(), ..Default::default() };
    let unique = deduplicate_sites(rows);
    outcome.sites = unique.len();
    outcome.duplicate_rows_dropped = outcome.input_rows - outcome.sites;

    let mut sites = Vec::with_capacity(unique.len());
    for row in unique {
        // (b) establishment -> name, municipality
        let establishment = row.establishment_id.as_deref().and_then(|id| {
            let found = establishments.get(id);
            if found.is_none() {
                outcome.unmatched_establishments += 1;
            }
            found
        });
        let establishment_name = establishment.and_then(|e| e.name.clone());
        let municipality_code = establishment.and_then(|e| e.municipality_code.clone());

        // (c) municipality -> name, department
        let municipality = municipality_code.as_deref().and_then(|code| {
            let found = municipalities.get(code);
            if found.is_none() {
                outcome.unmatched_municipalities += 1;
            }
            found
        });
        let municipality_name = municipality.and_then(|m| m.name.clone());
        let department_code = municipality.and_then(|m| m.department_code.clone());

        // (d) department -> name
        let department = department_code.as_deref().and_then(|code| {
            let found = departments.get(code);
            if found.is_none() {
                outcome.unmatched_departments += 1;
            }
            found
        });
        let department_name = department.and_then(|d| d.name.clone());

        sites.push(ConsolidatedSite {
            site_code: row.site_code,
            site_name: row.site_name,
            establishment_id: row.establishment_id,
            establishment_name,
            zone: row.zone,
            address: row.address,
            latitude: row.latitude,
            longitude: row.longitude,
            declared_municipality_code: row.municipality_code,
            municipality_code,
            municipality_name,
            department_code,
            department_name,
        });
    }

    if outcome.unmatched_establishments + outcome.unmatched_municipalities + outcome.unmatched_departments > 0 {
        tracing::warn!(
            establishments = outcome.unmatched_establishments,
            municipalities = outcome.unmatched_municipalities,
            departments = outcome.unmatched_departments,
            "reference joins left attributes null"
        );
    }
    tracing::info!(
        input_rows = outcome.input_rows,
        sites = outcome.sites,
        dropped = outcome.duplicate_rows_dropped,
        "sites deduplicated and joined to reference data"
    );
    (sites, outcome)
}
