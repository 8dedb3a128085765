use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::SiteYearRecord;
use crate::table::Cell;

/// Final establishment per site: the one reported in the site's latest year.
///
/// Rows are ordered by (site_code, year) with a stable sort, so among
/// duplicate (site_code, year) rows the one appearing last in the input wins.
/// No secondary tie-break exists in the source data.
pub fn latest_establishment(rows: &[SiteYearRecord]) -> BTreeMap<String, Cell> {
    let mut order: Vec<&SiteYearRecord> = rows.iter().collect();
    order.sort_by(|a, b| (&a.site_code, a.year).cmp(&(&b.site_code, b.year)));

    let mut latest = BTreeMap::new();
    for row in order {
        latest.insert(row.site_code.clone(), row.establishment_id.clone());
    }
    latest
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HomogenizeOutcome {
    /// Rows whose establishment id was rewritten.
    pub reassigned_rows: usize,
    /// Sites that reported under more than one establishment.
    pub reassigned_sites: usize,
}

/// Rewrite every row's establishment id to its site's final value.
///
/// Cardinality and row order are preserved; only `establishment_id` changes.
pub fn homogenize(mut rows: Vec<SiteYearRecord>) -> (Vec<SiteYearRecord>, HomogenizeOutcome) {
    let latest = latest_establishment(&rows);
    let mut outcome = HomogenizeOutcome::default();
    let mut touched: BTreeSet<String> = BTreeSet::new();

    for row in &mut rows {
        let Some(final_id) = latest.get(&row.site_code) else {
            continue;
        };
        if row.establishment_id != *final_id {
            row.establishment_id = final_id.clone();
            outcome.reassigned_rows += 1;
            touched.insert(row.site_code.clone());
        }
    }

    outcome.reassigned_sites = touched.len();
    tracing::info!(
        rows = rows.len(),
        reassigned_rows = outcome.reassigned_rows,
        reassigned_sites = outcome.reassigned_sites,
        "establishment ids homogenised"
    );
    (rows, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(site: &str, year: i32, est: Option<&str>) -> SiteYearRecord {
        SiteYearRecord {
            site_code: site.into(),
            year,
            establishment_id: est.map(str::to_string),
            establishment_name: None,
            site_name: None,
            zone: None,
            address: None,
            municipality_code: Some("05001".into()),
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn latest_year_wins() {
        // Input deliberately out of year order
        let rows = vec![record("S2", 2023, Some("B")), record("S2", 2022, Some("A"))];
        let (out, outcome) = homogenize(rows);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.establishment_id.as_deref() == Some("B")));
        assert_eq!(outcome.reassigned_rows, 1);
        assert_eq!(outcome.reassigned_sites, 1);
        // Order preserved
        assert_eq!(out[0].year, 2023);
        assert_eq!(out[1].year, 2022);
    }

    #[test]
    fn same_year_duplicates_last_encountered_wins() {
        let rows = vec![
            record("S1", 2023, Some("X")),
            record("S1", 2022, Some("W")),
            record("S1", 2023, Some("Y")),
        ];
        let latest = latest_establishment(&rows);
        assert_eq!(latest["S1"].as_deref(), Some("Y"));
    }

    #[test]
    fn null_latest_id_propagates() {
        let rows = vec![record("S1", 2022, Some("A")), record("S1", 2023, None)];
        let (out, _) = homogenize(rows);
        assert!(out.iter().all(|r| r.establishment_id.is_none()));
    }

    #[test]
    fn untouched_sites_are_not_counted() {
        let rows = vec![
            record("S1", 2022, Some("A")),
            record("S1", 2023, Some("A")),
            record("S3", 2023, Some("C")),
        ];
        let (_, outcome) = homogenize(rows);
        assert_eq!(outcome, HomogenizeOutcome::default());
    }
}
