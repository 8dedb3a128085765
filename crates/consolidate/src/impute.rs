use std::collections::BTreeSet;

use serde::Serialize;

use crate::geometry::MunicipalityIndex;
use crate::model::SiteYearRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImputeOutcome {
    /// Rows that received their municipality's representative point.
    pub imputed: usize,
    /// Rows left without coordinates: no boundary for the declared code.
    pub unimputable: usize,
    /// Distinct site codes behind `unimputable`, sorted.
    pub unimputable_sites: Vec<String>,
}

/// Fill every coordinate-less row with the centroid of its declared
/// municipality. Existing coordinates are never touched.
pub fn impute_coordinates(
    mut rows: Vec<SiteYearRecord>,
    municipalities: &MunicipalityIndex,
) -> (Vec<SiteYearRecord>, ImputeOutcome) {
    let mut outcome = ImputeOutcome::default();
    let mut unimputable_sites = BTreeSet::new();

    for row in rows.iter_mut().filter(|r| !r.has_coordinates()) {
        let centroid = row
            .municipality_code
            .as_deref()
            .and_then(|code| municipalities.get(code))
            .and_then(|m| m.centroid);

        match centroid {
            Some(point) => {
                row.latitude = Some(point.y());
                row.longitude = Some(point.x());
                outcome.imputed += 1;
            }
            None => {
                row.clear_coordinates();
                outcome.unimputable += 1;
                unimputable_sites.insert(row.site_code.clone());
            }
        }
    }

    outcome.unimputable_sites = unimputable_sites.into_iter().collect();
    if outcome.unimputable > 0 {
        tracing::warn!(
            rows = outcome.unimputable,
            sites = outcome.unimputable_sites.len(),
            "rows left without coordinates: declared municipality has no boundary"
        );
    }
    tracing::info!(imputed = outcome.imputed, unimputable = outcome.unimputable, "coordinates imputed");
    (rows, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{square, Municipality};

    fn index() -> MunicipalityIndex {
        MunicipalityIndex::from_municipalities(vec![Municipality::new(
            "05001",
            Some("05".into()),
            None,
            square(-75.7, 6.1, 0.2),
        )])
        .unwrap()
    }

    fn site(code: &str, mpio: Option<&str>, coords: Option<(f64, f64)>) -> SiteYearRecord {
        SiteYearRecord {
            site_code: code.into(),
            year: 2022,
            establishment_id: None,
            establishment_name: None,
            site_name: None,
            zone: None,
            address: None,
            municipality_code: mpio.map(str::to_string),
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
        }
    }

    #[test]
    fn missing_coordinates_take_municipality_centroid() {
        let (rows, outcome) = impute_coordinates(vec![site("S1", Some("05001"), None)], &index());
        assert!((rows[0].latitude.unwrap() - 6.2).abs() < 1e-9);
        assert!((rows[0].longitude.unwrap() - -75.6).abs() < 1e-9);
        assert_eq!(outcome.imputed, 1);
        assert_eq!(outcome.unimputable, 0);
    }

    #[test]
    fn valid_coordinates_are_never_overwritten() {
        let (rows, outcome) =
            impute_coordinates(vec![site("S1", Some("05001"), Some((6.15, -75.65)))], &index());
        assert_eq!(rows[0].latitude, Some(6.15));
        assert_eq!(rows[0].longitude, Some(-75.65));
        assert_eq!(outcome.imputed, 0);
    }

    #[test]
    fn unknown_municipality_stays_null_and_is_reported() {
        let rows = vec![
            site("S3", Some("99999"), None),
            site("S3", Some("99999"), None),
            site("S4", None, None),
        ];
        let (rows, outcome) = impute_coordinates(rows, &index());
        assert!(rows.iter().all(|r| !r.has_coordinates()));
        assert_eq!(outcome.unimputable, 3);
        assert_eq!(outcome.unimputable_sites, vec!["S3".to_string(), "S4".to_string()]);
    }
}
