use geo::Point;
use serde::Serialize;

use crate::geometry::MunicipalityIndex;
use crate::model::SiteYearRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    /// Rows carrying a full coordinate pair on input.
    pub checked: usize,
    /// Rows with no (or only half a) coordinate pair on input.
    pub missing_coordinates: usize,
    /// Rows whose coordinates were nulled: not inside the declared municipality.
    pub outside_municipality: usize,
    /// Subset of `outside_municipality` whose point lies in no polygon at all.
    pub no_containing_polygon: usize,
}

/// Null every coordinate pair that does not fall within the polygon of the
/// row's declared municipality. Rows are never removed.
///
/// A point is matched against every polygon strictly containing it; the row
/// is valid when the declared code is among them. A row with coordinates but
/// no declared municipality cannot be valid.
pub fn validate_coordinates(
    mut rows: Vec<SiteYearRecord>,
    municipalities: &MunicipalityIndex,
) -> (Vec<SiteYearRecord>, ValidationOutcome) {
    let mut outcome = ValidationOutcome::default();

    for row in &mut rows {
        let (Some(lat), Some(lon)) = (row.latitude, row.longitude) else {
            // Half a pair is as good as none
            row.clear_coordinates();
            outcome.missing_coordinates += 1;
            continue;
        };
        outcome.checked += 1;

        let point = Point::new(lon, lat);
        let containing = municipalities.containing(&point);
        let declared = row.municipality_code.as_deref();

        let valid = declared.is_some_and(|code| containing.contains(&code));
        if valid {
            continue;
        }

        if containing.is_empty() {
            outcome.no_containing_polygon += 1;
        }
        outcome.outside_municipality += 1;
        tracing::debug!(
            site = %row.site_code,
            year = row.year,
            declared = declared.unwrap_or(""),
            found = %containing.join("|"),
            lat,
            lon,
            "coordinates outside declared municipality"
        );
        row.clear_coordinates();
    }

    tracing::info!(
        checked = outcome.checked,
        missing = outcome.missing_coordinates,
        outside = outcome.outside_municipality,
        no_polygon = outcome.no_containing_polygon,
        "coordinates validated against municipality boundaries"
    );
    (rows, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{square, Municipality};

    fn index() -> MunicipalityIndex {
        MunicipalityIndex::from_municipalities(vec![
            Municipality::new("05001", Some("05".into()), None, square(-75.7, 6.1, 0.2)),
            Municipality::new("05002", Some("05".into()), None, square(-75.5, 6.1, 0.2)),
        ])
        .unwrap()
    }

    fn site(code: &str, mpio: Option<&str>, lat: Option<f64>, lon: Option<f64>) -> SiteYearRecord {
        SiteYearRecord {
            site_code: code.into(),
            year: 2023,
            establishment_id: None,
            establishment_name: None,
            site_name: None,
            zone: None,
            address: None,
            municipality_code: mpio.map(str::to_string),
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn point_inside_declared_municipality_survives() {
        let (rows, outcome) =
            validate_coordinates(vec![site("S1", Some("05001"), Some(6.2), Some(-75.6))], &index());
        assert_eq!(rows[0].latitude, Some(6.2));
        assert_eq!(rows[0].longitude, Some(-75.6));
        assert_eq!(outcome.checked, 1);
        assert_eq!(outcome.outside_municipality, 0);
    }

    #[test]
    fn point_in_neighbouring_municipality_is_nulled() {
        let (rows, outcome) =
            validate_coordinates(vec![site("S1", Some("05001"), Some(6.2), Some(-75.4))], &index());
        assert!(!rows[0].has_coordinates());
        assert_eq!(outcome.outside_municipality, 1);
        assert_eq!(outcome.no_containing_polygon, 0);
    }

    #[test]
    fn null_island_has_no_containing_polygon() {
        let (rows, outcome) =
            validate_coordinates(vec![site("S1", Some("05001"), Some(0.0), Some(0.0))], &index());
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].has_coordinates());
        assert_eq!(outcome.outside_municipality, 1);
        assert_eq!(outcome.no_containing_polygon, 1);
    }

    #[test]
    fn missing_and_half_pairs_are_tallied_separately() {
        let rows = vec![
            site("S1", Some("05001"), None, None),
            site("S2", Some("05001"), Some(6.2), None),
            site("S3", Some("05001"), Some(6.2), Some(-75.6)),
        ];
        let (rows, outcome) = validate_coordinates(rows, &index());
        assert_eq!(outcome.missing_coordinates, 2);
        assert_eq!(outcome.checked, 1);
        assert_eq!(outcome.outside_municipality, 0);
        assert_eq!(rows[1].latitude, None);
    }

    #[test]
    fn coordinates_without_declared_code_are_invalid() {
        let (rows, outcome) = validate_coordinates(vec![site("S1", None, Some(6.2), Some(-75.6))], &index());
        assert!(!rows[0].has_coordinates());
        assert_eq!(outcome.outside_municipality, 1);
    }
}
