// Property-based tests for code standardisation, homogenisation and the
// panel merge.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::{BTreeMap, BTreeSet, HashSet};

use proptest::prelude::*;
use sedes_consolidate::codes::{canonical_code, standardize_column, CodeDefect, CodeKind};
use sedes_consolidate::consolidate::{deduplicate_sites, ConsolidatedSite};
use sedes_consolidate::homogenize::{homogenize, latest_establishment};
use sedes_consolidate::indicators::{merge_indicators, prepare_source, DuplicatePolicy, SourcePlan};
use sedes_consolidate::model::SiteYearRecord;
use sedes_consolidate::Table;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn arb_kind() -> impl Strategy<Value = CodeKind> {
    prop_oneof![Just(CodeKind::Department), Just(CodeKind::Municipality)]
}

/// Raw code as it shows up in source files: short, padded, float-rendered.
fn arb_raw_code() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => r"[0-9]{1,5}",
        1 => r"[0-9]{1,5}\.0",
        1 => r" [0-9]{1,4} ",
    ]
}

/// (site, year, establishment) rows over a small key space so that sites
/// repeat and same-year duplicates occur.
fn arb_rows() -> impl Strategy<Value = Vec<(u8, i32, u8)>> {
    prop::collection::vec((0u8..6, 2019i32..2025, 0u8..4), 0..40)
}

fn record(site: u8, year: i32, est: u8) -> SiteYearRecord {
    SiteYearRecord {
        site_code: format!("S{site}"),
        year,
        establishment_id: Some(format!("E{est}")),
        establishment_name: None,
        site_name: None,
        zone: None,
        address: None,
        municipality_code: None,
        latitude: None,
        longitude: None,
    }
}

fn bare_site(code: &str) -> ConsolidatedSite {
    ConsolidatedSite {
        site_code: code.to_string(),
        site_name: None,
        establishment_id: None,
        establishment_name: None,
        zone: None,
        address: None,
        latitude: None,
        longitude: None,
        declared_municipality_code: None,
        municipality_code: None,
        municipality_name: None,
        department_code: None,
        department_name: None,
    }
}

// ---------------------------------------------------------------------------
// Standardisation
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn canonical_codes_have_exact_width(raw in arb_raw_code(), kind in arb_kind()) {
        match canonical_code(&raw, kind) {
            Ok(code) => {
                prop_assert_eq!(code.len(), kind.width());
                prop_assert!(code.bytes().all(|b| b.is_ascii_digit()));
            }
            Err(defect) => {
                // Only too-wide values fail for digit-only input
                prop_assert_eq!(defect, CodeDefect::TooWide);
                let digits = raw.trim().trim_end_matches(".0");
                prop_assert!(digits.len() > kind.width());
            }
        }
    }

    #[test]
    fn standardisation_is_idempotent(codes in prop::collection::vec(r"[0-9]{1,5}", 0..30)) {
        let rows: Vec<Vec<&str>> = codes.iter().map(|c| vec![c.as_str()]).collect();
        let row_refs: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        let mut once = Table::from_rows("t", &["mpio"], &row_refs);
        standardize_column(&mut once, "mpio", CodeKind::Municipality).unwrap();

        let mut twice = once.clone();
        let rewritten = standardize_column(&mut twice, "mpio", CodeKind::Municipality).unwrap();
        prop_assert_eq!(rewritten, 0);
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.len(), codes.len());
    }
}

// ---------------------------------------------------------------------------
// Homogenisation + dedup
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn homogenisation_preserves_cardinality_and_unifies_ids(raw in arb_rows()) {
        let rows: Vec<SiteYearRecord> = raw.iter().map(|&(s, y, e)| record(s, y, e)).collect();
        let latest = latest_establishment(&rows);
        let (out, _) = homogenize(rows.clone());

        prop_assert_eq!(out.len(), rows.len());
        let mut ids: BTreeMap<&str, BTreeSet<Option<&str>>> = BTreeMap::new();
        for (before, after) in rows.iter().zip(&out) {
            prop_assert_eq!(&before.site_code, &after.site_code);
            prop_assert_eq!(before.year, after.year);
            prop_assert_eq!(&after.establishment_id, &latest[&after.site_code]);
            ids.entry(after.site_code.as_str()).or_default().insert(after.establishment_id.as_deref());
        }
        prop_assert!(ids.values().all(|set| set.len() == 1));
    }

    #[test]
    fn dedup_yields_unique_sites_at_their_latest_year(raw in arb_rows()) {
        let rows: Vec<SiteYearRecord> = raw.iter().map(|&(s, y, e)| record(s, y, e)).collect();
        let distinct: BTreeSet<&str> = rows.iter().map(|r| r.site_code.as_str()).collect();
        let unique = deduplicate_sites(rows.clone());

        prop_assert_eq!(unique.len(), distinct.len());
        for site in &unique {
            let max_year = rows.iter().filter(|r| r.site_code == site.site_code).map(|r| r.year).max();
            prop_assert_eq!(Some(site.year), max_year);
        }
    }
}

// ---------------------------------------------------------------------------
// Panel merge
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn merged_panel_keys_are_unique_and_pruned(
        primary in arb_rows(),
        secondary in arb_rows(),
        known_mask in prop::collection::vec(any::<bool>(), 6),
    ) {
        let known: BTreeSet<String> = known_mask
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(i, _)| format!("S{i}"))
            .collect();
        let sites: Vec<ConsolidatedSite> = known.iter().map(|c| bare_site(c)).collect();

        let to_table = |name: &str, rows: &[(u8, i32, u8)]| {
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|(s, y, e)| vec![format!("S{s}"), y.to_string(), format!("v{e}")])
                .collect();
            let refs: Vec<Vec<&str>> = cells.iter().map(|r| r.iter().map(String::as_str).collect()).collect();
            let slices: Vec<&[&str]> = refs.iter().map(|r| r.as_slice()).collect();
            Table::from_rows(name, &["sede", "anio", "valor"], &slices)
        };
        let plan = |prefix: &str| SourcePlan {
            source: prefix.to_string(),
            prefix: prefix.to_string(),
            site_code: "sede".into(),
            year: Some("anio".into()),
            excluded: BTreeSet::new(),
            duplicates: DuplicatePolicy::KeepLast,
        };

        let (p, _) = prepare_source(&to_table("p", &primary), &plan("p_"), &known).unwrap();
        let (s, s_outcome) = prepare_source(&to_table("s", &secondary), &plan("s_"), &known).unwrap();
        let panel = merge_indicators(&sites, &p, &[s]);

        let keys: HashSet<_> = panel.rows.iter().map(|r| r.key.clone()).collect();
        prop_assert_eq!(keys.len(), panel.rows.len());
        prop_assert!(panel.rows.iter().all(|r| known.contains(&r.key.site_code)));
        // Every known site appears at least once
        let seen: BTreeSet<&String> = panel.rows.iter().map(|r| &r.key.site_code).collect();
        prop_assert_eq!(seen.len(), known.len());

        let unknown = secondary.iter().filter(|(s, _, _)| !known.contains(&format!("S{s}"))).count();
        prop_assert_eq!(s_outcome.pruned_rows, unknown);
    }
}
