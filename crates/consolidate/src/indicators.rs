//! Indicator sources: column preparation, referential pruning and the
//! longitudinal merge onto the consolidated site set.
//!
//! Every non-key column of a source is renamed with the source's prefix, so
//! an ISED `cobertura` and a connectivity `cobertura` land side by side as
//! `ised_cobertura` and `conect_cobertura`. Yearly sources join on
//! (site, year); the rector roster joins on site alone and repeats across a
//! site's yearly rows.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::codes::{standardize_column, CodeKind};
use crate::config::{ConnectivityConfig, IsedConfig, RectorConfig};
use crate::consolidate::ConsolidatedSite;
use crate::error::ConsolidateError;
use crate::model::{parse_year, PanelKey};
use crate::table::{Cell, Table};

// ---------------------------------------------------------------------------
// Source plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Later rows for the same key replace earlier ones.
    KeepLast,
    /// The first row for a key is kept; later ones are discarded.
    KeepFirst,
}

/// How one source is keyed, filtered and renamed.
#[derive(Debug, Clone)]
pub struct SourcePlan {
    pub source: String,
    pub prefix: String,
    pub site_code: String,
    /// Year column; `None` joins on site alone.
    pub year: Option<String>,
    /// Non-key columns left out of the indicator set.
    pub excluded: BTreeSet<String>,
    pub duplicates: DuplicatePolicy,
}

impl SourcePlan {
    /// The primary source: its site descriptors and declared municipality
    /// feed the identity columns, everything else is an indicator.
    pub fn ised(config: &IsedConfig) -> Self {
        let cols = &config.columns;
        let mut excluded: BTreeSet<String> = config.drop.iter().cloned().collect();
        excluded.extend(cols.descriptors().iter().map(|c| c.to_string()));
        excluded.insert(cols.municipality_code.clone());
        Self {
            source: "ised".into(),
            prefix: config.prefix.clone(),
            site_code: cols.site_code.clone(),
            year: Some(cols.year.clone()),
            excluded,
            duplicates: DuplicatePolicy::KeepLast,
        }
    }

    pub fn connectivity(config: &ConnectivityConfig) -> Self {
        Self {
            source: "connectivity".into(),
            prefix: config.prefix.clone(),
            site_code: config.site_code.clone(),
            year: Some(config.year.clone()),
            excluded: config.drop.iter().cloned().collect(),
            duplicates: DuplicatePolicy::KeepLast,
        }
    }

    pub fn rectors(config: &RectorConfig) -> Self {
        Self {
            source: "rectors".into(),
            prefix: config.prefix.clone(),
            site_code: config.site_code.clone(),
            year: None,
            excluded: config.drop.iter().cloned().collect(),
            duplicates: DuplicatePolicy::KeepFirst,
        }
    }
}

/// Standardise the administrative code columns a secondary source keeps.
///
/// Dropped columns are skipped; a kept configured column must exist.
/// Returns the number of rewritten cells.
pub fn standardize_source_codes(
    table: &mut Table,
    config: &ConnectivityConfig,
) -> Result<usize, ConsolidateError> {
    let kinds = config
        .municipality_code_columns
        .iter()
        .map(|c| (c, CodeKind::Municipality))
        .chain(config.department_code_columns.iter().map(|c| (c, CodeKind::Department)));

    let mut rewritten = 0;
    for (column, kind) in kinds {
        if config.drop.contains(column) {
            continue;
        }
        rewritten += standardize_column(table, column, kind)?;
    }
    Ok(rewritten)
}

// ---------------------------------------------------------------------------
// Prepared sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrepareOutcome {
    pub source: String,
    pub input_rows: usize,
    pub kept_rows: usize,
    /// Rows with a null site code or a null year.
    pub missing_key_rows: usize,
    /// Rows referencing a site absent from the consolidated set.
    pub pruned_rows: usize,
    /// Distinct site codes behind `pruned_rows`, sorted.
    pub pruned_sites: Vec<String>,
    /// Rows discarded because their key was already present.
    pub duplicate_keys: usize,
}

/// A source reduced to its prefixed indicator columns, keyed for joining.
#[derive(Debug, Clone)]
pub struct PreparedSource {
    pub source: String,
    pub columns: Vec<String>,
    yearly: bool,
    values: HashMap<PanelKey, Vec<Cell>>,
}

impl PreparedSource {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values for an output row; a site-level source ignores the year.
    pub fn lookup(&self, key: &PanelKey) -> Option<&[Cell]> {
        let found = if self.yearly {
            self.values.get(key)
        } else {
            self.values.get(&PanelKey::new(key.site_code.clone(), None))
        };
        found.map(Vec::as_slice)
    }

    /// Years each site reports in, ascending.
    pub fn years_by_site(&self) -> BTreeMap<&str, BTreeSet<i32>> {
        let mut years: BTreeMap<&str, BTreeSet<i32>> = BTreeMap::new();
        for key in self.values.keys() {
            if let Some(year) = key.year {
                years.entry(key.site_code.as_str()).or_default().insert(year);
            }
        }
        years
    }
}

/// Key, filter and prefix one source, dropping rows whose site is not in
/// `sites`. A malformed year is fatal; a missing one skips the row.
pub fn prepare_source(
    table: &Table,
    plan: &SourcePlan,
    sites: &BTreeSet<String>,
) -> Result<(PreparedSource, PrepareOutcome), ConsolidateError> {
    let site_idx = table.require(&plan.site_code)?;
    let year_idx = plan.year.as_deref().map(|y| table.require(y)).transpose()?;

    let value_idx: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(i, name)| {
            *i != site_idx && Some(*i) != year_idx && !plan.excluded.contains(name.as_str())
        })
        .map(|(i, _)| i)
        .collect();
    let columns = value_idx
        .iter()
        .map(|&i| format!("{}{}", plan.prefix, table.columns[i]))
        .collect();

    let mut outcome = PrepareOutcome {
        source: plan.source.clone(),
        input_rows: table.len(),
        ..Default::default()
    };
    let mut pruned_sites = BTreeSet::new();
    let mut values: HashMap<PanelKey, Vec<Cell>> = HashMap::new();

    for (row_idx, row) in table.rows.iter().enumerate() {
        let Some(site) = row[site_idx].as_deref() else {
            outcome.missing_key_rows += 1;
            continue;
        };
        let year = match year_idx {
            None => None,
            Some(idx) => match row[idx].as_deref() {
                None => {
                    outcome.missing_key_rows += 1;
                    continue;
                }
                Some(raw) => Some(parse_year(Some(raw)).ok_or_else(|| ConsolidateError::ValueParse {
                    source: table.name.clone(),
                    column: table.columns[idx].clone(),
                    row: row_idx + 1,
                    value: raw.to_string(),
                })?),
            },
        };

        if !sites.contains(site) {
            outcome.pruned_rows += 1;
            pruned_sites.insert(site.to_string());
            continue;
        }

        let cells: Vec<Cell> = value_idx.iter().map(|&i| row[i].clone()).collect();
        let key = PanelKey::new(site, year);
        match plan.duplicates {
            DuplicatePolicy::KeepLast => {
                if values.insert(key, cells).is_some() {
                    outcome.duplicate_keys += 1;
                }
            }
            DuplicatePolicy::KeepFirst => {
                if values.contains_key(&key) {
                    outcome.duplicate_keys += 1;
                } else {
                    values.insert(key, cells);
                }
            }
        }
    }

    outcome.kept_rows = values.len();
    outcome.pruned_sites = pruned_sites.into_iter().collect();

    if outcome.pruned_rows > 0 {
        tracing::warn!(
            source = %plan.source,
            rows = outcome.pruned_rows,
            sites = outcome.pruned_sites.len(),
            "rows referencing unknown sites pruned"
        );
    }
    if outcome.duplicate_keys > 0 {
        tracing::warn!(source = %plan.source, rows = outcome.duplicate_keys, "duplicate keys collapsed");
    }
    tracing::info!(
        source = %plan.source,
        input = outcome.input_rows,
        kept = outcome.kept_rows,
        missing_key = outcome.missing_key_rows,
        "indicator source prepared"
    );

    let prepared = PreparedSource {
        source: plan.source.clone(),
        columns,
        yearly: year_idx.is_some(),
        values,
    };
    Ok((prepared, outcome))
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// One (site, year) output row before column assembly.
#[derive(Debug, Clone)]
pub struct PanelRow<'a> {
    pub key: PanelKey,
    pub site: &'a ConsolidatedSite,
    pub indicators: Vec<Cell>,
}

/// Merged indicator columns, in source order, and the panel rows.
#[derive(Debug, Clone)]
pub struct Panel<'a> {
    pub columns: Vec<String>,
    pub rows: Vec<PanelRow<'a>>,
}

/// Left-join every source onto the site set.
///
/// The year axis comes from the primary source: a site yields one row per
/// year it reports there, or a single year-less row if it reports none.
/// Rows are ordered by (site_code, year).
pub fn merge_indicators<'a>(
    sites: &'a [ConsolidatedSite],
    primary: &PreparedSource,
    secondary: &[PreparedSource],
) -> Panel<'a> {
    let sources: Vec<&PreparedSource> = std::iter::once(primary).chain(secondary).collect();
    let columns: Vec<String> = sources.iter().flat_map(|s| s.columns.iter().cloned()).collect();
    let years = primary.years_by_site();

    let mut ordered: Vec<&ConsolidatedSite> = sites.iter().collect();
    ordered.sort_by(|a, b| a.site_code.cmp(&b.site_code));

    let mut rows = Vec::new();
    let mut unmatched: BTreeMap<&str, usize> = BTreeMap::new();
    for site in ordered {
        let site_years: Vec<Option<i32>> = match years.get(site.site_code.as_str()) {
            Some(ys) => ys.iter().copied().map(Some).collect(),
            None => vec![None],
        };

        for year in site_years {
            let key = PanelKey::new(site.site_code.clone(), year);
            let mut indicators = Vec::with_capacity(columns.len());
            for source in &sources {
                match source.lookup(&key) {
                    Some(values) => indicators.extend_from_slice(values),
                    None => {
                        *unmatched.entry(source.source.as_str()).or_default() += 1;
                        indicators.extend(std::iter::repeat(None).take(source.columns.len()));
                    }
                }
            }
            rows.push(PanelRow { key, site, indicators });
        }
    }

    for (source, count) in &unmatched {
        tracing::debug!(source, rows = count, "output rows without a match in source");
    }
    tracing::info!(rows = rows.len(), columns = columns.len(), "indicators merged");
    Panel { columns, rows }
}
