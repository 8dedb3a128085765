use std::collections::BTreeSet;

use serde::Serialize;

use crate::assemble::{assemble, compute_summary, site_roster, MasterTable, RunSummary};
use crate::codes::{standardize_column, CodeKind};
use crate::config::ConsolidateConfig;
use crate::consolidate::{consolidate, ConsolidateOutcome};
use crate::error::ConsolidateError;
use crate::geometry::{DepartmentIndex, MunicipalityIndex};
use crate::homogenize::{homogenize, HomogenizeOutcome};
use crate::impute::{impute_coordinates, ImputeOutcome};
use crate::indicators::{merge_indicators, prepare_source, standardize_source_codes, PrepareOutcome, SourcePlan};
use crate::model::{extract_establishments, extract_sites, ExtractOutcome};
use crate::spatial::{validate_coordinates, ValidationOutcome};
use crate::table::{BoundaryLayer, Table};

/// Pre-loaded sources for one run.
#[derive(Debug, Clone)]
pub struct SourceInputs {
    pub ised: Table,
    pub connectivity: Option<Table>,
    pub rectors: Option<Table>,
    pub municipalities: BoundaryLayer,
    pub departments: BoundaryLayer,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

/// Per-stage data-quality counters: what was rewritten, nulled, imputed,
/// pruned or collapsed. Nothing here is an error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditCounts {
    pub standardized_codes: usize,
    pub municipalities: usize,
    pub departments: usize,
    pub establishments: usize,
    pub extraction: ExtractOutcome,
    pub homogenize: HomogenizeOutcome,
    pub validation: ValidationOutcome,
    pub imputation: ImputeOutcome,
    pub consolidation: ConsolidateOutcome,
    pub sources: Vec<PrepareOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationResult {
    pub meta: RunMeta,
    pub summary: RunSummary,
    pub audit: AuditCounts,
    /// One row per (site, reporting year).
    #[serde(skip)]
    pub table: MasterTable,
    /// One row per site, identity and geography only.
    #[serde(skip)]
    pub sites: MasterTable,
}

/// Run the full pipeline. Stages run in order, each consuming the previous
/// stage's output; any fatal defect aborts before an output exists.
pub fn run(config: &ConsolidateConfig, inputs: SourceInputs) -> Result<ConsolidationResult, ConsolidateError> {
    let SourceInputs { mut ised, connectivity, rectors, municipalities, departments } = inputs;
    let mut audit = AuditCounts::default();

    // Codes first: every join below relies on canonical keys
    audit.standardized_codes +=
        standardize_column(&mut ised, &config.ised.columns.municipality_code, CodeKind::Municipality)?;
    let connectivity = match (connectivity, &config.connectivity) {
        (Some(mut table), Some(conn_config)) => {
            audit.standardized_codes += standardize_source_codes(&mut table, conn_config)?;
            Some((table, conn_config))
        }
        _ => None,
    };
    tracing::info!(rewritten = audit.standardized_codes, "administrative codes standardised");

    let municipality_index = MunicipalityIndex::from_layer(&municipalities, &config.municipalities)?;
    let department_index = DepartmentIndex::from_layer(&departments, &config.departments)?;
    audit.municipalities = municipality_index.len();
    audit.departments = department_index.len();
    tracing::info!(
        municipalities = audit.municipalities,
        departments = audit.departments,
        "reference boundaries loaded"
    );

    let (records, extraction) = extract_sites(&ised, &config.ised.columns)?;
    let establishments = extract_establishments(&records);
    audit.establishments = establishments.len();
    audit.extraction = extraction;

    let (records, homogenize_outcome) = homogenize(records);
    let (records, validation) = validate_coordinates(records, &municipality_index);
    let (records, imputation) = impute_coordinates(records, &municipality_index);
    let (sites, consolidation) = consolidate(records, &establishments, &municipality_index, &department_index);
    audit.homogenize = homogenize_outcome;
    audit.validation = validation;
    audit.imputation = imputation;
    audit.consolidation = consolidation;

    let known: BTreeSet<String> = sites.iter().map(|s| s.site_code.clone()).collect();
    let (primary, outcome) = prepare_source(&ised, &SourcePlan::ised(&config.ised), &known)?;
    audit.sources.push(outcome);

    let mut secondary = Vec::new();
    if let Some((table, conn_config)) = connectivity {
        let (prepared, outcome) = prepare_source(&table, &SourcePlan::connectivity(conn_config), &known)?;
        secondary.push(prepared);
        audit.sources.push(outcome);
    }
    if let (Some(table), Some(rector_config)) = (rectors, &config.rectors) {
        let (prepared, outcome) = prepare_source(&table, &SourcePlan::rectors(rector_config), &known)?;
        secondary.push(prepared);
        audit.sources.push(outcome);
    }

    let table = assemble(merge_indicators(&sites, &primary, &secondary))?;
    let summary = compute_summary(&table);
    tracing::info!(
        rows = summary.total_rows,
        sites = summary.unique_sites,
        columns = table.columns.len(),
        "master table assembled"
    );

    Ok(ConsolidationResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        audit,
        sites: site_roster(&sites),
        table,
    })
}
