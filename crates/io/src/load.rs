// Config-driven loading, header checks and output dispatch

use std::path::{Path, PathBuf};

use sedes_consolidate::geometry::Crs;
use sedes_consolidate::{
    BoundaryLayer, ConsolidateConfig, ConsolidateError, ConsolidationResult, MasterTable, Sink, SourceInputs, Table,
};

use crate::csv::CsvSink;
use crate::geojson::GeoJsonSink;
use crate::report::{fingerprint, InputFingerprint, OutputRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Delimited,
    Spreadsheet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Delimited),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

/// Relative paths resolve against the config file's directory.
pub fn resolve(base: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn io_error(path: &Path, message: impl std::fmt::Display) -> ConsolidateError {
    ConsolidateError::Io(format!("{}: {message}", path.display()))
}

fn delimiter_byte(path: &Path, delimiter: Option<char>) -> Result<Option<u8>, ConsolidateError> {
    match delimiter {
        None => Ok(None),
        Some(c) if c.is_ascii() => Ok(Some(c as u8)),
        Some(c) => Err(io_error(path, format!("delimiter '{c}' is not a single-byte character"))),
    }
}

fn format_of(path: &Path) -> Result<TableFormat, ConsolidateError> {
    TableFormat::from_path(path).ok_or_else(|| io_error(path, "unsupported table format"))
}

/// Load a tabular source by extension.
pub fn load_table(
    path: &Path,
    name: &str,
    sheet: Option<&str>,
    delimiter: Option<char>,
) -> Result<Table, ConsolidateError> {
    let table = match format_of(path)? {
        TableFormat::Delimited => crate::csv::read_table(path, name, delimiter_byte(path, delimiter)?),
        TableFormat::Spreadsheet => crate::xlsx::read_table(path, name, sheet),
    }
    .map_err(|e| io_error(path, e))?;
    tracing::info!(source = name, path = %path.display(), rows = table.len(), columns = table.columns.len(), "table loaded");
    Ok(table)
}

fn load_header(path: &Path, sheet: Option<&str>, delimiter: Option<char>) -> Result<Vec<String>, ConsolidateError> {
    let header = match format_of(path)? {
        TableFormat::Delimited => crate::csv::read_header(path, delimiter_byte(path, delimiter)?),
        TableFormat::Spreadsheet => crate::xlsx::read_header(path, sheet),
    };
    header.map_err(|e| io_error(path, e))
}

pub fn load_layer(path: &Path, name: &str) -> Result<BoundaryLayer, ConsolidateError> {
    let layer = crate::geojson::read_layer(path, name).map_err(|e| io_error(path, e))?;
    tracing::info!(layer = name, path = %path.display(), features = layer.features.len(), "boundary layer loaded");
    Ok(layer)
}

/// Every input file of a config, by role.
pub fn input_paths(config: &ConsolidateConfig, base: &Path) -> Vec<(&'static str, PathBuf)> {
    let mut paths = vec![("ised", resolve(base, &config.ised.file))];
    if let Some(ref c) = config.connectivity {
        paths.push(("connectivity", resolve(base, &c.file)));
    }
    if let Some(ref r) = config.rectors {
        paths.push(("rectors", resolve(base, &r.file)));
    }
    paths.push(("municipalities", resolve(base, &config.municipalities.file)));
    paths.push(("departments", resolve(base, &config.departments.file)));
    paths
}

/// Read every configured source and fingerprint it.
pub fn load_inputs(
    config: &ConsolidateConfig,
    base: &Path,
) -> Result<(SourceInputs, Vec<InputFingerprint>), ConsolidateError> {
    let ised = load_table(
        &resolve(base, &config.ised.file),
        "ised",
        config.ised.sheet.as_deref(),
        config.ised.delimiter,
    )?;
    let connectivity = config
        .connectivity
        .as_ref()
        .map(|c| load_table(&resolve(base, &c.file), "connectivity", c.sheet.as_deref(), c.delimiter))
        .transpose()?;
    let rectors = config
        .rectors
        .as_ref()
        .map(|r| load_table(&resolve(base, &r.file), "rectors", r.sheet.as_deref(), r.delimiter))
        .transpose()?;
    let municipalities = load_layer(&resolve(base, &config.municipalities.file), "municipalities")?;
    let departments = load_layer(&resolve(base, &config.departments.file), "departments")?;

    let mut fingerprints = Vec::new();
    for (role, path) in input_paths(config, base) {
        fingerprints.push(fingerprint(role, &path).map_err(|e| io_error(&path, e))?);
    }

    Ok((SourceInputs { ised, connectivity, rectors, municipalities, departments }, fingerprints))
}

// ---------------------------------------------------------------------------
// Header-only checks
// ---------------------------------------------------------------------------

fn missing_columns(source: &str, header: &[String], required: &[&str]) -> Vec<ConsolidateError> {
    required
        .iter()
        .filter(|c| !header.iter().any(|h| h == *c))
        .map(|c| ConsolidateError::MissingColumn { source: source.to_string(), column: c.to_string() })
        .collect()
}

fn layer_defects(layer: &BoundaryLayer, crs: Option<&str>, attributes: &[&str]) -> Vec<ConsolidateError> {
    let mut defects = Vec::new();
    if let Err(e) = Crs::resolve(layer, crs) {
        defects.push(e);
    }
    for attribute in attributes {
        let first_gap = layer
            .features
            .iter()
            .enumerate()
            .find_map(|(i, f)| layer.require_attribute(i, f, attribute).err());
        defects.extend(first_gap);
    }
    defects
}

/// Schema defects found from headers and layer attributes alone, without
/// running the pipeline. Unreadable files are still an error.
pub fn check_inputs(config: &ConsolidateConfig, base: &Path) -> Result<Vec<ConsolidateError>, ConsolidateError> {
    let mut defects = Vec::new();

    let cols = &config.ised.columns;
    let header = load_header(&resolve(base, &config.ised.file), config.ised.sheet.as_deref(), config.ised.delimiter)?;
    let mut required = vec![cols.site_code.as_str(), cols.year.as_str(), cols.municipality_code.as_str()];
    required.extend(cols.descriptors());
    defects.extend(missing_columns("ised", &header, &required));

    if let Some(ref c) = config.connectivity {
        let header = load_header(&resolve(base, &c.file), c.sheet.as_deref(), c.delimiter)?;
        let mut required = vec![c.site_code.as_str(), c.year.as_str()];
        required.extend(
            c.municipality_code_columns
                .iter()
                .chain(&c.department_code_columns)
                .filter(|col| !c.drop.contains(col))
                .map(String::as_str),
        );
        defects.extend(missing_columns("connectivity", &header, &required));
    }

    if let Some(ref r) = config.rectors {
        let header = load_header(&resolve(base, &r.file), r.sheet.as_deref(), r.delimiter)?;
        defects.extend(missing_columns("rectors", &header, &[r.site_code.as_str()]));
    }

    let m = &config.municipalities;
    let layer = load_layer(&resolve(base, &m.file), "municipalities")?;
    defects.extend(layer_defects(&layer, m.crs.as_deref(), &[m.code.as_str(), m.department_code.as_str()]));

    let d = &config.departments;
    let layer = load_layer(&resolve(base, &d.file), "departments")?;
    defects.extend(layer_defects(&layer, d.crs.as_deref(), &[d.code.as_str()]));

    Ok(defects)
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Sink for an output path, chosen by extension.
pub fn sink_for(path: &Path, bom: bool) -> Result<Box<dyn Sink>, ConsolidateError> {
    let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("csv") => Ok(Box::new(CsvSink::new(path, bom))),
        Some("geojson") => Ok(Box::new(GeoJsonSink::new(path))),
        _ => Err(io_error(path, "unsupported output format")),
    }
}

fn write_one(role: &str, path: PathBuf, table: &MasterTable, bom: bool) -> Result<OutputRecord, ConsolidateError> {
    let mut sink = sink_for(&path, bom)?;
    let rows = sink.write(table)?;
    tracing::info!(output = role, path = %path.display(), rows, "output written");
    Ok(OutputRecord { role: role.to_string(), path: path.display().to_string(), rows })
}

/// Write the master table and, when configured, the site roster.
/// `output_override` replaces the configured master-table path.
pub fn write_outputs(
    result: &ConsolidationResult,
    config: &ConsolidateConfig,
    base: &Path,
    output_override: Option<&Path>,
) -> Result<Vec<OutputRecord>, ConsolidateError> {
    let main_path = match output_override {
        Some(p) => p.to_path_buf(),
        None => resolve(base, &config.output.file),
    };

    let mut records = vec![write_one("table", main_path, &result.table, config.output.bom)?];
    if let Some(ref sites) = config.output.sites {
        records.push(write_one("sites", resolve(base, sites), &result.sites, config.output.bom)?);
    }
    Ok(records)
}
