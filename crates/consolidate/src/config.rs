use serde::Deserialize;

use crate::error::ConsolidateError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidateConfig {
    pub name: String,
    pub ised: IsedConfig,
    #[serde(default)]
    pub connectivity: Option<ConnectivityConfig>,
    #[serde(default)]
    pub rectors: Option<RectorConfig>,
    pub municipalities: MunicipalityLayerConfig,
    pub departments: DepartmentLayerConfig,
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Primary indicator source (site roster)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct IsedConfig {
    pub file: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default = "default_ised_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub columns: SiteColumns,
}

/// Header names of the site-describing columns in the primary source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteColumns {
    pub site_code: String,
    pub year: String,
    pub establishment_id: String,
    pub establishment_name: String,
    pub site_name: String,
    pub zone: String,
    pub address: String,
    pub municipality_code: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for SiteColumns {
    fn default() -> Self {
        Self {
            site_code: "sede_codigo".into(),
            year: "year_reporte".into(),
            establishment_id: "est_id".into(),
            establishment_name: "nombre_establecimiento".into(),
            site_name: "nombre_sede".into(),
            zone: "zona".into(),
            address: "direccion".into(),
            municipality_code: "cod_dane_municipio".into(),
            latitude: "latitud".into(),
            longitude: "longitud".into(),
        }
    }
}

impl SiteColumns {
    /// Descriptor columns: consumed by the site roster, excluded from indicators.
    pub fn descriptors(&self) -> [&str; 7] {
        [
            self.establishment_id.as_str(),
            self.establishment_name.as_str(),
            self.site_name.as_str(),
            self.zone.as_str(),
            self.address.as_str(),
            self.latitude.as_str(),
            self.longitude.as_str(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Secondary sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
    pub file: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default = "default_connectivity_prefix")]
    pub prefix: String,
    #[serde(default = "default_site_code")]
    pub site_code: String,
    #[serde(default = "default_connectivity_year")]
    pub year: String,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub municipality_code_columns: Vec<String>,
    #[serde(default)]
    pub department_code_columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RectorConfig {
    pub file: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default = "default_rector_prefix")]
    pub prefix: String,
    #[serde(default = "default_rector_site_code")]
    pub site_code: String,
    #[serde(default)]
    pub drop: Vec<String>,
}

// ---------------------------------------------------------------------------
// Boundary layers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MunicipalityLayerConfig {
    pub file: String,
    /// Overrides the frame declared by the file.
    #[serde(default)]
    pub crs: Option<String>,
    #[serde(default = "default_municipality_code")]
    pub code: String,
    #[serde(default = "default_department_code")]
    pub department_code: String,
    #[serde(default = "default_municipality_name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepartmentLayerConfig {
    pub file: String,
    #[serde(default)]
    pub crs: Option<String>,
    #[serde(default = "default_department_code")]
    pub code: String,
    #[serde(default = "default_department_name")]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub file: String,
    /// Optional one-row-per-site roster without indicators.
    #[serde(default)]
    pub sites: Option<String>,
    /// Optional JSON run report.
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default = "default_bom")]
    pub bom: bool,
}

fn default_ised_prefix() -> String {
    "ised_".into()
}

fn default_connectivity_prefix() -> String {
    "conect_".into()
}

fn default_rector_prefix() -> String {
    "rector_".into()
}

fn default_site_code() -> String {
    "sede_codigo".into()
}

fn default_connectivity_year() -> String {
    "anio".into()
}

fn default_rector_site_code() -> String {
    "PRECAR_E".into()
}

fn default_municipality_code() -> String {
    "MPIO_CDPMP".into()
}

fn default_department_code() -> String {
    "DPTO_CCDGO".into()
}

fn default_municipality_name() -> String {
    "MPIO_CNMBR".into()
}

fn default_department_name() -> String {
    "DPTO_CNMBR".into()
}

fn default_bom() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

const OUTPUT_EXTENSIONS: [&str; 2] = ["csv", "geojson"];

impl ConsolidateConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConsolidateError> {
        let config: ConsolidateConfig =
            toml::from_str(input).map_err(|e| ConsolidateError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConsolidateError> {
        if self.name.trim().is_empty() {
            return Err(ConsolidateError::ConfigValidation("name must not be empty".into()));
        }

        // Prefixes keep indicator columns from colliding across sources
        let mut prefixes: Vec<(&str, &str)> = vec![("ised", self.ised.prefix.as_str())];
        if let Some(ref c) = self.connectivity {
            prefixes.push(("connectivity", c.prefix.as_str()));
        }
        if let Some(ref r) = self.rectors {
            prefixes.push(("rectors", r.prefix.as_str()));
        }
        for (i, (source, prefix)) in prefixes.iter().enumerate() {
            if prefix.is_empty() {
                return Err(ConsolidateError::ConfigValidation(format!(
                    "{source}: prefix must not be empty"
                )));
            }
            if let Some((other, _)) = prefixes[..i].iter().find(|(_, p)| p == prefix) {
                return Err(ConsolidateError::ConfigValidation(format!(
                    "{source}: prefix '{prefix}' already used by {other}"
                )));
            }
        }

        let cols = &self.ised.columns;
        for key in [&cols.site_code, &cols.year, &cols.municipality_code] {
            if self.ised.drop.contains(key) {
                return Err(ConsolidateError::ConfigValidation(format!(
                    "ised: key column '{key}' cannot be dropped"
                )));
            }
        }
        if let Some(ref c) = self.connectivity {
            for key in [&c.site_code, &c.year] {
                if c.drop.contains(key) {
                    return Err(ConsolidateError::ConfigValidation(format!(
                        "connectivity: key column '{key}' cannot be dropped"
                    )));
                }
            }
        }
        if let Some(ref r) = self.rectors {
            if r.drop.contains(&r.site_code) {
                return Err(ConsolidateError::ConfigValidation(format!(
                    "rectors: key column '{}' cannot be dropped",
                    r.site_code
                )));
            }
        }

        for path in std::iter::once(&self.output.file).chain(self.output.sites.iter()) {
            let ext = std::path::Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();
            if !OUTPUT_EXTENSIONS.contains(&ext.as_str()) {
                return Err(ConsolidateError::ConfigValidation(format!(
                    "output '{path}': extension must be one of {}",
                    OUTPUT_EXTENSIONS.join(", ")
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
