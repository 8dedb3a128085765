use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidateError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (duplicate prefix, key column dropped, etc.).
    ConfigValidation(String),
    /// A configured column is absent from a source table header.
    MissingColumn { source: String, column: String },
    /// A boundary feature lacks a configured attribute (or carries null).
    MissingAttribute { layer: String, feature: usize, attribute: String },
    /// Administrative code longer than its canonical width.
    CodeTooWide { source: String, column: String, row: usize, value: String, width: usize },
    /// Administrative code containing something other than digits.
    CodeNotNumeric { source: String, column: String, row: usize, value: String },
    /// A supposedly unique reference table repeats a key.
    DuplicateReferenceKey { table: String, key: String },
    /// Year or coordinate cell that cannot be parsed.
    ValueParse { source: String, column: String, row: usize, value: String },
    /// Boundary layer declared in a reference frame we cannot reproject.
    UnsupportedCrs { layer: String, crs: String },
    /// (site_code, reporting_year) repeated in the merged output.
    DuplicatePanelKey { site_code: String, year: Option<i32> },
    /// Two output columns share a name.
    DuplicateColumn(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ConsolidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { source, column } => {
                write!(f, "source '{source}': missing column '{column}'")
            }
            Self::MissingAttribute { layer, feature, attribute } => {
                write!(f, "layer '{layer}', feature {feature}: missing attribute '{attribute}'")
            }
            Self::CodeTooWide { source, column, row, value, width } => write!(
                f,
                "source '{source}', column '{column}', row {row}: code '{value}' exceeds {width} digits"
            ),
            Self::CodeNotNumeric { source, column, row, value } => write!(
                f,
                "source '{source}', column '{column}', row {row}: code '{value}' is not numeric"
            ),
            Self::DuplicateReferenceKey { table, key } => {
                write!(f, "reference table '{table}': duplicate key '{key}'")
            }
            Self::ValueParse { source, column, row, value } => write!(
                f,
                "source '{source}', column '{column}', row {row}: cannot parse '{value}'"
            ),
            Self::UnsupportedCrs { layer, crs } => {
                write!(f, "layer '{layer}': unsupported reference frame '{crs}'")
            }
            Self::DuplicatePanelKey { site_code, year } => match year {
                Some(y) => write!(f, "duplicate output key (site '{site_code}', year {y})"),
                None => write!(f, "duplicate output key (site '{site_code}', no year)"),
            },
            Self::DuplicateColumn(name) => write!(f, "duplicate output column '{name}'"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ConsolidateError {}
