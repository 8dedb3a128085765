use std::collections::BTreeMap;

use geo::MultiPolygon;

use crate::error::ConsolidateError;

/// A cell is raw text; empty cells are `None`.
pub type Cell = Option<String>;

// ---------------------------------------------------------------------------
// Tabular sources
// ---------------------------------------------------------------------------

/// A loaded tabular source: header plus rows of nullable text cells.
///
/// Loaders guarantee every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self { name: name.into(), columns, rows: Vec::new() }
    }

    /// Build from string literals; empty strings become null cells.
    pub fn from_rows(name: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        let mut table = Self::new(name, columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row.iter().map(|v| normalize_cell(v)).collect());
        }
        table
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Index of a required column; absence is a schema defect.
    pub fn require(&self, column: &str) -> Result<usize, ConsolidateError> {
        self.position(column).ok_or_else(|| ConsolidateError::MissingColumn {
            source: self.name.clone(),
            column: column.to_string(),
        })
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }
}

/// Trim a raw value; blank becomes null.
pub fn normalize_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Boundary layers
// ---------------------------------------------------------------------------

/// A polygon feature with its attribute table row.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub attributes: BTreeMap<String, Cell>,
    pub geometry: MultiPolygon<f64>,
}

impl BoundaryFeature {
    /// Exact attribute lookup first, then case-insensitive.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.attributes.get(name) {
            return v.as_deref();
        }
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }
}

/// A polygon dataset as read from disk, before reprojection.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLayer {
    pub name: String,
    /// Reference frame declared by the file, if any.
    pub crs: Option<String>,
    pub features: Vec<BoundaryFeature>,
}

impl BoundaryLayer {
    /// Attribute value of a feature; absent or null is a schema defect.
    pub fn require_attribute<'a>(
        &self,
        feature_idx: usize,
        feature: &'a BoundaryFeature,
        attribute: &str,
    ) -> Result<&'a str, ConsolidateError> {
        feature.attribute(attribute).ok_or_else(|| ConsolidateError::MissingAttribute {
            layer: self.name.clone(),
            feature: feature_idx,
            attribute: attribute.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cells_are_null() {
        let t = Table::from_rows("t", &["a", "b"], &[&["x", "  "], &["", "y"]]);
        assert_eq!(t.get(0, 0), Some("x"));
        assert_eq!(t.get(0, 1), None);
        assert_eq!(t.get(1, 0), None);
        assert_eq!(t.get(1, 1), Some("y"));
    }

    #[test]
    fn short_rows_are_padded() {
        let mut t = Table::new("t", vec!["a".into(), "b".into(), "c".into()]);
        t.push_row(vec![Some("1".into())]);
        assert_eq!(t.rows[0].len(), 3);
    }

    #[test]
    fn require_reports_source_and_column() {
        let t = Table::from_rows("ised", &["a"], &[]);
        let err = t.require("sede_codigo").unwrap_err();
        assert_eq!(
            err,
            ConsolidateError::MissingColumn { source: "ised".into(), column: "sede_codigo".into() }
        );
    }

    #[test]
    fn attribute_lookup_falls_back_to_case_insensitive() {
        let feature = BoundaryFeature {
            attributes: BTreeMap::from([("dpto_ccdgo".to_string(), Some("05".to_string()))]),
            geometry: MultiPolygon::new(vec![]),
        };
        assert_eq!(feature.attribute("DPTO_CCDGO"), Some("05"));
        assert_eq!(feature.attribute("DPTO_CNMBR"), None);
    }
}
