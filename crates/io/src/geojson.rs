// GeoJSON boundary import and point export

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};

use sedes_consolidate::table::normalize_cell;
use sedes_consolidate::{BoundaryFeature, BoundaryLayer, Cell, ConsolidateError, MasterTable, Sink};

use crate::csv::read_file_as_utf8;

/// Read a polygon FeatureCollection.
pub fn read_layer(path: &Path, name: &str) -> Result<BoundaryLayer, String> {
    let content = read_file_as_utf8(path)?;
    parse_layer(&content, name)
}

/// Parse a polygon FeatureCollection. Polygon and MultiPolygon geometries
/// are accepted; a null geometry becomes an empty one. The legacy `crs`
/// member, when present, is carried as the declared reference frame.
pub fn parse_layer(content: &str, name: &str) -> Result<BoundaryLayer, String> {
    let root: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err("expected a GeoJSON FeatureCollection".to_string());
    }

    let crs = root
        .pointer("/crs/properties/name")
        .and_then(Value::as_str)
        .map(str::to_string);

    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| "FeatureCollection has no features array".to_string())?;

    let mut parsed = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let attributes = match feature.get("properties") {
            Some(Value::Object(props)) => props.iter().map(|(k, v)| (k.clone(), render_property(v))).collect(),
            _ => BTreeMap::new(),
        };
        let geometry = match feature.get("geometry") {
            None | Some(Value::Null) => MultiPolygon::new(vec![]),
            Some(g) => parse_geometry(g).map_err(|e| format!("feature {i}: {e}"))?,
        };
        parsed.push(BoundaryFeature { attributes, geometry });
    }

    Ok(BoundaryLayer { name: name.to_string(), crs, features: parsed })
}

fn render_property(value: &Value) -> Cell {
    match value {
        Value::Null => None,
        Value::String(s) => normalize_cell(s),
        Value::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Value::Number(n) => match n.as_f64() {
            // 8001.0 renders like a spreadsheet integer
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn parse_geometry(geometry: &Value) -> Result<MultiPolygon<f64>, String> {
    let kind = geometry.get("type").and_then(Value::as_str).unwrap_or("");
    let coordinates = geometry.get("coordinates").ok_or_else(|| "geometry has no coordinates".to_string())?;
    match kind {
        "Polygon" => Ok(MultiPolygon::new(vec![parse_polygon(coordinates)?])),
        "MultiPolygon" => {
            let parts = coordinates.as_array().ok_or_else(|| "MultiPolygon coordinates must be an array".to_string())?;
            let polygons = parts.iter().map(parse_polygon).collect::<Result<Vec<_>, _>>()?;
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(format!("unsupported geometry type '{other}'")),
    }
}

fn parse_polygon(rings: &Value) -> Result<Polygon<f64>, String> {
    let rings = rings.as_array().ok_or_else(|| "polygon rings must be an array".to_string())?;
    let mut parsed = rings.iter().map(parse_ring).collect::<Result<Vec<_>, _>>()?;
    if parsed.is_empty() {
        return Ok(Polygon::new(LineString::new(vec![]), vec![]));
    }
    let exterior = parsed.remove(0);
    Ok(Polygon::new(exterior, parsed))
}

fn parse_ring(ring: &Value) -> Result<LineString<f64>, String> {
    let positions = ring.as_array().ok_or_else(|| "ring must be an array of positions".to_string())?;
    let coords = positions
        .iter()
        .map(|p| {
            let x = p.get(0).and_then(Value::as_f64);
            let y = p.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(format!("invalid position {p}")),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Write a master table as a point FeatureCollection. Every column becomes a
/// property; rows without coordinates are left out. Returns rows written.
pub fn write_points(table: &MasterTable, path: &Path) -> Result<usize, String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let mut features = Vec::with_capacity(table.len());
    for row in &table.rows {
        let Some((lon, lat)) = table.coordinates(row) else {
            continue;
        };
        let properties: Map<String, Value> = table
            .columns
            .iter()
            .zip(&row.cells)
            .map(|(col, cell)| (col.clone(), cell.as_ref().map_or(Value::Null, |v| Value::String(v.clone()))))
            .collect();
        features.push(json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [lon, lat] },
            "properties": properties,
        }));
    }

    let written = features.len();
    let skipped = table.len() - written;
    if skipped > 0 {
        tracing::info!(path = %path.display(), skipped, "rows without coordinates left out of point output");
    }

    let collection = json!({ "type": "FeatureCollection", "features": features });
    let file = File::create(path).map_err(|e| e.to_string())?;
    serde_json::to_writer(BufWriter::new(file), &collection).map_err(|e| e.to_string())?;
    Ok(written)
}

/// GeoJSON point sink.
#[derive(Debug, Clone)]
pub struct GeoJsonSink {
    pub path: PathBuf,
}

impl GeoJsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Sink for GeoJsonSink {
    fn write(&mut self, table: &MasterTable) -> Result<usize, ConsolidateError> {
        write_points(table, &self.path).map_err(|e| ConsolidateError::Io(format!("{}: {e}", self.path.display())))
    }
}
