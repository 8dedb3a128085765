//! Reference geometry: municipality and department boundary sets.
//!
//! Layers are reprojected to geographic WGS84 once, at construction, and
//! never per row. The municipality set carries a bounding-box prefilter and a
//! precomputed representative point per polygon.

use std::collections::{BTreeMap, HashMap};

use geo::{BoundingRect, Centroid, Contains, Coord, InteriorPoint, MapCoords, MultiPolygon, Point, Rect};

use crate::codes::{canonical_code, defect_error, CodeKind};
use crate::config::{DepartmentLayerConfig, MunicipalityLayerConfig};
use crate::error::ConsolidateError;
use crate::table::BoundaryLayer;

// ---------------------------------------------------------------------------
// Reference frames
// ---------------------------------------------------------------------------

const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326 / OGC CRS84, degrees.
    Wgs84,
    /// EPSG:4686 MAGNA-SIRGAS; coincident with WGS84 at cadastral precision.
    MagnaSirgas,
    /// EPSG:3857 spherical web mercator, metres.
    WebMercator,
}

impl Crs {
    /// Parse `EPSG:4326`, `4326`, `urn:ogc:def:crs:EPSG::4326`, `...:CRS84`.
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Self::Wgs84);
        }
        let code = upper.rsplit(':').next().unwrap_or(&upper);
        match code {
            "4326" => Some(Self::Wgs84),
            "4686" => Some(Self::MagnaSirgas),
            "3857" | "900913" => Some(Self::WebMercator),
            _ => None,
        }
    }

    /// Resolve a layer's frame: config override, then file declaration,
    /// then WGS84.
    pub fn resolve(layer: &BoundaryLayer, override_crs: Option<&str>) -> Result<Self, ConsolidateError> {
        match override_crs.or(layer.crs.as_deref()) {
            None => Ok(Self::Wgs84),
            Some(raw) => Self::parse(raw).ok_or_else(|| ConsolidateError::UnsupportedCrs {
                layer: layer.name.clone(),
                crs: raw.to_string(),
            }),
        }
    }

    pub fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84 | Self::MagnaSirgas)
    }
}

/// Geometry in WGS84 degrees.
pub fn to_wgs84(geometry: &MultiPolygon<f64>, crs: Crs) -> MultiPolygon<f64> {
    if crs.is_geographic() {
        return geometry.clone();
    }
    geometry.map_coords(|Coord { x, y }| Coord {
        x: (x / EARTH_RADIUS_M).to_degrees(),
        y: (2.0 * (y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
    })
}

/// Centroid when it lies inside the shape, otherwise an interior point.
pub fn representative_point(geometry: &MultiPolygon<f64>) -> Option<Point<f64>> {
    match geometry.centroid() {
        Some(c) if geometry.contains(&c) => Some(c),
        _ => geometry.interior_point(),
    }
}

// ---------------------------------------------------------------------------
// Municipalities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Municipality {
    pub code: String,
    pub department_code: Option<String>,
    pub name: Option<String>,
    pub boundary: MultiPolygon<f64>,
    bbox: Option<Rect<f64>>,
    /// Imputation target; `None` for an empty geometry.
    pub centroid: Option<Point<f64>>,
}

impl Municipality {
    pub fn new(
        code: impl Into<String>,
        department_code: Option<String>,
        name: Option<String>,
        boundary: MultiPolygon<f64>,
    ) -> Self {
        let bbox = boundary.bounding_rect();
        let centroid = representative_point(&boundary);
        Self { code: code.into(), department_code, name, boundary, bbox, centroid }
    }

    /// Strict containment: points on the boundary line are not within.
    pub fn contains(&self, point: &Point<f64>) -> bool {
        let Some(bbox) = self.bbox else {
            return false;
        };
        let (min, max) = (bbox.min(), bbox.max());
        if point.x() < min.x || point.x() > max.x || point.y() < min.y || point.y() > max.y {
            return false;
        }
        self.boundary.contains(point)
    }
}

/// Read-only municipality boundary set, unique by code.
#[derive(Debug, Clone, Default)]
pub struct MunicipalityIndex {
    entries: Vec<Municipality>,
    by_code: HashMap<String, usize>,
}

impl MunicipalityIndex {
    pub fn from_municipalities(
        municipalities: Vec<Municipality>,
    ) -> Result<Self, ConsolidateError> {
        let mut by_code = HashMap::with_capacity(municipalities.len());
        for (i, m) in municipalities.iter().enumerate() {
            if by_code.insert(m.code.clone(), i).is_some() {
                return Err(ConsolidateError::DuplicateReferenceKey {
                    table: "municipalities".into(),
                    key: m.code.clone(),
                });
            }
        }
        Ok(Self { entries: municipalities, by_code })
    }

    /// Build from a layer: standardise codes, reject duplicates, reproject.
    pub fn from_layer(
        layer: &BoundaryLayer,
        config: &MunicipalityLayerConfig,
    ) -> Result<Self, ConsolidateError> {
        let crs = Crs::resolve(layer, config.crs.as_deref())?;
        if crs != Crs::Wgs84 {
            tracing::info!(layer = %layer.name, ?crs, "reprojecting boundary layer to WGS84");
        }

        let mut municipalities = Vec::with_capacity(layer.features.len());
        for (i, feature) in layer.features.iter().enumerate() {
            let raw_code = layer.require_attribute(i, feature, &config.code)?;
            let code = canonical_code(raw_code, CodeKind::Municipality).map_err(|d| {
                defect_error(d, CodeKind::Municipality, &layer.name, &config.code, i + 1, raw_code)
            })?;
            let raw_dept = layer.require_attribute(i, feature, &config.department_code)?;
            let department_code = canonical_code(raw_dept, CodeKind::Department).map_err(|d| {
                defect_error(d, CodeKind::Department, &layer.name, &config.department_code, i + 1, raw_dept)
            })?;
            let name = feature.attribute(&config.name).map(str::to_string);

            municipalities.push(Municipality::new(
                code,
                Some(department_code),
                name,
                to_wgs84(&feature.geometry, crs),
            ));
        }

        Self::from_municipalities(municipalities)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Municipality> {
        self.by_code.get(code).map(|&i| &self.entries[i])
    }

    /// Codes of every municipality strictly containing the point.
    pub fn containing(&self, point: &Point<f64>) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|m| m.contains(point))
            .map(|m| m.code.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Departments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Department {
    pub code: String,
    pub name: Option<String>,
}

/// Department reference table, unique by code. Geometry is not needed by
/// any stage and is not retained.
#[derive(Debug, Clone, Default)]
pub struct DepartmentIndex {
    by_code: BTreeMap<String, Department>,
}

impl DepartmentIndex {
    pub fn from_departments(departments: Vec<Department>) -> Result<Self, ConsolidateError> {
        let mut by_code = BTreeMap::new();
        for d in departments {
            if by_code.contains_key(&d.code) {
                return Err(ConsolidateError::DuplicateReferenceKey {
                    table: "departments".into(),
                    key: d.code,
                });
            }
            by_code.insert(d.code.clone(), d);
        }
        Ok(Self { by_code })
    }

    pub fn from_layer(
        layer: &BoundaryLayer,
        config: &DepartmentLayerConfig,
    ) -> Result<Self, ConsolidateError> {
        // Frame is still validated even though geometry is dropped
        Crs::resolve(layer, config.crs.as_deref())?;

        let mut departments = Vec::with_capacity(layer.features.len());
        for (i, feature) in layer.features.iter().enumerate() {
            let raw = layer.require_attribute(i, feature, &config.code)?;
            let code = canonical_code(raw, CodeKind::Department)
                .map_err(|d| defect_error(d, CodeKind::Department, &layer.name, &config.code, i + 1, raw))?;
            departments.push(Department {
                code,
                name: feature.attribute(&config.name).map(str::to_string),
            });
        }
        Self::from_departments(departments)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Department> {
        self.by_code.get(code)
    }
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

/// Axis-aligned square as a one-part MultiPolygon.
pub fn square(min_x: f64, min_y: f64, size: f64) -> MultiPolygon<f64> {
    let ring = vec![
        (min_x, min_y),
        (min_x + size, min_y),
        (min_x + size, min_y + size),
        (min_x, min_y + size),
        (min_x, min_y),
    ];
    MultiPolygon::new(vec![geo::Polygon::new(ring.into(), vec![])])
}
