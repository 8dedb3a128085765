//! `sedes-consolidate`: school-site consolidation engine.
//!
//! Pure engine crate: receives pre-loaded tables and boundary layers, returns
//! one master table keyed by (site, reporting year) plus a run summary.
//! No CLI or file dependencies.
//!
//! Stage order: code standardisation, identity homogenisation, spatial
//! validation, coordinate imputation, deduplication with reference joins,
//! indicator merge, output assembly.

pub mod assemble;
pub mod codes;
pub mod config;
pub mod consolidate;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod homogenize;
pub mod impute;
pub mod indicators;
pub mod model;
pub mod spatial;
pub mod table;

pub use assemble::{MasterRow, MasterTable, MemorySink, RunSummary, Sink};
pub use config::ConsolidateConfig;
pub use engine::{run, AuditCounts, ConsolidationResult, SourceInputs};
pub use error::ConsolidateError;
pub use model::PanelKey;
pub use table::{BoundaryFeature, BoundaryLayer, Cell, Table};
