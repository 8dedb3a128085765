// JSON run report

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use sedes_consolidate::ConsolidationResult;

/// Content fingerprint of one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFingerprint {
    pub role: String,
    pub path: String,
    pub bytes: u64,
    /// `blake3:<hex>`
    pub hash: String,
}

/// One written output and how many rows it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    pub role: String,
    pub path: String,
    pub rows: usize,
}

/// Run metadata, summary and audit counters, plus the files read and written.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    #[serde(flatten)]
    pub result: &'a ConsolidationResult,
    pub inputs: &'a [InputFingerprint],
    pub outputs: &'a [OutputRecord],
}

/// Compute blake3 hash of a file (with algorithm prefix).
pub fn fingerprint(role: &str, path: &Path) -> Result<InputFingerprint, String> {
    let contents = std::fs::read(path).map_err(|e| e.to_string())?;
    Ok(InputFingerprint {
        role: role.to_string(),
        path: path.display().to_string(),
        bytes: contents.len() as u64,
        hash: format!("blake3:{}", blake3::hash(&contents).to_hex()),
    })
}

pub fn write_report(report: &RunReport<'_>, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let file = File::create(path).map_err(|e| e.to_string())?;
    serde_json::to_writer_pretty(BufWriter::new(file), report).map_err(|e| e.to_string())
}
