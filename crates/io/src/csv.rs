// CSV/TSV import/export

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sedes_consolidate::table::normalize_cell;
use sedes_consolidate::{ConsolidateError, MasterTable, Sink, Table};

const UTF8_BOM: &str = "\u{feff}";

/// Read a delimited file into a table. The first record is the header.
///
/// `delimiter` overrides sniffing.
pub fn read_table(path: &Path, name: &str, delimiter: Option<u8>) -> Result<Table, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    table_from_str(&content, name, delimiter)
}

/// Header of a delimited file, without reading the body.
pub fn read_header(path: &Path, delimiter: Option<u8>) -> Result<Vec<String>, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    match reader.records().next() {
        Some(record) => Ok(header_names(&record.map_err(|e| e.to_string())?)),
        None => Err("file is empty".to_string()),
    }
}

/// Candidate delimiters. Earlier entries win ties; Colombian exports default to `;`.
const DELIMITERS: [u8; 4] = [b';', b',', b'\t', b'|'];

/// Records examined per candidate, header included.
const SNIFF_RECORDS: usize = 10;

/// Pick the delimiter under which the header splits and the body agrees with it.
///
/// Records go through the csv parser, so a quoted field holding a delimiter or
/// a line break stays one field. Candidates whose header does not split are
/// out. The rest rank by body records matching the header width, then by
/// header width. Falls back to `,`.
pub fn sniff_delimiter(content: &str) -> u8 {
    let mut best = b',';
    let mut best_shape = (0, 0);
    for delimiter in DELIMITERS {
        let Some((width, agreeing)) = shape_under(content, delimiter) else {
            continue;
        };
        if (agreeing, width) > best_shape {
            best_shape = (agreeing, width);
            best = delimiter;
        }
    }
    best
}

/// Header width and the number of following records with that width.
fn shape_under(content: &str, delimiter: u8) -> Option<(usize, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut records = reader.records().take(SNIFF_RECORDS).map_while(Result::ok);
    let width = records.next()?.len();
    if width < 2 {
        return None;
    }
    Some((width, records.filter(|r| r.len() == width).count()))
}

/// Read file as UTF-8, falling back to Windows-1252 (Excel exports).
/// A leading byte-order mark is dropped.
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            tracing::debug!(path = %path.display(), "not UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };

    Ok(match content.strip_prefix(UTF8_BOM) {
        Some(rest) => rest.to_string(),
        None => content,
    })
}

fn header_names(record: &csv::StringRecord) -> Vec<String> {
    record
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("column_{}", i + 1)
            } else {
                h.to_string()
            }
        })
        .collect()
}

pub fn table_from_str(content: &str, name: &str, delimiter: u8) -> Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => header_names(&record.map_err(|e| e.to_string())?),
        None => return Err("file is empty".to_string()),
    };

    let mut table = Table::new(name, header);
    for result in records {
        let record = result.map_err(|e| e.to_string())?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        table.push_row(record.iter().map(normalize_cell).collect());
    }

    Ok(table)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Write a master table as comma-separated UTF-8. Null cells are empty.
pub fn write_table(table: &MasterTable, path: &Path, bom: bool) -> Result<usize, String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let mut file = BufWriter::new(File::create(path).map_err(|e| e.to_string())?);
    if bom {
        file.write_all(UTF8_BOM.as_bytes()).map_err(|e| e.to_string())?;
    }

    let mut writer = csv::WriterBuilder::new().from_writer(file);
    writer.write_record(&table.columns).map_err(|e| e.to_string())?;
    for row in &table.rows {
        writer
            .write_record(row.cells.iter().map(|c| c.as_deref().unwrap_or("")))
            .map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    Ok(table.len())
}

/// CSV file sink.
#[derive(Debug, Clone)]
pub struct CsvSink {
    pub path: PathBuf,
    pub bom: bool,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, bom: bool) -> Self {
        Self { path: path.into(), bom }
    }
}

impl Sink for CsvSink {
    fn write(&mut self, table: &MasterTable) -> Result<usize, ConsolidateError> {
        write_table(table, &self.path, self.bom)
            .map_err(|e| ConsolidateError::Io(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    use sedes_consolidate::{MasterRow, PanelKey};

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "sede;anio;valor\nS1;2022;1\nS2;2023;2\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "sede,anio,valor\nS1,2022,1\nS2,2023,2\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "sede\tanio\tvalor\nS1\t2022\t1\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "sede;direccion;lat\nS1;\"Cra 1, No 2\";6,25\nS2;\"Cl 3\";6,3\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_quoted_header_field_holding_semicolon() {
        let content = "\"sede;codigo\",anio\n\"S1;01\",2022\n\"S2;02\",2023\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_quoted_line_break_counts_as_one_record() {
        let content = "sede;nota;anio\nS1;\"linea uno\nlinea dos, tres\";2022\nS2;\"x\";2023\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_header_that_splits_nowhere_falls_back_to_comma() {
        assert_eq!(sniff_delimiter("sede\nS1\nS2\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_sniff_body_agreement_beats_header_width() {
        // Header splits four ways on ',' but the body only agrees under ';'
        let content = "sede;a,b,c,d\nS1;1\nS2;2\nS3;3\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_read_table_normalises_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ised.csv");
        fs::write(&path, "sede,anio,,valor\nS1, 2022 ,x,\n,,,\nS2,2023\n").unwrap();

        let table = read_table(&path, "ised", None).unwrap();
        assert_eq!(table.columns, vec!["sede", "anio", "column_3", "valor"]);
        // Blank line dropped, short row padded
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec![Some("S1".into()), Some("2022".into()), Some("x".into()), None]);
        assert_eq!(table.rows[1], vec![Some("S2".into()), Some("2023".into()), None, None]);
    }

    #[test]
    fn test_bom_and_windows_1252() {
        let dir = tempdir().unwrap();

        let bom_path = dir.path().join("bom.csv");
        fs::write(&bom_path, "\u{feff}sede_codigo;anio\nS1;2022\n").unwrap();
        let table = read_table(&bom_path, "bom", None).unwrap();
        assert_eq!(table.columns[0], "sede_codigo");

        // "Bogotá" in Windows-1252
        let latin_path = dir.path().join("latin.csv");
        fs::write(&latin_path, b"sede,municipio\nS1,Bogot\xe1\n").unwrap();
        let table = read_table(&latin_path, "latin", None).unwrap();
        assert_eq!(table.get(0, 1), Some("Bogotá"));
    }

    #[test]
    fn test_explicit_delimiter_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipes.txt");
        fs::write(&path, "a|b,c\n1|2,3\n").unwrap();
        let table = read_table(&path, "pipes", Some(b',')).unwrap();
        assert_eq!(table.columns, vec!["a|b", "c"]);
        assert_eq!(read_header(&path, Some(b'|')).unwrap(), vec!["a", "b,c"]);
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();
        assert!(read_table(&path, "empty", None).is_err());
    }

    #[test]
    fn test_sink_writes_bom_and_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/nested/sedes.csv");
        let table = MasterTable {
            columns: vec!["site_code".into(), "reporting_year".into(), "ised_x".into()],
            rows: vec![MasterRow {
                key: PanelKey::new("S1", Some(2022)),
                cells: vec![Some("S1".into()), Some("2022".into()), None],
            }],
        };

        let mut sink = CsvSink::new(&path, true);
        assert_eq!(sink.write(&table).unwrap(), 1);

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM.as_bytes()));
        let content = String::from_utf8(bytes).unwrap();
        assert_eq!(content.trim_start_matches(UTF8_BOM), "site_code,reporting_year,ised_x\nS1,2022,\n");

        // Read back through the loader
        let back = read_table(&path, "back", None).unwrap();
        assert_eq!(back.columns, table.columns);
    }
}
