// Excel import (xlsx, xls, xlsb, ods)

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate};

use sedes_consolidate::table::normalize_cell;
use sedes_consolidate::{Cell, Table};

/// Read one worksheet into a table. The first non-empty row of the used
/// range is the header. `sheet` defaults to the first worksheet.
pub fn read_table(path: &Path, name: &str, sheet: Option<&str>) -> Result<Table, String> {
    let range = open_range(path, sheet)?;
    let mut rows = range.rows().skip_while(|row| row.iter().all(|c| render_cell(c).is_none()));

    let header = match rows.next() {
        Some(row) => header_names(row),
        None => return Err("worksheet is empty".to_string()),
    };

    let mut table = Table::new(name, header);
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(render_cell).collect();
        if cells.iter().all(Option::is_none) {
            continue;
        }
        table.push_row(cells);
    }
    Ok(table)
}

/// Header row of a worksheet.
pub fn read_header(path: &Path, sheet: Option<&str>) -> Result<Vec<String>, String> {
    let range = open_range(path, sheet)?;
    range
        .rows()
        .find(|row| row.iter().any(|c| render_cell(c).is_some()))
        .map(header_names)
        .ok_or_else(|| "worksheet is empty".to_string())
}

fn open_range(path: &Path, sheet: Option<&str>) -> Result<Range<Data>, String> {
    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| "Excel file contains no sheets".to_string())?,
    };

    workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| format!("Failed to read sheet '{}': {}", sheet_name, e))
}

fn header_names(row: &[Data]) -> Vec<String> {
    row.iter()
        .enumerate()
        .map(|(i, c)| render_cell(c).unwrap_or_else(|| format!("column_{}", i + 1)))
        .collect()
}

/// Render a spreadsheet value as source text.
///
/// Integral floats lose their decimal part (`5001.0` -> `5001`) so codes and
/// years read the same as in a CSV export.
pub fn render_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => None,
        Data::String(s) => normalize_cell(s),
        Data::Float(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                Some(format!("{}", *n as i64))
            } else {
                Some(format!("{}", n))
            }
        }
        Data::Int(n) => Some(n.to_string()),
        Data::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => Some(format!("#{:?}", e)),
        Data::DateTime(dt) => Some(render_serial(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => normalize_cell(s),
    }
}

/// Excel serial (1900 system) as ISO date, or date-time when it has a time part.
fn render_serial(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0)) else {
        return serial.to_string();
    };
    let millis = (serial * 86_400_000.0).round() as i64;
    let datetime = epoch + Duration::milliseconds(millis);
    if serial.fract() == 0.0 {
        datetime.format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    #[test]
    fn test_render_cell() {
        assert_eq!(render_cell(&Data::Float(5001.0)), Some("5001".into()));
        assert_eq!(render_cell(&Data::Float(6.25)), Some("6.25".into()));
        assert_eq!(render_cell(&Data::Int(2022)), Some("2022".into()));
        assert_eq!(render_cell(&Data::Bool(true)), Some("TRUE".into()));
        assert_eq!(render_cell(&Data::String("  ".into())), None);
        assert_eq!(render_cell(&Data::Empty), None);
    }

    #[test]
    fn test_render_serial() {
        assert_eq!(render_serial(44927.0), "2023-01-01");
        assert_eq!(render_serial(44927.5), "2023-01-01T12:00:00");
    }

    #[test]
    fn test_read_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rectores.xlsx");

        let mut workbook = Workbook::new();
        let first = workbook.add_worksheet();
        first.set_name("Portada").unwrap();
        first.write_string(0, 0, "ignorar").unwrap();

        let sheet = workbook.add_worksheet();
        sheet.set_name("Rectores").unwrap();
        sheet.write_string(0, 0, "PRECAR_E").unwrap();
        sheet.write_string(0, 1, "nombre").unwrap();
        sheet.write_string(0, 2, "cod_mpio").unwrap();
        sheet.write_string(1, 0, "105001000001").unwrap();
        sheet.write_string(1, 1, "Ana").unwrap();
        sheet.write_number(1, 2, 5001.0).unwrap();
        sheet.write_string(3, 0, "105001000002").unwrap();
        workbook.save(&path).unwrap();

        let table = read_table(&path, "rectors", Some("Rectores")).unwrap();
        assert_eq!(table.columns, vec!["PRECAR_E", "nombre", "cod_mpio"]);
        // Blank row 3 is skipped
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, 2), Some("5001"));
        assert_eq!(table.get(1, 1), None);

        assert_eq!(read_header(&path, None).unwrap(), vec!["ignorar"]);
        assert!(read_table(&path, "rectors", Some("Missing")).is_err());
    }
}
