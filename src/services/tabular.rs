//! Tabular reader
//!
//! Turns an uploaded `.csv`, `.xlsx` or `.xls` payload into rows of raw cells.
//! No coercion happens here: text stays text, numbers stay numbers and native
//! spreadsheet dates stay dates. Interpreting cells is the normalizer's job.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::defaults::DEFAULT_HEADER_SCAN_ROWS;
use crate::error::ParseError;

// =============================================================================
// CELLS AND ROWS
// =============================================================================

/// One spreadsheet cell, as read
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Native spreadsheet date (no timezone)
    Date(NaiveDateTime),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed display text, `None` for empty cells.
    pub fn text(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.to_string().trim().to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            // Whole numbers print without ".0" so installation ids and
            // documents stored as numbers keep their digits.
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Ordered cells of one spreadsheet row
pub type RawRow = Vec<CellValue>;

/// A row together with its 1-based position in the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub number: u32,
    pub cells: RawRow,
}

impl SheetRow {
    pub fn cell(&self, index: usize) -> &CellValue {
        self.cells.get(index).unwrap_or(&CellValue::Empty)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(CellValue::is_empty)
    }
}

// =============================================================================
// FORMATS AND OPTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Format from a file name extension.
    pub fn from_filename(name: &str) -> Result<Self, ParseError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" | "xlsm" => Ok(FileFormat::Xlsx),
            "xls" => Ok(FileFormat::Xls),
            _ => Err(ParseError::UnsupportedFormat(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    /// Return spreadsheet dates as Excel serial numbers instead of dates
    pub raw_serial_dates: bool,
}

// =============================================================================
// GRID (ALL ROWS) AND TABLE (HEADER + DATA)
// =============================================================================

/// All non-blank rows of one sheet, header not yet chosen
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub rows: Vec<SheetRow>,
}

/// Header row plus the data rows below it
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    /// 1-based sheet row of the header
    pub header_row: u32,
    pub rows: Vec<SheetRow>,
}

impl Table {
    /// Header → cell text for one row, used when reporting a failing row.
    pub fn row_as_json(&self, row: &SheetRow) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (idx, header) in self.headers.iter().enumerate() {
            let key = if header.is_empty() {
                format!("col{}", idx + 1)
            } else {
                header.clone()
            };
            map.insert(key, serde_json::Value::String(row.cell(idx).to_string()));
        }
        serde_json::Value::Object(map)
    }
}

impl Grid {
    /// Use the row at `index` (into `rows`) as header; everything below is data.
    pub fn into_table(mut self, index: usize) -> Result<Table, ParseError> {
        if self.rows.is_empty() {
            return Err(ParseError::Empty);
        }
        let index = index.min(self.rows.len() - 1);
        let data = self.rows.split_off(index + 1);
        let header = self.rows.pop().ok_or(ParseError::Empty)?;

        if data.is_empty() {
            return Err(ParseError::NoDataRows);
        }

        Ok(Table {
            headers: header.cells.iter().map(|c| c.to_string().trim().to_string()).collect(),
            header_row: header.number,
            rows: data,
        })
    }

    /// Pick the header among the first `scan_rows` rows: the row with the most
    /// cells accepted by `is_header_cell` wins, earliest row on ties. Falls back
    /// to the first row when nothing scores.
    pub fn detect_header_row<F>(&self, scan_rows: usize, is_header_cell: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut best: Option<(usize, usize)> = None;

        for (idx, row) in self.rows.iter().take(scan_rows).enumerate() {
            let score = row
                .cells
                .iter()
                .filter_map(CellValue::text)
                .filter(|t| is_header_cell(t))
                .count();

            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, score)) => {
                debug!("Header detected at sheet row {} (score {})", self.rows[idx].number, score);
                idx
            }
            None => {
                warn!("No header row matched within the first {} rows, using the first row", scan_rows);
                0
            }
        }
    }
}

// =============================================================================
// READERS
// =============================================================================

/// Read the first sheet of the payload.
pub fn read_grid(bytes: &[u8], format: FileFormat, options: ReaderOptions) -> Result<Grid, ParseError> {
    match format {
        FileFormat::Csv => read_csv(bytes),
        FileFormat::Xlsx | FileFormat::Xls => {
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
            let range = workbook.worksheet_range_at(0).ok_or(ParseError::NoSheets)??;
            range_to_grid(&range, options)
        }
    }
}

/// Read the first sheet using its first row as header.
pub fn read_table(bytes: &[u8], format: FileFormat, options: ReaderOptions) -> Result<Table, ParseError> {
    read_grid(bytes, format, options)?.into_table(0)
}

/// Read every non-empty sheet as `(sheet name, grid)`. A CSV yields one
/// sheet with an empty name.
pub fn read_workbook(
    bytes: &[u8],
    format: FileFormat,
    options: ReaderOptions,
) -> Result<Vec<(String, Grid)>, ParseError> {
    match format {
        FileFormat::Csv => Ok(vec![(String::new(), read_csv(bytes)?)]),
        FileFormat::Xlsx | FileFormat::Xls => {
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
            let names = workbook.sheet_names();
            if names.is_empty() {
                return Err(ParseError::NoSheets);
            }

            let mut sheets = Vec::with_capacity(names.len());
            for name in names {
                let range = workbook.worksheet_range(&name)?;
                match range_to_grid(&range, options) {
                    Ok(grid) => sheets.push((name, grid)),
                    Err(ParseError::Empty) => debug!("Sheet '{}' is empty, skipping", name),
                    Err(e) => return Err(e),
                }
            }
            Ok(sheets)
        }
    }
}

fn read_csv(bytes: &[u8]) -> Result<Grid, ParseError> {
    let text = decode_text(bytes);
    let delimiter = sniff_delimiter(&text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = SheetRow {
            // csv skips blank lines, so prefer the physical line number
            number: record.position().map_or(idx as u32 + 1, |p| p.line() as u32),
            cells: record
                .iter()
                .map(|v| {
                    let v = v.trim();
                    if v.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(v.to_string())
                    }
                })
                .collect(),
        };
        if !row.is_blank() {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(Grid { rows })
}

/// UTF-8 (BOM stripped) or, failing that, Windows-1252 as saved by Excel.
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded
        }
    }
}

/// Pick `;`, `,` or tab by how consistently it splits the first lines: the
/// candidate whose most common per-line count is shared by the most lines
/// wins, then the higher count. A stray comma in a title line loses to the
/// separator that repeats on the header and every data row.
fn sniff_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(DEFAULT_HEADER_SCAN_ROWS)
        .collect();

    [b';', b',', b'\t']
        .into_iter()
        .filter_map(|d| {
            let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
            for line in &lines {
                let n = line.bytes().filter(|b| *b == d).count();
                if n > 0 {
                    *counts.entry(n).or_default() += 1;
                }
            }
            counts
                .into_iter()
                .max_by_key(|&(per_line, hits)| (hits, per_line))
                .map(|(per_line, hits)| (d, hits, per_line))
        })
        .max_by(|a, b| (a.1, a.2).cmp(&(b.1, b.2)).then(a.0.cmp(&b.0)))
        .map_or(b',', |(d, _, _)| d)
}

fn range_to_grid(range: &Range<Data>, options: ReaderOptions) -> Result<Grid, ParseError> {
    let first_row = range.start().map_or(0, |(r, _)| r);

    let rows: Vec<SheetRow> = range
        .rows()
        .enumerate()
        .map(|(idx, cells)| SheetRow {
            number: first_row + idx as u32 + 1,
            cells: cells.iter().map(|c| convert_cell(c, options)).collect(),
        })
        .filter(|row| !row.is_blank())
        .collect();

    if rows.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(Grid { rows })
}

fn convert_cell(cell: &Data, options: ReaderOptions) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.trim().to_string()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => {
            if options.raw_serial_dates {
                CellValue::Number(dt.as_f64())
            } else {
                dt.as_datetime()
                    .map_or(CellValue::Number(dt.as_f64()), CellValue::Date)
            }
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => {
            debug!("Cell error {:?} read as empty", e);
            CellValue::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    fn grid_of(rows: &[&[&str]]) -> Grid {
        Grid {
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, cells)| SheetRow {
                    number: i as u32 + 1,
                    cells: cells.iter().map(|c| CellValue::Text(c.to_string())).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_read_csv_semicolon_with_bom() {
        let csv = "\u{feff}Nome;CPF;Telefone\nAna;529.982.247-25;41 9999-0000\n";
        let table = read_table(csv.as_bytes(), FileFormat::Csv, ReaderOptions::default()).unwrap();

        assert_eq!(table.headers, vec!["Nome", "CPF", "Telefone"]);
        assert_eq!(table.header_row, 1);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].number, 2);
        assert_eq!(table.rows[0].cell(1), &CellValue::Text("529.982.247-25".into()));
    }

    #[test]
    fn test_read_csv_comma_and_blank_rows_dropped() {
        let csv = "Nome,CPF\nAna,1\n,\n\nBeto,2\n";
        let table = read_table(csv.as_bytes(), FileFormat::Csv, ReaderOptions::default()).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].cell(0), &CellValue::Text("Beto".into()));
    }

    #[test]
    fn test_read_csv_windows_1252() {
        // "Endereço;Cidade\nRua A;São Paulo" saved by Excel in cp1252
        let bytes = b"Endere\xe7o;Cidade\nRua A;S\xe3o Paulo\n".to_vec();
        let table = read_table(&bytes, FileFormat::Csv, ReaderOptions::default()).unwrap();

        assert_eq!(table.headers[0], "Endereço");
        assert_eq!(table.rows[0].cell(1), &CellValue::Text("São Paulo".into()));
    }

    #[test]
    fn test_delimiter_sniffed_past_title_line() {
        let csv = "Relatório de Faturas\nInstalação;Valor\n123;1,50\n";
        let grid = read_grid(csv.as_bytes(), FileFormat::Csv, ReaderOptions::default()).unwrap();

        assert_eq!(grid.rows[1].cells.len(), 2);
        assert_eq!(grid.rows[2].cell(1), &CellValue::Text("1,50".into()));
    }

    #[test]
    fn test_comma_in_title_does_not_pick_delimiter() {
        let csv = "Distribuidora Energia Sul, Relatório de Faturas\n\
            Instalação;Valor;Vencimento\n\
            3001;10,00;25/12/2024\n\
            3002;1.250,00;10/01/2025\n";
        let grid = read_grid(csv.as_bytes(), FileFormat::Csv, ReaderOptions::default()).unwrap();

        assert_eq!(grid.rows[0].cells.len(), 1);
        assert_eq!(grid.rows[1].cells.len(), 3);
        assert_eq!(grid.rows[2].cell(1), &CellValue::Text("10,00".into()));
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2,5;3\n"), b';');
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("single column\nvalue\n"), b',');
    }

    #[test]
    fn test_header_only_is_no_data_rows() {
        let err = read_table(b"Nome;CPF\n", FileFormat::Csv, ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::NoDataRows));
    }

    #[test]
    fn test_empty_payload_is_parse_error() {
        let err = read_table(b"\n\n", FileFormat::Csv, ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }

    #[test]
    fn test_garbage_xlsx_is_parse_error() {
        let err = read_grid(b"not a zip file", FileFormat::Xlsx, ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Spreadsheet(_)));
    }

    #[test]
    fn test_format_from_filename() {
        assert_eq!(FileFormat::from_filename("base.CSV").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_filename("faturas.xlsx").unwrap(), FileFormat::Xlsx);
        assert_eq!(FileFormat::from_filename("antigo.xls").unwrap(), FileFormat::Xls);
        assert!(FileFormat::from_filename("notas.pdf").is_err());
    }

    #[test]
    fn test_detect_header_row_skips_preamble() {
        let grid = grid_of(&[
            &["Relatório de Faturas"],
            &["Distribuidora X"],
            &["Instalação", "Valor", "Vencimento"],
            &["123", "10,00", "10/01/2025"],
        ]);
        let idx = grid.detect_header_row(50, |t| {
            let t = t.to_lowercase();
            t.contains("valor") || t.contains("vencimento")
        });
        assert_eq!(idx, 2);
    }

    #[test]
    fn test_detect_header_row_falls_back_to_first() {
        let grid = grid_of(&[&["a", "b"], &["c", "d"]]);
        assert_eq!(grid.detect_header_row(50, |_| false), 0);
    }

    #[test]
    fn test_detect_header_row_respects_scan_limit() {
        let grid = grid_of(&[&["x"], &["x"], &["valor"]]);
        assert_eq!(grid.detect_header_row(2, |t| t == "valor"), 0);
    }

    #[test]
    fn test_number_display_keeps_digits() {
        assert_eq!(CellValue::Number(3001234567.0).to_string(), "3001234567");
        assert_eq!(CellValue::Number(12.5).to_string(), "12.5");
    }

    /// One-sheet `.xlsx` with a title above the header at sheet row 3.
    fn invoice_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Faturas").unwrap();
        sheet.write_string(0, 0, "Relatório de Faturas").unwrap();
        sheet.write_string(2, 0, "Instalação").unwrap();
        sheet.write_string(2, 1, "Vencimento").unwrap();
        sheet.write_number(3, 0, 3001234567.0).unwrap();
        let date = ExcelDateTime::from_ymd(2024, 12, 25).unwrap();
        let format = Format::new().set_num_format("dd/mm/yyyy");
        sheet.write_datetime_with_format(3, 1, &date, &format).unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_read_xlsx_keeps_sheet_row_numbers_and_native_types() {
        let grid = read_grid(&invoice_workbook(), FileFormat::Xlsx, ReaderOptions::default()).unwrap();

        let numbers: Vec<u32> = grid.rows.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 3, 4]);
        assert_eq!(grid.rows[1].cell(0), &CellValue::Text("Instalação".into()));
        assert_eq!(grid.rows[2].cell(0), &CellValue::Number(3001234567.0));

        let expected = chrono::NaiveDate::from_ymd_opt(2024, 12, 25)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(grid.rows[2].cell(1), &CellValue::Date(expected));
    }

    #[test]
    fn test_read_xlsx_raw_serial_dates() {
        let options = ReaderOptions { raw_serial_dates: true };
        let grid = read_grid(&invoice_workbook(), FileFormat::Xlsx, options).unwrap();

        assert_eq!(grid.rows[2].cell(1), &CellValue::Number(45651.0));
    }

    #[test]
    fn test_read_workbook_skips_empty_sheets() {
        let mut workbook = Workbook::new();
        let clients = workbook.add_worksheet();
        clients.set_name("Clientes").unwrap();
        clients.write_string(0, 0, "Nome").unwrap();
        clients.write_string(1, 0, "Ana").unwrap();
        workbook.add_worksheet().set_name("Resumo").unwrap();
        let invoices = workbook.add_worksheet();
        invoices.set_name("Faturas").unwrap();
        invoices.write_string(0, 0, "Instalação").unwrap();
        invoices.write_number(1, 0, 42.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheets = read_workbook(&bytes, FileFormat::Xlsx, ReaderOptions::default()).unwrap();
        let names: Vec<&str> = sheets.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Clientes", "Faturas"]);
        assert_eq!(sheets[1].1.rows[1].cell(0), &CellValue::Number(42.0));
    }

    #[test]
    fn test_row_as_json_uses_headers() {
        let table = grid_of(&[&["Nome", ""], &["Ana", "x"]]).into_table(0).unwrap();
        let json = table.row_as_json(&table.rows[0]);
        assert_eq!(json["Nome"], "Ana");
        assert_eq!(json["col2"], "x");
    }
}
