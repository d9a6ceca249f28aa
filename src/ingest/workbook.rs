//! Spreadsheet bytes → grid of trimmed cell text.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

use super::IngestError;
use crate::mapping::Grid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SheetFormat {
    Workbook,
    Delimited(u8),
}

impl SheetFormat {
    pub fn from_file_name(file_name: &str) -> Self {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".csv") || lower.ends_with(".txt") {
            Self::Delimited(b',')
        } else if lower.ends_with(".tsv") {
            Self::Delimited(b'\t')
        } else {
            Self::Workbook
        }
    }
}

/// Parses the first sheet of a workbook, or a delimited text file.
pub fn parse_grid(file_name: &str, bytes: &[u8]) -> Result<Grid, IngestError> {
    let grid = match SheetFormat::from_file_name(file_name) {
        SheetFormat::Workbook => parse_workbook(bytes)?,
        SheetFormat::Delimited(delimiter) => parse_delimited(bytes, delimiter)?,
    };
    if grid.iter().all(|row| row.iter().all(String::is_empty)) {
        return Err(IngestError::EmptySheet);
    }
    Ok(grid)
}

pub fn parse_workbook(bytes: &[u8]) -> Result<Grid, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| IngestError::Unreadable(format!("failed to open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(IngestError::EmptySheet)?
        .map_err(|e| IngestError::Unreadable(format!("failed to read first sheet: {e}")))?;

    // Ranges start at the first used cell; pad back to A1 so header rows stay 1-based.
    let (top, left) = range.start().unwrap_or((0, 0));
    let mut grid: Grid = vec![Vec::new(); top as usize];
    for row in range.rows() {
        let mut cells = vec![String::new(); left as usize];
        cells.extend(row.iter().map(cell_to_string));
        grid.push(cells);
    }
    Ok(grid)
}

pub fn parse_delimited(bytes: &[u8], delimiter: u8) -> Result<Grid, IngestError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut grid = Grid::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestError::Unreadable(format!("malformed delimited text: {e}")))?;
        grid.push(record.iter().map(|c| c.trim().to_string()).collect());
    }
    Ok(grid)
}

pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_owned(),
        Data::Float(f) => {
            // Order numbers and phone numbers often arrive as whole floats.
            if *f == f.floor() && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
        Data::Empty => String::new(),
    }
}
