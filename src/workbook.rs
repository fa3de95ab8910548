use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use log::debug;

use crate::{
    error::{ParseError, ParseOutcome},
    raw::{RawRow, RawTable},
};

/// Renders a cell the way it would read in a text export: integral floats lose
/// their `.0`, date cells become ISO dates (or datetimes when they carry time)
/// and error cells keep their token (`#N/A`) so casting rejects them.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Error(err) => err.to_string(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.time() == chrono::NaiveTime::MIN => {
                value.date().format("%Y-%m-%d").to_string()
            }
            Some(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn workbook_error(err: impl std::fmt::Display) -> ParseError {
    ParseError::Workbook {
        detail: err.to_string(),
    }
}

/// Reads `sheet` (or the first sheet). The first row with any content is the header.
pub fn read_workbook(bytes: &[u8], sheet: Option<&str>) -> ParseOutcome<RawTable> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(workbook_error)?;
    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = match sheet {
        Some(name) => sheet_names
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| ParseError::Workbook {
                detail: format!("sheet '{name}' not found; sheets are [{}]", sheet_names.join(", ")),
            })?,
        None => sheet_names.first().cloned().ok_or_else(|| ParseError::Workbook {
            detail: "workbook has no sheets".to_string(),
        })?,
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(workbook_error)?;
    let (row_count, col_count) = range.get_size();
    debug!("Sheet '{sheet_name}': {row_count} row(s) x {col_count} column(s)");

    let start_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut table: Option<RawTable> = None;
    let mut skipped = 0usize;
    for (offset, row) in range.rows().enumerate() {
        let values = row.iter().map(cell_to_string).collect::<Vec<_>>();
        if values.iter().all(|value| value.trim().is_empty()) {
            skipped += 1;
            continue;
        }
        let line = start_row + offset + 1;
        match table.as_mut() {
            None => table = Some(RawTable::new(values)),
            Some(table) => table.rows.push(RawRow::new(line, values)),
        }
    }
    let mut table = table.unwrap_or_default();
    table.skipped_lines = skipped;
    Ok(table)
}
