//! Spreadsheet extraction via `calamine`.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::error::PipelineResult;
use crate::types::{Sheet, Value, Workbook};

/// Read every sheet of an Excel document (`.xlsx`, `.xls`, ...) into memory.
///
/// Behavior:
/// - Sheets come back in workbook declaration order
/// - Each table is anchored at A1: leading empty rows and columns are kept as empty cells
/// - Cells are passed through; dates are rendered as `%Y-%m-%d %H:%M:%S`
///
/// The workbook reader (and its file handle) is dropped before this returns, on success or
/// failure.
pub fn read_excel_workbook(path: impl AsRef<Path>) -> PipelineResult<Workbook> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;

    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        sheets.push(Sheet::new(name, range_to_rows(&range)));
    }

    Ok(Workbook::new(path, sheets))
}

fn range_to_rows(range: &Range<Data>) -> Vec<Vec<Value>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let lead_cols = start_col as usize;
    let width = lead_cols + range.width();

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(start_row as usize + range.height());
    for _ in 0..start_row {
        rows.push(vec![Value::Null; width]);
    }
    for row in range.rows() {
        let mut out = Vec::with_capacity(width);
        out.resize(lead_cols, Value::Null);
        out.extend(row.iter().map(convert_cell));
        rows.push(out);
    }
    rows
}

fn convert_cell(c: &Data) -> Value {
    match c {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) => Value::Float64(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::Utf8(s.clone()),
        Data::DateTime(dt) => Value::Utf8(
            dt.as_datetime()
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| dt.as_f64().to_string()),
        ),
        Data::DateTimeIso(s) => Value::Utf8(s.clone()),
        Data::DurationIso(s) => Value::Utf8(s.clone()),
        Data::Error(e) => Value::Utf8(e.to_string()),
    }
}
