//! Delimited-text pass-through.

use std::path::Path;

use crate::error::PipelineResult;
use crate::types::{Sheet, Value, Workbook};

/// Read a comma-separated file as a single-sheet workbook.
///
/// Rules:
///
/// - No header handling: every record, including the first, is a row.
/// - Records may have different lengths.
/// - Empty fields become [`Value::Null`]; everything else is kept verbatim as [`Value::Utf8`].
/// - The sheet is named after the file stem.
pub fn read_csv_workbook(path: impl AsRef<Path>) -> PipelineResult<Workbook> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let rows = read_csv_rows(&mut rdr)?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Workbook::new(path, vec![Sheet::new(name, rows)]))
}

/// Read all records from an existing CSV reader.
pub fn read_csv_rows<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> PipelineResult<Vec<Vec<Value>>> {
    let mut rows: Vec<Vec<Value>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(
            record
                .iter()
                .map(|raw| {
                    if raw.is_empty() {
                        Value::Null
                    } else {
                        Value::Utf8(raw.to_owned())
                    }
                })
                .collect(),
        );
    }
    Ok(rows)
}
