//! In-memory workbook model.
//!
//! A [`Workbook`] is what the extractor hands to the artifact writer: an ordered list of named
//! [`Sheet`]s, each a row-major table of pass-through [`Value`]s. A workbook lives only for the
//! duration of one conversion.

use std::path::{Path, PathBuf};

/// A single cell value.
///
/// Values are passed through as read; no schema or type validation is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Empty cell.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string (also used for rendered dates and error cells).
    Utf8(String),
}

impl Value {
    /// Text form written into a delimited artifact.
    ///
    /// Whole floats are written without a fractional part (`3.0` becomes `3`).
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int64(i) => i.to_string(),
            Value::Float64(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Utf8(s) => s.clone(),
        }
    }
}

/// A named 2-D table of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    /// Sheet name as declared in the workbook.
    pub name: String,
    /// Row-major cell storage. Rows may differ in length.
    pub rows: Vec<Vec<Value>>,
}

impl Sheet {
    /// Create a sheet from a name and rows.
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Number of rows in the sheet.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// An opened spreadsheet: its source path and its sheets in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    /// File the workbook was read from.
    pub source: PathBuf,
    /// Sheets in file-declaration order.
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(source: impl AsRef<Path>, sheets: Vec<Sheet>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            sheets,
        }
    }

    /// Iterate sheet names in order.
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }
}
