//! Format dispatch for extraction.
//!
//! [`SheetExtractor::extract`] turns an accepted input file into a [`Workbook`], choosing the
//! reader from the file extension.

use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::Workbook;

use super::csv::read_csv_workbook;
use super::excel::read_excel_workbook;

/// Input formats the extractor can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Comma-separated values, passed through as one sheet.
    Csv,
    /// Spreadsheet/workbook formats read through calamine.
    Excel,
}

impl InputFormat {
    /// Parse an input format from a file extension (case-insensitive, without the dot).
    ///
    /// Whether a file is *accepted* is decided by the configured extension set, not here.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|s| s.to_str())
            .and_then(Self::from_extension)
    }
}

/// Opens a workbook and materializes every sheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct SheetExtractor;

impl SheetExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract all sheets of `path`, in declaration order.
    ///
    /// The file handle is scoped to this call; nothing stays open after it returns.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sheet_drain::ingestion::SheetExtractor;
    ///
    /// # fn main() -> Result<(), sheet_drain::PipelineError> {
    /// let workbook = SheetExtractor::new().extract("input/Q1.xlsx")?;
    /// for sheet in &workbook.sheets {
    ///     println!("{}: {} rows", sheet.name, sheet.row_count());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn extract(&self, path: impl AsRef<Path>) -> PipelineResult<Workbook> {
        let path = path.as_ref();
        match InputFormat::from_path(path) {
            Some(InputFormat::Csv) => read_csv_workbook(path),
            Some(InputFormat::Excel) => read_excel_workbook(path),
            None => Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no reader for extension of {}", path.display()),
            ))),
        }
    }
}
