use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by pipeline components.
///
/// This is a single error enum shared by extraction, artifact writing, quarantine, watching and
/// configuration. The [`crate::router::EventRouter`] never lets one of these escape an event.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The workbook could not be opened or a sheet could not be decoded.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Delimited-text read or write error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),

    /// The filesystem watcher could not be created or attached.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A staged artifact could not be renamed into place.
    #[error("persist error: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// The worker pool could not be built.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The configuration is structurally valid JSON but semantically unusable.
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    /// The quarantine directory already holds a file with the same name.
    #[error("quarantine destination already exists: {}", destination.display())]
    QuarantineCollision { destination: PathBuf },
}

impl PipelineError {
    /// True if the failure bottoms out in an I/O `NotFound`, including one wrapped by a reader.
    ///
    /// Used to tell a file that vanished mid-conversion from one that failed to parse.
    pub fn is_not_found(&self) -> bool {
        self.io_error()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    }

    fn io_error(&self) -> Option<&io::Error> {
        match self {
            PipelineError::Io(e) => Some(e),
            PipelineError::Excel(e) => calamine_io_error(e),
            PipelineError::Csv(e) => match e.kind() {
                csv::ErrorKind::Io(e) => Some(e),
                _ => None,
            },
            PipelineError::Persist(e) => Some(&e.error),
            _ => None,
        }
    }
}

fn calamine_io_error(e: &calamine::Error) -> Option<&io::Error> {
    use calamine::{Error, OdsError, XlsError, XlsbError, XlsxError};

    match e {
        Error::Io(e) => Some(e),
        Error::Xlsx(XlsxError::Io(e)) => Some(e),
        Error::Xls(XlsError::Io(e)) => Some(e),
        Error::Xlsb(XlsbError::Io(e)) => Some(e),
        Error::Ods(OdsError::Io(e)) => Some(e),
        _ => None,
    }
}
