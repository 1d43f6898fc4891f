//! Manual-review routing.
//!
//! Files the pipeline will not convert are moved, basename preserved, into the quarantine
//! directory. A failed move is reported as [`Severity::Critical`](crate::ingestion::Severity)
//! and goes no further: the file stays where it is until an operator deals with it.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::observability::{PipelineEvent, PipelineObserver};

/// Why a file is being quarantined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarantineReason {
    /// The extension is not in the accepted set.
    UnacceptableExtension,
    /// The path exists but is not a regular file.
    NotRegularFile,
    /// The extension was accepted but the content could not be parsed.
    ParseFailure,
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuarantineReason::UnacceptableExtension => "Unknown file type",
            QuarantineReason::NotRegularFile => "Not a regular file",
            QuarantineReason::ParseFailure => "Unparseable workbook",
        };
        f.write_str(s)
    }
}

/// A decision to move `path` out of the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineRecord {
    pub path: PathBuf,
    pub reason: QuarantineReason,
}

impl QuarantineRecord {
    pub fn new(path: impl AsRef<Path>, reason: QuarantineReason) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reason,
        }
    }
}

/// Moves rejected files into the manual-review directory.
pub struct QuarantineRouter {
    base_path: PathBuf,
    observer: Arc<dyn PipelineObserver>,
}

impl QuarantineRouter {
    pub fn new(base_path: impl AsRef<Path>, observer: Arc<dyn PipelineObserver>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            observer,
        }
    }

    /// Where `original` would land.
    pub fn destination_for(&self, original: &Path) -> PathBuf {
        let name = original
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "unknown".into());
        self.base_path.join(name)
    }

    /// Move the file and report the outcome.
    ///
    /// Returns the new location, or `None` if the file could not be moved. Never fails past
    /// this call.
    pub fn quarantine(&self, record: &QuarantineRecord) -> Option<PathBuf> {
        match self.relocate(&record.path) {
            Ok(destination) => {
                self.observer.on_event(&PipelineEvent::Quarantined {
                    path: record.path.clone(),
                    destination: destination.clone(),
                    reason: record.reason,
                });
                Some(destination)
            }
            Err(e) => {
                self.observer.on_event(&PipelineEvent::QuarantineFailed {
                    path: record.path.clone(),
                    reason: record.reason,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    fn relocate(&self, original: &Path) -> PipelineResult<PathBuf> {
        let destination = self.destination_for(original);

        if fs::symlink_metadata(original)?.is_dir() {
            // Directories cannot be linked; rename() may still replace an empty one.
            refuse_existing(&destination)?;
            fs::rename(original, &destination)?;
            return Ok(destination);
        }

        // link() refuses an existing destination atomically, where rename() would replace it.
        match fs::hard_link(original, &destination) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(original) {
                    let _ = fs::remove_file(&destination);
                    return Err(e.into());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::QuarantineCollision { destination });
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                copy_then_remove(original, &destination)?;
            }
            // No hard links on this filesystem.
            Err(_) => {
                refuse_existing(&destination)?;
                fs::rename(original, &destination)?;
            }
        }
        Ok(destination)
    }
}

fn refuse_existing(destination: &Path) -> PipelineResult<()> {
    if fs::symlink_metadata(destination).is_ok() {
        return Err(PipelineError::QuarantineCollision {
            destination: destination.to_path_buf(),
        });
    }
    Ok(())
}

/// Copy across filesystems. Exactly one of the two copies survives.
fn copy_then_remove(original: &Path, destination: &Path) -> PipelineResult<()> {
    let mut src = File::open(original)?;
    let mut dst = match OpenOptions::new().write(true).create_new(true).open(destination) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(PipelineError::QuarantineCollision {
                destination: destination.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let copied = io::copy(&mut src, &mut dst).and_then(|_| dst.sync_all());
    drop((src, dst));
    if let Err(e) = copied.and_then(|()| fs::remove_file(original)) {
        let _ = fs::remove_file(destination);
        return Err(e.into());
    }
    Ok(())
}
