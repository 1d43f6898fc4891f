//! Per-event orchestration.
//!
//! [`EventRouter::handle`] takes one [`WatchEvent`] from start to finish: classify the file,
//! then either convert it (wait until readable, extract, write artifacts, remove the original)
//! or quarantine it. Every decision is reported to the observer and nothing is returned as an
//! error: the outcome is a [`Disposition`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::execution::ShutdownSignal;
use crate::ingestion::observability::{PipelineEvent, PipelineObserver};
use crate::ingestion::retry::{Readiness, RetryGate};
use crate::ingestion::unified::SheetExtractor;
use crate::output::ArtifactWriter;
use crate::quarantine::{QuarantineReason, QuarantineRecord, QuarantineRouter};
use crate::watcher::WatchEvent;

/// What happened to one incoming file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// One artifact per sheet was committed. `original_removed` is false if the source could not
    /// be deleted afterwards (reported as critical).
    Converted {
        artifacts: Vec<PathBuf>,
        original_removed: bool,
    },
    /// The file now lives in the quarantine directory.
    Quarantined {
        destination: PathBuf,
        reason: QuarantineReason,
    },
    /// The file should have been quarantined but is stuck in the input directory.
    QuarantineFailed { reason: QuarantineReason },
    /// The file never became readable (or shutdown interrupted the wait); it was left in place.
    Deferred,
    /// The path no longer existed.
    Vanished,
    /// Artifacts could not be written; the original was left in place.
    Failed,
}

/// Result of classifying a path before any conversion work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Accepted,
    Rejected(QuarantineReason),
    Vanished,
}

pub struct EventRouter {
    config: PipelineConfig,
    gate: RetryGate,
    extractor: SheetExtractor,
    writer: ArtifactWriter,
    quarantine: QuarantineRouter,
    observer: Arc<dyn PipelineObserver>,
}

impl EventRouter {
    pub fn new(
        config: &PipelineConfig,
        shutdown: ShutdownSignal,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            config: config.clone(),
            gate: RetryGate::new(config.retry, shutdown),
            extractor: SheetExtractor::new(),
            writer: ArtifactWriter::from_config(config, Arc::clone(&observer)),
            quarantine: QuarantineRouter::new(&config.quarantine_dir, Arc::clone(&observer)),
            observer,
        }
    }

    /// Handle one event to completion.
    pub fn handle(&self, event: &WatchEvent) -> Disposition {
        match event {
            WatchEvent::Appeared(path) => self.handle_appeared(path),
        }
    }

    fn handle_appeared(&self, path: &Path) -> Disposition {
        self.emit(PipelineEvent::Appeared {
            path: path.to_path_buf(),
        });

        let classification = self.classify(path);
        self.emit(PipelineEvent::Classified {
            path: path.to_path_buf(),
            extension: extension_of(path),
            accepted: classification == Classification::Accepted,
        });

        match classification {
            Classification::Accepted => self.convert(path),
            Classification::Rejected(reason) => self.reject(path, reason),
            Classification::Vanished => {
                self.emit(PipelineEvent::Vanished {
                    path: path.to_path_buf(),
                });
                Disposition::Vanished
            }
        }
    }

    /// Decide what to do with `path` based on what is on disk right now.
    pub fn classify(&self, path: &Path) -> Classification {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Classification::Vanished,
            Err(_) => return Classification::Rejected(QuarantineReason::NotRegularFile),
        };
        if !metadata.is_file() {
            return Classification::Rejected(QuarantineReason::NotRegularFile);
        }

        match extension_of(path) {
            Some(ext) if self.config.accepts_extension(&ext) => Classification::Accepted,
            _ => Classification::Rejected(QuarantineReason::UnacceptableExtension),
        }
    }

    fn convert(&self, path: &Path) -> Disposition {
        match self.gate.wait_until_readable(path) {
            Readiness::Ready { .. } => {}
            Readiness::TimedOut { attempts } => {
                self.emit(PipelineEvent::AccessTimedOut {
                    path: path.to_path_buf(),
                    attempts,
                });
                return Disposition::Deferred;
            }
            Readiness::Cancelled => {
                self.emit(PipelineEvent::AccessCancelled {
                    path: path.to_path_buf(),
                });
                return Disposition::Deferred;
            }
            Readiness::Gone(_) => {
                self.emit(PipelineEvent::Vanished {
                    path: path.to_path_buf(),
                });
                return Disposition::Vanished;
            }
        }

        let workbook = match self.extractor.extract(path) {
            Ok(wb) => wb,
            Err(e) if e.is_not_found() || !exists(path) => {
                self.emit(PipelineEvent::Vanished {
                    path: path.to_path_buf(),
                });
                return Disposition::Vanished;
            }
            Err(e) => {
                self.emit(PipelineEvent::ConversionFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
                return self.reject(path, QuarantineReason::ParseFailure);
            }
        };

        let artifacts = match self.writer.write_workbook(&basename_of(path), &workbook) {
            Ok(paths) => paths,
            Err(e) => {
                self.emit(PipelineEvent::ConversionFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
                return Disposition::Failed;
            }
        };

        let original_removed = match fs::remove_file(path) {
            Ok(()) => {
                self.emit(PipelineEvent::OriginalRemoved {
                    path: path.to_path_buf(),
                });
                true
            }
            // Someone else drained it first; the input no longer holds it either way.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.emit(PipelineEvent::Vanished {
                    path: path.to_path_buf(),
                });
                true
            }
            Err(e) => {
                self.emit(PipelineEvent::RemovalFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
                false
            }
        };

        Disposition::Converted {
            artifacts,
            original_removed,
        }
    }

    fn reject(&self, path: &Path, reason: QuarantineReason) -> Disposition {
        match self.quarantine.quarantine(&QuarantineRecord::new(path, reason)) {
            Some(destination) => Disposition::Quarantined {
                destination,
                reason,
            },
            None => Disposition::QuarantineFailed { reason },
        }
    }

    fn emit(&self, event: PipelineEvent) {
        self.observer.on_event(&event);
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().into_owned())
}

/// File name without its final extension: `input/Q1.xlsx` gives `Q1`.
pub fn basename_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
