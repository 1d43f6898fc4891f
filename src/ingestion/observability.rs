use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::quarantine::QuarantineReason;

/// Severity attached to every pipeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine decision.
    Info,
    /// The event was not handled the normal way but nothing is stuck.
    Warning,
    /// A file is stuck in the input directory; an operator has to step in.
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Decisions the pipeline reports to its observer.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started {
        input_dir: PathBuf,
    },
    /// The watcher (or the startup scan) reported a new file.
    Appeared {
        path: PathBuf,
    },
    Classified {
        path: PathBuf,
        extension: Option<String>,
        accepted: bool,
    },
    /// The file stayed locked or unreadable for every retry attempt.
    AccessTimedOut {
        path: PathBuf,
        attempts: u32,
    },
    /// Shutdown was requested while waiting for the file to become readable.
    AccessCancelled {
        path: PathBuf,
    },
    SheetConverted {
        sheet: String,
        destination: PathBuf,
    },
    OriginalRemoved {
        path: PathBuf,
    },
    /// Artifacts were committed but the original could not be removed.
    RemovalFailed {
        path: PathBuf,
        error: String,
    },
    ConversionFailed {
        path: PathBuf,
        error: String,
    },
    Quarantined {
        path: PathBuf,
        destination: PathBuf,
        reason: QuarantineReason,
    },
    QuarantineFailed {
        path: PathBuf,
        reason: QuarantineReason,
        error: String,
    },
    /// The path was gone by the time the event was handled (usually a duplicate notification).
    Vanished {
        path: PathBuf,
    },
    /// A notification arrived for a path another handler already owns; it was dropped.
    Coalesced {
        path: PathBuf,
    },
    WatcherError {
        message: String,
    },
    HandlerPanicked {
        message: String,
    },
    Stopped {
        summary: String,
    },
}

impl PipelineEvent {
    pub fn severity(&self) -> Severity {
        match self {
            PipelineEvent::Started { .. }
            | PipelineEvent::Appeared { .. }
            | PipelineEvent::Classified { .. }
            | PipelineEvent::SheetConverted { .. }
            | PipelineEvent::OriginalRemoved { .. }
            | PipelineEvent::Coalesced { .. }
            | PipelineEvent::Stopped { .. } => Severity::Info,
            PipelineEvent::AccessTimedOut { .. }
            | PipelineEvent::AccessCancelled { .. }
            | PipelineEvent::ConversionFailed { .. }
            | PipelineEvent::Quarantined { .. }
            | PipelineEvent::Vanished { .. }
            | PipelineEvent::WatcherError { .. } => Severity::Warning,
            PipelineEvent::RemovalFailed { .. }
            | PipelineEvent::QuarantineFailed { .. }
            | PipelineEvent::HandlerPanicked { .. } => Severity::Critical,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::Started { input_dir } => {
                write!(f, "Watching {} for new files", input_dir.display())
            }
            PipelineEvent::Appeared { path } => write!(f, "Created: {}", path.display()),
            PipelineEvent::Classified {
                path,
                extension,
                accepted,
            } => write!(
                f,
                "Classified {} (extension={}): {}",
                path.display(),
                extension.as_deref().unwrap_or("<none>"),
                if *accepted { "accepted" } else { "not accepted" }
            ),
            PipelineEvent::AccessTimedOut { path, attempts } => write!(
                f,
                "File {} could not be accessed after {attempts} attempts; leaving it in place",
                path.display()
            ),
            PipelineEvent::AccessCancelled { path } => write!(
                f,
                "Shutdown requested while waiting on {}; leaving it in place",
                path.display()
            ),
            PipelineEvent::SheetConverted { sheet, destination } => write!(
                f,
                "Converted sheet '{sheet}' to {}",
                destination.display()
            ),
            PipelineEvent::OriginalRemoved { path } => {
                write!(f, "Removed original file: {}", path.display())
            }
            PipelineEvent::RemovalFailed { path, error } => write!(
                f,
                "Artifacts written but original {} could not be removed: {error}",
                path.display()
            ),
            PipelineEvent::ConversionFailed { path, error } => {
                write!(f, "Conversion of {} failed: {error}", path.display())
            }
            PipelineEvent::Quarantined {
                path,
                destination,
                reason,
            } => write!(
                f,
                "{reason}: moved {} to {} for manual review",
                path.display(),
                destination.display()
            ),
            PipelineEvent::QuarantineFailed {
                path,
                reason,
                error,
            } => write!(
                f,
                "{reason}: file stuck in input folder, remove {} manually ({error})",
                path.display()
            ),
            PipelineEvent::Vanished { path } => {
                write!(f, "{} no longer exists; nothing to do", path.display())
            }
            PipelineEvent::Coalesced { path } => {
                write!(f, "{} is already being handled; duplicate notification dropped", path.display())
            }
            PipelineEvent::WatcherError { message } => write!(f, "Watcher error: {message}"),
            PipelineEvent::HandlerPanicked { message } => {
                write!(f, "Event handler panicked: {message}")
            }
            PipelineEvent::Stopped { summary } => write!(f, "Pipeline stopped ({summary})"),
        }
    }
}

/// Sink for pipeline decisions.
///
/// Each component receives one at construction and reports through it; nothing logs through a
/// global.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// An observer that fans out events to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_event(&self, event: &PipelineEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Forwards events to `tracing`. Critical events are emitted at `ERROR` with `critical = true`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event.severity() {
            Severity::Info => tracing::info!(target: "sheet_drain", "{event}"),
            Severity::Warning => tracing::warn!(target: "sheet_drain", "{event}"),
            Severity::Critical => tracing::error!(target: "sheet_drain", critical = true, "{event}"),
        }
    }
}

/// Appends one timestamped line per event to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored. The file is
    /// opened per line, so every line is on disk when `on_event` returns.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl PipelineObserver for FileObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.append_line(&format_log_line(event));
    }
}

/// `2025-09-05 14:03:11 - WARNING - message`
pub fn format_log_line(event: &PipelineEvent) -> String {
    format!(
        "{} - {} - {event}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        event.severity().label()
    )
}
