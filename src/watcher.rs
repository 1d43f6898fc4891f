//! Directory watching.
//!
//! Wraps a debounced `notify` watcher and turns raw filesystem notifications into
//! [`WatchEvent`]s on a channel. Delivery is at-least-once: the same path may be reported more
//! than once, and the pipeline copes with that.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use walkdir::WalkDir;

use crate::error::PipelineResult;
use crate::ingestion::observability::{PipelineEvent, PipelineObserver};

/// Events the pipeline reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file or directory was created in, or moved into, the watched tree.
    Appeared(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Appeared(path) => path,
        }
    }
}

/// Recursive watcher on one directory. Dropping it stops the notifications.
pub struct DirectoryWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl DirectoryWatcher {
    /// Start watching `root` recursively, sending appearances to `tx`.
    ///
    /// Notifications for the same path inside `debounce` are merged. Watcher errors are reported
    /// to `observer` and do not stop the watch.
    pub fn start(
        root: impl AsRef<Path>,
        debounce: Duration,
        tx: Sender<WatchEvent>,
        observer: Arc<dyn PipelineObserver>,
    ) -> PipelineResult<Self> {
        let root = root.as_ref();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        for path in appeared_paths(&event.event) {
                            // Receiver gone means the pipeline is shutting down.
                            let _ = tx.send(WatchEvent::Appeared(path));
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        observer.on_event(&PipelineEvent::WatcherError {
                            message: error.to_string(),
                        });
                    }
                }
            }
        })?;

        debouncer.watch(root, RecursiveMode::Recursive)?;

        Ok(Self {
            _debouncer: debouncer,
        })
    }

    pub fn stop(self) {
        drop(self);
    }
}

/// Paths a notification reports as newly present.
///
/// Creations count, folders included, and so do renames whose destination is inside the tree (a
/// producer moving a finished file in).
pub fn appeared_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Send an [`WatchEvent::Appeared`] for every entry directly under `root`.
///
/// A directory is reported once as a whole and its contents are not walked, since handling it
/// moves the entire subtree. Returns the number of events sent.
pub fn scan_existing(root: impl AsRef<Path>, tx: &Sender<WatchEvent>) -> usize {
    let mut sent = 0;
    let mut it = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = it.next() {
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_dir() {
            it.skip_current_dir();
        }
        if tx.send(WatchEvent::Appeared(entry.into_path())).is_err() {
            break;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::mpsc;

    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode};
    use notify::{Event, EventKind};

    use super::{appeared_paths, scan_existing, WatchEvent};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn creations_and_moves_in_count() {
        assert_eq!(
            appeared_paths(&event(EventKind::Create(CreateKind::File), &["input/a.xlsx"])),
            vec![PathBuf::from("input/a.xlsx")]
        );
        assert_eq!(
            appeared_paths(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["input/b.csv"]
            )),
            vec![PathBuf::from("input/b.csv")]
        );
        assert_eq!(
            appeared_paths(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["input/tmp.part", "input/c.xls"]
            )),
            vec![PathBuf::from("input/c.xls")]
        );
        assert_eq!(
            appeared_paths(&event(EventKind::Create(CreateKind::Folder), &["input/sub"])),
            vec![PathBuf::from("input/sub")]
        );
    }

    #[test]
    fn other_kinds_are_ignored() {
        assert!(appeared_paths(&event(EventKind::Remove(RemoveKind::File), &["input/a.xlsx"])).is_empty());
        assert!(appeared_paths(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["input/a.xlsx"]
        ))
        .is_empty());
        assert!(appeared_paths(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["input/a.xlsx"]
        ))
        .is_empty());
    }

    #[test]
    fn scan_reports_directories_whole() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub").join("deeper")).unwrap();
        std::fs::write(dir.path().join("a.xlsx"), b"x").unwrap();
        std::fs::write(dir.path().join("sub").join("b.txt"), b"x").unwrap();

        let (tx, rx) = mpsc::channel();
        assert_eq!(scan_existing(dir.path(), &tx), 2);
        drop(tx);

        let mut got: Vec<PathBuf> = rx.iter().map(|e| e.path().to_path_buf()).collect();
        got.sort();
        assert_eq!(
            got,
            vec![dir.path().join("a.xlsx"), dir.path().join("sub")]
        );
    }

    #[test]
    fn event_exposes_its_path() {
        let e = WatchEvent::Appeared(PathBuf::from("input/a.xlsx"));
        assert_eq!(e.path(), PathBuf::from("input/a.xlsx").as_path());
    }
}
