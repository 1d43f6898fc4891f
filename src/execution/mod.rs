//! Long-running execution of the drain pipeline.
//!
//! [`Pipeline`] owns the worker pool and the shared state event handlers need:
//!
//! - a rayon pool sized from the configuration, so independent files are handled concurrently
//! - an [`InFlight`] tracker, so shutdown can drain handlers that already started
//! - [`PathClaims`], so a path reported twice is handled by one worker at a time
//! - a [`ShutdownSignal`] that also cancels retry waits
//! - [`PipelineMetrics`] counting every disposition

mod metrics;
mod signal;

use std::any::Any;
use std::fs;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::ingestion::observability::{PipelineEvent, PipelineObserver};
use crate::router::EventRouter;
use crate::watcher::{scan_existing, DirectoryWatcher, WatchEvent};

pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};
pub use signal::{InFlight, InFlightGuard, PathClaim, PathClaims, ShutdownSignal};

// How often the dispatch loop looks at the shutdown flag while the channel is quiet.
const DISPATCH_POLL: Duration = Duration::from_millis(100);

pub struct Pipeline {
    config: PipelineConfig,
    pool: ThreadPool,
    router: Arc<EventRouter>,
    observer: Arc<dyn PipelineObserver>,
    shutdown: ShutdownSignal,
    in_flight: Arc<InFlight>,
    claims: Arc<PathClaims>,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Validate `config`, create the working directories and build the worker pool.
    pub fn new(config: PipelineConfig, observer: Arc<dyn PipelineObserver>) -> PipelineResult<Self> {
        config.validate()?;
        for dir in [&config.input_dir, &config.output_dir, &config.quarantine_dir] {
            fs::create_dir_all(dir)?;
        }

        let metrics = Arc::new(PipelineMetrics::new());
        let pool = {
            let observer = Arc::clone(&observer);
            let metrics = Arc::clone(&metrics);
            ThreadPoolBuilder::new()
                .num_threads(config.worker_count())
                .thread_name(|i| format!("sheet-drain-worker-{i}"))
                .panic_handler(move |payload| {
                    metrics.on_handler_panic();
                    observer.on_event(&PipelineEvent::HandlerPanicked {
                        message: panic_message(&*payload),
                    });
                })
                .build()?
        };

        let shutdown = ShutdownSignal::new();
        let router = Arc::new(EventRouter::new(
            &config,
            shutdown.clone(),
            Arc::clone(&observer),
        ));

        Ok(Self {
            config,
            pool,
            router,
            observer,
            shutdown,
            in_flight: Arc::new(InFlight::new()),
            claims: Arc::new(PathClaims::new()),
            metrics,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle used to stop [`Self::run`] from another thread or a signal handler.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Hand one event to the worker pool. Returns immediately.
    ///
    /// An event whose path is still being handled by another worker is dropped.
    pub fn submit(&self, event: WatchEvent) {
        let guard = self.in_flight.enter();
        self.metrics.on_event_received(guard.entered_with());

        let Some(claim) = self.claims.try_claim(event.path()) else {
            self.metrics.on_coalesced();
            self.emit(PipelineEvent::Coalesced {
                path: event.path().to_path_buf(),
            });
            return;
        };

        let router = Arc::clone(&self.router);
        let metrics = Arc::clone(&self.metrics);
        self.pool.spawn(move || {
            // Held until the handler returns or unwinds.
            let _guard = guard;
            let _claim = claim;
            let disposition = router.handle(&event);
            metrics.on_disposition(&disposition);
        });
    }

    /// Block until every submitted event has been handled.
    pub fn wait_idle(&self) {
        self.in_flight.wait_idle();
    }

    /// Watch the input directory until shutdown is requested.
    ///
    /// Files already present are picked up first when `scan_existing` is set. On shutdown no new
    /// events are dispatched, handlers already running finish, and the final metrics are
    /// returned.
    pub fn run(&self) -> PipelineResult<PipelineMetricsSnapshot> {
        self.emit(PipelineEvent::Started {
            input_dir: self.config.input_dir.clone(),
        });

        let (tx, rx) = mpsc::channel();
        // Watch before scanning: a file landing in between is reported twice rather than never.
        let watcher = DirectoryWatcher::start(
            &self.config.input_dir,
            self.config.debounce(),
            tx.clone(),
            Arc::clone(&self.observer),
        )?;
        if self.config.scan_existing {
            let found = scan_existing(&self.config.input_dir, &tx);
            tracing::debug!(found, "startup scan queued existing files");
        }
        drop(tx);

        self.dispatch(&rx);
        watcher.stop();
        Ok(self.finish())
    }

    /// Dispatch events from `rx` until it disconnects or shutdown is requested, then drain.
    ///
    /// This is [`Self::run`] without the directory watcher.
    pub fn run_with_events(&self, rx: Receiver<WatchEvent>) -> PipelineMetricsSnapshot {
        self.dispatch(&rx);
        self.finish()
    }

    fn dispatch(&self, rx: &Receiver<WatchEvent>) {
        while !self.shutdown.is_requested() {
            match rx.recv_timeout(DISPATCH_POLL) {
                Ok(event) => self.submit(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn finish(&self) -> PipelineMetricsSnapshot {
        self.wait_idle();
        let snapshot = self.metrics.snapshot();
        self.emit(PipelineEvent::Stopped {
            summary: snapshot.to_string(),
        });
        snapshot
    }

    fn emit(&self, event: PipelineEvent) {
        self.observer.on_event(&event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    use super::{panic_message, Pipeline};
    use crate::config::{PipelineConfig, RetryPolicy};
    use crate::ingestion::observability::{PipelineEvent, PipelineObserver, Severity};
    use crate::watcher::WatchEvent;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl PipelineObserver for Recording {
        fn on_event(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn config_in(root: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            input_dir: root.join("input"),
            output_dir: root.join("output"),
            quarantine_dir: root.join("manrev"),
            log_file: None,
            workers: Some(4),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn new_creates_working_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let _pipeline = Pipeline::new(config.clone(), Arc::new(Recording::default())).unwrap();

        assert!(config.input_dir.is_dir());
        assert!(config.output_dir.is_dir());
        assert!(config.quarantine_dir.is_dir());
    }

    #[test]
    fn invalid_config_is_rejected_before_anything_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.workers = Some(0);
        assert!(Pipeline::new(config.clone(), Arc::new(Recording::default())).is_err());
        assert!(!config.output_dir.exists());
    }

    #[test]
    fn run_with_events_handles_files_concurrently_and_drains() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let observer = Arc::new(Recording::default());
        let pipeline = Pipeline::new(config.clone(), observer.clone()).unwrap();

        let (tx, rx) = mpsc::channel();
        for i in 0..8 {
            let path = config.input_dir.join(format!("batch{i}.csv"));
            std::fs::write(&path, format!("id,value\n{i},x\n")).unwrap();
            tx.send(WatchEvent::Appeared(path)).unwrap();
        }
        let notes = config.input_dir.join("notes.txt");
        std::fs::write(&notes, b"hello").unwrap();
        tx.send(WatchEvent::Appeared(notes)).unwrap();
        drop(tx);

        let summary = pipeline.run_with_events(rx);
        assert_eq!(summary.events_received, 9);
        assert_eq!(summary.files_converted, 8);
        assert_eq!(summary.artifacts_written, 8);
        assert_eq!(summary.files_quarantined, 1);
        assert_eq!(summary.failures, 0);

        for i in 0..8 {
            let artifact = config.output_dir.join(format!("batch{i}-batch{i}.csv"));
            assert_eq!(
                std::fs::read_to_string(artifact).unwrap(),
                format!("id\tvalue\n{i}\tx\n")
            );
        }
        assert!(config.quarantine_dir.join("notes.txt").is_file());
        assert_eq!(std::fs::read_dir(&config.input_dir).unwrap().count(), 0);

        let events = observer.events.lock().unwrap();
        assert!(matches!(events.last(), Some(PipelineEvent::Stopped { .. })));
    }

    #[test]
    fn requested_shutdown_stops_dispatching() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let pipeline = Pipeline::new(config.clone(), Arc::new(Recording::default())).unwrap();

        let path: PathBuf = config.input_dir.join("late.csv");
        std::fs::write(&path, b"a\n1\n").unwrap();
        let (tx, rx) = mpsc::channel();
        tx.send(WatchEvent::Appeared(path.clone())).unwrap();

        pipeline.shutdown_signal().request();
        let summary = pipeline.run_with_events(rx);

        assert_eq!(summary.events_received, 0);
        assert!(path.is_file());
        drop(tx);
    }

    #[test]
    fn a_path_reported_twice_is_converted_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            retry: RetryPolicy::new(10, std::time::Duration::from_millis(100)),
            ..config_in(dir.path())
        };
        let observer = Arc::new(Recording::default());
        let pipeline = Pipeline::new(config.clone(), observer.clone()).unwrap();

        let path = config.input_dir.join("dup.csv");
        std::fs::write(&path, b"id\n1\n").unwrap();
        // Keep the first handler busy retrying so the second report arrives while it owns the path.
        let file = std::fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
        fs2::FileExt::lock_exclusive(&file).unwrap();
        let unlock = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(250));
            fs2::FileExt::unlock(&file).unwrap();
        });

        let (tx, rx) = mpsc::channel();
        tx.send(WatchEvent::Appeared(path.clone())).unwrap();
        tx.send(WatchEvent::Appeared(path.clone())).unwrap();
        drop(tx);

        let summary = pipeline.run_with_events(rx);
        unlock.join().unwrap();

        assert_eq!(summary.events_received, 2);
        assert_eq!(summary.coalesced, 1);
        assert_eq!(summary.files_converted, 1);
        assert_eq!(summary.failures, 0);
        assert!(!path.exists());
        assert!(config.output_dir.join("dup-dup.csv").is_file());

        let events = observer.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::Coalesced { .. })));
        assert!(!events.iter().any(|e| e.severity() == Severity::Critical));
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42_u8), "handler panicked");
    }
}
