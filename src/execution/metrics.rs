use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::router::Disposition;

/// Real-time counters for a pipeline run.
///
/// The pipeline updates these as events are handled; callers can snapshot them at any time.
pub struct PipelineMetrics {
    events_received: AtomicU64,
    coalesced: AtomicU64,
    files_converted: AtomicU64,
    artifacts_written: AtomicU64,
    files_quarantined: AtomicU64,
    quarantine_failures: AtomicU64,
    deferred: AtomicU64,
    vanished: AtomicU64,
    failures: AtomicU64,

    max_in_flight: AtomicUsize,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            files_converted: AtomicU64::new(0),
            artifacts_written: AtomicU64::new(0),
            files_quarantined: AtomicU64::new(0),
            quarantine_failures: AtomicU64::new(0),
            deferred: AtomicU64::new(0),
            vanished: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn on_event_received(&self, in_flight: usize) {
        let _ = self.events_received.fetch_add(1, Ordering::SeqCst);
        update_max_usize(&self.max_in_flight, in_flight);
    }

    /// A notification was dropped because its path was already being handled.
    pub fn on_coalesced(&self) {
        let _ = self.coalesced.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_disposition(&self, disposition: &Disposition) {
        match disposition {
            Disposition::Converted {
                artifacts,
                original_removed,
            } => {
                let _ = self.files_converted.fetch_add(1, Ordering::SeqCst);
                let _ = self
                    .artifacts_written
                    .fetch_add(artifacts.len() as u64, Ordering::SeqCst);
                if !original_removed {
                    let _ = self.failures.fetch_add(1, Ordering::SeqCst);
                }
            }
            Disposition::Quarantined { .. } => {
                let _ = self.files_quarantined.fetch_add(1, Ordering::SeqCst);
            }
            Disposition::QuarantineFailed { .. } => {
                let _ = self.quarantine_failures.fetch_add(1, Ordering::SeqCst);
            }
            Disposition::Deferred => {
                let _ = self.deferred.fetch_add(1, Ordering::SeqCst);
            }
            Disposition::Vanished => {
                let _ = self.vanished.fetch_add(1, Ordering::SeqCst);
            }
            Disposition::Failed => {
                let _ = self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// A handler panicked before producing a disposition.
    pub fn on_handler_panic(&self) {
        let _ = self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            events_received: self.events_received.load(Ordering::SeqCst),
            coalesced: self.coalesced.load(Ordering::SeqCst),
            files_converted: self.files_converted.load(Ordering::SeqCst),
            artifacts_written: self.artifacts_written.load(Ordering::SeqCst),
            files_quarantined: self.files_quarantined.load(Ordering::SeqCst),
            quarantine_failures: self.quarantine_failures.load(Ordering::SeqCst),
            deferred: self.deferred.load(Ordering::SeqCst),
            vanished: self.vanished.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst
            .compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`PipelineMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineMetricsSnapshot {
    pub events_received: u64,
    pub coalesced: u64,
    pub files_converted: u64,
    pub artifacts_written: u64,
    pub files_quarantined: u64,
    pub quarantine_failures: u64,
    pub deferred: u64,
    pub vanished: u64,
    pub failures: u64,
    pub max_in_flight: usize,
}

impl fmt::Display for PipelineMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "events={}, coalesced={}, converted={}, artifacts={}, quarantined={}, quarantine_failures={}, deferred={}, vanished={}, failures={}, max_in_flight={}",
            self.events_received,
            self.coalesced,
            self.files_converted,
            self.artifacts_written,
            self.files_quarantined,
            self.quarantine_failures,
            self.deferred,
            self.vanished,
            self.failures,
            self.max_in_flight
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::PipelineMetrics;
    use crate::quarantine::QuarantineReason;
    use crate::router::Disposition;

    #[test]
    fn dispositions_update_counters() {
        let m = PipelineMetrics::new();
        m.on_event_received(1);
        m.on_event_received(3);
        m.on_event_received(2);
        m.on_disposition(&Disposition::Converted {
            artifacts: vec![PathBuf::from("output/a-1.csv"), PathBuf::from("output/a-2.csv")],
            original_removed: true,
        });
        m.on_disposition(&Disposition::Quarantined {
            destination: PathBuf::from("manrev/b.txt"),
            reason: QuarantineReason::UnacceptableExtension,
        });
        m.on_disposition(&Disposition::Deferred);
        m.on_coalesced();

        let snap = m.snapshot();
        assert_eq!(snap.events_received, 3);
        assert_eq!(snap.files_converted, 1);
        assert_eq!(snap.artifacts_written, 2);
        assert_eq!(snap.files_quarantined, 1);
        assert_eq!(snap.deferred, 1);
        assert_eq!(snap.coalesced, 1);
        assert_eq!(snap.failures, 0);
        assert_eq!(snap.max_in_flight, 3);
        assert!(snap.to_string().starts_with("events=3, coalesced=1, converted=1, artifacts=2"));
    }
}
