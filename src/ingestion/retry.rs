//! Readiness probe for freshly created files.
//!
//! A producer may still be writing (or hold a lock on) a file when its creation event arrives.
//! [`RetryGate`] polls until the file can be opened and share-locked, with a bounded number of
//! attempts and a cancelable pause between them.

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use fs2::FileExt;

use crate::config::RetryPolicy;
use crate::execution::ShutdownSignal;

/// Outcome of [`RetryGate::wait_until_readable`].
#[derive(Debug)]
pub enum Readiness {
    /// The file opened and a shared lock was granted on attempt `attempt` (1-based).
    Ready { attempt: u32 },
    /// Every attempt failed with a transient error.
    TimedOut { attempts: u32 },
    /// The file does not exist (anymore). Not retried.
    Gone(io::Error),
    /// Shutdown was requested during a pause.
    Cancelled,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

/// Bounded wait for a file to become readable.
///
/// An attempt opens the file for reading and takes a non-blocking shared lock. A contended lock
/// or any open error other than `NotFound` counts as transient. No pause follows the last
/// attempt, so the total sleep is at most `(max_attempts - 1) * delay`.
#[derive(Debug, Clone)]
pub struct RetryGate {
    policy: RetryPolicy,
    shutdown: ShutdownSignal,
}

impl RetryGate {
    pub fn new(policy: RetryPolicy, shutdown: ShutdownSignal) -> Self {
        Self { policy, shutdown }
    }

    pub fn wait_until_readable(&self, path: &Path) -> Readiness {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match probe(path) {
                Ok(()) => return Readiness::Ready { attempt },
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Readiness::Gone(e),
                Err(_) => {}
            }
            if attempt < attempts && self.shutdown.wait_timeout(self.policy.delay()) {
                return Readiness::Cancelled;
            }
        }
        Readiness::TimedOut { attempts }
    }
}

/// One-shot form: `true` if `path` became readable within `max_attempts` polls.
pub fn wait_until_readable(path: impl AsRef<Path>, max_attempts: u32, delay: Duration) -> bool {
    RetryGate::new(RetryPolicy::new(max_attempts, delay), ShutdownSignal::new())
        .wait_until_readable(path.as_ref())
        .is_ready()
}

fn probe(path: &Path) -> io::Result<()> {
    let file = File::open(path)?;
    // Trait-qualified: newer std has inherent `File` lock methods with other signatures.
    FileExt::try_lock_shared(&file)?;
    FileExt::unlock(&file)
}
