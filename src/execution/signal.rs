use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A cloneable, one-way shutdown flag that sleepers can wait on.
///
/// [`Self::wait_timeout`] is the pipeline's only sleep: it returns early as soon as shutdown is
/// requested, which is what makes retry waits cancelable.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter.
    pub fn request(&self) {
        let (lock, cv) = &*self.inner;
        *guard(lock) = true;
        cv.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        *guard(&self.inner.0)
    }

    /// Sleep for `timeout` or until shutdown is requested.
    ///
    /// Returns `true` if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cv) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut requested = guard(lock);
        while !*requested {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            requested = match cv.wait_timeout(requested, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// Counts event handlers that have been submitted but not finished.
#[derive(Default)]
pub struct InFlight {
    count: Mutex<usize>,
    cv: Condvar,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one handler. The returned guard deregisters it on drop, including during unwind.
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = {
            let mut g = guard(&self.count);
            *g += 1;
            *g
        };
        InFlightGuard {
            tracker: Arc::clone(self),
            entered_with: now,
        }
    }

    pub fn current(&self) -> usize {
        *guard(&self.count)
    }

    /// Block until no handler is in flight.
    pub fn wait_idle(&self) {
        let mut g = guard(&self.count);
        while *g > 0 {
            g = match self.cv.wait(g) {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn leave(&self) {
        let mut g = guard(&self.count);
        *g = g.saturating_sub(1);
        if *g == 0 {
            self.cv.notify_all();
        }
    }
}

pub struct InFlightGuard {
    tracker: Arc<InFlight>,
    entered_with: usize,
}

impl InFlightGuard {
    /// In-flight count right after this handler was registered (itself included).
    pub fn entered_with(&self) -> usize {
        self.entered_with
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.leave();
    }
}

/// Paths currently owned by a handler. Each path has at most one owner.
#[derive(Default)]
pub struct PathClaims {
    held: Mutex<HashSet<PathBuf>>,
}

impl PathClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `path`, or `None` if another handler already holds it.
    pub fn try_claim(self: &Arc<Self>, path: &Path) -> Option<PathClaim> {
        if !guard(&self.held).insert(path.to_path_buf()) {
            return None;
        }
        Some(PathClaim {
            claims: Arc::clone(self),
            path: path.to_path_buf(),
        })
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        guard(&self.held).contains(path)
    }
}

/// Ownership of one path; released on drop.
pub struct PathClaim {
    claims: Arc<PathClaims>,
    path: PathBuf,
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        guard(&self.claims.held).remove(&self.path);
    }
}

// A handler that panicked must not wedge shutdown, so poisoning is ignored.
fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::{InFlight, PathClaims, ShutdownSignal};

    #[test]
    fn wait_timeout_elapses_without_request() {
        let s = ShutdownSignal::new();
        let start = Instant::now();
        assert!(!s.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn request_wakes_sleeper_early() {
        let s = ShutdownSignal::new();
        let s2 = s.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            s2.request();
        });

        let start = Instant::now();
        assert!(s.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(s.is_requested());
        t.join().unwrap();
    }

    #[test]
    fn wait_idle_returns_after_guards_drop() {
        let tracker = Arc::new(InFlight::new());
        let g1 = tracker.enter();
        let g2 = tracker.enter();
        assert_eq!(g2.entered_with(), 2);
        assert_eq!(tracker.current(), 2);

        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(g1);
            drop(g2);
        });
        tracker.wait_idle();
        assert_eq!(tracker.current(), 0);
        t.join().unwrap();
    }

    #[test]
    fn a_path_has_one_owner_until_released() {
        let claims = Arc::new(PathClaims::new());
        let path = Path::new("input/dup.csv");

        let first = claims.try_claim(path).unwrap();
        assert!(claims.try_claim(path).is_none());
        assert!(claims.try_claim(Path::new("input/other.csv")).is_some());
        assert!(claims.is_claimed(path));

        drop(first);
        assert!(!claims.is_claimed(path));
        assert!(claims.try_claim(path).is_some());
    }
}
