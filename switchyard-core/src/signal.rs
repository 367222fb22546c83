//! Readiness notification primitives.
//!
//! Queues and sockets do not own threads. They announce readiness edges to a
//! set of registered [`Notify`] watchers, and blocked callers park on a
//! [`Signal`] whose generation counter makes the check-then-wait sequence
//! free of lost wakeups.

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Receiver of readiness edges.
///
/// Implementations must be cheap and must never block or take a socket lock:
/// they run on whichever thread produced the edge.
pub trait Notify: Send + Sync {
    fn notify(&self);
}

/// Absolute deadline `timeout` from now.
///
/// `None` when the deadline is not representable (e.g. `Duration::MAX`),
/// which callers treat as waiting indefinitely.
#[must_use]
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Handle returned by `watch`, used to unregister.
pub type WatchKey = u64;

type WatcherList = SmallVec<[(WatchKey, Arc<dyn Notify>); 4]>;

/// Registered watchers of a readiness source.
#[derive(Default)]
pub struct Watchers {
    next_key: AtomicU64,
    list: Mutex<WatcherList>,
}

impl Watchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, notify: Arc<dyn Notify>) -> WatchKey {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.list.lock().push((key, notify));
        key
    }

    pub fn remove(&self, key: WatchKey) {
        self.list.lock().retain(|(k, _)| *k != key);
    }

    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.lock().is_empty()
    }

    /// Notify every watcher. The list lock is released before any callback runs.
    pub fn notify_all(&self) {
        let snapshot: SmallVec<[Arc<dyn Notify>; 4]> =
            self.list.lock().iter().map(|(_, n)| Arc::clone(n)).collect();
        for watcher in snapshot {
            watcher.notify();
        }
    }
}

impl fmt::Debug for Watchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchers").field("count", &self.len()).finish()
    }
}

/// Level-change signal with a monotonically increasing generation.
///
/// Waiters read `generation()` before checking their condition and then call
/// `wait_for_change` with that value; any `notify` in between makes the wait
/// return immediately.
#[derive(Default)]
pub struct Signal {
    generation: Mutex<u64>,
    cond: Condvar,
    watchers: Watchers,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Block until the generation differs from `seen` or `deadline` passes.
    ///
    /// Returns `false` only on timeout.
    pub fn wait_for_change(&self, seen: u64, deadline: Option<Instant>) -> bool {
        let mut generation = self.generation.lock();
        while *generation == seen {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut generation, deadline).timed_out() {
                        return *generation != seen;
                    }
                }
                None => self.cond.wait(&mut generation),
            }
        }
        true
    }

    /// Forward notifications of this signal to another watcher.
    pub fn watch(&self, notify: Arc<dyn Notify>) -> WatchKey {
        self.watchers.add(notify)
    }

    pub fn unwatch(&self, key: WatchKey) {
        self.watchers.remove(key);
    }
}

impl Notify for Signal {
    fn notify(&self) {
        {
            let mut generation = self.generation.lock();
            *generation = generation.wrapping_add(1);
        }
        self.cond.notify_all();
        self.watchers.notify_all();
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("generation", &self.generation())
            .field("watchers", &self.watchers)
            .finish()
    }
}
