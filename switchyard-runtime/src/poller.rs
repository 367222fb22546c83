//! Readiness multiplexing across sockets and other `Pollable` sources.
//!
//! `poll` registers one shared signal as a watcher on every source, then
//! re-reads readiness each time the signal's generation moves. Readiness is
//! only ever queried, so polling never consumes messages.

use std::sync::Arc;
use std::time::Duration;
use switchyard_core::prelude::*;
use tracing::trace;

/// One source and the events the caller is interested in.
#[derive(Clone, Copy)]
pub struct PollItem<'a> {
    source: &'a dyn Pollable,
    interest: PollEvents,
}

impl<'a> PollItem<'a> {
    pub fn new(source: &'a dyn Pollable, interest: PollEvents) -> Self {
        Self { source, interest }
    }

    pub fn readable(source: &'a dyn Pollable) -> Self {
        Self::new(source, PollEvents::IN)
    }

    pub fn writable(source: &'a dyn Pollable) -> Self {
        Self::new(source, PollEvents::OUT)
    }

    pub fn interest(&self) -> PollEvents {
        self.interest
    }

    /// `ERR` is reported whether or not it was asked for.
    fn ready(&self) -> PollEvents {
        self.source.readiness() & (self.interest | PollEvents::ERR)
    }
}

/// Unwatches every source when the poll returns, however it returns.
struct WatchGuard<'a, 'b> {
    items: &'b [PollItem<'a>],
    keys: Vec<WatchKey>,
}

impl Drop for WatchGuard<'_, '_> {
    fn drop(&mut self) {
        for (item, key) in self.items.iter().zip(&self.keys) {
            item.source.unwatch(*key);
        }
    }
}

fn collect_ready(items: &[PollItem<'_>]) -> Vec<(usize, PollEvents)> {
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let events = item.ready();
            (!events.is_empty()).then_some((i, events))
        })
        .collect()
}

/// Wait until at least one item is ready or the timeout passes.
///
/// Returns `(index, events)` for every ready item, in input order. `None`
/// waits indefinitely; `Some(Duration::ZERO)` only reports what is ready now.
/// A timeout with nothing ready yields an empty vector.
///
/// # Errors
///
/// `InvalidOption` when called with no items and no timeout.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use switchyard_core::prelude::*;
/// use switchyard_runtime::poller::{poll, PollItem};
///
/// let idle: Queue = Queue::new(4);
/// let busy: Queue = Queue::new(4);
/// busy.try_enqueue(Message::from("job")).unwrap();
///
/// let items = [PollItem::readable(&idle), PollItem::readable(&busy)];
/// let ready = poll(&items, Some(Duration::ZERO)).unwrap();
/// assert_eq!(ready, vec![(1, PollEvents::IN)]);
/// ```
pub fn poll(items: &[PollItem<'_>], timeout: Option<Duration>) -> Result<Vec<(usize, PollEvents)>> {
    if items.is_empty() {
        return match timeout {
            Some(timeout) => {
                std::thread::sleep(timeout);
                Ok(Vec::new())
            }
            None => Err(Error::invalid_option("poll with no items and no timeout")),
        };
    }

    let ready = collect_ready(items);
    if !ready.is_empty() || timeout == Some(Duration::ZERO) {
        return Ok(ready);
    }

    let deadline = timeout.and_then(deadline_after);
    let signal = Arc::new(Signal::new());
    let guard = WatchGuard {
        items,
        keys: items
            .iter()
            .map(|item| item.source.watch(Arc::clone(&signal) as Arc<dyn Notify>))
            .collect(),
    };

    loop {
        let seen = signal.generation();
        let ready = collect_ready(guard.items);
        if !ready.is_empty() {
            return Ok(ready);
        }
        if !signal.wait_for_change(seen, deadline) {
            trace!(items = items.len(), "[POLL] timed out");
            return Ok(Vec::new());
        }
    }
}
