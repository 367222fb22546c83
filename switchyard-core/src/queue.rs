//! Bounded FIFO with high-water-mark backpressure.
//!
//! Every socket keeps one outbound and one inbound `Queue` per peer, and the
//! in-process transport builds its channels out of two of them. Callers choose
//! per operation whether to block, fail fast, or wait with a timeout.
//!
//! Invariants:
//! - `len() <= hwm` whenever `hwm > 0` (`hwm == 0` means unbounded)
//! - items come out in the order they went in
//! - after `close()` every waiter wakes, enqueue fails with `Closed`, and items
//!   already queued stay readable until drained

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::readiness::{PollEvents, Pollable};
use crate::signal::{deadline_after, Notify, WatchKey, Watchers};

/// Enqueue failure; the rejected item is handed back to the caller.
#[derive(Debug)]
pub enum EnqueueError<T> {
    /// HWM reached and the caller asked not to wait
    Full(T),
    /// Queue closed
    Closed(T),
    /// HWM still reached when the timeout elapsed
    TimedOut(T),
}

impl<T> EnqueueError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) | Self::TimedOut(item) => item,
        }
    }

    /// Drop the item and keep the error kind.
    pub fn into_error(self) -> Error {
        match self {
            Self::Full(_) => Error::Full,
            Self::Closed(_) => Error::Closed,
            Self::TimedOut(_) => Error::TimedOut,
        }
    }
}

impl<T> fmt::Display for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("queue is full"),
            Self::Closed(_) => f.write_str("queue is closed"),
            Self::TimedOut(_) => f.write_str("timed out waiting for queue space"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for EnqueueError<T> {}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded blocking queue. Defaults to carrying [`Message`]s.
pub struct Queue<T = Message> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    hwm: usize,
    watchers: Watchers,
}

impl<T> Queue<T> {
    /// Create a queue holding at most `hwm` items; 0 means unbounded.
    pub fn new(hwm: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            hwm,
            watchers: Watchers::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn hwm(&self) -> usize {
        self.hwm
    }

    #[inline]
    fn at_capacity(&self, len: usize) -> bool {
        self.hwm != 0 && len >= self.hwm
    }

    /// Append without waiting.
    pub fn try_enqueue(&self, item: T) -> std::result::Result<(), EnqueueError<T>> {
        self.enqueue(item, false, None)
    }

    /// Append an item.
    ///
    /// With `blocking == false` a full queue fails immediately with `Full`.
    /// Otherwise the call waits for space, at most `timeout` when given.
    pub fn enqueue(
        &self,
        item: T,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> std::result::Result<(), EnqueueError<T>> {
        let deadline = timeout.and_then(deadline_after);
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(EnqueueError::Closed(item));
            }
            if !self.at_capacity(state.items.len()) {
                break;
            }
            if !blocking {
                return Err(EnqueueError::Full(item));
            }
            match deadline {
                Some(deadline) => {
                    if self.not_full.wait_until(&mut state, deadline).timed_out()
                        && !state.closed
                        && self.at_capacity(state.items.len())
                    {
                        return Err(EnqueueError::TimedOut(item));
                    }
                }
                None => self.not_full.wait(&mut state),
            }
        }

        let was_empty = state.items.is_empty();
        state.items.push_back(item);
        drop(state);

        if was_empty {
            self.not_empty.notify_all();
            self.watchers.notify_all();
        }
        Ok(())
    }

    /// Remove the oldest item without waiting.
    pub fn try_dequeue(&self) -> Result<T> {
        self.dequeue(false, None)
    }

    /// Remove the oldest item.
    ///
    /// # Errors
    ///
    /// - `WouldBlock` when empty and `blocking == false`
    /// - `TimedOut` when still empty after `timeout`
    /// - `Closed` when closed and fully drained
    pub fn dequeue(&self, blocking: bool, timeout: Option<Duration>) -> Result<T> {
        let deadline = timeout.and_then(deadline_after);
        let mut state = self.state.lock();
        loop {
            let len = state.items.len();
            if let Some(item) = state.items.pop_front() {
                drop(state);
                if self.at_capacity(len) {
                    self.not_full.notify_all();
                    self.watchers.notify_all();
                }
                return Ok(item);
            }
            if state.closed {
                return Err(Error::Closed);
            }
            if !blocking {
                return Err(Error::WouldBlock);
            }
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut state, deadline).timed_out()
                        && state.items.is_empty()
                        && !state.closed
                    {
                        return Err(Error::TimedOut);
                    }
                }
                None => self.not_empty.wait(&mut state),
            }
        }
    }

    /// Close the queue and wake every waiter. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.watchers.notify_all();
    }

    /// Discard every queued item.
    pub fn clear(&self) -> usize {
        let (dropped, was_full) = {
            let mut state = self.state.lock();
            let len = state.items.len();
            let was_full = self.at_capacity(len);
            state.items.clear();
            (len, was_full)
        };
        if was_full {
            self.not_full.notify_all();
            self.watchers.notify_all();
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// An item is available.
    pub fn is_readable(&self) -> bool {
        !self.state.lock().items.is_empty()
    }

    /// An enqueue would succeed without waiting.
    pub fn is_writable(&self) -> bool {
        let state = self.state.lock();
        !state.closed && !self.at_capacity(state.items.len())
    }

    /// Register a watcher for readiness edges (empty to non-empty, full to
    /// non-full, close).
    pub fn watch(&self, notify: Arc<dyn Notify>) -> WatchKey {
        self.watchers.add(notify)
    }

    pub fn unwatch(&self, key: WatchKey) {
        self.watchers.remove(key);
    }
}

impl<T: Send> Pollable for Queue<T> {
    fn readiness(&self) -> PollEvents {
        let state = self.state.lock();
        let mut events = PollEvents::empty();
        if !state.items.is_empty() {
            events |= PollEvents::IN;
        }
        if state.closed {
            if state.items.is_empty() {
                events |= PollEvents::ERR;
            }
        } else if !self.at_capacity(state.items.len()) {
            events |= PollEvents::OUT;
        }
        events
    }

    fn watch(&self, notify: Arc<dyn Notify>) -> WatchKey {
        Queue::watch(self, notify)
    }

    fn unwatch(&self, key: WatchKey) {
        Queue::unwatch(self, key);
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Queue")
            .field("len", &state.items.len())
            .field("hwm", &self.hwm)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = Queue::new(10);
        for i in 0..5u32 {
            queue.try_enqueue(i).unwrap();
        }
        let out: Vec<u32> = (0..5).map(|_| queue.try_dequeue().unwrap()).collect();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_hwm_non_blocking_full() {
        let queue = Queue::new(2);
        queue.try_enqueue(1).unwrap();
        queue.try_enqueue(2).unwrap();
        match queue.try_enqueue(3) {
            Err(EnqueueError::Full(item)) => assert_eq!(item, 3),
            other => panic!("expected Full, got {:?}", other),
        }
        assert_eq!(queue.len(), 2);
        assert!(!queue.is_writable());
    }

    #[test]
    fn test_unbounded() {
        let queue = Queue::unbounded();
        for i in 0..10_000 {
            queue.try_enqueue(i).unwrap();
        }
        assert_eq!(queue.len(), 10_000);
        assert!(queue.is_writable());
    }

    #[test]
    fn test_blocking_enqueue_resumes_after_dequeue() {
        let queue = Arc::new(Queue::new(1));
        queue.try_enqueue(1).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(2, true, None).is_ok())
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.try_dequeue().unwrap(), 1);
        assert!(producer.join().unwrap());
        assert_eq!(queue.try_dequeue().unwrap(), 2);
    }

    #[test]
    fn test_timeouts() {
        let queue: Queue<u8> = Queue::new(1);
        let start = Instant::now();
        assert!(matches!(
            queue.dequeue(true, Some(Duration::from_millis(30))),
            Err(Error::TimedOut)
        ));
        assert!(start.elapsed() >= Duration::from_millis(30));

        queue.try_enqueue(1).unwrap();
        assert!(matches!(
            queue.enqueue(2, true, Some(Duration::from_millis(10))),
            Err(EnqueueError::TimedOut(2))
        ));
    }

    #[test]
    fn test_huge_timeout_waits_like_blocking() {
        let queue = Arc::new(Queue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue(true, Some(Duration::MAX)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.try_enqueue(7u8).unwrap();
        assert_eq!(consumer.join().unwrap().unwrap(), 7);

        assert!(queue.enqueue(8, false, Some(Duration::MAX)).is_ok());
        assert!(matches!(
            queue.enqueue(9, false, Some(Duration::MAX)),
            Err(EnqueueError::Full(9))
        ));
    }

    #[test]
    fn test_non_blocking_dequeue_on_empty() {
        let queue: Queue<u8> = Queue::new(1);
        assert!(matches!(queue.try_dequeue(), Err(Error::WouldBlock)));
    }

    #[test]
    fn test_close_wakes_waiters_and_drains() {
        let queue = Arc::new(Queue::<u8>::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue(true, None))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(matches!(consumer.join().unwrap(), Err(Error::Closed)));

        let queue = Queue::new(4);
        queue.try_enqueue("a").unwrap();
        queue.close();
        assert!(matches!(queue.try_enqueue("b"), Err(EnqueueError::Closed("b"))));
        assert_eq!(queue.try_dequeue().unwrap(), "a");
        assert!(matches!(queue.try_dequeue(), Err(Error::Closed)));
    }

    struct Counter(AtomicUsize);

    impl Notify for Counter {
        fn notify(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_watchers_fire_on_edges_only() {
        let queue = Queue::new(2);
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        queue.watch(counter.clone());

        queue.try_enqueue(1).unwrap(); // empty -> non-empty
        queue.try_enqueue(2).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        queue.try_dequeue().unwrap(); // full -> non-full
        queue.try_dequeue().unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        queue.close();
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_readiness() {
        let queue = Queue::new(1);
        assert_eq!(queue.readiness(), PollEvents::OUT);
        queue.try_enqueue(1).unwrap();
        assert_eq!(queue.readiness(), PollEvents::IN);
        queue.close();
        assert_eq!(queue.readiness(), PollEvents::IN);
        queue.try_dequeue().unwrap();
        assert_eq!(queue.readiness(), PollEvents::ERR);
    }
}
