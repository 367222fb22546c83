//! I/O worker pool.
//!
//! ```text
//! Application threads                 I/O workers (io_threads)
//! ┌──────────────┐   Attach/Close    ┌────────────────────────────┐
//! │ Socket       │──────────────────▶│ worker 0                   │
//! │  bind/connect│   Control         │  sessions 0, 2, 4, ...     │
//! │  close       │──────────────────▶│  pump on readiness edges   │
//! └──────────────┘                   └────────────────────────────┘
//!        │  Pump (queue/channel      ┌────────────────────────────┐
//!        │  watchers)                │ worker 1                   │
//!        └──────────────────────────▶│  sessions 1, 3, 5, ...     │
//!                                    └────────────────────────────┘
//! ```
//!
//! Each worker owns the sessions assigned to it and is driven only by its
//! command mailbox. Readiness edges on a session's queues or channel post a
//! `Pump`; at most one `Pump` per session is in flight. A periodic tick
//! enforces linger deadlines and peer idle timeouts.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use switchyard_core::config::REACTOR_TICK;
use switchyard_core::prelude::*;
use switchyard_core::transport::{Channel, Greeting};
use tracing::{debug, trace, warn};

use crate::session::{Flow, Session};
use crate::socket::SocketInner;

pub(crate) type SessionId = u64;

/// Commands posted to a worker's mailbox.
pub(crate) enum Command {
    /// Take over a freshly opened channel
    Attach {
        session: SessionId,
        socket: Weak<SocketInner>,
        socket_type: SocketType,
        greeting: Greeting,
        channel: Box<dyn Channel>,
    },
    /// Readiness changed somewhere on the session
    Pump(SessionId),
    /// Send a control packet ahead of queued data
    Control(SessionId, Packet),
    /// The owning socket closed
    Close {
        session: SessionId,
        linger: Option<Duration>,
    },
    Stop,
}

/// Notifier registered on a session's queues and channel.
pub(crate) struct PumpHook {
    tx: flume::Sender<Command>,
    session: SessionId,
    scheduled: AtomicBool,
}

impl PumpHook {
    pub(crate) fn new(tx: flume::Sender<Command>, session: SessionId) -> Self {
        Self {
            tx,
            session,
            scheduled: AtomicBool::new(false),
        }
    }

    /// Called by the session before each pump so later edges schedule again.
    pub(crate) fn rearm(&self) {
        self.scheduled.store(false, Ordering::Release);
    }
}

impl Notify for PumpHook {
    fn notify(&self) {
        if !self.scheduled.swap(true, Ordering::AcqRel) {
            // worker gone means the context is stopping; nothing left to pump
            let _ = self.tx.send(Command::Pump(self.session));
        }
    }
}

pub(crate) struct Reactor {
    workers: Vec<flume::Sender<Command>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
    next_session: AtomicU64,
}

impl Reactor {
    pub(crate) fn new(io_threads: usize) -> Result<Self> {
        let io_threads = io_threads.max(1);
        let mut workers = Vec::with_capacity(io_threads);
        let mut handles = Vec::with_capacity(io_threads);
        for i in 0..io_threads {
            let (tx, rx) = flume::unbounded();
            let own_tx = tx.clone();
            let handle = thread::Builder::new()
                .name(format!("switchyard-io-{i}"))
                .spawn(move || worker_thread(i, own_tx, rx))?;
            workers.push(tx);
            handles.push(handle);
        }
        debug!(io_threads, "[REACTOR] started");
        Ok(Self {
            workers,
            handles: Mutex::new(handles),
            next_worker: AtomicUsize::new(0),
            next_session: AtomicU64::new(1),
        })
    }

    /// Allocate a session id and pick its worker (round-robin).
    pub(crate) fn assign(&self) -> (SessionId, usize) {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let worker = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        (session, worker)
    }

    pub(crate) fn send(&self, worker: usize, command: Command) {
        let Some(tx) = self.workers.get(worker) else {
            warn!(worker, "[REACTOR] no such worker");
            return;
        };
        if tx.send(command).is_err() {
            trace!(worker, "[REACTOR] worker already stopped");
        }
    }

    pub(crate) fn io_threads(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker and join them. Idempotent.
    ///
    /// Sessions still lingering are finished without further flushing.
    pub(crate) fn stop(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return;
        }
        for tx in &self.workers {
            let _ = tx.send(Command::Stop);
        }
        let current = thread::current().id();
        for handle in handles {
            // the last context reference may be dropped on a worker itself
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("[REACTOR] I/O worker panicked");
            }
        }
        debug!("[REACTOR] stopped");
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_thread(worker_id: usize, tx: flume::Sender<Command>, rx: flume::Receiver<Command>) {
    debug!("[Worker {}] Starting", worker_id);
    let mut sessions: HashMap<SessionId, Session> = HashMap::new();
    let mut next_tick = Instant::now() + REACTOR_TICK;

    loop {
        let command = match rx.recv_deadline(next_tick) {
            Ok(command) => Some(command),
            Err(flume::RecvTimeoutError::Timeout) => None,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };

        match command {
            Some(Command::Attach {
                session,
                socket,
                socket_type,
                greeting,
                channel,
            }) => {
                let hook = Arc::new(PumpHook::new(tx.clone(), session));
                let mut s = Session::new(session, worker_id, socket, socket_type, greeting, channel, hook);
                trace!("[Worker {}] attached session {}", worker_id, session);
                if let Flow::Continue = s.pump() {
                    sessions.insert(session, s);
                }
            }
            Some(Command::Pump(session)) => {
                if let Some(s) = sessions.get_mut(&session) {
                    if let Flow::Finished(_) = s.pump() {
                        sessions.remove(&session);
                    }
                }
            }
            Some(Command::Control(session, packet)) => {
                if let Some(s) = sessions.get_mut(&session) {
                    s.push_control(packet);
                    if let Flow::Finished(_) = s.pump() {
                        sessions.remove(&session);
                    }
                }
            }
            Some(Command::Close { session, linger }) => {
                if let Some(s) = sessions.get_mut(&session) {
                    if let Flow::Finished(_) = s.begin_close(linger) {
                        sessions.remove(&session);
                    }
                }
            }
            Some(Command::Stop) => break,
            None => {}
        }

        let now = Instant::now();
        if now >= next_tick {
            sessions.retain(|_, s| matches!(s.tick(now), Flow::Continue));
            next_tick = now + REACTOR_TICK;
        }
    }

    for (_, mut s) in sessions.drain() {
        s.finish("worker stopped");
    }
    debug!("[Worker {}] Stopped", worker_id);
}
