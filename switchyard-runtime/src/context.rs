//! Context: owner of sockets, transports and the I/O worker pool.

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use switchyard_core::prelude::*;
use switchyard_core::transport::InprocTransport;
use tracing::debug;

use crate::reactor::Reactor;
use crate::socket::{Socket, SocketId, SocketInner};

/// Context lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    Active,
    /// No new sockets; existing ones fail every call with `Closed`
    ShuttingDown,
    /// All sockets closed and the I/O workers joined
    Terminated,
}

struct Lifecycle {
    state: ContextState,
    sockets: HashMap<SocketId, Weak<SocketInner>>,
}

pub(crate) struct ContextShared {
    options: ContextOptions,
    lifecycle: Mutex<Lifecycle>,
    all_closed: Condvar,
    pub(crate) reactor: Reactor,
    transports: RwLock<HashMap<&'static str, Arc<dyn Transport>>>,
    next_socket: AtomicU64,
}

impl ContextShared {
    pub(crate) fn transport(&self, scheme: &str) -> Result<Arc<dyn Transport>> {
        self.transports
            .read()
            .get(scheme)
            .cloned()
            .ok_or_else(|| Error::not_supported(format!("no transport registered for {scheme}://")))
    }

    /// A socket closed.
    pub(crate) fn unregister(&self, id: SocketId) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.sockets.remove(&id).is_some() && lifecycle.sockets.is_empty() {
            self.all_closed.notify_all();
        }
    }
}

/// Handle to a messaging context. Clones share the same context.
///
/// Dropping the last handle does not close sockets; they keep the context
/// alive until closed themselves.
#[derive(Clone)]
pub struct Context {
    shared: Arc<ContextShared>,
}

impl Context {
    /// Create a context with `io_threads` I/O workers (at least one).
    ///
    /// # Errors
    ///
    /// `Io` if a worker thread cannot be spawned.
    pub fn new(io_threads: usize) -> Result<Self> {
        Self::with_options(ContextOptions::default().with_io_threads(io_threads))
    }

    /// # Errors
    ///
    /// `Io` if a worker thread cannot be spawned.
    pub fn with_options(options: ContextOptions) -> Result<Self> {
        let reactor = Reactor::new(options.io_threads)?;
        let mut transports: HashMap<&'static str, Arc<dyn Transport>> = HashMap::new();
        let inproc = InprocTransport::new(options.channel_capacity);
        transports.insert(inproc.scheme(), Arc::new(inproc));

        debug!(
            io_threads = reactor.io_threads(),
            max_sockets = options.max_sockets,
            "[CONTEXT] created"
        );
        Ok(Self {
            shared: Arc::new(ContextShared {
                options,
                lifecycle: Mutex::new(Lifecycle {
                    state: ContextState::Active,
                    sockets: HashMap::new(),
                }),
                all_closed: Condvar::new(),
                reactor,
                transports: RwLock::new(transports),
                next_socket: AtomicU64::new(1),
            }),
        })
    }

    pub fn options(&self) -> &ContextOptions {
        &self.shared.options
    }

    /// Open a socket of the given type.
    ///
    /// # Errors
    ///
    /// `ContextTerminated` once shutdown started, `TooManySockets` when
    /// `max_sockets` sockets are open.
    pub fn socket(&self, socket_type: SocketType) -> Result<Socket> {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.state != ContextState::Active {
            return Err(Error::ContextTerminated);
        }
        if lifecycle.sockets.len() >= self.shared.options.max_sockets {
            return Err(Error::TooManySockets(self.shared.options.max_sockets));
        }
        let id = self.shared.next_socket.fetch_add(1, Ordering::Relaxed);
        let socket = Socket::new(Arc::clone(&self.shared), id, socket_type);
        lifecycle.sockets.insert(id, Arc::downgrade(socket.inner()));
        drop(lifecycle);
        debug!(socket = id, %socket_type, "[CONTEXT] socket created");
        Ok(socket)
    }

    /// Stop accepting sockets and make every call on existing sockets fail
    /// with `Closed`, waking blocked callers. Idempotent; does not wait.
    pub fn shutdown(&self) {
        let sockets: Vec<Arc<SocketInner>> = {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state == ContextState::Active {
                lifecycle.state = ContextState::ShuttingDown;
                debug!("[CONTEXT] shutting down");
            }
            lifecycle.sockets.values().filter_map(Weak::upgrade).collect()
        };
        for socket in sockets {
            socket.terminate();
        }
    }

    /// Shut down, wait until every socket has been closed, then stop the I/O
    /// workers. Calling it again is a no-op.
    pub fn terminate(&self) {
        if self.state() == ContextState::Terminated {
            return;
        }
        self.shutdown();
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            while !lifecycle.sockets.is_empty() {
                debug!(open = lifecycle.sockets.len(), "[CONTEXT] waiting for sockets to close");
                self.shared.all_closed.wait(&mut lifecycle);
            }
            if lifecycle.state == ContextState::Terminated {
                return;
            }
            lifecycle.state = ContextState::Terminated;
        }
        self.shared.reactor.stop();
        debug!("[CONTEXT] terminated");
    }

    pub fn state(&self) -> ContextState {
        self.shared.lifecycle.lock().state
    }

    /// Number of sockets not yet closed.
    pub fn socket_count(&self) -> usize {
        self.shared.lifecycle.lock().sockets.len()
    }

    /// Install a transport for its scheme, replacing any previous one.
    pub fn register_transport(&self, transport: Arc<dyn Transport>) {
        let scheme = transport.scheme();
        debug!(scheme, "[CONTEXT] transport registered");
        self.shared.transports.write().insert(scheme, transport);
    }

    /// Transport registered for `scheme`, if any.
    pub fn transport(&self, scheme: &str) -> Option<Arc<dyn Transport>> {
        self.shared.transport(scheme).ok()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.shared.lifecycle.lock();
        f.debug_struct("Context")
            .field("state", &lifecycle.state)
            .field("sockets", &lifecycle.sockets.len())
            .field("io_threads", &self.shared.reactor.io_threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::RecvFlags;
    use std::time::{Duration, Instant};

    #[test]
    fn test_new_context_is_active() {
        let ctx = Context::new(2).unwrap();
        assert_eq!(ctx.state(), ContextState::Active);
        assert_eq!(ctx.socket_count(), 0);
        assert!(ctx.transport("inproc").is_some());
        assert!(ctx.transport("tcp").is_none());
    }

    #[test]
    fn test_zero_io_threads_still_starts_one_worker() {
        let ctx = Context::new(0).unwrap();
        assert_eq!(ctx.shared.reactor.io_threads(), 1);
    }

    #[test]
    fn test_socket_limit() {
        let ctx = Context::with_options(ContextOptions::new().with_max_sockets(2)).unwrap();
        let _a = ctx.socket(SocketType::Pair).unwrap();
        let b = ctx.socket(SocketType::Pair).unwrap();
        assert!(matches!(ctx.socket(SocketType::Pair), Err(Error::TooManySockets(2))));

        drop(b);
        assert_eq!(ctx.socket_count(), 1);
        assert!(ctx.socket(SocketType::Pair).is_ok());
    }

    #[test]
    fn test_no_sockets_after_shutdown() {
        let ctx = Context::new(1).unwrap();
        let socket = ctx.socket(SocketType::Pull).unwrap();
        ctx.shutdown();
        assert_eq!(ctx.state(), ContextState::ShuttingDown);
        assert!(matches!(ctx.socket(SocketType::Push), Err(Error::ContextTerminated)));
        assert!(matches!(socket.recv(RecvFlags::DONTWAIT), Err(Error::Closed)));
    }

    #[test]
    fn test_terminate_waits_for_sockets() {
        let ctx = Context::new(1).unwrap();
        let socket = ctx.socket(SocketType::Pull).unwrap();
        let start = Instant::now();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
                drop(socket);
            });
            ctx.terminate();
        });
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(ctx.state(), ContextState::Terminated);

        // second call returns at once
        ctx.terminate();
        assert_eq!(ctx.state(), ContextState::Terminated);
    }

    #[test]
    fn test_unknown_scheme() {
        let ctx = Context::new(1).unwrap();
        let socket = ctx.socket(SocketType::Pair).unwrap();
        assert!(matches!(socket.bind("tcp://127.0.0.1:5555"), Err(Error::NotSupported(_))));
    }
}
