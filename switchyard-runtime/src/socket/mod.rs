//! Pattern-typed sockets.
//!
//! A `Socket` is created by a `Context` with a fixed `SocketType`. It can bind
//! and connect any number of endpoints; each resulting connection becomes one
//! peer once its handshake completes. Sends and receives go through per-peer
//! queues and are routed by the socket's pattern (see `pattern.rs`).
//!
//! All methods take `&self`, so one socket may be shared by several threads
//! (for example a sender thread and a receiver thread on a PAIR socket).
//! The socket is closed when the handle is dropped.

mod pattern;
pub(crate) mod state;

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_core::monitor::create_monitor;
use switchyard_core::prelude::*;
use switchyard_core::transport::{Acceptor, Channel, Greeting};
use tracing::debug;

pub use state::SocketState;

use self::pattern::SendOutcome;
pub(crate) use self::state::{SocketCore, SocketId, SocketInner};
use crate::context::ContextShared;
use crate::flags::{RecvFlags, SendFlags};
use crate::reactor::{Command, SessionId};

/// Failed send, with the message handed back when it was not consumed.
pub(crate) struct SendFailure {
    pub(crate) error: Error,
    pub(crate) message: Option<Message>,
}

impl SendFailure {
    fn new(error: Error, message: Message) -> Self {
        Self {
            error,
            message: Some(message),
        }
    }
}

/// Pattern-typed messaging endpoint.
///
/// # Examples
///
/// ```
/// use switchyard_runtime::{Context, RecvFlags, SendFlags};
/// use switchyard_core::prelude::*;
///
/// let ctx = Context::new(1).unwrap();
/// let server = ctx.socket(SocketType::Rep).unwrap();
/// let client = ctx.socket(SocketType::Req).unwrap();
/// server.bind("inproc://doc-reqrep").unwrap();
/// client.connect("inproc://doc-reqrep").unwrap();
///
/// client.send("ping", SendFlags::empty()).unwrap();
/// let request = server.recv(RecvFlags::empty()).unwrap();
/// server.send(request, SendFlags::empty()).unwrap();
/// let reply = client.recv(RecvFlags::empty()).unwrap();
/// assert_eq!(reply.frames()[0].as_ref(), b"ping");
/// ```
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    pub(crate) fn new(ctx: Arc<ContextShared>, id: SocketId, socket_type: SocketType) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                id,
                socket_type,
                ctx,
                signal: Arc::new(Signal::new()),
                core: parking_lot::Mutex::new(SocketCore::new(socket_type)),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<SocketInner> {
        &self.inner
    }

    pub fn socket_type(&self) -> SocketType {
        self.inner.socket_type
    }

    pub fn state(&self) -> SocketState {
        self.inner.core.lock().state()
    }

    /// Snapshot of the current options.
    pub fn options(&self) -> SocketOptions {
        self.inner.core.lock().options.clone()
    }

    /// Replace the whole option set. Subscriptions are unaffected.
    ///
    /// # Errors
    ///
    /// `InvalidOption` when the options fail validation, `Closed` after close.
    pub fn set_options(&self, options: SocketOptions) -> Result<()> {
        options.validate()?;
        let mut core = self.inner.core.lock();
        core.ensure_open()?;
        core.options = options;
        Ok(())
    }

    /// Change one option.
    ///
    /// High water marks and the identity apply to peers attached afterwards.
    /// `Subscribe`/`Unsubscribe` are only valid on SUB sockets.
    ///
    /// # Errors
    ///
    /// `InvalidOption` for a rejected value, `NotSupported` for subscription
    /// options on other socket types, `Closed` after close.
    pub fn set_option(&self, option: SocketOption) -> Result<()> {
        let mut core = self.inner.core.lock();
        core.ensure_open()?;
        match option {
            SocketOption::Subscribe(prefix) => {
                self.require_sub()?;
                if core.subscriptions.subscribe(prefix.clone()) {
                    let packet = Packet::Subscription(SubscriptionEvent::Subscribe(prefix));
                    self.inner.broadcast_control(&core, &packet);
                }
                Ok(())
            }
            SocketOption::Unsubscribe(prefix) => {
                self.require_sub()?;
                if core.subscriptions.unsubscribe(&prefix) {
                    let packet = Packet::Subscription(SubscriptionEvent::Unsubscribe(prefix));
                    self.inner.broadcast_control(&core, &packet);
                }
                Ok(())
            }
            other => core.options.apply(&other),
        }
    }

    fn require_sub(&self) -> Result<()> {
        if self.inner.socket_type == SocketType::Sub {
            Ok(())
        } else {
            Err(Error::not_supported(format!(
                "{} sockets have no subscriptions",
                self.inner.socket_type
            )))
        }
    }

    /// Shorthand for `set_option(SocketOption::Subscribe(..))`.
    pub fn subscribe(&self, prefix: impl Into<Bytes>) -> Result<()> {
        self.set_option(SocketOption::Subscribe(prefix.into()))
    }

    /// Shorthand for `set_option(SocketOption::Unsubscribe(..))`.
    pub fn unsubscribe(&self, prefix: impl Into<Bytes>) -> Result<()> {
        self.set_option(SocketOption::Unsubscribe(prefix.into()))
    }

    /// Stream of lifecycle events. A new call replaces the previous stream.
    pub fn monitor(&self) -> SocketMonitor {
        let (sender, receiver) = create_monitor();
        self.inner.core.lock().monitor = Some(sender);
        receiver
    }

    /// Number of peers currently attached.
    pub fn peer_count(&self) -> usize {
        self.inner.core.lock().attached_peers()
    }

    /// Accept connections on an endpoint.
    ///
    /// # Errors
    ///
    /// `Endpoint` for a malformed address, `NotSupported` when no transport
    /// handles the scheme, `AddressInUse` when already bound, `Closed` after
    /// close.
    pub fn bind(&self, endpoint: &str) -> Result<()> {
        let endpoint = Endpoint::parse(endpoint)?;
        self.inner.core.lock().ensure_open()?;
        let transport = self.inner.ctx.transport(endpoint.scheme())?;

        let weak = Arc::downgrade(&self.inner);
        let accepted_on = endpoint.clone();
        let acceptor: Acceptor = Arc::new(move |channel: Box<dyn Channel>| {
            if let Some(socket) = weak.upgrade() {
                socket.start_session(channel, SocketEvent::Accepted(accepted_on.clone()));
            }
        });
        let listener = transport.listen(&endpoint, acceptor)?;

        let mut core = self.inner.core.lock();
        if let Err(e) = core.ensure_open() {
            // listener drops here and unbinds
            return Err(e);
        }
        core.listeners.push(listener);
        core.bound = true;
        core.emit(SocketEvent::Bound(endpoint.clone()));
        drop(core);
        debug!(socket = self.inner.id, %endpoint, "[SOCKET] bound");
        Ok(())
    }

    /// Open a connection to an endpoint.
    ///
    /// # Errors
    ///
    /// `Endpoint`, `NotSupported`, `ConnectionRefused` (nothing bound there)
    /// or `Closed`.
    pub fn connect(&self, endpoint: &str) -> Result<()> {
        let endpoint = Endpoint::parse(endpoint)?;
        self.inner.core.lock().ensure_open()?;
        let transport = self.inner.ctx.transport(endpoint.scheme())?;
        let channel = transport.connect(&endpoint)?;

        self.inner.start_session(channel, SocketEvent::Connected(endpoint.clone()));
        self.inner.core.lock().connected = true;
        debug!(socket = self.inner.id, %endpoint, "[SOCKET] connected");
        Ok(())
    }

    /// Stop accepting connections on a bound endpoint.
    ///
    /// Connections accepted on it are closed like on `close`: whatever is
    /// already queued to them is flushed for up to the linger period. The
    /// endpoint is free for another bind as soon as this returns.
    ///
    /// # Errors
    ///
    /// `Endpoint` for a malformed address, `EndpointNotFound` when the socket
    /// is not bound there, `Closed` after close.
    pub fn unbind(&self, endpoint: &str) -> Result<()> {
        let endpoint = Endpoint::parse(endpoint)?;
        let (listener, sessions, linger) = {
            let mut core = self.inner.core.lock();
            core.ensure_open()?;
            let index = core
                .listeners
                .iter()
                .position(|listener| listener.endpoint() == &endpoint)
                .ok_or_else(|| Error::EndpointNotFound(endpoint.to_string()))?;
            let listener = core.listeners.remove(index);
            let ids = core.accepted.remove(&endpoint).unwrap_or_default();
            let sessions = core.release_sessions(&ids);
            core.bound = !core.listeners.is_empty();
            core.emit(SocketEvent::Unbound(endpoint.clone()));
            (listener, sessions, core.options.effective_linger())
        };
        drop(listener);
        self.inner.close_sessions(sessions, linger);
        debug!(socket = self.inner.id, %endpoint, "[SOCKET] unbound");
        Ok(())
    }

    /// Close every connection `connect` opened to an endpoint.
    ///
    /// Messages already queued to those peers are flushed for up to the
    /// linger period; new sends are routed to the remaining peers.
    ///
    /// # Errors
    ///
    /// `Endpoint` for a malformed address, `EndpointNotFound` when the socket
    /// never connected there, `Closed` after close.
    pub fn disconnect(&self, endpoint: &str) -> Result<()> {
        let endpoint = Endpoint::parse(endpoint)?;
        let (sessions, linger) = {
            let mut core = self.inner.core.lock();
            core.ensure_open()?;
            let ids = core
                .connections
                .remove(&endpoint)
                .ok_or_else(|| Error::EndpointNotFound(endpoint.to_string()))?;
            let sessions = core.release_sessions(&ids);
            core.connected = !core.connections.is_empty();
            core.emit(SocketEvent::ConnectionsDropped(endpoint.clone()));
            (sessions, core.options.effective_linger())
        };
        self.inner.close_sessions(sessions, linger);
        debug!(socket = self.inner.id, %endpoint, "[SOCKET] disconnected");
        Ok(())
    }

    /// Send a message, or with `SendFlags::MORE` stage its frames as the
    /// beginning of a longer message.
    ///
    /// Staged frames are submitted together with the next send that does not
    /// carry `MORE`, so peers only ever see whole messages. A failed final send
    /// discards the staged frames.
    ///
    /// # Errors
    ///
    /// - `WouldBlock` with `DONTWAIT` (or a zero send timeout) when no peer can
    ///   take the message
    /// - `TimedOut` after the send timeout
    /// - `StateViolation` on REQ/REP misuse
    /// - `UnknownPeer` / `MalformedMessage` on ROUTER addressing errors
    /// - `NotSupported` on SUB and PULL
    /// - `Closed` after close or context shutdown
    pub fn send(&self, msg: impl Into<Message>, flags: SendFlags) -> Result<()> {
        let msg = msg.into();
        let (msg, timeout) = {
            let mut core = self.inner.core.lock();
            core.ensure_open()?;
            if !self.inner.socket_type.can_send() {
                return Err(Error::not_supported(format!(
                    "{} sockets cannot send",
                    self.inner.socket_type
                )));
            }
            if flags.contains(SendFlags::MORE) {
                match &mut core.outgoing {
                    Some(staged) => staged.extend(msg),
                    None => core.outgoing = Some(msg),
                }
                return Ok(());
            }
            let msg = match core.outgoing.take() {
                Some(mut staged) => {
                    staged.extend(msg);
                    staged
                }
                None => msg,
            };
            (msg, core.options.send_timeout)
        };
        if msg.is_empty() {
            return Err(Error::MalformedMessage("message has no frames"));
        }

        let nonblocking = flags.contains(SendFlags::DONTWAIT) || timeout.is_some_and(|t| t.is_zero());
        let deadline = timeout.and_then(deadline_after);
        self.inner
            .send_until(msg, nonblocking, deadline)
            .map_err(|failure| failure.error)
    }

    /// Send one frame. Frames sent with `SendFlags::MORE` are held back until
    /// the final frame and then delivered together.
    pub fn send_frame(&self, frame: impl Into<Bytes>, flags: SendFlags) -> Result<()> {
        self.send(Message::from(frame.into()), flags)
    }

    /// Receive the next whole message.
    ///
    /// If `recv_frame` already handed out part of a message, the remaining
    /// frames are returned.
    ///
    /// # Errors
    ///
    /// - `WouldBlock` with `DONTWAIT` (or a zero receive timeout)
    /// - `TimedOut` after the receive timeout
    /// - `StateViolation` on REQ/REP misuse
    /// - `NotSupported` on PUB and PUSH
    /// - `Closed` after close or context shutdown
    pub fn recv(&self, flags: RecvFlags) -> Result<Message> {
        let timeout = {
            let mut core = self.inner.core.lock();
            core.ensure_open()?;
            if let Some(rest) = core.incoming.take() {
                return Ok(rest);
            }
            core.options.recv_timeout
        };
        let nonblocking = flags.contains(RecvFlags::DONTWAIT) || timeout.is_some_and(|t| t.is_zero());
        let deadline = timeout.and_then(deadline_after);
        self.inner.recv_until(nonblocking, deadline)
    }

    /// Receive one frame; `Frame::more` tells whether the message continues.
    pub fn recv_frame(&self, flags: RecvFlags) -> Result<Frame> {
        let mut msg = self.recv(flags)?;
        let Some(payload) = msg.pop_front() else {
            return Err(Error::MalformedMessage("message has no frames"));
        };
        let more = !msg.is_empty();
        if more {
            self.inner.core.lock().incoming = Some(msg);
        }
        Ok(Frame::new(payload, more))
    }

    /// Whether frames of a message partly read with `recv_frame` remain.
    pub fn has_more(&self) -> bool {
        self.inner.core.lock().incoming.is_some()
    }

    /// Close the socket. Idempotent.
    ///
    /// Endpoints are unbound at once. Queued outbound messages keep flowing
    /// for up to the linger period; inbound messages are discarded.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Send with an explicit deadline, returning the message if it could not
    /// be placed.
    pub(crate) fn send_with_deadline(
        &self,
        msg: Message,
        deadline: Instant,
    ) -> std::result::Result<(), SendFailure> {
        self.inner.send_until(msg, false, Some(deadline))
    }

    pub(crate) fn is_closed(&self) -> bool {
        let core = self.inner.core.lock();
        core.closed || core.terminated
    }
}

impl SocketInner {
    /// Hand a new connection to an I/O worker.
    pub(crate) fn start_session(self: &Arc<Self>, channel: Box<dyn Channel>, event: SocketEvent) {
        let mut core = self.core.lock();
        if core.closed || core.terminated {
            return;
        }
        let (session, worker) = self.ctx.reactor.assign();
        core.sessions.insert(session, worker);
        core.record_session(&event, session);
        core.emit(event);
        let greeting = Greeting {
            socket_type: self.socket_type,
            identity: core.options.identity.clone(),
        };
        drop(core);
        self.ctx.reactor.send(
            worker,
            Command::Attach {
                session,
                socket: Arc::downgrade(self),
                socket_type: self.socket_type,
                greeting,
                channel,
            },
        );
    }

    pub(crate) fn send_until(
        &self,
        mut msg: Message,
        nonblocking: bool,
        deadline: Option<Instant>,
    ) -> std::result::Result<(), SendFailure> {
        loop {
            let seen = self.signal.generation();
            {
                let mut core = self.core.lock();
                if let Err(error) = core.ensure_open() {
                    return Err(SendFailure::new(error, msg));
                }
                match core.try_send(msg) {
                    Ok(SendOutcome::Sent) => {
                        drop(core);
                        self.after_state_change();
                        return Ok(());
                    }
                    Ok(SendOutcome::Blocked(back)) => msg = back,
                    Err(error) => {
                        return Err(SendFailure {
                            error,
                            message: None,
                        })
                    }
                }
            }
            if nonblocking {
                return Err(SendFailure::new(Error::WouldBlock, msg));
            }
            if !self.signal.wait_for_change(seen, deadline) {
                return Err(SendFailure::new(Error::TimedOut, msg));
            }
        }
    }

    pub(crate) fn recv_until(&self, nonblocking: bool, deadline: Option<Instant>) -> Result<Message> {
        loop {
            let seen = self.signal.generation();
            {
                let mut core = self.core.lock();
                core.ensure_open()?;
                if let Some(msg) = core.try_recv()? {
                    drop(core);
                    self.after_state_change();
                    return Ok(msg);
                }
            }
            if nonblocking {
                return Err(Error::WouldBlock);
            }
            if !self.signal.wait_for_change(seen, deadline) {
                return Err(Error::TimedOut);
            }
        }
    }

    /// REQ/REP readiness flips with every completed call.
    fn after_state_change(&self) {
        if matches!(self.socket_type, SocketType::Req | SocketType::Rep) {
            self.signal.notify();
        }
    }

    fn close_sessions(&self, sessions: Vec<(SessionId, usize)>, linger: Option<Duration>) {
        for (session, worker) in sessions {
            self.ctx
                .reactor
                .send(worker, Command::Close { session, linger });
        }
    }

    pub(crate) fn close(&self) {
        let (sessions, linger, listeners) = {
            let mut core = self.core.lock();
            if core.closed {
                return;
            }
            core.closed = true;
            for link in core.links.values() {
                link.outbound.close();
                link.inbound.close();
                link.inbound.clear();
            }
            core.pattern.reset();
            core.outgoing = None;
            core.incoming = None;
            core.emit(SocketEvent::Closed);
            core.monitor = None;
            let sessions: Vec<_> = core.sessions.iter().map(|(s, w)| (*s, *w)).collect();
            (
                sessions,
                core.options.effective_linger(),
                std::mem::take(&mut core.listeners),
            )
        };
        // unbinds
        drop(listeners);
        self.close_sessions(sessions, linger);
        self.signal.notify();
        self.ctx.unregister(self.id);
        debug!(socket = self.id, socket_type = %self.socket_type, "[SOCKET] closed");
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// `IN` means some peer queue holds a message, not that `recv` will return
/// one. A REQ socket waiting for its reply drops stale replies, and a SUB
/// socket drops messages its subscriptions no longer match, so after a
/// spurious `IN` a `recv(RecvFlags::DONTWAIT)` gives `WouldBlock`. Poll again
/// in that case.
impl Pollable for Socket {
    fn readiness(&self) -> PollEvents {
        let core = self.inner.core.lock();
        if core.closed || core.terminated {
            return PollEvents::ERR;
        }
        let mut events = PollEvents::empty();
        if core.incoming.is_some() || core.is_readable() {
            events |= PollEvents::IN;
        }
        if self.inner.socket_type.can_send() && core.is_writable() {
            events |= PollEvents::OUT;
        }
        events
    }

    fn watch(&self, notify: Arc<dyn Notify>) -> WatchKey {
        self.inner.signal.watch(notify)
    }

    fn unwatch(&self, key: WatchKey) {
        self.inner.signal.unwatch(key);
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.inner.id)
            .field("type", &self.inner.socket_type)
            .field("state", &self.state())
            .finish()
    }
}

/// Default wait slice used by callers that must re-check an external
/// condition while blocked in `send`.
pub(crate) const SEND_RECHECK: Duration = Duration::from_millis(50);
