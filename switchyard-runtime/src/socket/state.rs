//! Socket state shared between application threads and I/O sessions.
//!
//! Application calls and session events both go through `SocketInner`, which
//! guards a single `SocketCore` with a mutex. Lock order is socket core first,
//! then any queue; queue watchers never take a socket lock.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use switchyard_core::monitor::SocketEventSender;
use switchyard_core::prelude::*;
use switchyard_core::transport::{Greeting, Listener};
use tracing::{debug, trace};

use super::pattern::{PatternState, ReqState};
use crate::context::ContextShared;
use crate::link::Link;
use crate::reactor::{Command, SessionId};

pub(crate) type SocketId = u64;

/// Lifecycle as reported by `Socket::state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
    Unbound,
    Bound,
    Connected,
    Closed,
}

pub(crate) struct SocketCore {
    pub(crate) socket_type: SocketType,
    pub(crate) options: SocketOptions,
    pub(crate) closed: bool,
    /// Set by context shutdown; the handle stays open until closed but is unusable
    pub(crate) terminated: bool,
    pub(crate) bound: bool,
    pub(crate) connected: bool,
    pub(crate) links: HashMap<PeerId, Arc<Link>>,
    pub(crate) rotation: RoundRobin,
    /// ROUTER identities
    pub(crate) peers: PeerRegistry,
    /// SUB: own subscriptions
    pub(crate) subscriptions: SubscriptionSet,
    /// PUB: what each peer subscribed to
    pub(crate) subscribers: SubscriptionIndex,
    pub(crate) pattern: PatternState,
    /// Live sessions and the worker driving each
    pub(crate) sessions: HashMap<SessionId, usize>,
    pub(crate) listeners: Vec<Box<dyn Listener>>,
    /// Sessions accepted on each bound endpoint
    pub(crate) accepted: HashMap<Endpoint, Vec<SessionId>>,
    /// Sessions opened by `connect`, per endpoint
    pub(crate) connections: HashMap<Endpoint, Vec<SessionId>>,
    /// Frames staged with `SendFlags::MORE`
    pub(crate) outgoing: Option<Message>,
    /// Unread frames of the run `recv_frame` is handing out
    pub(crate) incoming: Option<Message>,
    pub(crate) monitor: Option<SocketEventSender>,
}

impl SocketCore {
    pub(crate) fn new(socket_type: SocketType) -> Self {
        Self {
            socket_type,
            options: SocketOptions::default(),
            closed: false,
            terminated: false,
            bound: false,
            connected: false,
            links: HashMap::new(),
            rotation: RoundRobin::new(),
            peers: PeerRegistry::new(),
            subscriptions: SubscriptionSet::new(),
            subscribers: SubscriptionIndex::new(),
            pattern: PatternState::for_type(socket_type),
            sessions: HashMap::new(),
            listeners: Vec::new(),
            accepted: HashMap::new(),
            connections: HashMap::new(),
            outgoing: None,
            incoming: None,
            monitor: None,
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed || self.terminated {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn state(&self) -> SocketState {
        if self.closed {
            SocketState::Closed
        } else if self.connected {
            SocketState::Connected
        } else if self.bound {
            SocketState::Bound
        } else {
            SocketState::Unbound
        }
    }

    pub(crate) fn emit(&mut self, event: SocketEvent) {
        if let Some(monitor) = &self.monitor {
            if monitor.send(event).is_err() {
                self.monitor = None;
            }
        }
    }

    /// Remember which endpoint a new session belongs to.
    pub(crate) fn record_session(&mut self, event: &SocketEvent, session: SessionId) {
        let (origins, endpoint) = match event {
            SocketEvent::Accepted(ep) => (&mut self.accepted, ep),
            SocketEvent::Connected(ep) => (&mut self.connections, ep),
            _ => return,
        };
        let live = &self.sessions;
        let ids = origins.entry(endpoint.clone()).or_default();
        ids.retain(|id| live.contains_key(id));
        ids.push(session);
    }

    /// Stop routing to the given sessions and list the live ones with their
    /// workers. Their outbound queues are closed so a lingering session ends
    /// once it has flushed what was already queued.
    pub(crate) fn release_sessions(&mut self, ids: &[SessionId]) -> Vec<(SessionId, usize)> {
        let mut released = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(link) = self.links.get(id) {
                link.outbound.close();
            }
            if let Some(worker) = self.sessions.get(id) {
                released.push((*id, *worker));
            }
        }
        released
    }

    pub(crate) fn remove_link(&mut self, id: PeerId) {
        self.links.remove(&id);
        self.rotation.remove(id);
    }

    pub(crate) fn attached_peers(&self) -> usize {
        self.links
            .values()
            .filter(|link| !link.inbound.is_closed())
            .count()
    }
}

/// Why a session's handshake was refused.
#[derive(Debug)]
pub(crate) struct Rejected(pub(crate) String);

pub(crate) struct SocketInner {
    pub(crate) id: SocketId,
    pub(crate) socket_type: SocketType,
    pub(crate) ctx: Arc<ContextShared>,
    pub(crate) signal: Arc<Signal>,
    pub(crate) core: Mutex<SocketCore>,
}

impl SocketInner {
    /// Handshake completed: validate the peer and make it routable.
    ///
    /// Returns the new link plus the control packets (subscription replay)
    /// the session must send before any data.
    pub(crate) fn attach_peer(
        &self,
        session: SessionId,
        worker: usize,
        greeting: Greeting,
        pump: Arc<dyn Notify>,
    ) -> std::result::Result<(Arc<Link>, Vec<Packet>), Rejected> {
        let mut core = self.core.lock();
        let outcome = self.admit(&mut core, session, worker, greeting, pump);
        match &outcome {
            Ok((link, _)) => {
                debug!(
                    socket = self.id,
                    session,
                    peer_type = %link.peer_type,
                    "[SOCKET] peer attached"
                );
                core.emit(SocketEvent::PeerAttached {
                    peer_type: link.peer_type,
                });
            }
            Err(Rejected(reason)) => {
                debug!(socket = self.id, session, %reason, "[SOCKET] peer rejected");
                core.emit(SocketEvent::PeerRejected {
                    reason: reason.clone(),
                });
            }
        }
        drop(core);
        if outcome.is_ok() {
            self.signal.notify();
        }
        outcome
    }

    fn admit(
        &self,
        core: &mut SocketCore,
        session: SessionId,
        worker: usize,
        greeting: Greeting,
        pump: Arc<dyn Notify>,
    ) -> std::result::Result<(Arc<Link>, Vec<Packet>), Rejected> {
        if core.closed {
            return Err(Rejected("socket closed".into()));
        }
        if !self.socket_type.is_compatible(greeting.socket_type) {
            return Err(Rejected(format!(
                "{} cannot talk to {}",
                self.socket_type, greeting.socket_type
            )));
        }
        if self.socket_type == SocketType::Pair && core.attached_peers() > 0 {
            return Err(Rejected("PAIR socket already has a peer".into()));
        }

        let identity = if self.socket_type == SocketType::Router {
            core.peers
                .register(greeting.identity, session, Instant::now())
                .map_err(|e| Rejected(e.to_string()))?
        } else {
            greeting.identity.unwrap_or_default()
        };

        let watchers: [Arc<dyn Notify>; 2] = [pump, Arc::clone(&self.signal) as Arc<dyn Notify>];
        let link = Arc::new(Link::new(
            session,
            worker,
            greeting.socket_type,
            identity,
            core.options.send_hwm,
            core.options.recv_hwm,
            &watchers,
        ));
        core.links.insert(session, Arc::clone(&link));
        core.rotation.add(session);

        let replay = core
            .subscriptions
            .prefixes()
            .map(|prefix| Packet::Subscription(SubscriptionEvent::Subscribe(prefix.clone())))
            .collect();
        Ok((link, replay))
    }

    /// The peer's session ended. Queued inbound messages stay readable.
    pub(crate) fn detach_peer(&self, link: &Arc<Link>) {
        let mut core = self.core.lock();
        link.shut();
        core.sessions.remove(&link.id);
        core.peers.remove(link.id);
        core.subscribers.remove_peer(link.id);
        if link.is_drained() {
            core.remove_link(link.id);
        }
        if let PatternState::Req { state, .. } = &mut core.pattern {
            if matches!(*state, ReqState::Sent { peer, .. } if peer == link.id) {
                debug!(socket = self.id, "[REQ] peer with outstanding request left, back to idle");
                *state = ReqState::Idle;
            }
        }
        if !core.closed {
            core.emit(SocketEvent::Disconnected {
                peer_type: link.peer_type,
            });
        }
        drop(core);
        debug!(socket = self.id, session = link.id, "[SOCKET] peer detached");
        self.signal.notify();
    }

    /// A session that never completed its handshake ended.
    pub(crate) fn forget_session(&self, session: SessionId) {
        self.core.lock().sessions.remove(&session);
    }

    /// A PUB peer changed its subscriptions.
    pub(crate) fn apply_peer_subscription(&self, peer: PeerId, event: SubscriptionEvent) {
        if self.socket_type != SocketType::Pub {
            return;
        }
        let mut core = self.core.lock();
        trace!(socket = self.id, peer, ?event, "[PUB] subscription update");
        match event {
            SubscriptionEvent::Subscribe(prefix) => core.subscribers.subscribe(peer, prefix),
            SubscriptionEvent::Unsubscribe(prefix) => core.subscribers.unsubscribe(peer, &prefix),
        }
    }

    pub(crate) fn touch_peer(&self, peer: PeerId, now: Instant) {
        self.core.lock().peers.touch(peer, now);
    }

    /// ROUTER: whether the peer exceeded the idle timeout.
    pub(crate) fn peer_is_idle(&self, peer: PeerId, now: Instant) -> bool {
        let core = self.core.lock();
        match core.options.peer_idle_timeout {
            Some(idle) => core.peers.is_idle(peer, idle, now),
            None => false,
        }
    }

    /// Send the same control packet to every attached peer's session.
    pub(crate) fn broadcast_control(&self, core: &SocketCore, packet: &Packet) {
        for link in core.links.values() {
            if !link.inbound.is_closed() {
                self.ctx
                    .reactor
                    .send(link.worker, Command::Control(link.id, packet.clone()));
            }
        }
    }

    /// Context shutdown: make every call fail and wake blocked callers.
    pub(crate) fn terminate(&self) {
        self.core.lock().terminated = true;
        self.signal.notify();
    }
}
