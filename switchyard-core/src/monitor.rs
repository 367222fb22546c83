//! Socket event monitoring.
//!
//! Sockets optionally publish lifecycle events (binds, connects, peers coming
//! and going) on an unbounded channel. Events are emitted without blocking;
//! once the receiving side is dropped, emission stops.

use std::fmt;

use crate::endpoint::Endpoint;
use crate::socket_type::SocketType;

/// Socket lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Socket bound to an endpoint
    Bound(Endpoint),

    /// Socket opened a connection to an endpoint
    Connected(Endpoint),

    /// Socket stopped listening on an endpoint
    Unbound(Endpoint),

    /// Socket dropped the connections it opened to an endpoint
    ConnectionsDropped(Endpoint),

    /// A peer connected to one of the socket's bound endpoints
    Accepted(Endpoint),

    /// Handshake finished; the peer now takes part in routing
    PeerAttached { peer_type: SocketType },

    /// Handshake refused (incompatible type, second PAIR peer, identity clash)
    PeerRejected { reason: String },

    /// An attached peer went away
    Disconnected { peer_type: SocketType },

    /// Socket closed
    Closed,
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound(ep) => write!(f, "Bound to {ep}"),
            Self::Connected(ep) => write!(f, "Connected to {ep}"),
            Self::Unbound(ep) => write!(f, "Unbound from {ep}"),
            Self::ConnectionsDropped(ep) => write!(f, "Dropped connections to {ep}"),
            Self::Accepted(ep) => write!(f, "Accepted connection on {ep}"),
            Self::PeerAttached { peer_type } => write!(f, "{peer_type} peer attached"),
            Self::PeerRejected { reason } => write!(f, "Peer rejected: {reason}"),
            Self::Disconnected { peer_type } => write!(f, "{peer_type} peer disconnected"),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Receiving end of a socket's event stream.
pub type SocketMonitor = flume::Receiver<SocketEvent>;

/// Sending end held by the socket.
pub type SocketEventSender = flume::Sender<SocketEvent>;

#[must_use]
pub fn create_monitor() -> (SocketEventSender, SocketMonitor) {
    flume::unbounded()
}
