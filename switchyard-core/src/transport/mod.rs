//! Transport collaborator contract.
//!
//! Sockets never touch bytes on a wire. A transport turns an [`Endpoint`] into
//! message-level [`Channel`]s: `listen` registers an acceptor that is handed
//! every inbound connection, `connect` opens one outbound connection. Whatever
//! framing a transport uses internally, a channel carries whole [`Packet`]s,
//! in order, without loss while it stays connected.
//!
//! Channels are non-blocking. An I/O worker drives each one and is woken
//! through the notifier registered with `watch`.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::Message;
use crate::signal::Notify;
use crate::socket_type::SocketType;
use crate::subscription::SubscriptionEvent;

pub mod inproc;

pub use inproc::InprocTransport;

/// First packet each side sends on a new channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub socket_type: SocketType,
    pub identity: Option<Bytes>,
}

/// Unit of exchange on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Greeting(Greeting),
    Subscription(SubscriptionEvent),
    Message(Message),
}

/// The peer is gone; nothing more can be read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel disconnected")]
pub struct Disconnected;

/// Write failure; the packet is handed back.
#[derive(Debug)]
pub enum WriteError {
    /// Transport buffer full, retry after the next notification
    Full(Packet),
    Disconnected(Packet),
}

/// One established connection, seen from one side.
pub trait Channel: Send + fmt::Debug {
    fn try_write(&mut self, packet: Packet) -> std::result::Result<(), WriteError>;

    /// `Ok(None)` when nothing is pending.
    fn try_read(&mut self) -> std::result::Result<Option<Packet>, Disconnected>;

    /// Register the notifier fired when the channel may have become readable,
    /// writable, or disconnected.
    fn watch(&mut self, notify: Arc<dyn Notify>);

    /// Disconnect. The peer observes `Disconnected` once it has read whatever
    /// was already written.
    fn close(&mut self);
}

/// Callback receiving each accepted connection of a listener.
pub type Acceptor = Arc<dyn Fn(Box<dyn Channel>) + Send + Sync>;

/// A bound endpoint. Dropping it stops accepting connections.
pub trait Listener: Send + fmt::Debug {
    fn endpoint(&self) -> &Endpoint;
}

/// Endpoint scheme implementation.
pub trait Transport: Send + Sync {
    /// Scheme handled by this transport, e.g. `"inproc"`.
    fn scheme(&self) -> &'static str;

    /// # Errors
    ///
    /// `AddressInUse` when the endpoint is already bound.
    fn listen(&self, endpoint: &Endpoint, acceptor: Acceptor) -> Result<Box<dyn Listener>>;

    /// # Errors
    ///
    /// `ConnectionRefused` when nothing listens at the endpoint.
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>>;
}
