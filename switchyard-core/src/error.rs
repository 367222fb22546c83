//! Switchyard Error Types
//!
//! Every socket, queue, context and poller operation reports failure through
//! this one enum. There is no process-wide error slot.

use bytes::Bytes;
use std::io;
use thiserror::Error;

use crate::endpoint::EndpointError;

/// Main error type for Switchyard operations
#[derive(Error, Debug)]
pub enum Error {
    /// Non-blocking call had nothing to do; retry later
    #[error("Operation would block")]
    WouldBlock,

    /// Pattern state machine misuse (e.g. REQ sending twice)
    #[error("State violation: {0}")]
    StateViolation(&'static str),

    /// Bounded queue saturated
    #[error("Queue is full")]
    Full,

    /// Socket or queue torn down
    #[error("Socket closed")]
    Closed,

    /// ROUTER send to an identity with no live connection
    #[error("Unknown peer: {0:?}")]
    UnknownPeer(Bytes),

    /// Deadline elapsed
    #[error("Operation timed out")]
    TimedOut,

    /// Operation attempted after context shutdown
    #[error("Context terminated")]
    ContextTerminated,

    /// Operation not available for this socket type or transport
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Message does not fit the framing rules of the socket
    #[error("Malformed message: {0}")]
    MalformedMessage(&'static str),

    /// Option value rejected
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Context socket limit reached
    #[error("Too many sockets (max: {0})")]
    TooManySockets(usize),

    /// Endpoint already bound
    #[error("Address in use: {0}")]
    AddressInUse(String),

    /// Nothing is bound at the endpoint
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Unbind or disconnect from an endpoint the socket never used
    #[error("Endpoint not in use: {0}")]
    EndpointNotFound(String),

    /// Endpoint parse failure
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// IO error raised by a transport collaborator
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for Switchyard operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a not-supported error with a message
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Create an invalid option error with a message
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    /// Check if the caller may simply retry (or re-route) the operation
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::WouldBlock | Self::Full | Self::TimedOut | Self::UnknownPeer(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Check if the handle is unusable from now on
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::ContextTerminated)
    }
}
