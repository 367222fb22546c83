//! Socket and context configuration.
//!
//! `SocketOptions` is the full option set a socket starts with; it can be
//! built up front with the `with_*` methods or changed later one value at a
//! time through [`SocketOption`]. `ContextOptions` sizes the I/O thread pool
//! and the socket table.

use bytes::Bytes;
use std::time::Duration;

use crate::config::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_HWM, DEFAULT_IO_THREADS, DEFAULT_LINGER,
    DEFAULT_MAX_SOCKETS, MAX_IDENTITY_LEN,
};
use crate::error::{Error, Result};

/// Socket configuration options.
///
/// # Examples
///
/// ```
/// use switchyard_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_recv_timeout(Duration::from_secs(5))
///     .with_send_hwm(10);
/// assert_eq!(opts.send_hwm, 10);
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Maximum queued outbound messages per peer (0 = unbounded)
    ///
    /// Applies to peers attached after the change.
    pub send_hwm: usize,

    /// Maximum queued inbound messages per peer (0 = unbounded)
    pub recv_hwm: usize,

    /// Identity announced to peers; ROUTER peers route by it
    pub identity: Option<Bytes>,

    /// How long a closing socket keeps flushing queued outbound messages.
    /// - `None` or `Some(Duration::ZERO)`: discard immediately
    /// - `Some(duration)`: flush for at most `duration`
    pub linger: Option<Duration>,

    /// Send timeout
    /// - `None`: block indefinitely (default)
    /// - `Some(Duration::ZERO)`: non-blocking
    /// - `Some(duration)`: fail with `TimedOut` after `duration`
    pub send_timeout: Option<Duration>,

    /// Receive timeout, same meaning as `send_timeout`
    pub recv_timeout: Option<Duration>,

    /// ROUTER only: drop peers silent for longer than this
    pub peer_idle_timeout: Option<Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            send_hwm: DEFAULT_HWM,
            recv_hwm: DEFAULT_HWM,
            identity: None,
            linger: Some(DEFAULT_LINGER),
            send_timeout: None,
            recv_timeout: None,
            peer_idle_timeout: None,
        }
    }
}

impl SocketOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_hwm(mut self, hwm: usize) -> Self {
        self.send_hwm = hwm;
        self
    }

    pub fn with_recv_hwm(mut self, hwm: usize) -> Self {
        self.recv_hwm = hwm;
        self
    }

    /// Set both high water marks.
    pub fn with_hwm(self, hwm: usize) -> Self {
        self.with_send_hwm(hwm).with_recv_hwm(hwm)
    }

    /// Set the identity. Validated when the options are applied to a socket.
    pub fn with_identity(mut self, identity: impl Into<Bytes>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    pub fn with_peer_idle_timeout(mut self, timeout: Duration) -> Self {
        self.peer_idle_timeout = Some(timeout);
        self
    }

    pub fn is_send_nonblocking(&self) -> bool {
        matches!(self.send_timeout, Some(d) if d.is_zero())
    }

    pub fn is_recv_nonblocking(&self) -> bool {
        matches!(self.recv_timeout, Some(d) if d.is_zero())
    }

    /// Effective linger: `None` means discard pending messages right away.
    pub fn effective_linger(&self) -> Option<Duration> {
        self.linger.filter(|d| !d.is_zero())
    }

    /// Check the whole option set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` if the identity is malformed.
    pub fn validate(&self) -> Result<()> {
        if let Some(identity) = &self.identity {
            validate_identity(identity)?;
        }
        Ok(())
    }

    /// Apply a single option change.
    ///
    /// Subscription options are not stored here; the socket handles them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` for a malformed identity, or `NotSupported` for
    /// subscription options.
    pub fn apply(&mut self, option: &SocketOption) -> Result<()> {
        match option {
            SocketOption::SendHwm(hwm) => self.send_hwm = *hwm,
            SocketOption::RecvHwm(hwm) => self.recv_hwm = *hwm,
            SocketOption::HighWaterMark(hwm) => {
                self.send_hwm = *hwm;
                self.recv_hwm = *hwm;
            }
            SocketOption::Identity(identity) => {
                validate_identity(identity)?;
                self.identity = Some(identity.clone());
            }
            SocketOption::Linger(linger) => self.linger = *linger,
            SocketOption::SendTimeout(timeout) => self.send_timeout = *timeout,
            SocketOption::RecvTimeout(timeout) => self.recv_timeout = *timeout,
            SocketOption::PeerIdleTimeout(timeout) => self.peer_idle_timeout = *timeout,
            SocketOption::Subscribe(_) | SocketOption::Unsubscribe(_) => {
                return Err(Error::not_supported(
                    "subscriptions are socket state, not stored options",
                ));
            }
        }
        Ok(())
    }
}

/// One runtime option change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    SendHwm(usize),
    RecvHwm(usize),
    /// Both high water marks at once
    HighWaterMark(usize),
    Identity(Bytes),
    /// SUB only: add a topic prefix (empty = everything)
    Subscribe(Bytes),
    /// SUB only: remove one reference to a topic prefix
    Unsubscribe(Bytes),
    Linger(Option<Duration>),
    SendTimeout(Option<Duration>),
    RecvTimeout(Option<Duration>),
    PeerIdleTimeout(Option<Duration>),
}

/// Validate an application-chosen identity.
///
/// Identities must be 1-255 bytes and must not start with a zero byte, which
/// is reserved for generated identities.
///
/// # Errors
///
/// Returns `InvalidOption` describing the violated rule.
pub fn validate_identity(identity: &[u8]) -> Result<()> {
    if identity.is_empty() {
        return Err(Error::invalid_option("identity cannot be empty"));
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return Err(Error::invalid_option(format!(
            "identity cannot exceed {} bytes (got {})",
            MAX_IDENTITY_LEN,
            identity.len()
        )));
    }
    if identity[0] == 0x00 {
        return Err(Error::invalid_option(
            "identity cannot start with a zero byte (reserved for generated identities)",
        ));
    }
    Ok(())
}

/// Context configuration.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Number of I/O worker threads (at least one is always started)
    pub io_threads: usize,
    /// Maximum number of live sockets
    pub max_sockets: usize,
    /// Capacity of each direction of an in-process channel
    pub channel_capacity: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            io_threads: DEFAULT_IO_THREADS,
            max_sockets: DEFAULT_MAX_SOCKETS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_io_threads(mut self, io_threads: usize) -> Self {
        self.io_threads = io_threads;
        self
    }

    pub fn with_max_sockets(mut self, max_sockets: usize) -> Self {
        self.max_sockets = max_sockets;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}
