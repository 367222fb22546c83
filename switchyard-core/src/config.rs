//! Default tuning values
//!
//! Shared by `SocketOptions`, `ContextOptions` and the I/O reactor.

use std::time::Duration;

/// Default send/receive high water mark (messages per peer queue)
pub const DEFAULT_HWM: usize = 1000;

/// Default linger period for pending outbound messages on close
pub const DEFAULT_LINGER: Duration = Duration::from_secs(30);

/// Default number of I/O worker threads
pub const DEFAULT_IO_THREADS: usize = 1;

/// Default maximum number of live sockets per context
pub const DEFAULT_MAX_SOCKETS: usize = 1023;

/// Default capacity of one direction of an in-process channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Housekeeping interval of the I/O workers (linger deadlines, idle peers)
pub const REACTOR_TICK: Duration = Duration::from_millis(50);

/// Maximum identity length in bytes
pub const MAX_IDENTITY_LEN: usize = 255;
