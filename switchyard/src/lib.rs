//! # Switchyard
//!
//! Pattern-based, message-oriented sockets over pluggable transports.
//!
//! ## Architecture
//!
//! - **`switchyard-core`**: messages, bounded HWM queues, readiness signals,
//!   peer registry, subscriptions, options, and the transport contract with
//!   the built-in in-process transport
//! - **`switchyard-runtime`**: the context with its I/O worker pool, the
//!   socket patterns, the poller and the proxy
//! - **`switchyard`**: public API surface (this crate)
//!
//! ## Socket patterns
//!
//! | pattern       | sockets          | routing                                        |
//! |---------------|------------------|------------------------------------------------|
//! | pair          | `Pair`           | exactly one peer                               |
//! | pipeline      | `Push` / `Pull`  | round-robin out, fair-queued in                |
//! | publish/sub   | `Pub` / `Sub`    | prefix-filtered fan-out, drops at HWM          |
//! | request/reply | `Req` / `Rep`    | strict alternation, envelope carried back      |
//! | async routing | `Router`/`Dealer`| identity-addressed / load-balanced             |
//!
//! ## Quick Start
//!
//! ```rust
//! use switchyard::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let ctx = Context::new(1)?;
//!
//! let pull = ctx.socket(SocketType::Pull)?;
//! pull.bind("inproc://jobs")?;
//! let push = ctx.socket(SocketType::Push)?;
//! push.connect("inproc://jobs")?;
//!
//! // multi-part message, delivered as one unit
//! push.send(Message::new().push_str("job").push_u32(7), SendFlags::empty())?;
//! let job = pull.recv(RecvFlags::empty())?;
//! assert_eq!(job.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Polling
//!
//! ```rust
//! use std::time::Duration;
//! use switchyard::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let ctx = Context::new(1)?;
//! let a = ctx.socket(SocketType::Pull)?;
//! let b = ctx.socket(SocketType::Pull)?;
//!
//! let items = [PollItem::readable(&a), PollItem::readable(&b)];
//! let ready = poll(&items, Some(Duration::ZERO))?;
//! assert!(ready.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod dev_tracing;

// Re-export core types
pub use bytes::Bytes;

pub use switchyard_core::endpoint::{Endpoint, EndpointError};
pub use switchyard_core::error::{Error, Result};
pub use switchyard_core::message::{Frame, Message};
pub use switchyard_core::monitor::{SocketEvent, SocketMonitor};
pub use switchyard_core::options::{ContextOptions, SocketOption, SocketOptions};
pub use switchyard_core::queue::{EnqueueError, Queue};
pub use switchyard_core::readiness::{PollEvents, Pollable};
pub use switchyard_core::signal::{Notify, Signal};
pub use switchyard_core::socket_type::{Pattern, SocketType};
pub use switchyard_runtime::proxy::{ControlCommand, ProxyStatistics, SideStatistics};
pub use switchyard_runtime::{
    poll, proxy, proxy_steerable, Context, ContextState, PollItem, RecvFlags, SendFlags, Socket,
    SocketState,
};

/// Transport collaborator contract, for plugging in schemes beyond `inproc`.
pub mod transport {
    pub use switchyard_core::transport::{
        inproc::InprocChannel, Acceptor, Channel, Disconnected, Greeting, InprocTransport,
        Listener, Packet, Transport, WriteError,
    };
}

/// Everything needed for typical socket code.
pub mod prelude {
    pub use crate::{
        poll, proxy, Bytes, Context, Error, Frame, Message, PollEvents, PollItem, Pollable,
        RecvFlags, Result, SendFlags, Socket, SocketOption, SocketOptions, SocketType,
    };
}

/// Library version as `(major, minor, patch)`.
pub fn version() -> (u32, u32, u32) {
    let parse = |s: &str| s.parse().unwrap_or(0);
    (
        parse(env!("CARGO_PKG_VERSION_MAJOR")),
        parse(env!("CARGO_PKG_VERSION_MINOR")),
        parse(env!("CARGO_PKG_VERSION_PATCH")),
    )
}
