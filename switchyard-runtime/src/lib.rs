//! Switchyard Runtime
//!
//! Threaded runtime for the Switchyard socket core:
//! - `Context`: socket lifecycle, transports and the I/O worker pool
//! - `Socket`: PAIR, PUB/SUB, REQ/REP, PUSH/PULL and ROUTER/DEALER patterns
//! - `poller::poll`: readiness multiplexing across sockets and queues
//! - `proxy`: bidirectional forwarding with optional capture and control
//!
//! Application calls never touch a transport directly. They exchange messages
//! with per-peer queues that the I/O workers (`reactor`, `session`) move to
//! and from each peer's channel.

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_arguments)]

mod context;
mod flags;
mod link;
pub mod poller;
pub mod proxy;
mod reactor;
mod session;
mod socket;

pub use context::{Context, ContextState};
pub use flags::{RecvFlags, SendFlags};
pub use poller::{poll, PollItem};
pub use proxy::{proxy, proxy_steerable, ControlCommand, ProxyStatistics, SideStatistics};
pub use socket::{Socket, SocketState};
