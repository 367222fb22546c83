//! Switchyard Core
//!
//! This crate contains the runtime-agnostic building blocks shared by every
//! socket pattern:
//! - Frames and logical messages (`message`)
//! - Bounded HWM queues with blocking, non-blocking and timed access (`queue`)
//! - Readiness signals and the `Pollable` contract (`signal`, `readiness`)
//! - Round-robin peer rotation for load balancing / fair queueing (`balance`)
//! - ROUTER peer registry (`peer`)
//! - PUB/SUB subscription sets and the publisher-side index (`subscription`, `pubsub`)
//! - Socket options, endpoints, socket types and monitor events
//! - The transport collaborator contract plus the in-process transport (`transport`)
//! - Error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
pub mod balance;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod monitor;
pub mod options;
pub mod peer;
pub mod queue;
pub mod readiness;
pub mod signal;
pub mod socket_type;
pub mod subscription;
pub mod transport;

pub mod pubsub {
    pub mod index;
}

// Keep the prelude small; downstream crates import modules directly for anything else.
pub mod prelude {
    pub use crate::balance::RoundRobin;
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{Error, Result};
    pub use crate::message::{Frame, Message};
    pub use crate::monitor::{SocketEvent, SocketMonitor};
    pub use crate::options::{ContextOptions, SocketOption, SocketOptions};
    pub use crate::peer::{PeerId, PeerRegistry};
    pub use crate::pubsub::index::SubscriptionIndex;
    pub use crate::queue::{EnqueueError, Queue};
    pub use crate::readiness::{PollEvents, Pollable};
    pub use crate::signal::{deadline_after, Notify, Signal, WatchKey};
    pub use crate::socket_type::{Pattern, SocketType};
    pub use crate::subscription::{SubscriptionEvent, SubscriptionSet};
    pub use crate::transport::{Channel, Greeting, Packet, Transport};
}
