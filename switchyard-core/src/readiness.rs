//! Readiness flags and the pollable-source contract.

use std::sync::Arc;

use crate::signal::{Notify, WatchKey};

bitflags::bitflags! {
    /// Readiness conditions reported by a pollable source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PollEvents: u8 {
        /// A receive would not block
        const IN = 0b001;
        /// A send would not block
        const OUT = 0b010;
        /// The source is closed or otherwise unusable
        const ERR = 0b100;
    }
}

/// Anything a poller can wait on: sockets, queues, or external sources
/// wrapped by the application.
///
/// `watch` registers a notifier that fires whenever `readiness()` may have
/// changed; spurious notifications are allowed, missed edges are not.
pub trait Pollable: Sync {
    fn readiness(&self) -> PollEvents;

    fn watch(&self, notify: Arc<dyn Notify>) -> WatchKey;

    fn unwatch(&self, key: WatchKey);
}
