//! Per-peer queues shared between a socket and the I/O session driving the
//! peer's channel.
//!
//! The application side enqueues into `outbound` and dequeues from `inbound`;
//! the session does the opposite. Both queues report readiness edges to the
//! session (so it pumps) and to the socket's signal (so blocked callers and
//! pollers re-check).

use bytes::Bytes;
use std::sync::Arc;
use switchyard_core::prelude::*;

#[derive(Debug)]
pub(crate) struct Link {
    /// Same value as the session id of the peer's connection
    pub(crate) id: PeerId,
    /// I/O worker owning the session
    pub(crate) worker: usize,
    pub(crate) peer_type: SocketType,
    /// Routing identity (assigned by the registry on ROUTER sockets)
    pub(crate) identity: Bytes,
    pub(crate) outbound: Queue,
    pub(crate) inbound: Queue,
}

impl Link {
    pub(crate) fn new(
        id: PeerId,
        worker: usize,
        peer_type: SocketType,
        identity: Bytes,
        send_hwm: usize,
        recv_hwm: usize,
        watchers: &[Arc<dyn Notify>],
    ) -> Self {
        let link = Self {
            id,
            worker,
            peer_type,
            identity,
            outbound: Queue::new(send_hwm),
            inbound: Queue::new(recv_hwm),
        };
        for watcher in watchers {
            link.outbound.watch(Arc::clone(watcher));
            link.inbound.watch(Arc::clone(watcher));
        }
        link
    }

    /// Stop traffic in both directions. Inbound messages already queued stay
    /// readable; unsent outbound messages are dropped.
    pub(crate) fn shut(&self) {
        self.outbound.close();
        self.outbound.clear();
        self.inbound.close();
    }

    /// True once the peer is gone and nothing is left to read.
    pub(crate) fn is_drained(&self) -> bool {
        self.inbound.is_closed() && self.inbound.is_empty()
    }
}
