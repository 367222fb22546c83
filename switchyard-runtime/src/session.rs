//! One connection, driven by an I/O worker.
//!
//! A session moves packets between its channel and the peer's `Link`:
//!
//! ```text
//! link.outbound ──▶ [control packets first] ──▶ channel.try_write
//! channel.try_read ──▶ greeting / subscription / message ──▶ link.inbound
//! ```
//!
//! Nothing here blocks. When the channel or the inbound queue is full the
//! packet is parked (`stalled_out` / `stalled_in`) and the session waits for
//! the next readiness edge to retry it, so per-peer order is preserved.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use switchyard_core::prelude::*;
use switchyard_core::transport::{Channel, Greeting, WriteError};
use tracing::{debug, trace};

use crate::link::Link;
use crate::reactor::{PumpHook, SessionId};
use crate::socket::SocketInner;

/// What the worker should do with the session after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// The session ended and must be dropped
    Finished(&'static str),
}

pub(crate) struct Session {
    id: SessionId,
    worker: usize,
    socket: Weak<SocketInner>,
    socket_type: SocketType,
    channel: Box<dyn Channel>,
    hook: Arc<PumpHook>,
    /// Set once the peer's greeting was accepted
    link: Option<Arc<Link>>,
    /// Greeting and subscription packets, sent ahead of data
    control: VecDeque<Packet>,
    stalled_out: Option<Packet>,
    stalled_in: Option<Message>,
    closing: bool,
    linger_deadline: Option<Instant>,
    /// ROUTER: activity already recorded this tick
    touched: bool,
    done: bool,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        worker: usize,
        socket: Weak<SocketInner>,
        socket_type: SocketType,
        greeting: Greeting,
        mut channel: Box<dyn Channel>,
        hook: Arc<PumpHook>,
    ) -> Self {
        channel.watch(Arc::clone(&hook) as Arc<dyn Notify>);
        let mut control = VecDeque::new();
        control.push_back(Packet::Greeting(greeting));
        Self {
            id,
            worker,
            socket,
            socket_type,
            channel,
            hook,
            link: None,
            control,
            stalled_out: None,
            stalled_in: None,
            closing: false,
            linger_deadline: None,
            touched: false,
            done: false,
        }
    }

    pub(crate) fn push_control(&mut self, packet: Packet) {
        if !self.closing {
            self.control.push_back(packet);
        }
    }

    /// Move as much as possible in both directions.
    pub(crate) fn pump(&mut self) -> Flow {
        if self.done {
            return Flow::Finished("already finished");
        }
        self.hook.rearm();

        if let Flow::Finished(reason) = self.flush_outbound() {
            return self.finish(reason);
        }
        if self.closing {
            return Flow::Continue;
        }
        let attached_before = self.link.is_some();
        if let Flow::Finished(reason) = self.drain_inbound() {
            return self.finish(reason);
        }
        // a fresh attach queued the subscription replay
        if !attached_before && self.link.is_some() {
            if let Flow::Finished(reason) = self.flush_outbound() {
                return self.finish(reason);
            }
        }
        Flow::Continue
    }

    fn flush_outbound(&mut self) -> Flow {
        loop {
            let packet = if let Some(packet) = self.stalled_out.take() {
                packet
            } else if let Some(packet) = self.control.pop_front() {
                packet
            } else if let Some(link) = &self.link {
                match link.outbound.try_dequeue() {
                    Ok(msg) => Packet::Message(msg),
                    Err(Error::Closed) if self.closing => return Flow::Finished("linger complete"),
                    Err(_) => return Flow::Continue,
                }
            } else if self.closing {
                return Flow::Finished("closed before handshake");
            } else {
                return Flow::Continue;
            };

            match self.channel.try_write(packet) {
                Ok(()) => {}
                Err(WriteError::Full(packet)) => {
                    self.stalled_out = Some(packet);
                    return Flow::Continue;
                }
                Err(WriteError::Disconnected(_)) => return Flow::Finished("peer disconnected"),
            }
        }
    }

    fn drain_inbound(&mut self) -> Flow {
        if let Some(msg) = self.stalled_in.take() {
            if !self.deliver(msg) {
                return Flow::Continue;
            }
        }
        loop {
            let packet = match self.channel.try_read() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Flow::Continue,
                Err(_) => return Flow::Finished("peer disconnected"),
            };
            match packet {
                Packet::Greeting(greeting) => {
                    if self.link.is_some() {
                        return Flow::Finished("duplicate greeting");
                    }
                    if let Flow::Finished(reason) = self.attach(greeting) {
                        return Flow::Finished(reason);
                    }
                }
                Packet::Subscription(event) => {
                    let Some(link) = &self.link else {
                        return Flow::Finished("subscription before greeting");
                    };
                    if let Some(socket) = self.socket.upgrade() {
                        socket.apply_peer_subscription(link.id, event);
                    }
                }
                Packet::Message(msg) => {
                    if self.link.is_none() {
                        return Flow::Finished("message before greeting");
                    }
                    if !self.deliver(msg) {
                        return Flow::Continue;
                    }
                }
            }
        }
    }

    fn attach(&mut self, greeting: Greeting) -> Flow {
        let Some(socket) = self.socket.upgrade() else {
            return Flow::Finished("socket dropped");
        };
        let pump = Arc::clone(&self.hook) as Arc<dyn Notify>;
        match socket.attach_peer(self.id, self.worker, greeting, pump) {
            Ok((link, replay)) => {
                self.control.extend(replay);
                self.link = Some(link);
                Flow::Continue
            }
            Err(_) => Flow::Finished("handshake rejected"),
        }
    }

    /// `false` when the inbound queue is full and the message was parked.
    fn deliver(&mut self, msg: Message) -> bool {
        let Some(link) = &self.link else {
            return true;
        };
        match link.inbound.try_enqueue(msg) {
            Ok(()) => {
                if self.socket_type == SocketType::Router && !self.touched {
                    self.touched = true;
                    if let Some(socket) = self.socket.upgrade() {
                        socket.touch_peer(link.id, Instant::now());
                    }
                }
                true
            }
            Err(EnqueueError::Full(msg)) => {
                trace!(session = self.id, "[SESSION] inbound queue full, pausing reads");
                self.stalled_in = Some(msg);
                false
            }
            // socket closed; nobody will read it
            Err(_) => true,
        }
    }

    /// The socket closed. Keep flushing queued messages for up to `linger`.
    pub(crate) fn begin_close(&mut self, linger: Option<Duration>) -> Flow {
        self.closing = true;
        self.stalled_in = None;
        match linger {
            None => self.finish("closed without linger"),
            Some(linger) => {
                // unrepresentable linger: flush until the peer drains or goes away
                self.linger_deadline = Instant::now().checked_add(linger);
                self.pump()
            }
        }
    }

    /// Periodic housekeeping: linger deadline, peer idle timeout, and a retry
    /// of anything left stalled.
    pub(crate) fn tick(&mut self, now: Instant) -> Flow {
        self.touched = false;
        if self.linger_deadline.is_some_and(|deadline| now >= deadline) {
            return self.finish("linger expired");
        }
        if self.socket_type == SocketType::Router && !self.closing {
            let idle = match (&self.link, self.socket.upgrade()) {
                (Some(link), Some(socket)) => socket.peer_is_idle(link.id, now),
                _ => false,
            };
            if idle {
                return self.finish("peer idle");
            }
        }
        self.pump()
    }

    /// Tear the session down and tell the socket. Idempotent.
    pub(crate) fn finish(&mut self, reason: &'static str) -> Flow {
        if self.done {
            return Flow::Finished(reason);
        }
        self.done = true;
        self.channel.close();
        let socket = self.socket.upgrade();
        match (self.link.take(), socket) {
            (Some(link), Some(socket)) => socket.detach_peer(&link),
            (Some(link), None) => link.shut(),
            (None, Some(socket)) => socket.forget_session(self.id),
            (None, None) => {}
        }
        debug!(session = self.id, worker = self.worker, reason, "[SESSION] finished");
        Flow::Finished(reason)
    }
}
