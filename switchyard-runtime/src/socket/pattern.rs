//! Pattern routing.
//!
//! Every socket type shares one `SocketCore`; the type picks which of the
//! routines below handle `send` and `recv`, and `PatternState` carries the
//! little state the request/reply types need between calls. All routines run
//! under the socket lock and never block: they either complete, report
//! `Blocked` so the caller can wait for a readiness change, or fail.

use bytes::Bytes;
use std::sync::Arc;
use switchyard_core::prelude::*;
use tracing::trace;

use super::state::SocketCore;
use crate::link::Link;

/// Result of a non-blocking send attempt.
pub(crate) enum SendOutcome {
    Sent,
    /// No peer could take the message right now; it is handed back.
    Blocked(Message),
}

/// REQ: `Idle -> Sent -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReqState {
    Idle,
    Sent { request_id: u32, peer: PeerId },
}

/// REP: `Idle -> Received -> Idle`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RepState {
    Idle,
    Received { peer: PeerId, envelope: Message },
}

#[derive(Debug)]
pub(crate) enum PatternState {
    /// Types whose routing needs no state between calls
    Stateless,
    Req { state: ReqState, next_request_id: u32 },
    Rep(RepState),
}

impl PatternState {
    pub(crate) fn for_type(socket_type: SocketType) -> Self {
        match socket_type {
            SocketType::Req => Self::Req {
                state: ReqState::Idle,
                next_request_id: rand::random(),
            },
            SocketType::Rep => Self::Rep(RepState::Idle),
            _ => Self::Stateless,
        }
    }

    pub(crate) fn reset(&mut self) {
        match self {
            Self::Req { state, .. } => *state = ReqState::Idle,
            Self::Rep(state) => *state = RepState::Idle,
            Self::Stateless => {}
        }
    }
}

fn unsupported_send(socket_type: SocketType) -> Error {
    Error::not_supported(format!("{socket_type} sockets cannot send"))
}

fn unsupported_recv(socket_type: SocketType) -> Error {
    Error::not_supported(format!("{socket_type} sockets cannot receive"))
}

impl SocketCore {
    pub(crate) fn try_send(&mut self, msg: Message) -> Result<SendOutcome> {
        match self.socket_type {
            SocketType::Pair | SocketType::Push | SocketType::Dealer => {
                Ok(match self.load_balance(msg) {
                    Ok(_) => SendOutcome::Sent,
                    Err(msg) => SendOutcome::Blocked(msg),
                })
            }
            SocketType::Req => self.req_send(msg),
            SocketType::Rep => self.rep_send(msg),
            SocketType::Router => self.router_send(msg),
            SocketType::Pub => {
                self.publish(msg);
                Ok(SendOutcome::Sent)
            }
            SocketType::Sub | SocketType::Pull => Err(unsupported_send(self.socket_type)),
        }
    }

    /// `Ok(None)` means nothing is available yet.
    pub(crate) fn try_recv(&mut self) -> Result<Option<Message>> {
        match self.socket_type {
            SocketType::Pair | SocketType::Pull | SocketType::Dealer => {
                Ok(self.fair_dequeue().map(|(_, msg)| msg))
            }
            SocketType::Sub => Ok(self.sub_recv()),
            SocketType::Req => self.req_recv(),
            SocketType::Rep => self.rep_recv(),
            SocketType::Router => Ok(self.router_recv()),
            SocketType::Pub | SocketType::Push => Err(unsupported_recv(self.socket_type)),
        }
    }

    /// Hand the message to the next peer in rotation with room for it.
    ///
    /// Only lock holders enqueue into outbound queues, so a queue seen
    /// writable here stays writable until the enqueue below.
    fn load_balance(&mut self, msg: Message) -> std::result::Result<PeerId, Message> {
        let links = &self.links;
        let picked = self.rotation.select(|id| {
            links
                .get(&id)
                .filter(|link| link.outbound.is_writable())
                .map(Arc::clone)
        });
        match picked {
            Some((id, link)) => link
                .outbound
                .try_enqueue(msg)
                .map(|()| id)
                .map_err(EnqueueError::into_inner),
            None => Err(msg),
        }
    }

    /// Take the next message from the rotation, dropping links whose peer is
    /// gone and whose queue has been read dry.
    pub(crate) fn fair_dequeue(&mut self) -> Option<(Arc<Link>, Message)> {
        let links = &self.links;
        let mut drained: smallvec::SmallVec<[PeerId; 2]> = smallvec::SmallVec::new();
        let picked = self.rotation.select(|id| {
            let link = links.get(&id)?;
            match link.inbound.try_dequeue() {
                Ok(msg) => Some((Arc::clone(link), msg)),
                Err(Error::Closed) => {
                    drained.push(id);
                    None
                }
                Err(_) => None,
            }
        });
        for id in drained {
            self.remove_link(id);
        }
        picked.map(|(_, value)| value)
    }

    fn publish(&mut self, msg: Message) {
        let topic = msg.first().map_or(&[][..], |t| &t[..]);
        for peer in self.subscribers.match_topic(topic) {
            let Some(link) = self.links.get(&peer) else {
                continue;
            };
            if link.outbound.try_enqueue(msg.clone()).is_err() {
                trace!(peer, "[PUB] peer at high water mark, message dropped");
            }
        }
    }

    fn sub_recv(&mut self) -> Option<Message> {
        loop {
            let (_, msg) = self.fair_dequeue()?;
            let topic = msg.first().map_or(&[][..], |t| &t[..]);
            if self.subscriptions.matches(topic) {
                return Some(msg);
            }
        }
    }

    fn req_send(&mut self, mut msg: Message) -> Result<SendOutcome> {
        let PatternState::Req {
            state,
            next_request_id,
        } = &mut self.pattern
        else {
            return Err(unsupported_send(self.socket_type));
        };
        if let ReqState::Sent { .. } = state {
            return Err(Error::StateViolation(
                "REQ socket must receive a reply before sending again",
            ));
        }
        let request_id = *next_request_id;
        msg.push_front(Bytes::new());
        msg.push_front(Bytes::copy_from_slice(&request_id.to_be_bytes()));

        match self.load_balance(msg) {
            Ok(peer) => {
                if let PatternState::Req {
                    state,
                    next_request_id,
                } = &mut self.pattern
                {
                    *state = ReqState::Sent { request_id, peer };
                    *next_request_id = next_request_id.wrapping_add(1);
                }
                Ok(SendOutcome::Sent)
            }
            Err(mut msg) => {
                // strip id and delimiter again
                drop(msg.split_front(2));
                Ok(SendOutcome::Blocked(msg))
            }
        }
    }

    fn req_recv(&mut self) -> Result<Option<Message>> {
        let expected = match &self.pattern {
            PatternState::Req {
                state: ReqState::Sent { request_id, .. },
                ..
            } => *request_id,
            PatternState::Req { .. } => {
                return Err(Error::StateViolation(
                    "REQ socket must send a request before receiving",
                ));
            }
            _ => return Err(unsupported_recv(self.socket_type)),
        };
        while let Some((_, mut msg)) = self.fair_dequeue() {
            let matches = msg.len() >= 2
                && msg.frames()[0][..] == expected.to_be_bytes()[..]
                && msg.frames()[1].is_empty();
            if !matches {
                trace!("[REQ] discarding stale or malformed reply");
                continue;
            }
            drop(msg.split_front(2));
            self.pattern.reset();
            return Ok(Some(msg));
        }
        Ok(None)
    }

    fn rep_recv(&mut self) -> Result<Option<Message>> {
        match &self.pattern {
            PatternState::Rep(RepState::Idle) => {}
            PatternState::Rep(RepState::Received { .. }) => {
                return Err(Error::StateViolation(
                    "REP socket must reply before receiving again",
                ));
            }
            _ => return Err(unsupported_recv(self.socket_type)),
        }
        while let Some((link, mut msg)) = self.fair_dequeue() {
            let Some(delimiter) = msg.delimiter_position() else {
                trace!(peer = link.id, "[REP] request without envelope delimiter dropped");
                continue;
            };
            let envelope = msg.split_front(delimiter + 1);
            self.pattern = PatternState::Rep(RepState::Received {
                peer: link.id,
                envelope,
            });
            return Ok(Some(msg));
        }
        Ok(None)
    }

    fn rep_send(&mut self, msg: Message) -> Result<SendOutcome> {
        let (peer, envelope) = match &self.pattern {
            PatternState::Rep(RepState::Received { peer, envelope }) => (*peer, envelope.clone()),
            PatternState::Rep(RepState::Idle) => {
                return Err(Error::StateViolation(
                    "REP socket must receive a request before replying",
                ));
            }
            _ => return Err(unsupported_send(self.socket_type)),
        };

        let Some(link) = self.links.get(&peer) else {
            trace!(peer, "[REP] requester gone, reply dropped");
            self.pattern.reset();
            return Ok(SendOutcome::Sent);
        };
        if !link.outbound.is_writable() && !link.outbound.is_closed() {
            return Ok(SendOutcome::Blocked(msg));
        }

        let mut reply = envelope;
        reply.extend(msg);
        if link.outbound.try_enqueue(reply).is_err() {
            trace!(peer, "[REP] requester disconnected, reply dropped");
        }
        self.pattern.reset();
        Ok(SendOutcome::Sent)
    }

    fn router_recv(&mut self) -> Option<Message> {
        let (link, mut msg) = self.fair_dequeue()?;
        msg.push_front(link.identity.clone());
        Some(msg)
    }

    fn router_send(&mut self, mut msg: Message) -> Result<SendOutcome> {
        if msg.len() < 2 {
            return Err(Error::MalformedMessage(
                "ROUTER messages need an identity frame followed by a body",
            ));
        }
        let Some(identity) = msg.pop_front() else {
            return Err(Error::MalformedMessage("ROUTER message has no identity frame"));
        };
        let link = self
            .peers
            .lookup(&identity)
            .and_then(|peer| self.links.get(&peer));
        let Some(link) = link else {
            return Err(Error::UnknownPeer(identity));
        };
        if link.outbound.is_closed() {
            return Err(Error::UnknownPeer(identity));
        }
        if !link.outbound.is_writable() {
            msg.push_front(identity);
            return Ok(SendOutcome::Blocked(msg));
        }
        link.outbound
            .try_enqueue(msg)
            .map_err(|_| Error::UnknownPeer(identity))?;
        Ok(SendOutcome::Sent)
    }

    /// Whether a `recv` could make progress, as seen by pollers.
    pub(crate) fn is_readable(&self) -> bool {
        match &self.pattern {
            PatternState::Req {
                state: ReqState::Idle,
                ..
            } => return false,
            PatternState::Rep(RepState::Received { .. }) => return false,
            _ => {}
        }
        self.socket_type.can_recv()
            && self.links.values().any(|link| !link.inbound.is_empty())
    }

    /// Whether a `send` could complete without waiting, as seen by pollers.
    pub(crate) fn is_writable(&self) -> bool {
        let any_writable = || self.links.values().any(|link| link.outbound.is_writable());
        match (self.socket_type, &self.pattern) {
            // never block: drops or fails fast instead
            (SocketType::Pub | SocketType::Router, _) => true,
            (SocketType::Sub | SocketType::Pull, _) => false,
            (_, PatternState::Req { state: ReqState::Sent { .. }, .. }) => false,
            (_, PatternState::Rep(RepState::Idle)) => false,
            (_, PatternState::Rep(RepState::Received { peer, .. })) => self
                .links
                .get(peer)
                .map_or(true, |link| link.outbound.is_writable() || link.outbound.is_closed()),
            _ => any_writable(),
        }
    }
}
