//! Message proxy (broker).
//!
//! A proxy connects a frontend and a backend socket and forwards whole
//! messages in both directions until one of them is closed. Typical setups:
//!
//! ```text
//! Clients    → ROUTER (frontend) → DEALER (backend) → Workers
//! Producers  → PULL   (frontend) → PUSH   (backend) → Consumers
//! Publishers → SUB    (frontend) → PUB    (backend) → Subscribers
//! ```
//!
//! Every forwarded message can be copied to a capture socket. The copy shares
//! frame buffers with the forwarded message and is sent without waiting; a
//! capture socket that cannot keep up simply misses messages.

use bytes::Bytes;
use smallvec::SmallVec;
use std::time::Instant;
use switchyard_core::prelude::*;
use tracing::{debug, trace, warn};

use crate::flags::{RecvFlags, SendFlags};
use crate::poller::{poll, PollItem};
use crate::socket::{SendFailure, Socket, SEND_RECHECK};

/// Traffic counters for one side of a proxy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SideStatistics {
    /// Messages received on this socket
    pub messages_in: u64,
    pub bytes_in: u64,
    /// Messages sent on this socket
    pub messages_out: u64,
    pub bytes_out: u64,
}

/// Counters reported by the `STATISTICS` control command.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProxyStatistics {
    pub frontend: SideStatistics,
    pub backend: SideStatistics,
}

impl ProxyStatistics {
    /// Eight big-endian `u64` frames: frontend then backend, each as
    /// messages in, bytes in, messages out, bytes out.
    pub fn to_message(&self) -> Message {
        [self.frontend, self.backend]
            .iter()
            .fold(Message::with_capacity(8), |msg, side| {
                msg.push_u64(side.messages_in)
                    .push_u64(side.bytes_in)
                    .push_u64(side.messages_out)
                    .push_u64(side.bytes_out)
            })
    }

    /// Inverse of [`to_message`](Self::to_message).
    ///
    /// # Errors
    ///
    /// `MalformedMessage` unless the message has exactly eight 8-byte frames.
    pub fn from_message(msg: &Message) -> Result<Self> {
        if msg.len() != 8 {
            return Err(Error::MalformedMessage("statistics reply needs 8 frames"));
        }
        let mut values = [0u64; 8];
        for (value, frame) in values.iter_mut().zip(msg.frames()) {
            let bytes: [u8; 8] = frame[..]
                .try_into()
                .map_err(|_| Error::MalformedMessage("statistics frame is not 8 bytes"))?;
            *value = u64::from_be_bytes(bytes);
        }
        let side = |v: &[u64]| SideStatistics {
            messages_in: v[0],
            bytes_in: v[1],
            messages_out: v[2],
            bytes_out: v[3],
        };
        Ok(Self {
            frontend: side(&values[..4]),
            backend: side(&values[4..]),
        })
    }
}

/// Commands understood on the control socket of [`proxy_steerable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Terminate,
    Statistics,
}

impl ControlCommand {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Pause => b"PAUSE",
            Self::Resume => b"RESUME",
            Self::Terminate => b"TERMINATE",
            Self::Statistics => b"STATISTICS",
        }
    }

    pub fn parse(frame: &[u8]) -> Option<Self> {
        match frame {
            b"PAUSE" => Some(Self::Pause),
            b"RESUME" => Some(Self::Resume),
            b"TERMINATE" => Some(Self::Terminate),
            b"STATISTICS" => Some(Self::Statistics),
            _ => None,
        }
    }
}

impl From<ControlCommand> for Message {
    fn from(command: ControlCommand) -> Self {
        Message::from(Bytes::from_static(command.as_bytes()))
    }
}

/// Forward messages between `frontend` and `backend` until either is closed.
///
/// # Errors
///
/// `Closed` as soon as either socket is closed (directly or by context
/// shutdown); any other error a receive or forward reports.
///
/// # Examples
///
/// ```no_run
/// use switchyard_core::prelude::*;
/// use switchyard_runtime::{proxy::proxy, Context};
///
/// let ctx = Context::new(1).unwrap();
/// let frontend = ctx.socket(SocketType::Router).unwrap();
/// let backend = ctx.socket(SocketType::Dealer).unwrap();
/// frontend.bind("inproc://clients").unwrap();
/// backend.bind("inproc://workers").unwrap();
///
/// // runs until one side is closed
/// let _ = proxy(&frontend, &backend, None);
/// ```
pub fn proxy(frontend: &Socket, backend: &Socket, capture: Option<&Socket>) -> Result<()> {
    run(frontend, backend, capture, None)
}

/// Like [`proxy`], additionally obeying [`ControlCommand`]s read from
/// `control`.
///
/// `PAUSE` stops forwarding (messages stay queued), `RESUME` restarts it,
/// `TERMINATE` makes the call return `Ok(())`, and `STATISTICS` is answered
/// on the control socket with [`ProxyStatistics::to_message`]. A REP control
/// socket gets an empty reply to every other command so it can receive again.
///
/// # Errors
///
/// As [`proxy`]; a closed control socket also ends the proxy with `Closed`.
pub fn proxy_steerable(
    frontend: &Socket,
    backend: &Socket,
    capture: Option<&Socket>,
    control: &Socket,
) -> Result<()> {
    run(frontend, backend, capture, Some(control))
}

fn run(
    frontend: &Socket,
    backend: &Socket,
    capture: Option<&Socket>,
    control: Option<&Socket>,
) -> Result<()> {
    debug!(
        frontend = %frontend.socket_type(),
        backend = %backend.socket_type(),
        steerable = control.is_some(),
        "[PROXY] starting"
    );
    let result = event_loop(frontend, backend, capture, control);
    debug!(?result, "[PROXY] exited");
    result
}

fn event_loop(
    frontend: &Socket,
    backend: &Socket,
    capture: Option<&Socket>,
    control: Option<&Socket>,
) -> Result<()> {
    let mut stats = ProxyStatistics::default();
    let mut paused = false;

    loop {
        // while paused only closure (ERR) is watched on the data sockets
        let interest = if paused { PollEvents::empty() } else { PollEvents::IN };
        let mut items: SmallVec<[PollItem<'_>; 3]> = SmallVec::new();
        items.push(PollItem::new(frontend, interest));
        items.push(PollItem::new(backend, interest));
        if let Some(control) = control {
            items.push(PollItem::readable(control));
        }

        for (index, events) in poll(&items, None)? {
            if events.contains(PollEvents::ERR) {
                return Err(Error::Closed);
            }
            match index {
                0 if !paused => forward(
                    frontend,
                    backend,
                    capture,
                    &mut stats.frontend,
                    &mut stats.backend,
                )?,
                1 if !paused => forward(
                    backend,
                    frontend,
                    capture,
                    &mut stats.backend,
                    &mut stats.frontend,
                )?,
                2 => {
                    if let Some(control) = control {
                        match steer(control, &stats)? {
                            Some(ControlCommand::Pause) => paused = true,
                            Some(ControlCommand::Resume) => paused = false,
                            Some(ControlCommand::Terminate) => return Ok(()),
                            Some(ControlCommand::Statistics) | None => {}
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Move one message from `from` to `to`.
fn forward(
    from: &Socket,
    to: &Socket,
    capture: Option<&Socket>,
    from_stats: &mut SideStatistics,
    to_stats: &mut SideStatistics,
) -> Result<()> {
    let msg = match from.recv(RecvFlags::DONTWAIT) {
        Ok(msg) => msg,
        Err(Error::WouldBlock) => return Ok(()),
        Err(e) => return Err(e),
    };
    let bytes = msg.byte_len() as u64;
    from_stats.messages_in += 1;
    from_stats.bytes_in += bytes;
    trace!(
        from = %from.socket_type(),
        to = %to.socket_type(),
        frames = msg.len(),
        "[PROXY] forwarding"
    );

    if let Some(capture) = capture {
        if let Err(e) = capture.send(msg.clone(), SendFlags::DONTWAIT) {
            trace!("[PROXY] capture send failed: {}", e);
        }
    }

    let mut pending = msg;
    loop {
        match to.send_with_deadline(pending, Instant::now() + SEND_RECHECK) {
            Ok(()) => break,
            Err(SendFailure {
                error: Error::TimedOut,
                message: Some(msg),
            }) => {
                // keep waiting for room, unless the source went away meanwhile
                if from.is_closed() {
                    return Err(Error::Closed);
                }
                pending = msg;
            }
            Err(SendFailure {
                error: Error::UnknownPeer(identity),
                ..
            }) => {
                trace!(?identity, "[PROXY] reply for departed peer dropped");
                return Ok(());
            }
            Err(failure) => return Err(failure.error),
        }
    }
    to_stats.messages_out += 1;
    to_stats.bytes_out += bytes;
    Ok(())
}

fn steer(control: &Socket, stats: &ProxyStatistics) -> Result<Option<ControlCommand>> {
    let msg = match control.recv(RecvFlags::DONTWAIT) {
        Ok(msg) => msg,
        Err(Error::WouldBlock) => return Ok(None),
        Err(e) => return Err(e),
    };
    let command = msg.first().and_then(|frame| ControlCommand::parse(frame));
    debug!(?command, "[PROXY] control command");

    let reply = match command {
        Some(ControlCommand::Statistics) => Some(stats.to_message()),
        _ if control.socket_type() == SocketType::Rep => Some(Message::from(Bytes::new())),
        _ => None,
    };
    if command.is_none() {
        warn!(frames = msg.len(), "[PROXY] unknown control command ignored");
    }
    if let Some(reply) = reply {
        if let Err(e) = control.send(reply, SendFlags::DONTWAIT) {
            warn!("[PROXY] control reply failed: {}", e);
        }
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_layout() {
        let stats = ProxyStatistics {
            frontend: SideStatistics {
                messages_in: 1,
                bytes_in: 2,
                messages_out: 3,
                bytes_out: 4,
            },
            backend: SideStatistics {
                messages_in: 5,
                bytes_in: 6,
                messages_out: 7,
                bytes_out: 8,
            },
        };
        let msg = stats.to_message();
        assert_eq!(msg.len(), 8);
        assert_eq!(msg.frames()[0].as_ref(), &1u64.to_be_bytes());
        assert_eq!(msg.frames()[7].as_ref(), &8u64.to_be_bytes());
        assert_eq!(ProxyStatistics::from_message(&msg).unwrap(), stats);
    }

    #[test]
    fn test_statistics_reject_short_reply() {
        let msg = Message::new().push_u64(1);
        assert!(matches!(
            ProxyStatistics::from_message(&msg),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_control_command_parse() {
        for command in [
            ControlCommand::Pause,
            ControlCommand::Resume,
            ControlCommand::Terminate,
            ControlCommand::Statistics,
        ] {
            assert_eq!(ControlCommand::parse(command.as_bytes()), Some(command));
        }
        assert_eq!(ControlCommand::parse(b"pause"), None);
    }
}
