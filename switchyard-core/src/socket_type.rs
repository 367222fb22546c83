//! Socket types and the messaging pattern each belongs to.

use std::fmt;

/// Socket types.
///
/// Discriminants follow the classic numbering (PAIR = 0 .. PUSH = 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketType {
    /// Exclusive bidirectional link to exactly one peer
    Pair = 0,
    /// Publisher: fan-out to matching subscribers, never blocks
    Pub = 1,
    /// Subscriber: receives messages matching its prefixes
    Sub = 2,
    /// Strict send/receive alternation, load balanced
    Req = 3,
    /// Strict receive/send alternation, replies to the requester
    Rep = 4,
    /// Asynchronous load-balanced send, fair-queued receive
    Dealer = 5,
    /// Identity-addressed routing
    Router = 6,
    /// Fair-queued receive from pushers
    Pull = 7,
    /// Load-balanced send to pullers
    Push = 8,
}

/// Messaging pattern families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    Pair,
    PubSub,
    ReqRep,
    PushPull,
    RouterDealer,
}

impl SocketType {
    pub const ALL: [SocketType; 9] = [
        Self::Pair,
        Self::Pub,
        Self::Sub,
        Self::Req,
        Self::Rep,
        Self::Dealer,
        Self::Router,
        Self::Pull,
        Self::Push,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Dealer => "DEALER",
            Self::Router => "ROUTER",
            Self::Pull => "PULL",
            Self::Push => "PUSH",
        }
    }

    pub fn pattern(&self) -> Pattern {
        match self {
            Self::Pair => Pattern::Pair,
            Self::Pub | Self::Sub => Pattern::PubSub,
            Self::Req | Self::Rep => Pattern::ReqRep,
            Self::Push | Self::Pull => Pattern::PushPull,
            Self::Dealer | Self::Router => Pattern::RouterDealer,
        }
    }

    /// Whether `send` is meaningful for this type.
    pub fn can_send(&self) -> bool {
        !matches!(self, Self::Sub | Self::Pull)
    }

    /// Whether `recv` is meaningful for this type.
    pub fn can_recv(&self) -> bool {
        !matches!(self, Self::Pub | Self::Push)
    }

    /// Check if this socket type may talk to the given peer type.
    pub fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Pair, Self::Pair)
                | (Self::Pub, Self::Sub)
                | (Self::Sub, Self::Pub)
                | (Self::Req, Self::Rep)
                | (Self::Rep, Self::Req)
                | (Self::Req, Self::Router)
                | (Self::Router, Self::Req)
                | (Self::Dealer, Self::Rep)
                | (Self::Rep, Self::Dealer)
                | (Self::Dealer, Self::Router)
                | (Self::Router, Self::Dealer)
                | (Self::Dealer, Self::Dealer)
                | (Self::Router, Self::Router)
                | (Self::Push, Self::Pull)
                | (Self::Pull, Self::Push)
        )
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_type_display() {
        assert_eq!(SocketType::Dealer.to_string(), "DEALER");
        assert_eq!(SocketType::Pub.to_string(), "PUB");
    }

    #[test]
    fn test_socket_compatibility() {
        assert!(SocketType::Req.is_compatible(SocketType::Rep));
        assert!(SocketType::Req.is_compatible(SocketType::Router));
        assert!(SocketType::Dealer.is_compatible(SocketType::Rep));
        assert!(SocketType::Push.is_compatible(SocketType::Pull));
        assert!(SocketType::Pub.is_compatible(SocketType::Sub));

        assert!(!SocketType::Req.is_compatible(SocketType::Dealer));
        assert!(!SocketType::Pub.is_compatible(SocketType::Pull));
        assert!(!SocketType::Pair.is_compatible(SocketType::Push));
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        for a in SocketType::ALL {
            for b in SocketType::ALL {
                assert_eq!(a.is_compatible(b), b.is_compatible(a), "{a} / {b}");
            }
        }
    }

    #[test]
    fn test_pattern_and_direction() {
        assert_eq!(SocketType::Router.pattern(), Pattern::RouterDealer);
        assert_eq!(SocketType::Sub.pattern(), Pattern::PubSub);
        assert!(!SocketType::Pub.can_recv());
        assert!(!SocketType::Pull.can_send());
        assert!(SocketType::Pair.can_send() && SocketType::Pair.can_recv());
        assert_eq!(SocketType::from_u8(8), Some(SocketType::Push));
        assert_eq!(SocketType::from_u8(9), None);
    }
}
