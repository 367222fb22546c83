//! ROUTER peer registry.
//!
//! Maps routing identities to live connections. Each connection is known by
//! a `PeerId` (the id of its link), and each entry tracks when the peer was
//! last heard from so that idle peers can be dropped.
//!
//! Peers that announce no identity get a generated 5-byte one: a zero byte
//! followed by a big-endian counter seeded at random, so generated ids can
//! never collide with application-chosen ones (which may not start with 0).

use bytes::{BufMut, Bytes, BytesMut};
use hashbrown::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Connection-unique peer key.
pub type PeerId = u64;

/// Registry entry for one connected peer.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub identity: Bytes,
    pub peer: PeerId,
    pub last_seen: Instant,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("identity {0:?} is already bound to a live peer")]
    DuplicateIdentity(Bytes),

    #[error("peer {0} is already registered")]
    DuplicatePeer(PeerId),
}

#[derive(Debug)]
pub struct PeerRegistry {
    by_identity: HashMap<Bytes, PeerEntry>,
    by_peer: HashMap<PeerId, Bytes>,
    next_generated: u32,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            by_identity: HashMap::new(),
            by_peer: HashMap::new(),
            next_generated: rand::random(),
        }
    }

    fn generate_identity(&mut self) -> Bytes {
        loop {
            let mut id = BytesMut::with_capacity(5);
            id.put_u8(0);
            id.put_u32(self.next_generated);
            self.next_generated = self.next_generated.wrapping_add(1);
            let id = id.freeze();
            if !self.by_identity.contains_key(&id) {
                return id;
            }
        }
    }

    /// Register a connection, returning the identity it is routed by.
    ///
    /// # Errors
    ///
    /// Fails if the announced identity already belongs to another live peer;
    /// the existing peer keeps it.
    pub fn register(
        &mut self,
        identity: Option<Bytes>,
        peer: PeerId,
        now: Instant,
    ) -> Result<Bytes, RegistryError> {
        if self.by_peer.contains_key(&peer) {
            return Err(RegistryError::DuplicatePeer(peer));
        }
        let identity = match identity.filter(|id| !id.is_empty()) {
            Some(id) if self.by_identity.contains_key(&id) => {
                return Err(RegistryError::DuplicateIdentity(id));
            }
            Some(id) => id,
            None => self.generate_identity(),
        };
        self.by_peer.insert(peer, identity.clone());
        self.by_identity.insert(
            identity.clone(),
            PeerEntry {
                identity: identity.clone(),
                peer,
                last_seen: now,
            },
        );
        Ok(identity)
    }

    /// Drop a peer (disconnect or idle timeout).
    pub fn remove(&mut self, peer: PeerId) -> Option<PeerEntry> {
        let identity = self.by_peer.remove(&peer)?;
        self.by_identity.remove(&identity)
    }

    pub fn lookup(&self, identity: &[u8]) -> Option<PeerId> {
        self.by_identity.get(identity).map(|e| e.peer)
    }

    pub fn get(&self, peer: PeerId) -> Option<&PeerEntry> {
        self.by_peer
            .get(&peer)
            .and_then(|id| self.by_identity.get(id))
    }

    /// Record inbound activity.
    pub fn touch(&mut self, peer: PeerId, now: Instant) {
        if let Some(identity) = self.by_peer.get(&peer) {
            if let Some(entry) = self.by_identity.get_mut(identity) {
                entry.last_seen = now;
            }
        }
    }

    /// True when the peer has been silent for longer than `idle`.
    pub fn is_idle(&self, peer: PeerId, idle: Duration, now: Instant) -> bool {
        self.get(peer)
            .is_some_and(|e| now.saturating_duration_since(e.last_seen) > idle)
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_identity.clear();
        self.by_peer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut reg = PeerRegistry::new();
        let now = Instant::now();
        let id = reg
            .register(Some(Bytes::from_static(b"worker-1")), 10, now)
            .unwrap();
        assert_eq!(id, Bytes::from_static(b"worker-1"));
        assert_eq!(reg.lookup(b"worker-1"), Some(10));
        assert_eq!(reg.lookup(b"worker-2"), None);
    }

    #[test]
    fn test_generated_identity_shape() {
        let mut reg = PeerRegistry::new();
        let now = Instant::now();
        let a = reg.register(None, 1, now).unwrap();
        let b = reg.register(Some(Bytes::new()), 2, now).unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(a[0], 0);
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut reg = PeerRegistry::new();
        let now = Instant::now();
        reg.register(Some(Bytes::from_static(b"dup")), 1, now).unwrap();
        assert_eq!(
            reg.register(Some(Bytes::from_static(b"dup")), 2, now),
            Err(RegistryError::DuplicateIdentity(Bytes::from_static(b"dup")))
        );
        assert_eq!(reg.lookup(b"dup"), Some(1));

        // Identity becomes available again once the holder leaves
        reg.remove(1);
        assert!(reg.register(Some(Bytes::from_static(b"dup")), 2, now).is_ok());
    }

    #[test]
    fn test_idle_tracking() {
        let mut reg = PeerRegistry::new();
        let start = Instant::now();
        reg.register(Some(Bytes::from_static(b"p")), 1, start).unwrap();

        let idle = Duration::from_millis(100);
        assert!(!reg.is_idle(1, idle, start + Duration::from_millis(50)));
        assert!(reg.is_idle(1, idle, start + Duration::from_millis(150)));

        reg.touch(1, start + Duration::from_millis(120));
        assert!(!reg.is_idle(1, idle, start + Duration::from_millis(150)));
        assert!(!reg.is_idle(99, idle, start + Duration::from_secs(10)));
    }
}
