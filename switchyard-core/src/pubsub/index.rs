//! Publisher-side subscription index.
//!
//! A PUB socket records, per prefix, which peers want it. Prefixes stay sorted
//! so a topic lookup is a forward scan that stops as soon as the prefix sorts
//! after the topic. Peers are plain `PeerId`s to keep the table dense.

use bytes::Bytes;
use smallvec::SmallVec;

use crate::peer::PeerId;

/// Peers matched by one topic. Inline for typical fan-out.
pub type Targets = SmallVec<[PeerId; 16]>;

#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    // (prefix, subscribed peers), sorted by prefix, never with an empty peer list
    table: Vec<(Bytes, SmallVec<[PeerId; 4]>)>,
}

impl SubscriptionIndex {
    #[must_use]
    pub const fn new() -> Self {
        Self { table: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of distinct prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    fn find(&self, prefix: &[u8]) -> Result<usize, usize> {
        self.table.binary_search_by(|(p, _)| p.as_ref().cmp(prefix))
    }

    pub fn subscribe(&mut self, peer: PeerId, prefix: Bytes) {
        match self.find(&prefix) {
            Ok(idx) => {
                let peers = &mut self.table[idx].1;
                if !peers.contains(&peer) {
                    peers.push(peer);
                }
            }
            Err(idx) => {
                let mut peers = SmallVec::new();
                peers.push(peer);
                self.table.insert(idx, (prefix, peers));
            }
        }
    }

    pub fn unsubscribe(&mut self, peer: PeerId, prefix: &[u8]) {
        if let Ok(idx) = self.find(prefix) {
            let peers = &mut self.table[idx].1;
            peers.retain(|p| *p != peer);
            if peers.is_empty() {
                self.table.remove(idx);
            }
        }
    }

    /// Forget a disconnected peer.
    pub fn remove_peer(&mut self, peer: PeerId) {
        self.table.retain_mut(|(_, peers)| {
            peers.retain(|p| *p != peer);
            !peers.is_empty()
        });
    }

    /// Peers subscribed to any prefix of `topic`, deduplicated.
    #[must_use]
    pub fn match_topic(&self, topic: &[u8]) -> Targets {
        let mut out = Targets::new();
        for (prefix, peers) in &self.table {
            if prefix.as_ref() > topic {
                break;
            }
            if topic.starts_with(prefix) {
                out.extend_from_slice(peers);
            }
        }
        // nested prefixes
        if out.len() > 1 {
            out.sort_unstable();
            out.dedup();
        }
        out
    }
}
