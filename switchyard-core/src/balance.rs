//! Round-robin rotation over attached peers.
//!
//! The same rotation drives outbound load balancing (PUSH, DEALER, REQ) and
//! inbound fair queueing (PULL, DEALER, ROUTER, SUB): starting at the cursor,
//! peers are offered the operation in turn and the cursor moves past whichever
//! peer accepted it, so no ready peer is skipped twice in a row.

use crate::peer::PeerId;

#[derive(Debug, Default, Clone)]
pub struct RoundRobin {
    ids: Vec<PeerId>,
    cursor: usize,
}

impl RoundRobin {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ids: Vec::new(),
            cursor: 0,
        }
    }

    /// Add a peer at the end of the rotation. Duplicates are ignored.
    pub fn add(&mut self, id: PeerId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    /// Remove a peer, keeping the cursor on the same successor.
    pub fn remove(&mut self, id: PeerId) -> bool {
        let Some(pos) = self.ids.iter().position(|p| *p == id) else {
            return false;
        };
        self.ids.remove(pos);
        if pos < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.ids.len() {
            self.cursor = 0;
        }
        true
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.ids.iter().copied()
    }

    /// Offer the operation to each peer once, starting at the cursor.
    ///
    /// Returns the first peer for which `attempt` produced a value, and moves
    /// the cursor just past it. The cursor does not move when nobody accepts.
    pub fn select<R>(&mut self, mut attempt: impl FnMut(PeerId) -> Option<R>) -> Option<(PeerId, R)> {
        let n = self.ids.len();
        for step in 0..n {
            let idx = (self.cursor + step) % n;
            let id = self.ids[idx];
            if let Some(value) = attempt(id) {
                self.cursor = (idx + 1) % n;
                return Some((id, value));
            }
        }
        None
    }
}
