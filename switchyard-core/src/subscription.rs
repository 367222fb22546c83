//! Subscriber-side topic filter.
//!
//! A SUB socket keeps one `SubscriptionSet`. Prefixes are reference counted:
//! subscribing twice to the same prefix needs two unsubscribes before the
//! prefix stops matching, and only the first subscribe / last unsubscribe
//! produce a [`SubscriptionEvent`] for upstream publishers.

use bytes::Bytes;

/// Counted, sorted set of topic prefixes.
///
/// - empty set matches nothing
/// - an empty prefix matches every topic
#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    // Sorted by prefix; the count is always >= 1.
    entries: Vec<(Bytes, usize)>,
}

impl SubscriptionSet {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add one reference to `prefix`. Returns true if the prefix is new.
    pub fn subscribe(&mut self, prefix: Bytes) -> bool {
        match self.entries.binary_search_by(|(p, _)| p.cmp(&prefix)) {
            Ok(idx) => {
                self.entries[idx].1 += 1;
                false
            }
            Err(idx) => {
                self.entries.insert(idx, (prefix, 1));
                true
            }
        }
    }

    /// Drop one reference to `prefix`. Returns true if the prefix is gone.
    ///
    /// Unsubscribing a prefix that was never subscribed is a no-op.
    pub fn unsubscribe(&mut self, prefix: &[u8]) -> bool {
        let Ok(idx) = self.entries.binary_search_by(|(p, _)| p.as_ref().cmp(prefix)) else {
            return false;
        };
        let count = &mut self.entries[idx].1;
        *count -= 1;
        if *count == 0 {
            self.entries.remove(idx);
            true
        } else {
            false
        }
    }

    /// Check whether a topic should be delivered.
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        for (prefix, _) in &self.entries {
            // Sorted: once the prefix sorts after the topic it cannot be a prefix of it.
            if prefix.as_ref() > topic {
                break;
            }
            if topic.starts_with(prefix) {
                return true;
            }
        }
        false
    }

    /// Distinct prefixes, in sorted order.
    pub fn prefixes(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.iter().map(|(p, _)| p)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Subscription change travelling from a subscriber to its publishers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Subscribe(Bytes),
    Unsubscribe(Bytes),
}

impl SubscriptionEvent {
    #[must_use]
    pub const fn prefix(&self) -> &Bytes {
        match self {
            Self::Subscribe(p) | Self::Unsubscribe(p) => p,
        }
    }

    #[must_use]
    pub const fn is_subscribe(&self) -> bool {
        matches!(self, Self::Subscribe(_))
    }
}
