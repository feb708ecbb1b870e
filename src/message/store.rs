//! Set of every message this node has observed.

use parking_lot::Mutex;
use std::collections::HashSet;

use super::MessageId;

/// Thread-safe, grow-only set of known messages.
///
/// Once recorded a message is never removed. The store is the source of
/// truth for `read` replies and for reseeding neighbors after a topology
/// change.
#[derive(Debug, Default)]
pub struct MessageStore {
    seen: Mutex<HashSet<MessageId>>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message.
    ///
    /// Returns `true` if the message was previously unknown.
    pub fn record(&self, id: MessageId) -> bool {
        self.seen.lock().insert(id)
    }

    /// Record a batch of messages under a single lock acquisition.
    ///
    /// Returns the newly learned subset in input order. A message repeated
    /// inside the batch is reported at most once.
    pub fn record_many(&self, ids: &[MessageId]) -> Vec<MessageId> {
        let mut seen = self.seen.lock();
        ids.iter().copied().filter(|id| seen.insert(*id)).collect()
    }

    /// Check whether a message is known.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.lock().contains(id)
    }

    /// Snapshot of every known message.
    pub fn all(&self) -> HashSet<MessageId> {
        self.seen.lock().clone()
    }

    /// Snapshot of every known message in ascending order.
    pub fn sorted(&self) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self.seen.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of known messages.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Check if no message is known.
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
