//! Per-neighbor pending sets for the broadcast protocol.
//!
//! Tracks, for every current neighbor, the messages that neighbor is
//! believed not to have acknowledged yet. The key set of the table *is* the
//! neighbor set: a topology change replaces both in one critical section.
//!
//! ## Invariant
//!
//! A message known locally but absent from a neighbor's pending set was
//! either acknowledged by that neighbor or never needed by it. Entries are
//! added when a message is first learned (for every neighbor) or when a
//! neighbor is (re)assigned (full reseed), and removed only by an
//! acknowledgment from that neighbor or a topology reset.

use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
    sync::Arc,
};

use crate::message::MessageId;

/// Shared pending table.
pub type SharedPendingTable<I> = Arc<PendingTable<I>>;

/// Neighbor -> messages not yet acknowledged by that neighbor.
#[derive(Debug)]
pub struct PendingTable<I> {
    inner: Mutex<HashMap<I, HashSet<MessageId>>>,
}

impl<I> Default for PendingTable<I> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<I: Clone + Eq + Hash + Ord> PendingTable<I> {
    /// Create an empty table with no neighbors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a newly learned message pending for every current neighbor.
    pub fn mark_pending_for_all(&self, id: MessageId) {
        let mut inner = self.inner.lock();
        for pending in inner.values_mut() {
            pending.insert(id);
        }
    }

    /// Mark a batch of newly learned messages pending for every neighbor.
    pub fn mark_many_pending_for_all(&self, ids: &[MessageId]) {
        if ids.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for pending in inner.values_mut() {
            pending.extend(ids.iter().copied());
        }
    }

    /// Replace (or initialize) one neighbor's pending set.
    pub fn reseed(&self, neighbor: I, snapshot: &HashSet<MessageId>) {
        self.inner.lock().insert(neighbor, snapshot.clone());
    }

    /// Remove acknowledged messages from a neighbor's pending set.
    ///
    /// Messages that are not pending and neighbors that are not assigned
    /// are ignored. Returns the number of entries removed.
    pub fn acknowledge(&self, neighbor: &I, ids: &[MessageId]) -> usize {
        let mut inner = self.inner.lock();
        let Some(pending) = inner.get_mut(neighbor) else {
            return 0;
        };
        ids.iter().filter(|id| pending.remove(id)).count()
    }

    /// Snapshot of one neighbor's pending set in ascending order.
    ///
    /// Empty for neighbors that are not assigned.
    pub fn snapshot_pending_for(&self, neighbor: &I) -> Vec<MessageId> {
        let inner = self.inner.lock();
        let mut ids: Vec<MessageId> = inner
            .get(neighbor)
            .map(|pending| pending.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Consistent snapshot of every non-empty pending set.
    ///
    /// Taken under one lock acquisition, so callers can send the batches
    /// without holding the table.
    pub fn snapshot_all(&self) -> Vec<(I, Vec<MessageId>)> {
        let inner = self.inner.lock();
        let mut batches: Vec<(I, Vec<MessageId>)> = inner
            .iter()
            .filter(|(_, pending)| !pending.is_empty())
            .map(|(neighbor, pending)| {
                let mut ids: Vec<MessageId> = pending.iter().copied().collect();
                ids.sort_unstable();
                (neighbor.clone(), ids)
            })
            .collect();
        batches.sort_by(|(a, _), (b, _)| a.cmp(b));
        batches
    }

    /// Discard every pending set and assign a new neighbor set.
    ///
    /// Each new neighbor starts with the full `snapshot`: nothing is known
    /// about what it already has.
    pub fn reset_topology(
        &self,
        neighbors: impl IntoIterator<Item = I>,
        snapshot: &HashSet<MessageId>,
    ) {
        let mut inner = self.inner.lock();
        Self::rebuild_locked(&mut inner, neighbors, snapshot);
    }

    /// Like [`Self::reset_topology`], taking the snapshot while the table is locked.
    ///
    /// A message recorded concurrently is then either in the snapshot or
    /// marked on the new table afterwards, never lost on the old one.
    pub fn reset_topology_with<F>(&self, neighbors: impl IntoIterator<Item = I>, snapshot: F)
    where
        F: FnOnce() -> HashSet<MessageId>,
    {
        let mut inner = self.inner.lock();
        let snapshot = snapshot();
        Self::rebuild_locked(&mut inner, neighbors, &snapshot);
    }

    fn rebuild_locked(
        inner: &mut HashMap<I, HashSet<MessageId>>,
        neighbors: impl IntoIterator<Item = I>,
        snapshot: &HashSet<MessageId>,
    ) {
        inner.clear();
        for neighbor in neighbors {
            inner.insert(neighbor, snapshot.clone());
        }
    }

    /// Current neighbors in ascending order.
    pub fn neighbors(&self) -> Vec<I> {
        let mut neighbors: Vec<I> = self.inner.lock().keys().cloned().collect();
        neighbors.sort();
        neighbors
    }

    /// Check if a peer is a current neighbor.
    pub fn contains_neighbor(&self, neighbor: &I) -> bool {
        self.inner.lock().contains_key(neighbor)
    }

    /// Number of messages pending for one neighbor.
    pub fn pending_count(&self, neighbor: &I) -> usize {
        self.inner
            .lock()
            .get(neighbor)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Get statistics about the table.
    pub fn stats(&self) -> PendingStats {
        let inner = self.inner.lock();
        PendingStats {
            neighbors: inner.len(),
            total_pending: inner.values().map(HashSet::len).sum(),
            max_pending: inner.values().map(HashSet::len).max().unwrap_or(0),
        }
    }
}

/// Statistics about the pending table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingStats {
    /// Number of assigned neighbors.
    pub neighbors: usize,
    /// Sum of pending entries over all neighbors.
    pub total_pending: usize,
    /// Largest single pending set.
    pub max_pending: usize,
}
