//! Core dissemination engine.
//!
//! This module provides the [`Broadcaster`] that ties the message store, the
//! per-neighbor pending table and the topology manager together: inbound
//! protocol messages are handled synchronously, and a periodic
//! retransmission loop flushes every neighbor's pending set until the
//! neighbor acknowledges it.

use async_channel::{Receiver, Sender};
use futures_timer::Delay;
use std::{
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    config::BroadcastConfig,
    error::{Error, Result},
    message::{BroadcastMessage, MessageId, MessageStore, TopologyDescription},
    pending::{PendingTable, SharedPendingTable},
    topology::{Neighbors, TopologyManager},
};

#[cfg(feature = "metrics")]
use crate::metrics;

/// Delegate trait for receiving broadcast events.
///
/// # Important
///
/// Callbacks run synchronously inside the message handlers. **They must
/// return quickly**; queue expensive work elsewhere.
#[auto_impl::auto_impl(Box, Arc)]
pub trait BroadcastDelegate<I = ()>: Send + Sync + 'static {
    /// Called the first time this node learns a message.
    fn on_deliver(&self, message_id: MessageId);

    /// Called after the neighbor set has been replaced.
    ///
    /// # Arguments
    /// - `neighbors`: The new neighbor set
    fn on_topology_change(&self, _neighbors: &[I]) {}
}

/// No-op delegate for when no handler is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl<I> BroadcastDelegate<I> for NoopDelegate {
    fn on_deliver(&self, _message_id: MessageId) {}
}

/// Node-local broadcast engine.
///
/// Cheap to clone; clones share state.
///
/// # Type Parameters
///
/// - `I`: Node identifier type
/// - `D`: Delegate type for receiving events
pub struct Broadcaster<I, D = NoopDelegate> {
    inner: Arc<BroadcasterInner<I, D>>,
}

struct BroadcasterInner<I, D> {
    /// Every message observed by this node.
    store: Arc<MessageStore>,

    /// Neighbor -> unacknowledged messages. Its key set is the topology.
    pending: SharedPendingTable<I>,

    /// Neighbor assignment policy.
    topology: TopologyManager,

    /// Event delegate.
    delegate: D,

    /// Configuration.
    config: BroadcastConfig,

    /// Local node ID.
    local_id: I,

    /// Every cluster member, including this node.
    members: Vec<I>,

    /// `update_ok` replies are skipped on the benchmark grid.
    suppress_acks: bool,

    /// Shutdown flag.
    shutdown: AtomicBool,

    /// Closed on shutdown to wake the retransmission loop.
    shutdown_rx: Receiver<()>,
    shutdown_tx: Sender<()>,

    /// Channel for outgoing messages.
    outgoing_tx: Sender<OutgoingMessage<I>>,
}

/// Outgoing message to be sent.
#[derive(Debug, Clone)]
pub struct OutgoingMessage<I> {
    /// Target neighbor.
    pub target: I,
    /// Message to send.
    pub message: BroadcastMessage<I>,
}

impl<I: Eq + Hash> PartialEq for OutgoingMessage<I> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.message == other.message
    }
}

impl<I: Eq + Hash> Eq for OutgoingMessage<I> {}

/// Point-in-time statistics of a broadcaster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Number of messages in the store.
    pub known_messages: usize,
    /// Number of current neighbors.
    pub neighbors: usize,
    /// Sum of pending entries over all neighbors.
    pub total_pending: usize,
    /// Largest single pending set.
    pub max_pending: usize,
    /// Whether the benchmark grid applies to this cluster.
    pub grid_active: bool,
    /// Whether `update_ok` replies are suppressed.
    pub acks_suppressed: bool,
}

impl<I, D> Broadcaster<I, D>
where
    I: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static,
    D: BroadcastDelegate<I>,
{
    /// Create a new broadcaster with empty state.
    ///
    /// # Arguments
    ///
    /// - `local_id`: This node's identifier
    /// - `members`: Every cluster member, including `local_id`
    /// - `config`: Broadcast configuration
    /// - `delegate`: Event handler
    pub fn new(
        local_id: I,
        members: Vec<I>,
        config: BroadcastConfig,
        delegate: D,
    ) -> (Self, BroadcastHandle<I>) {
        Self::with_state(
            local_id,
            members,
            config,
            delegate,
            Arc::new(MessageStore::new()),
            Arc::new(PendingTable::new()),
        )
    }

    /// Create a broadcaster over existing state objects.
    pub fn with_state(
        local_id: I,
        members: Vec<I>,
        config: BroadcastConfig,
        delegate: D,
        store: Arc<MessageStore>,
        pending: SharedPendingTable<I>,
    ) -> (Self, BroadcastHandle<I>) {
        let (outgoing_tx, outgoing_rx) =
            async_channel::bounded(config.outgoing_queue_capacity.max(1));
        // Shutdown channel - closing the sender notifies all receivers
        let (shutdown_tx, shutdown_rx) = async_channel::bounded(1);

        let topology = TopologyManager::from_config(&config);
        let suppress_acks = config.suppress_grid_acks && topology.uses_grid(members.len());

        let inner = Arc::new(BroadcasterInner {
            store,
            pending,
            topology,
            delegate,
            config,
            local_id,
            members,
            suppress_acks,
            shutdown: AtomicBool::new(false),
            shutdown_rx,
            shutdown_tx,
            outgoing_tx,
        });

        (Self { inner }, BroadcastHandle { outgoing_rx })
    }

    /// Get the local node ID.
    pub fn local_id(&self) -> &I {
        &self.inner.local_id
    }

    /// Get the configuration.
    pub fn config(&self) -> &BroadcastConfig {
        &self.inner.config
    }

    /// Every cluster member, including this node.
    pub fn members(&self) -> &[I] {
        &self.inner.members
    }

    /// Current neighbors in ascending order.
    pub fn neighbors(&self) -> Vec<I> {
        self.inner.pending.neighbors()
    }

    /// The message store.
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.inner.store
    }

    /// The pending table.
    pub fn pending(&self) -> &SharedPendingTable<I> {
        &self.inner.pending
    }

    /// Check if `update_ok` replies are suppressed for this cluster.
    pub fn acks_suppressed(&self) -> bool {
        self.inner.suppress_acks
    }

    /// Handle a client `broadcast`.
    ///
    /// Returns `true` if the message was new to this node. The caller
    /// replies `broadcast_ok` either way.
    pub fn handle_broadcast(&self, message_id: MessageId) -> bool {
        if !self.inner.store.record(message_id) {
            tracing::trace!("broadcast of known message {}", message_id);
            #[cfg(feature = "metrics")]
            metrics::record_duplicates(1);
            return false;
        }

        self.inner.pending.mark_pending_for_all(message_id);
        tracing::debug!("learned message {} from client", message_id);

        #[cfg(feature = "metrics")]
        {
            metrics::record_messages_learned(1);
            metrics::set_known_messages(self.inner.store.len());
        }

        self.inner.delegate.on_deliver(message_id);

        if self.inner.config.eager_push {
            self.push_to_neighbors(&[message_id], None);
        }
        true
    }

    /// Every known message in ascending order.
    pub fn read(&self) -> Vec<MessageId> {
        self.inner.store.sorted()
    }

    /// Replace the neighbor set from a cluster topology description.
    ///
    /// Every new neighbor starts with the full current store pending.
    ///
    /// # Errors
    ///
    /// Fatal [`Error::MissingTopology`] / [`Error::UnknownNode`] when no
    /// neighbor set can be derived for this node. State is left untouched.
    pub fn handle_topology(&self, description: &TopologyDescription<I>) -> Result<Neighbors<I>> {
        let neighbors = self.inner.topology.compute_neighbors(
            &self.inner.local_id,
            description,
            &self.inner.members,
        )?;

        let store = &self.inner.store;
        self.inner
            .pending
            .reset_topology_with(neighbors.iter().cloned(), || store.all());

        tracing::info!(
            "topology updated: {} neighbors {:?}{}",
            neighbors.len(),
            neighbors.as_slice(),
            if self.inner.topology.uses_grid(self.inner.members.len()) {
                " (grid)"
            } else {
                ""
            }
        );

        #[cfg(feature = "metrics")]
        {
            metrics::set_neighbors(neighbors.len());
            metrics::set_pending_total(self.inner.pending.stats().total_pending);
        }

        self.inner.delegate.on_topology_change(&neighbors);
        Ok(neighbors)
    }

    /// Handle an `update` batch from a neighbor.
    ///
    /// Newly learned messages become pending for every neighbor. Returns the
    /// acknowledgment payload (the full batch), or `None` when
    /// acknowledgments are suppressed.
    pub fn handle_update(&self, from: &I, messages: &[MessageId]) -> Option<Vec<MessageId>> {
        let learned = self.inner.store.record_many(messages);

        #[cfg(feature = "metrics")]
        metrics::record_duplicates(messages.len() - learned.len());

        if !learned.is_empty() {
            self.inner.pending.mark_many_pending_for_all(&learned);
            tracing::debug!(
                "learned {} of {} messages from {:?}",
                learned.len(),
                messages.len(),
                from
            );

            #[cfg(feature = "metrics")]
            {
                metrics::record_messages_learned(learned.len());
                metrics::set_known_messages(self.inner.store.len());
            }

            for id in &learned {
                self.inner.delegate.on_deliver(*id);
            }

            if self.inner.config.eager_push {
                self.push_to_neighbors(&learned, Some(from));
            }
        }

        if self.inner.suppress_acks {
            None
        } else {
            Some(messages.to_vec())
        }
    }

    /// Handle an `update_ok` acknowledgment from a neighbor.
    ///
    /// Returns the number of pending entries cleared.
    pub fn handle_update_ok(&self, from: &I, messages: &[MessageId]) -> usize {
        let cleared = self.inner.pending.acknowledge(from, messages);
        tracing::trace!("{:?} acknowledged {} messages", from, cleared);

        #[cfg(feature = "metrics")]
        metrics::record_acks_received(cleared);

        cleared
    }

    /// Dispatch one inbound protocol message.
    ///
    /// Returns the reply to send back to `from`, if any.
    ///
    /// # Errors
    ///
    /// [`Error::Shutdown`] after [`Self::shutdown`], and the fatal topology
    /// errors of [`Self::handle_topology`].
    pub fn handle_message(
        &self,
        from: I,
        message: BroadcastMessage<I>,
    ) -> Result<Option<BroadcastMessage<I>>> {
        if self.is_shutdown() {
            return Err(Error::Shutdown);
        }

        match message {
            BroadcastMessage::Broadcast { message } => {
                self.handle_broadcast(message);
                Ok(Some(BroadcastMessage::BroadcastOk))
            }
            BroadcastMessage::Read => Ok(Some(BroadcastMessage::ReadOk {
                messages: self.read(),
            })),
            BroadcastMessage::Topology { topology } => {
                self.handle_topology(&topology)?;
                Ok(Some(BroadcastMessage::TopologyOk))
            }
            BroadcastMessage::Update { messages } => Ok(self
                .handle_update(&from, &messages)
                .map(|messages| BroadcastMessage::UpdateOk { messages })),
            BroadcastMessage::UpdateOk { messages } => {
                self.handle_update_ok(&from, &messages);
                Ok(None)
            }
            reply @ (BroadcastMessage::BroadcastOk
            | BroadcastMessage::ReadOk { .. }
            | BroadcastMessage::TopologyOk) => {
                tracing::debug!("ignoring unexpected {} from {:?}", reply.kind(), from);
                Ok(None)
            }
        }
    }

    /// Run one retransmission round.
    ///
    /// Queues an `update` with every non-empty pending set and returns the
    /// number of batches queued. Never waits: a batch that does not fit in
    /// the outgoing queue is dropped and goes out again next round.
    pub fn gossip_tick(&self) -> Result<usize> {
        if self.is_shutdown() {
            return Err(Error::Shutdown);
        }

        let batches = self.inner.pending.snapshot_all();
        let mut queued = 0;

        for (neighbor, messages) in batches {
            #[cfg(feature = "metrics")]
            metrics::record_update_batch_size(messages.len());

            match self.inner.outgoing_tx.try_send(OutgoingMessage {
                target: neighbor,
                message: BroadcastMessage::Update { messages },
            }) {
                Ok(()) => queued += 1,
                Err(async_channel::TrySendError::Full(dropped)) => {
                    tracing::debug!("update dropped for {:?}: channel full", dropped.target);
                }
                Err(async_channel::TrySendError::Closed(_)) => {
                    return Err(Error::Channel("outgoing channel closed".into()));
                }
            }
        }

        tracing::trace!("gossip tick queued {} batches", queued);

        #[cfg(feature = "metrics")]
        {
            metrics::record_updates_sent(queued);
            metrics::set_pending_total(self.inner.pending.stats().total_pending);
        }

        Ok(queued)
    }

    /// Run the retransmission loop.
    ///
    /// Calls [`Self::gossip_tick`] every `gossip_interval` until shutdown.
    /// This should be spawned as a background task.
    pub async fn run_gossip_loop(&self) {
        use futures::future::FutureExt;

        let period = self.inner.config.gossip_interval;
        let mut interval = Delay::new(period);

        loop {
            let shutdown_recv = self.inner.shutdown_rx.recv().fuse();
            futures::pin_mut!(shutdown_recv);

            futures::select! {
                _ = (&mut interval).fuse() => {
                    interval.reset(period);
                }
                _ = shutdown_recv => {
                    break;
                }
            }

            if self.inner.shutdown.load(Ordering::Acquire) {
                break;
            }

            if let Err(e) = self.gossip_tick() {
                tracing::debug!("gossip loop stopping: {}", e);
                break;
            }
        }
    }

    /// Shutdown the broadcaster.
    ///
    /// Messages already queued stay readable from the handle.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.shutdown_tx.close();
        self.inner.outgoing_tx.close();
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Get statistics about the broadcaster.
    pub fn stats(&self) -> BroadcastStats {
        let pending = self.inner.pending.stats();
        BroadcastStats {
            known_messages: self.inner.store.len(),
            neighbors: pending.neighbors,
            total_pending: pending.total_pending,
            max_pending: pending.max_pending,
            grid_active: self.inner.topology.uses_grid(self.inner.members.len()),
            acks_suppressed: self.inner.suppress_acks,
        }
    }

    fn push_to_neighbors(&self, messages: &[MessageId], except: Option<&I>) {
        for neighbor in self.inner.pending.neighbors() {
            if Some(&neighbor) == except {
                continue;
            }
            let msg = OutgoingMessage {
                target: neighbor,
                message: BroadcastMessage::Update {
                    messages: messages.to_vec(),
                },
            };
            // Pending entries stay, so a dropped push is resent next round
            if let Err(e) = self.inner.outgoing_tx.try_send(msg) {
                tracing::debug!("eager push dropped: {}", e);
            }
        }
    }
}

impl<I, D> Clone for Broadcaster<I, D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Handle for draining outgoing messages into the network layer.
pub struct BroadcastHandle<I> {
    outgoing_rx: Receiver<OutgoingMessage<I>>,
}

impl<I> BroadcastHandle<I> {
    /// Get the next outgoing message to send.
    ///
    /// Returns `None` once the broadcaster is shut down and the queue is empty.
    pub async fn next_outgoing(&self) -> Option<OutgoingMessage<I>> {
        self.outgoing_rx.recv().await.ok()
    }

    /// Take an outgoing message if one is queued.
    pub fn try_next_outgoing(&self) -> Option<OutgoingMessage<I>> {
        self.outgoing_rx.try_recv().ok()
    }

    /// Get a stream of outgoing messages.
    pub fn outgoing_stream(&self) -> impl futures::Stream<Item = OutgoingMessage<I>> + '_ {
        self.outgoing_rx.clone()
    }

    /// Number of queued outgoing messages.
    pub fn pending_outgoing(&self) -> usize {
        self.outgoing_rx.len()
    }

    /// Check if the handle is closed.
    pub fn is_closed(&self) -> bool {
        self.outgoing_rx.is_closed()
    }
}

impl<I> Clone for BroadcastHandle<I> {
    fn clone(&self) -> Self {
        Self {
            outgoing_rx: self.outgoing_rx.clone(),
        }
    }
}
