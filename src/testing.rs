//! Testing utilities for the broadcast protocol.
//!
//! This module provides tools for injecting failures and for driving whole
//! clusters deterministically, without timers or a runtime.
//!
//! ## Features
//!
//! - **Message Loss**: Randomly drop messages with configurable probability
//! - **Network Partitions**: Simulate network splits between node groups
//! - **Simulated Cluster**: Step retransmission rounds by hand and check convergence
//!
//! ## Example
//!
//! ```ignore
//! use maelstrom_broadcast::testing::{ring_topology, ChaosConfig, ChaosController, SimulatedCluster};
//!
//! let members: Vec<u64> = (0..5).collect();
//! let chaos = ChaosController::with_config(ChaosConfig::new().with_message_loss_rate(0.2));
//! let mut cluster = SimulatedCluster::new(members.clone(), BroadcastConfig::default())
//!     .with_chaos(chaos);
//!
//! cluster.apply_topology(&ring_topology(&members))?;
//! cluster.broadcast(&0, MessageId::new(1))?;
//! assert!(cluster.run_until_converged(50).is_some());
//! ```

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    broadcast::{BroadcastHandle, Broadcaster, NoopDelegate},
    config::BroadcastConfig,
    error::{Error, Result},
    message::{BroadcastMessage, MessageId, TopologyDescription},
};

/// Configuration for chaos testing.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Probability of dropping a message (0.0 to 1.0).
    pub message_loss_rate: f64,

    /// Whether to enable chaos testing.
    pub enabled: bool,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            message_loss_rate: 0.0,
            enabled: false,
        }
    }
}

impl ChaosConfig {
    /// Create a new chaos configuration with defaults (no chaos).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chaos configuration for moderate failure testing (5% message loss).
    pub fn moderate() -> Self {
        Self {
            message_loss_rate: 0.05,
            enabled: true,
        }
    }

    /// Create a chaos configuration for aggressive failure testing (20% message loss).
    pub fn aggressive() -> Self {
        Self {
            message_loss_rate: 0.20,
            enabled: true,
        }
    }

    /// Set the message loss rate (0.0 to 1.0).
    pub fn with_message_loss_rate(mut self, rate: f64) -> Self {
        self.message_loss_rate = rate.clamp(0.0, 1.0);
        self.enabled = true;
        self
    }

    /// Enable or disable chaos testing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn should_drop<R: Rng>(&self, rng: &mut R) -> bool {
        if !self.enabled || self.message_loss_rate == 0.0 {
            return false;
        }
        rng.random::<f64>() < self.message_loss_rate
    }
}

/// Network partition simulator.
///
/// Allows creating artificial network partitions between groups of nodes.
#[derive(Debug)]
pub struct NetworkPartition<I> {
    /// Pairs of nodes that cannot communicate.
    partitioned: RwLock<HashSet<(I, I)>>,
    /// Whether any partition is active.
    active: AtomicBool,
}

impl<I: Clone + Eq + Hash> NetworkPartition<I> {
    /// Create a new network partition controller.
    pub fn new() -> Self {
        Self {
            partitioned: RwLock::new(HashSet::new()),
            active: AtomicBool::new(false),
        }
    }

    /// Create a partition between two nodes (bidirectional).
    pub fn partition(&self, node_a: I, node_b: I) {
        let mut partitioned = self.partitioned.write();
        partitioned.insert((node_a.clone(), node_b.clone()));
        partitioned.insert((node_b, node_a));
        self.active.store(true, Ordering::Release);
    }

    /// Block traffic from `from` to `to` only.
    pub fn block(&self, from: I, to: I) {
        self.partitioned.write().insert((from, to));
        self.active.store(true, Ordering::Release);
    }

    /// Split the cluster into two groups that cannot reach each other.
    pub fn split(&self, group_a: &[I], group_b: &[I]) {
        for a in group_a {
            for b in group_b {
                self.partition(a.clone(), b.clone());
            }
        }
    }

    /// Heal a partition between two nodes.
    pub fn heal(&self, node_a: &I, node_b: &I) {
        let mut partitioned = self.partitioned.write();
        partitioned.remove(&(node_a.clone(), node_b.clone()));
        partitioned.remove(&(node_b.clone(), node_a.clone()));
        if partitioned.is_empty() {
            self.active.store(false, Ordering::Release);
        }
    }

    /// Heal all partitions.
    pub fn heal_all(&self) {
        self.partitioned.write().clear();
        self.active.store(false, Ordering::Release);
    }

    /// Check if two nodes are partitioned.
    pub fn is_partitioned(&self, from: &I, to: &I) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        self.partitioned
            .read()
            .contains(&(from.clone(), to.clone()))
    }

    /// Create a partition isolating one node from all others.
    pub fn isolate(&self, node: I, others: impl IntoIterator<Item = I>) {
        for other in others {
            self.partition(node.clone(), other);
        }
    }
}

impl<I: Clone + Eq + Hash> Default for NetworkPartition<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics collected during chaos testing.
#[derive(Debug, Default)]
pub struct ChaosStats {
    /// Total messages processed.
    pub messages_total: AtomicU64,
    /// Messages dropped due to configured loss rate.
    pub messages_dropped: AtomicU64,
    /// Messages blocked due to partition.
    pub messages_partitioned: AtomicU64,
}

impl ChaosStats {
    /// Create new stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message being processed.
    pub fn record_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message being dropped.
    pub fn record_drop(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message blocked by partition.
    pub fn record_partition_block(&self) {
        self.messages_partitioned.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the drop rate (dropped / total).
    pub fn drop_rate(&self) -> f64 {
        let total = self.messages_total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.messages_dropped.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Get a snapshot of stats.
    pub fn snapshot(&self) -> ChaosStatsSnapshot {
        ChaosStatsSnapshot {
            messages_total: self.messages_total.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_partitioned: self.messages_partitioned.load(Ordering::Relaxed),
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.messages_total.store(0, Ordering::Relaxed);
        self.messages_dropped.store(0, Ordering::Relaxed);
        self.messages_partitioned.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of chaos statistics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaosStatsSnapshot {
    /// Total messages processed.
    pub messages_total: u64,
    /// Messages dropped.
    pub messages_dropped: u64,
    /// Messages blocked by partition.
    pub messages_partitioned: u64,
}

impl ChaosStatsSnapshot {
    /// Get the effective delivery rate (1.0 - drop rate - partition rate).
    pub fn delivery_rate(&self) -> f64 {
        if self.messages_total == 0 {
            return 1.0;
        }
        let failed = self.messages_dropped + self.messages_partitioned;
        1.0 - (failed as f64 / self.messages_total as f64)
    }
}

/// Controller for chaos testing a broadcast cluster.
///
/// Clones share configuration, partitions, statistics and random source.
#[derive(Debug)]
pub struct ChaosController<I> {
    /// Chaos configuration.
    pub config: Arc<RwLock<ChaosConfig>>,
    /// Network partition controller.
    pub partition: Arc<NetworkPartition<I>>,
    /// Statistics.
    pub stats: Arc<ChaosStats>,
    rng: Arc<Mutex<StdRng>>,
}

impl<I: Clone + Eq + Hash> ChaosController<I> {
    /// Create a new chaos controller with default configuration.
    pub fn new() -> Self {
        Self::with_config(ChaosConfig::default())
    }

    /// Create a chaos controller with specific configuration.
    pub fn with_config(config: ChaosConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            partition: Arc::new(NetworkPartition::new()),
            stats: Arc::new(ChaosStats::new()),
            rng: Arc::new(Mutex::new(StdRng::from_rng(&mut rand::rng()))),
        }
    }

    /// Make message loss reproducible (builder pattern).
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Update the chaos configuration.
    pub fn set_config(&self, config: ChaosConfig) {
        *self.config.write() = config;
    }

    /// Disable all chaos testing.
    pub fn disable(&self) {
        self.set_config(ChaosConfig::default());
        self.partition.heal_all();
    }

    /// Check if a message from `from` to `to` should be delivered.
    pub fn should_deliver(&self, from: &I, to: &I) -> bool {
        self.stats.record_message();

        if self.partition.is_partitioned(from, to) {
            self.stats.record_partition_block();
            return false;
        }

        if self.config.read().should_drop(&mut *self.rng.lock()) {
            self.stats.record_drop();
            return false;
        }

        true
    }

    /// Get current statistics.
    pub fn stats(&self) -> ChaosStatsSnapshot {
        self.stats.snapshot()
    }

    /// Reset statistics.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

impl<I: Clone + Eq + Hash> Default for ChaosController<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Clone for ChaosController<I> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            partition: self.partition.clone(),
            stats: self.stats.clone(),
            rng: self.rng.clone(),
        }
    }
}

// =============================================================================
// Simulated Cluster
// =============================================================================

struct SimulatedNode<I> {
    broadcaster: Broadcaster<I>,
    handle: BroadcastHandle<I>,
}

/// An in-memory cluster of broadcasters driven round by round.
///
/// A round ([`Self::step`]) runs one retransmission tick on every node and
/// then delivers every message in flight, including the replies and eager
/// pushes that delivery produces, until the network is quiet. Timers are
/// never involved, so runs are reproducible given a seeded
/// [`ChaosController`].
pub struct SimulatedCluster<I> {
    nodes: BTreeMap<I, SimulatedNode<I>>,
    chaos: ChaosController<I>,
    in_flight: VecDeque<(I, I, BroadcastMessage<I>)>,
    rounds: usize,
}

impl<I> SimulatedCluster<I>
where
    I: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static,
{
    /// Create a cluster with one broadcaster per member.
    pub fn new(members: Vec<I>, config: BroadcastConfig) -> Self {
        let nodes = members
            .iter()
            .map(|id| {
                let (broadcaster, handle) =
                    Broadcaster::new(id.clone(), members.clone(), config.clone(), NoopDelegate);
                (
                    id.clone(),
                    SimulatedNode {
                        broadcaster,
                        handle,
                    },
                )
            })
            .collect();

        Self {
            nodes,
            chaos: ChaosController::new(),
            in_flight: VecDeque::new(),
            rounds: 0,
        }
    }

    /// Route every message through `chaos` (builder pattern).
    pub fn with_chaos(mut self, chaos: ChaosController<I>) -> Self {
        self.chaos = chaos;
        self
    }

    /// The chaos controller in use.
    pub fn chaos(&self) -> &ChaosController<I> {
        &self.chaos
    }

    /// Every member in ascending order.
    pub fn members(&self) -> Vec<I> {
        self.nodes.keys().cloned().collect()
    }

    /// Get one node's broadcaster.
    pub fn node(&self, id: &I) -> Option<&Broadcaster<I>> {
        self.nodes.get(id).map(|node| &node.broadcaster)
    }

    /// Number of rounds run so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Hand the same topology description to every node.
    ///
    /// # Errors
    ///
    /// The first node that cannot derive its neighbors.
    pub fn apply_topology(&mut self, description: &TopologyDescription<I>) -> Result<()> {
        for node in self.nodes.values() {
            node.broadcaster.handle_topology(description)?;
        }
        Ok(())
    }

    /// Inject a client broadcast at one node.
    ///
    /// Returns whether the message was new to that node.
    pub fn broadcast(&mut self, at: &I, message: MessageId) -> Result<bool> {
        let node = self
            .nodes
            .get(at)
            .ok_or_else(|| Error::UnknownNode(format!("{:?}", at)))?;
        let learned = node.broadcaster.handle_broadcast(message);
        self.collect_outgoing();
        Ok(learned)
    }

    /// Run one retransmission tick on every node.
    ///
    /// Returns the number of batches put in flight.
    pub fn tick(&mut self) -> usize {
        let mut queued = 0;
        for node in self.nodes.values() {
            match node.broadcaster.gossip_tick() {
                Ok(count) => queued += count,
                Err(e) => tracing::warn!("tick failed on {:?}: {}", node.broadcaster.local_id(), e),
            }
        }
        self.collect_outgoing();
        queued
    }

    /// Deliver messages until nothing is in flight.
    ///
    /// Returns the number of messages delivered (dropped ones excluded).
    pub fn deliver(&mut self) -> usize {
        let mut delivered = 0;

        while let Some((from, to, message)) = self.in_flight.pop_front() {
            if !self.chaos.should_deliver(&from, &to) {
                continue;
            }
            let Some(node) = self.nodes.get(&to) else {
                tracing::debug!("no simulated node {:?}", to);
                continue;
            };

            delivered += 1;
            match node.broadcaster.handle_message(from.clone(), message) {
                Ok(Some(reply)) => self.in_flight.push_back((to, from, reply)),
                Ok(None) => {}
                Err(e) => tracing::warn!("{:?} failed to handle message: {}", to, e),
            }
            self.collect_outgoing();
        }

        delivered
    }

    /// Run one round: a tick on every node, then delivery until quiet.
    pub fn step(&mut self) -> usize {
        self.rounds += 1;
        self.tick();
        self.deliver()
    }

    /// Step until every node knows every message, at most `max_rounds` times.
    ///
    /// Returns the number of rounds it took, or `None` if the cluster did not
    /// converge.
    pub fn run_until_converged(&mut self, max_rounds: usize) -> Option<usize> {
        self.deliver();
        if self.is_converged() {
            return Some(0);
        }
        for round in 1..=max_rounds {
            self.step();
            if self.is_converged() {
                return Some(round);
            }
        }
        None
    }

    /// Every message known anywhere in the cluster.
    pub fn all_messages(&self) -> Vec<MessageId> {
        let mut all: Vec<MessageId> = self
            .nodes
            .values()
            .flat_map(|node| node.broadcaster.read())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        all.sort_unstable();
        all
    }

    /// Check if every node knows every message.
    pub fn is_converged(&self) -> bool {
        let all = self.all_messages();
        self.nodes
            .values()
            .all(|node| node.broadcaster.read() == all)
    }

    /// A node's `read` result.
    pub fn read(&self, id: &I) -> Option<Vec<MessageId>> {
        self.node(id).map(Broadcaster::read)
    }

    /// Number of messages in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn collect_outgoing(&mut self) {
        for (id, node) in &self.nodes {
            while let Some(outgoing) = node.handle.try_next_outgoing() {
                self.in_flight
                    .push_back((id.clone(), outgoing.target, outgoing.message));
            }
        }
    }
}

// =============================================================================
// Topology Helpers
// =============================================================================

/// Every member's neighbors are the previous and next member, wrapping around.
pub fn ring_topology<I: Clone + Eq + Hash>(members: &[I]) -> TopologyDescription<I> {
    let n = members.len();
    members
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let mut neighbors = Vec::new();
            if n > 1 {
                neighbors.push(members[(i + n - 1) % n].clone());
            }
            if n > 2 {
                neighbors.push(members[(i + 1) % n].clone());
            }
            (id.clone(), neighbors)
        })
        .collect()
}

/// Members form a chain: the worst case for dissemination latency.
pub fn line_topology<I: Clone + Eq + Hash>(members: &[I]) -> TopologyDescription<I> {
    members
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let mut neighbors = Vec::new();
            if i > 0 {
                neighbors.push(members[i - 1].clone());
            }
            if i + 1 < members.len() {
                neighbors.push(members[i + 1].clone());
            }
            (id.clone(), neighbors)
        })
        .collect()
}

/// Every member is a neighbor of every other member.
pub fn full_mesh_topology<I: Clone + Eq + Hash>(members: &[I]) -> TopologyDescription<I> {
    members
        .iter()
        .map(|id| {
            let neighbors = members.iter().filter(|m| *m != id).cloned().collect();
            (id.clone(), neighbors)
        })
        .collect()
}

// =============================================================================
// Test Utilities (for internal and external test use)
// =============================================================================

/// Wait for a condition to become true, with timeout.
///
/// Polls `condition` every `poll_interval` on the current thread.
///
/// # Returns
///
/// `Ok(())` if the condition was met, `Err(message)` if timeout occurred.
pub fn wait_for<F>(
    mut condition: F,
    timeout: Duration,
    poll_interval: Duration,
) -> std::result::Result<(), String>
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while !condition() {
        if start.elapsed() > timeout {
            return Err(format!("Timeout after {:?} waiting for condition", timeout));
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Wait for a condition with default poll interval (10ms).
pub fn wait_for_condition<F>(condition: F, timeout: Duration) -> std::result::Result<(), String>
where
    F: FnMut() -> bool,
{
    wait_for(condition, timeout, Duration::from_millis(10))
}

/// Assert that a condition becomes true within a timeout.
///
/// # Example
///
/// ```ignore
/// use maelstrom_broadcast::assert_eventually;
///
/// assert_eventually!(
///     broadcaster.read().len() == 3,
///     timeout = Duration::from_secs(1),
///     "all messages should arrive"
/// );
/// ```
#[macro_export]
macro_rules! assert_eventually {
    ($condition:expr, timeout = $timeout:expr) => {
        $crate::testing::wait_for_condition(|| $condition, $timeout)
            .expect(concat!("Condition not met: ", stringify!($condition)));
    };
    ($condition:expr, timeout = $timeout:expr, $msg:expr) => {
        $crate::testing::wait_for_condition(|| $condition, $timeout).expect($msg);
    };
}
