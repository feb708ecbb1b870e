//! Message loss tests.
//!
//! Lost `update` and `update_ok` messages only delay delivery: entries stay
//! pending until acknowledged and are resent every round.

use maelstrom_broadcast::{
    testing::{line_topology, ring_topology, ChaosConfig, ChaosController, SimulatedCluster},
    BroadcastConfig, MessageId,
};

fn lossy_cluster(size: u64, loss_rate: f64, seed: u64) -> SimulatedCluster<u64> {
    let members: Vec<u64> = (0..size).collect();
    let chaos = ChaosController::with_config(ChaosConfig::new().with_message_loss_rate(loss_rate))
        .with_seed(seed);
    let mut cluster =
        SimulatedCluster::new(members.clone(), BroadcastConfig::default()).with_chaos(chaos);
    cluster.apply_topology(&ring_topology(&members)).unwrap();
    cluster
}

/// Test convergence with a moderate loss rate.
#[test]
fn test_convergence_with_moderate_loss() {
    let mut cluster = lossy_cluster(10, 0.05, 1);

    for (node, message) in [(0, 1), (3, 2), (7, 3)] {
        cluster.broadcast(&node, MessageId::new(message)).unwrap();
    }

    assert!(cluster.run_until_converged(100).is_some());
    assert_eq!(cluster.all_messages().len(), 3);
}

/// Test convergence with an aggressive loss rate.
#[test]
fn test_convergence_with_aggressive_loss() {
    let mut cluster = lossy_cluster(10, 0.20, 7);

    for message in 0..20u64 {
        let node = message % 10;
        cluster.broadcast(&node, MessageId::new(message)).unwrap();
    }

    assert!(cluster.run_until_converged(300).is_some());

    let stats = cluster.chaos().stats();
    assert!(stats.messages_dropped > 0);
    assert!(stats.delivery_rate() < 1.0);
}

/// Test that nothing is delivered while every message is lost, and that
/// delivery completes once the network recovers.
#[test]
fn test_total_loss_then_recovery() {
    let mut cluster = lossy_cluster(5, 1.0, 3);

    cluster.broadcast(&2, MessageId::new(42)).unwrap();
    for _ in 0..10 {
        cluster.step();
    }
    assert_eq!(cluster.read(&1).unwrap(), Vec::<MessageId>::new());
    assert_eq!(cluster.read(&2).unwrap(), vec![MessageId::new(42)]);

    cluster.chaos().disable();
    assert!(cluster.run_until_converged(10).is_some());
}

/// Test that lost acknowledgments only cause retransmission, not duplicates.
#[test]
fn test_lost_acks_resend_without_duplicates() {
    let members: Vec<u64> = (0..2).collect();
    let mut cluster = SimulatedCluster::new(members.clone(), BroadcastConfig::default());
    cluster.apply_topology(&line_topology(&members)).unwrap();

    // Only acknowledgments from 1 back to 0 are lost
    cluster.chaos().partition.block(1, 0);
    cluster.broadcast(&0, MessageId::new(5)).unwrap();

    for _ in 0..4 {
        cluster.step();
    }

    assert_eq!(cluster.read(&1).unwrap(), vec![MessageId::new(5)]);
    // Still unacknowledged at the sender
    assert_eq!(
        cluster.node(&0).unwrap().pending().snapshot_pending_for(&1),
        vec![MessageId::new(5)]
    );

    cluster.chaos().partition.heal_all();
    cluster.step();
    assert!(cluster.node(&0).unwrap().pending().snapshot_pending_for(&1).is_empty());
}

/// Test that the same seed gives the same run.
#[test]
fn test_seeded_runs_are_reproducible() {
    let run = || {
        let mut cluster = lossy_cluster(8, 0.3, 99);
        cluster.broadcast(&0, MessageId::new(1)).unwrap();
        cluster.broadcast(&4, MessageId::new(2)).unwrap();
        let rounds = cluster.run_until_converged(200);
        (rounds, cluster.chaos().stats())
    };

    assert_eq!(run(), run());
}
