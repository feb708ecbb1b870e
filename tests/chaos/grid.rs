//! Benchmark grid tests.
//!
//! A cluster of exactly 25 nodes ignores the supplied topology and uses five
//! fully connected groups joined through their hubs, with acknowledgments
//! suppressed.

use std::collections::HashMap;

use maelstrom_broadcast::{
    testing::{line_topology, ChaosConfig, ChaosController, SimulatedCluster},
    BroadcastConfig, MessageId, NodeId, BENCHMARK_CLUSTER_SIZE,
};

fn members() -> Vec<NodeId> {
    (0..BENCHMARK_CLUSTER_SIZE)
        .map(|i| NodeId::new(format!("n{}", i)))
        .collect()
}

fn grid_cluster() -> SimulatedCluster<NodeId> {
    let mut cluster = SimulatedCluster::new(members(), BroadcastConfig::default());
    // The grid replaces whatever the workbench supplies
    cluster.apply_topology(&line_topology(&members())).unwrap();
    cluster
}

/// Test that a message reaches all 25 nodes within the grid diameter.
#[test]
fn test_grid_converges_within_three_rounds() {
    let mut cluster = grid_cluster();
    cluster
        .broadcast(&NodeId::from("n3"), MessageId::new(1))
        .unwrap();

    // Group member -> hub -> other hubs -> their groups
    assert_eq!(cluster.run_until_converged(10), Some(3));
}

/// Test that grid neighbors come from positions, not the description.
#[test]
fn test_grid_ignores_supplied_topology() {
    let cluster = grid_cluster();

    let hub = cluster.node(&NodeId::from("n9")).unwrap();
    let mut neighbors: Vec<String> = hub.neighbors().iter().map(|n| n.to_string()).collect();
    neighbors.sort_by_key(|name| name[1..].parse::<usize>().unwrap_or(usize::MAX));
    assert_eq!(
        neighbors,
        vec!["n4", "n5", "n6", "n7", "n8", "n14", "n19", "n24"]
    );

    let member = cluster.node(&NodeId::from("n12")).unwrap();
    assert_eq!(member.neighbors().len(), 4);
}

/// Test that an empty description is accepted on the grid.
#[test]
fn test_grid_accepts_empty_description() {
    let mut cluster = SimulatedCluster::new(members(), BroadcastConfig::default());
    cluster.apply_topology(&HashMap::new()).unwrap();

    cluster
        .broadcast(&NodeId::from("n24"), MessageId::new(2))
        .unwrap();
    assert!(cluster.run_until_converged(10).is_some());
}

/// Test that acknowledgments are suppressed, so pending entries never clear.
#[test]
fn test_grid_suppresses_acks() {
    let mut cluster = grid_cluster();
    let n0 = NodeId::from("n0");
    cluster.broadcast(&n0, MessageId::new(9)).unwrap();
    assert!(cluster.run_until_converged(10).is_some());

    let before = cluster.node(&n0).unwrap().stats();
    assert!(before.acks_suppressed);
    assert!(before.grid_active);

    cluster.step();
    let after = cluster.node(&n0).unwrap().stats();
    assert_eq!(after.total_pending, before.total_pending);
    assert_eq!(after.total_pending, 4);

    // Every pending set is resent every round
    assert!(cluster.tick() > 0);
}

/// Test grid convergence with message loss.
#[test]
fn test_grid_converges_with_loss() {
    let chaos = ChaosController::with_config(ChaosConfig::aggressive()).with_seed(25);
    let mut cluster = grid_cluster().with_chaos(chaos);

    for i in 0..BENCHMARK_CLUSTER_SIZE {
        let node = NodeId::new(format!("n{}", i));
        cluster.broadcast(&node, MessageId::new(i as u64)).unwrap();
    }

    assert!(cluster.run_until_converged(100).is_some());
    assert_eq!(cluster.all_messages().len(), BENCHMARK_CLUSTER_SIZE);
}

/// Test that the grid can be turned off.
#[test]
fn test_grid_disabled_uses_supplied_topology() {
    let config = BroadcastConfig::default().with_grid_cluster_size(None);
    let mut cluster = SimulatedCluster::new(members(), config);
    cluster.apply_topology(&line_topology(&members())).unwrap();

    let stats = cluster.node(&NodeId::from("n0")).unwrap().stats();
    assert!(!stats.grid_active);
    assert!(!stats.acks_suppressed);

    cluster
        .broadcast(&NodeId::from("n0"), MessageId::new(1))
        .unwrap();
    // A line of 25 needs one round per hop
    assert_eq!(cluster.run_until_converged(50), Some(24));
}
