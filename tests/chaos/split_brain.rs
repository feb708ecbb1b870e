//! Split-brain (network partition) tests.
//!
//! These tests verify that messages stay within partition groups while the
//! partition lasts and that retransmission completes delivery once it heals.

use maelstrom_broadcast::{
    testing::{full_mesh_topology, ring_topology, SimulatedCluster},
    BroadcastConfig, MessageId,
};

fn cluster(size: u64, mesh: bool) -> SimulatedCluster<u64> {
    let members: Vec<u64> = (0..size).collect();
    let mut cluster = SimulatedCluster::new(members.clone(), BroadcastConfig::default());
    let topology = if mesh {
        full_mesh_topology(&members)
    } else {
        ring_topology(&members)
    };
    cluster.apply_topology(&topology).unwrap();
    cluster
}

fn has(cluster: &SimulatedCluster<u64>, node: u64, message: u64) -> bool {
    cluster
        .read(&node)
        .unwrap()
        .contains(&MessageId::new(message))
}

fn run_rounds(cluster: &mut SimulatedCluster<u64>, rounds: usize) {
    for _ in 0..rounds {
        cluster.step();
    }
}

/// Test that messages only propagate within partition groups.
#[test]
fn test_split_brain_isolation() {
    let mut cluster = cluster(6, true);

    // Create split-brain: nodes 0,1,2 in group A, nodes 3,4,5 in group B
    cluster.chaos().partition.split(&[0, 1, 2], &[3, 4, 5]);

    cluster.broadcast(&0, MessageId::new(1)).unwrap();
    cluster.broadcast(&4, MessageId::new(2)).unwrap();
    run_rounds(&mut cluster, 10);

    for node in 0..3 {
        assert!(has(&cluster, node, 1));
        assert!(!has(&cluster, node, 2));
    }
    for node in 3..6 {
        assert!(!has(&cluster, node, 1));
        assert!(has(&cluster, node, 2));
    }
    assert!(!cluster.is_converged());
}

/// Test that messages broadcast during a partition arrive after it heals.
#[test]
fn test_partition_heal_delivers_backlog() {
    let mut cluster = cluster(4, false);

    cluster.chaos().partition.split(&[0, 1], &[2, 3]);
    cluster.broadcast(&0, MessageId::new(10)).unwrap();
    cluster.broadcast(&3, MessageId::new(20)).unwrap();
    run_rounds(&mut cluster, 5);
    assert!(!cluster.is_converged());

    // Nothing was acknowledged across the split, so it is all still pending
    let stats = cluster.node(&1).unwrap().stats();
    assert!(stats.total_pending > 0);

    cluster.chaos().partition.heal_all();
    assert!(cluster.run_until_converged(10).is_some());

    let expected = vec![MessageId::new(10), MessageId::new(20)];
    for node in cluster.members() {
        assert_eq!(cluster.read(&node).unwrap(), expected);
    }
}

/// Test minority partition (one node isolated).
#[test]
fn test_minority_partition() {
    let mut cluster = cluster(5, false);

    cluster.chaos().partition.isolate(0, vec![1, 2, 3, 4]);

    cluster.broadcast(&1, MessageId::new(7)).unwrap();
    cluster.broadcast(&0, MessageId::new(8)).unwrap();
    run_rounds(&mut cluster, 10);

    // The rest of the ring is still a connected line
    for node in 1..5 {
        assert!(has(&cluster, node, 7));
        assert!(!has(&cluster, node, 8));
    }
    assert_eq!(cluster.read(&0).unwrap(), vec![MessageId::new(8)]);

    cluster.chaos().partition.heal_all();
    assert!(cluster.run_until_converged(10).is_some());
}

/// Test a partition that starts while a message is spreading.
#[test]
fn test_partition_during_propagation() {
    let members: Vec<u64> = (0..6).collect();
    let mut cluster = SimulatedCluster::new(members.clone(), BroadcastConfig::default());
    cluster
        .apply_topology(&maelstrom_broadcast::testing::line_topology(&members))
        .unwrap();

    cluster.broadcast(&0, MessageId::new(3)).unwrap();
    run_rounds(&mut cluster, 2);
    assert!(has(&cluster, 2, 3));
    assert!(!has(&cluster, 3, 3));

    // Cut the chain just ahead of the message
    cluster.chaos().partition.partition(2, 3);
    run_rounds(&mut cluster, 5);
    assert!(!has(&cluster, 3, 3));

    cluster.chaos().partition.heal(&2, &3);
    let rounds = cluster.run_until_converged(10).unwrap();
    // Three more hops to the end of the chain
    assert_eq!(rounds, 3);
}

/// Test that a partition blocks traffic and is counted.
#[test]
fn test_partition_stats() {
    let mut cluster = cluster(2, true);
    cluster.chaos().partition.partition(0, 1);

    cluster.broadcast(&0, MessageId::new(1)).unwrap();
    run_rounds(&mut cluster, 3);

    let stats = cluster.chaos().stats();
    assert_eq!(stats.messages_partitioned, 3);
    assert_eq!(stats.delivery_rate(), 0.0);
}
