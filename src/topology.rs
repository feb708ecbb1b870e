//! Neighbor assignment for the broadcast overlay.
//!
//! By default a node gossips with exactly the neighbors the cluster-wide
//! topology description assigns to it. One special case exists: when the
//! cluster has the size of the known large-scale benchmark (25 nodes by
//! default), the supplied adjacency is ignored and a fixed low-diameter grid
//! is used instead.
//!
//! ## Benchmark Grid
//!
//! ```text
//!  group 0        group 1        group 2        group 3        group 4
//! [0 1 2 3 4]    [5 6 7 8 9]    [10 .. 14]     [15 .. 19]     [20 .. 24]
//!          \______________|___________|______________|______________/
//!                      hubs 4, 9, 14, 19, 24 fully connected
//! ```
//!
//! Members are ordered and split into groups of consecutive indices. Nodes
//! inside a group are fully connected. The last node of each group is its
//! hub, and every hub is connected to every other hub, so any two nodes are
//! at most three hops apart.
//!
//! The grid is a bounded override for that one cluster shape, not a general
//! topology algorithm: other sizes always use the supplied adjacency.

use smallvec::SmallVec;
use std::{fmt::Debug, hash::Hash};

use crate::{
    config::BroadcastConfig,
    error::{Error, Result},
    message::TopologyDescription,
};

/// Neighbor list of one node.
pub type Neighbors<I> = SmallVec<[I; 8]>;

/// Which rule produced a neighbor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyPolicy {
    /// The adjacency supplied by the cluster, used verbatim.
    Supplied,
    /// The benchmark grid.
    Grid {
        /// Number of cluster members.
        cluster_size: usize,
        /// Consecutive indices per group.
        group_size: usize,
    },
}

/// Computes this node's neighbor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyManager {
    grid_cluster_size: Option<usize>,
    grid_group_size: usize,
}

impl Default for TopologyManager {
    fn default() -> Self {
        Self::from_config(&BroadcastConfig::default())
    }
}

impl TopologyManager {
    /// Create a manager.
    ///
    /// `grid_cluster_size` is the only cluster size that activates the grid;
    /// `None` disables the override entirely.
    pub const fn new(grid_cluster_size: Option<usize>, grid_group_size: usize) -> Self {
        Self {
            grid_cluster_size,
            grid_group_size,
        }
    }

    /// Create a manager from the broadcast configuration.
    pub const fn from_config(config: &BroadcastConfig) -> Self {
        Self::new(config.grid_cluster_size, config.grid_group_size)
    }

    /// Policy applied to a cluster of the given size.
    pub fn policy(&self, cluster_size: usize) -> TopologyPolicy {
        match self.grid_cluster_size {
            Some(size) if size == cluster_size && self.grid_group_size > 0 => {
                TopologyPolicy::Grid {
                    cluster_size,
                    group_size: self.grid_group_size,
                }
            }
            _ => TopologyPolicy::Supplied,
        }
    }

    /// Check if a cluster of the given size gets the benchmark grid.
    pub fn uses_grid(&self, cluster_size: usize) -> bool {
        matches!(self.policy(cluster_size), TopologyPolicy::Grid { .. })
    }

    /// Compute the neighbors of `local`.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingTopology`] if the description has no entry for
    ///   `local` and the supplied adjacency is in effect.
    /// - [`Error::UnknownNode`] if `local` is not among `members` and the
    ///   grid is in effect.
    pub fn compute_neighbors<I>(
        &self,
        local: &I,
        description: &TopologyDescription<I>,
        members: &[I],
    ) -> Result<Neighbors<I>>
    where
        I: Clone + Eq + Hash + Ord + Debug,
    {
        match self.policy(members.len()) {
            TopologyPolicy::Supplied => description
                .get(local)
                .map(|neighbors| neighbors.iter().cloned().collect())
                .ok_or_else(|| Error::MissingTopology(format!("{:?}", local))),
            TopologyPolicy::Grid {
                cluster_size,
                group_size,
            } => {
                let mut ordered: Vec<&I> = members.iter().collect();
                ordered.sort();

                let index = ordered
                    .iter()
                    .position(|member| *member == local)
                    .ok_or_else(|| Error::UnknownNode(format!("{:?}", local)))?;

                Ok(Self::grid_neighbors(index, cluster_size, group_size)
                    .into_iter()
                    .map(|i| ordered[i].clone())
                    .collect())
            }
        }
    }

    /// Grid neighbors of the node at `index`, as member indices.
    ///
    /// Every other member of the node's group, plus every other hub when
    /// the node is its group's hub.
    pub fn grid_neighbors(index: usize, cluster_size: usize, group_size: usize) -> Vec<usize> {
        if group_size == 0 || index >= cluster_size {
            return Vec::new();
        }

        let start = (index / group_size) * group_size;
        let end = (start + group_size).min(cluster_size);
        let mut neighbors: Vec<usize> = (start..end).filter(|&i| i != index).collect();

        if Self::is_hub(index, group_size) {
            neighbors.extend(
                (group_size - 1..cluster_size)
                    .step_by(group_size)
                    .filter(|&hub| hub != index),
            );
        }

        neighbors
    }

    /// Check if the node at `index` is the hub of its group.
    pub fn is_hub(index: usize, group_size: usize) -> bool {
        group_size > 0 && index % group_size == group_size - 1
    }
}
