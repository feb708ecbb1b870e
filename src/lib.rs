//! # maelstrom-broadcast
//!
//! Gossip broadcast for fixed-membership clusters, runnable as a node of the
//! Maelstrom distributed-systems workbench.
//!
//! Every node keeps the set of message values it has seen and, for each
//! neighbor, the subset that neighbor has not yet acknowledged. A periodic
//! retransmission round sends each neighbor its outstanding subset until it
//! is acknowledged, so every message reaches every node despite message loss
//! and temporary partitions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Maelstrom Node (stdio)                        │
//! │        (envelope codec, init, error replies, request tasks)      │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ handle_message()
//! ┌────────────────────────────▼────────────────────────────────────┐
//! │                        Broadcaster                               │
//! │      (broadcast / read / topology / update / update_ok)          │
//! ├──────────────┬──────────────────┬───────────────────────────────┤
//! │ MessageStore │   PendingTable   │       TopologyManager         │
//! │   (seen)     │ (per-neighbor)   │  (supplied or 25-node grid)   │
//! └──────────────┴──────────────────┴───────────────────────────────┘
//!                              │ OutgoingMessage
//! ┌────────────────────────────▼────────────────────────────────────┐
//! │              BroadcastRunner + Transport                         │
//! │        (retransmission loop, outgoing queue delivery)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## API Entry Points
//!
//! | API | Use Case |
//! |-----|----------|
//! | [`maelstrom::Node`] | Run as a Maelstrom node over stdin/stdout |
//! | [`BroadcastRunner`] | Drive a broadcaster over your own [`Transport`] |
//! | [`Broadcaster`] | Core protocol only, call the handlers yourself |
//! | [`testing::SimulatedCluster`] | Deterministic in-memory clusters for tests |
//!
//! ## Example
//!
//! ```ignore
//! use maelstrom_broadcast::{BroadcastConfig, Broadcaster, MessageId, NoopDelegate};
//!
//! let (broadcaster, handle) = Broadcaster::new(
//!     "n1".into(),
//!     vec!["n1".into(), "n2".into()],
//!     BroadcastConfig::default(),
//!     NoopDelegate,
//! );
//!
//! broadcaster.handle_topology(&topology)?;
//! broadcaster.handle_broadcast(MessageId::new(42));
//!
//! // Each round queues an `update` for every neighbor with unacknowledged messages
//! broadcaster.gossip_tick()?;
//! while let Some(outgoing) = handle.try_next_outgoing() {
//!     send(outgoing.target, outgoing.message);
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![allow(clippy::type_complexity)]

mod broadcast;
mod config;
mod error;
mod message;
mod pending;
mod runner;
mod topology;
mod transport;

pub mod maelstrom;
pub mod testing;

#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;

// Re-export configuration
pub use config::{
    BroadcastConfig, BENCHMARK_CLUSTER_SIZE, ENV_EAGER_PUSH, ENV_GOSSIP_INTERVAL_MS,
    ENV_GRID_OVERRIDE, ENV_SUPPRESS_GRID_ACKS,
};

// Re-export error types
pub use error::{Error, Result};

// Re-export message types
pub use message::{BroadcastMessage, MessageId, MessageStore, NodeId, TopologyDescription};

// Re-export state tracking
pub use pending::{PendingStats, PendingTable, SharedPendingTable};
pub use topology::{Neighbors, TopologyManager, TopologyPolicy};

// Re-export the protocol engine
pub use broadcast::{
    BroadcastDelegate, BroadcastHandle, BroadcastStats, Broadcaster, NoopDelegate,
    OutgoingMessage,
};

// Re-export runner and transport
pub use runner::BroadcastRunner;
pub use transport::{ChannelTransport, ChannelTransportError, NoopTransport, Transport};
