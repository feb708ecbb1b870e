//! Message types and storage for the broadcast protocol.
//!
//! This module contains:
//! - [`MessageId`] and [`NodeId`] - identifiers
//! - [`BroadcastMessage`] - protocol message kinds
//! - [`MessageStore`] - the set of messages this node has observed

mod id;
mod store;
mod types;

pub use id::{MessageId, NodeId};
pub use store::MessageStore;
pub use types::{BroadcastMessage, TopologyDescription};
