//! Broadcast protocol message types.
//!
//! Every kind of message the protocol exchanges is one variant of
//! [`BroadcastMessage`]. Payloads are validated once, when the wire form is
//! decoded into this type; handlers never re-check field types.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, hash::Hash};

use super::MessageId;

/// Cluster-wide adjacency description: node -> neighbor list.
pub type TopologyDescription<I> = HashMap<I, Vec<I>>;

/// Protocol message kinds.
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type": "update", "messages": [1, 2]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(bound(
    serialize = "I: Serialize + Eq + Hash",
    deserialize = "I: Deserialize<'de> + Eq + Hash"
))]
pub enum BroadcastMessage<I> {
    /// Inject a new message at this node.
    Broadcast {
        /// The message to disseminate.
        message: MessageId,
    },

    /// Reply to [`BroadcastMessage::Broadcast`].
    BroadcastOk,

    /// Ask for every message known to this node.
    Read,

    /// Reply to [`BroadcastMessage::Read`].
    ReadOk {
        /// Every known message, without duplicates.
        messages: Vec<MessageId>,
    },

    /// Replace the neighbor assignment.
    Topology {
        /// Node -> neighbor list for the whole cluster.
        topology: TopologyDescription<I>,
    },

    /// Reply to [`BroadcastMessage::Topology`].
    TopologyOk,

    /// Batch of messages a neighbor has not acknowledged yet.
    Update {
        /// Messages in the batch.
        messages: Vec<MessageId>,
    },

    /// Acknowledgment of an [`BroadcastMessage::Update`] batch.
    UpdateOk {
        /// Messages the neighbor has recorded.
        messages: Vec<MessageId>,
    },
}

// Topology equality needs `I: Eq + Hash`.
impl<I: Eq + Hash> PartialEq for BroadcastMessage<I> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Broadcast { message: a }, Self::Broadcast { message: b }) => a == b,
            (Self::BroadcastOk, Self::BroadcastOk)
            | (Self::Read, Self::Read)
            | (Self::TopologyOk, Self::TopologyOk) => true,
            (Self::ReadOk { messages: a }, Self::ReadOk { messages: b })
            | (Self::Update { messages: a }, Self::Update { messages: b })
            | (Self::UpdateOk { messages: a }, Self::UpdateOk { messages: b }) => a == b,
            (Self::Topology { topology: a }, Self::Topology { topology: b }) => a == b,
            _ => false,
        }
    }
}

impl<I: Eq + Hash> Eq for BroadcastMessage<I> {}

impl<I> BroadcastMessage<I> {
    /// Wire names of every message kind.
    pub const KINDS: &'static [&'static str] = &[
        "broadcast",
        "broadcast_ok",
        "read",
        "read_ok",
        "topology",
        "topology_ok",
        "update",
        "update_ok",
    ];

    /// Wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastMessage::Broadcast { .. } => "broadcast",
            BroadcastMessage::BroadcastOk => "broadcast_ok",
            BroadcastMessage::Read => "read",
            BroadcastMessage::ReadOk { .. } => "read_ok",
            BroadcastMessage::Topology { .. } => "topology",
            BroadcastMessage::TopologyOk => "topology_ok",
            BroadcastMessage::Update { .. } => "update",
            BroadcastMessage::UpdateOk { .. } => "update_ok",
        }
    }

    /// Check whether a wire name belongs to this protocol.
    pub fn is_known_kind(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }

    /// Check whether this kind is a reply to a client request.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            BroadcastMessage::BroadcastOk
                | BroadcastMessage::ReadOk { .. }
                | BroadcastMessage::TopologyOk
        )
    }
}
