//! Outgoing envelope queue and the Maelstrom [`Transport`].

use async_channel::{Receiver, Sender};
use bytes::Bytes;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use super::envelope::{encode_body, encode_envelope, ControlMessage, Envelope, ErrorCode};
use crate::{
    error::{Error, Result},
    message::{BroadcastMessage, NodeId},
    transport::Transport,
};

/// Queue of encoded output lines, shared by replies and gossip.
///
/// Every envelope gets a fresh `msg_id`. A single writer drains the queue,
/// so lines never interleave.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: Sender<Bytes>,
    next_msg_id: Arc<AtomicU64>,
}

impl Outbox {
    /// Create an outbox and the receiver its lines arrive on.
    pub fn new() -> (Self, Receiver<Bytes>) {
        let (tx, rx) = async_channel::unbounded();
        let outbox = Self {
            tx,
            next_msg_id: Arc::new(AtomicU64::new(1)),
        };
        (outbox, rx)
    }

    fn next_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue a message from `src` to `dest`.
    pub fn send<T: Serialize>(
        &self,
        src: &NodeId,
        dest: &NodeId,
        payload: &T,
        in_reply_to: Option<u64>,
    ) -> Result<()> {
        let body = encode_body(payload, Some(self.next_msg_id()), in_reply_to)?;
        let line = encode_envelope(&Envelope {
            src: src.clone(),
            dest: dest.clone(),
            body,
        })?;
        self.tx
            .try_send(line)
            .map_err(|e| Error::Channel(e.to_string()))
    }

    /// Queue a reply to `request`.
    pub fn reply<T: Serialize>(&self, request: &Envelope, payload: &T) -> Result<()> {
        self.send(&request.dest, &request.src, payload, request.msg_id())
    }

    /// Queue an `error` reply to `request`.
    pub fn reply_error(
        &self,
        request: &Envelope,
        code: ErrorCode,
        text: impl Into<String>,
    ) -> Result<()> {
        self.reply(
            request,
            &ControlMessage::Error {
                code: code.code(),
                text: text.into(),
            },
        )
    }

    /// Stop accepting lines. Lines already queued are still delivered.
    pub fn close(&self) {
        self.tx.close();
    }

    /// Check if the outbox is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// [`Transport`] that writes protocol messages as envelopes from the local node.
#[derive(Debug, Clone)]
pub struct MaelstromTransport {
    local_id: NodeId,
    outbox: Outbox,
}

impl MaelstromTransport {
    /// Create a transport sending as `local_id`.
    pub fn new(local_id: NodeId, outbox: Outbox) -> Self {
        Self { local_id, outbox }
    }
}

impl Transport<NodeId> for MaelstromTransport {
    type Error = Error;

    async fn send_to(
        &self,
        target: &NodeId,
        message: BroadcastMessage<NodeId>,
    ) -> std::result::Result<(), Self::Error> {
        self.outbox.send(&self.local_id, target, &message, None)
    }
}
