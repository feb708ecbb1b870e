//! Newline-delimited JSON envelope codec.
//!
//! Every line on the wire is one envelope:
//!
//! ```text
//! {"src": "c1", "dest": "n1", "body": {"type": "broadcast", "msg_id": 3, "message": 42}}
//! ```
//!
//! The body always carries a `type`; requests carry a `msg_id` and replies
//! an `in_reply_to`. Body payloads are decoded once, here, into
//! [`Payload`]; anything that does not match its kind's shape is rejected
//! before a handler sees it.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;

use crate::{
    error::{Error, Result},
    message::{BroadcastMessage, NodeId},
};

/// One wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender.
    pub src: NodeId,
    /// Recipient.
    pub dest: NodeId,
    /// Message body; always a JSON object with a `type` field.
    pub body: Value,
}

impl Envelope {
    /// Wire name of the body's message kind.
    pub fn kind(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    /// The body's `msg_id`, if it has one.
    pub fn msg_id(&self) -> Option<u64> {
        self.body.get("msg_id").and_then(Value::as_u64)
    }

    /// The body's `in_reply_to`, if it has one.
    pub fn in_reply_to(&self) -> Option<u64> {
        self.body.get("in_reply_to").and_then(Value::as_u64)
    }
}

/// Runtime-level messages that never reach the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// First message of every run: assigns this node's identity.
    Init {
        /// This node's identifier.
        node_id: NodeId,
        /// Every cluster member, including this node.
        node_ids: Vec<NodeId>,
    },

    /// Reply to [`ControlMessage::Init`].
    InitOk,

    /// Protocol-level failure reply.
    Error {
        /// Numeric error code, see [`ErrorCode`].
        code: u16,
        /// Human-readable description.
        text: String,
    },
}

impl ControlMessage {
    /// Wire names of every control kind.
    pub const KINDS: &'static [&'static str] = &["init", "init_ok", "error"];

    /// Check whether a wire name is a control kind.
    pub fn is_known_kind(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }
}

/// A decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Handled by the runtime.
    Control(ControlMessage),
    /// Handled by the broadcaster.
    Broadcast(BroadcastMessage<NodeId>),
}

/// Error codes used in `error` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The message type is not handled by this node.
    NotSupported,
    /// The node cannot serve the request yet; retrying may succeed.
    TemporarilyUnavailable,
    /// The request body does not match its type.
    MalformedRequest,
    /// The node hit an unrecoverable error.
    Crash,
    /// The request conflicts with the node's state.
    PreconditionFailed,
}

impl ErrorCode {
    /// Numeric wire value.
    pub const fn code(self) -> u16 {
        match self {
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::PreconditionFailed => 22,
        }
    }

    /// Code reported for a handler error.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::NotInitialized => ErrorCode::TemporarilyUnavailable,
            Error::Decode(_) => ErrorCode::MalformedRequest,
            _ => ErrorCode::Crash,
        }
    }
}

/// Decode one input line into an envelope.
///
/// # Errors
///
/// [`Error::Decode`] if the line is not an envelope or its body is not a
/// JSON object.
pub fn decode_envelope(line: &[u8]) -> Result<Envelope> {
    let envelope: Envelope = serde_json::from_slice(line)?;
    if !envelope.body.is_object() {
        return Err(Error::Decode("envelope body must be an object".into()));
    }
    Ok(envelope)
}

/// Encode an envelope as one newline-terminated line.
pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes> {
    let mut writer = BytesMut::with_capacity(128).writer();
    serde_json::to_writer(&mut writer, envelope).map_err(|e| Error::Encode(e.to_string()))?;
    writer.write_all(b"\n")?;
    Ok(writer.into_inner().freeze())
}

/// Decode a body into its typed payload.
///
/// # Errors
///
/// - [`Error::Decode`] if the body has no `type` or its fields do not match
///   the kind's shape.
/// - [`Error::NotSupported`] for a well-formed body of an unknown kind.
pub fn parse_payload(body: &Value) -> Result<Payload> {
    let kind = body
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Decode("body has no string `type` field".into()))?;

    if ControlMessage::is_known_kind(kind) {
        Ok(Payload::Control(ControlMessage::deserialize(body)?))
    } else if BroadcastMessage::<NodeId>::is_known_kind(kind) {
        Ok(Payload::Broadcast(BroadcastMessage::deserialize(body)?))
    } else {
        Err(Error::NotSupported(kind.to_string()))
    }
}

/// Serialize a payload into a body, adding the correlation fields.
pub fn encode_body<T: Serialize>(
    payload: &T,
    msg_id: Option<u64>,
    in_reply_to: Option<u64>,
) -> Result<Value> {
    let value = serde_json::to_value(payload).map_err(|e| Error::Encode(e.to_string()))?;
    let Value::Object(mut body) = value else {
        return Err(Error::Encode("payload is not a JSON object".into()));
    };

    insert_id(&mut body, "msg_id", msg_id);
    insert_id(&mut body, "in_reply_to", in_reply_to);
    Ok(Value::Object(body))
}

fn insert_id(body: &mut Map<String, Value>, key: &str, id: Option<u64>) {
    if let Some(id) = id {
        body.insert(key.to_string(), Value::from(id));
    }
}
