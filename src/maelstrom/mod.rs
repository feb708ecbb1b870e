//! Maelstrom runtime for the broadcaster.
//!
//! Nodes exchange newline-delimited JSON envelopes over stdin and stdout.
//! This module provides:
//!
//! - The envelope codec and payload decoding ([`decode_envelope`],
//!   [`parse_payload`], [`encode_envelope`])
//! - [`MaelstromTransport`], which sends protocol messages as envelopes
//! - [`Node`], the stdio event loop (requires the `tokio` feature)
//!
//! # Protocol
//!
//! | type | reply |
//! |------|-------|
//! | `init` | `init_ok` |
//! | `broadcast` | `broadcast_ok` |
//! | `read` | `read_ok` |
//! | `topology` | `topology_ok` |
//! | `update` | `update_ok`, unless suppressed on the benchmark grid |
//! | `update_ok` | none |
//!
//! Failures are answered with an `error` body carrying an [`ErrorCode`].

mod envelope;
#[cfg(feature = "tokio")]
mod node;
mod transport;

pub use envelope::{
    decode_envelope, encode_body, encode_envelope, parse_payload, ControlMessage, Envelope,
    ErrorCode, Payload,
};
#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub use node::Node;
pub use transport::{MaelstromTransport, Outbox};
