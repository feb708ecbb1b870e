//! Transport abstraction for broadcast message delivery.
//!
//! The engine never touches the network: it queues [`OutgoingMessage`]s and a
//! [`BroadcastRunner`] hands each one to a `Transport`.
//!
//! # Important
//!
//! Delivery must be **unicast**: an `update` batch reflects one neighbor's
//! pending set, and an `update_ok` only clears entries of the neighbor that
//! sent it. Delivery may be lossy; lost batches are resent by the next
//! retransmission round.
//!
//! # Available Transports
//!
//! - [`ChannelTransport`]: Channel-based transport for testing
//! - [`NoopTransport`]: No-op transport that discards messages
//! - [`MaelstromTransport`]: envelopes queued for the node's output stream
//!
//! [`OutgoingMessage`]: crate::OutgoingMessage
//! [`BroadcastRunner`]: crate::BroadcastRunner
//! [`MaelstromTransport`]: crate::maelstrom::MaelstromTransport

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use crate::message::BroadcastMessage;

/// Transport trait for sending broadcast protocol messages.
///
/// # Example
///
/// ```ignore
/// use maelstrom_broadcast::{BroadcastMessage, Transport};
///
/// struct UdpTransport {
///     socket: UdpSocket,
///     peers: HashMap<u64, SocketAddr>,
/// }
///
/// impl Transport<u64> for UdpTransport {
///     type Error = std::io::Error;
///
///     async fn send_to(&self, target: &u64, message: BroadcastMessage<u64>) -> Result<(), Self::Error> {
///         let data = serde_json::to_vec(&message)?;
///         self.socket.send_to(&data, self.peers[target]).await.map(|_| ())
///     }
/// }
/// ```
#[auto_impl::auto_impl(Box, Arc)]
pub trait Transport<I>: Send + Sync + 'static
where
    I: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a message to a specific neighbor (unicast).
    fn send_to(
        &self,
        target: &I,
        message: BroadcastMessage<I>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A simple channel-based transport that outputs (target, message) pairs.
///
/// Useful for testing or when you want to handle delivery externally.
#[derive(Debug, Clone)]
pub struct ChannelTransport<I> {
    tx: async_channel::Sender<(I, BroadcastMessage<I>)>,
}

impl<I> ChannelTransport<I> {
    /// Create a new channel transport.
    pub fn new(tx: async_channel::Sender<(I, BroadcastMessage<I>)>) -> Self {
        Self { tx }
    }

    /// Create a channel transport with a new bounded channel.
    ///
    /// Returns the transport and the receiver for (target, message) pairs.
    pub fn bounded(capacity: usize) -> (Self, async_channel::Receiver<(I, BroadcastMessage<I>)>) {
        let (tx, rx) = async_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

/// Error type for channel transport.
#[derive(Debug, Clone)]
pub struct ChannelTransportError(pub String);

impl std::fmt::Display for ChannelTransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel transport error: {}", self.0)
    }
}

impl std::error::Error for ChannelTransportError {}

impl<I> Transport<I> for ChannelTransport<I>
where
    I: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    type Error = ChannelTransportError;

    async fn send_to(&self, target: &I, message: BroadcastMessage<I>) -> Result<(), Self::Error> {
        self.tx
            .send((target.clone(), message))
            .await
            .map_err(|e| ChannelTransportError(e.to_string()))
    }
}

/// A no-op transport that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

impl<I> Transport<I> for NoopTransport
where
    I: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    type Error = std::convert::Infallible;

    async fn send_to(&self, _target: &I, _message: BroadcastMessage<I>) -> Result<(), Self::Error> {
        Ok(())
    }
}
