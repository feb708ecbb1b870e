//! Background task runner for the broadcaster.
//!
//! Drives the retransmission loop and drains the outgoing queue into a
//! [`Transport`].
//!
//! # Important: Unicast
//!
//! Every outgoing message names one target neighbor and must be delivered to
//! that neighbor only. A failed send is logged and forgotten: the entries
//! stay pending and the next retransmission round sends them again.

use std::{fmt::Debug, hash::Hash, sync::Arc};

use crate::{
    broadcast::{BroadcastDelegate, BroadcastHandle, Broadcaster, OutgoingMessage},
    transport::Transport,
};

/// Runs the broadcaster's background tasks over a [`Transport`].
///
/// # Example
///
/// ```ignore
/// use maelstrom_broadcast::{BroadcastRunner, ChannelTransport};
///
/// let (transport, rx) = ChannelTransport::bounded(1024);
/// let runner = BroadcastRunner::new(broadcaster, handle, transport);
///
/// // Spawn the runner
/// tokio::spawn(runner.run());
///
/// // Deliver (target, message) pairs
/// while let Ok((target, message)) = rx.recv().await {
///     network.send(&target, message).await;
/// }
/// ```
pub struct BroadcastRunner<I, D, T> {
    broadcaster: Broadcaster<I, D>,
    handle: BroadcastHandle<I>,
    transport: Arc<T>,
}

impl<I, D, T> BroadcastRunner<I, D, T>
where
    I: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static,
    D: BroadcastDelegate<I>,
    T: Transport<I>,
{
    /// Create a new runner with the given transport.
    pub fn new(broadcaster: Broadcaster<I, D>, handle: BroadcastHandle<I>, transport: T) -> Self {
        Self {
            broadcaster,
            handle,
            transport: Arc::new(transport),
        }
    }

    /// Run all background tasks.
    ///
    /// Returns after [`Self::shutdown`] once the outgoing queue is drained.
    pub async fn run(self) {
        futures::future::join(self.run_gossip_loop(), self.run_outgoing_processor()).await;
    }

    /// Run only the retransmission loop.
    pub async fn run_gossip_loop(&self) {
        self.broadcaster.run_gossip_loop().await;
    }

    /// Run the outgoing message processor with unicast delivery.
    pub async fn run_outgoing_processor(&self) {
        while let Some(outgoing) = self.handle.next_outgoing().await {
            let OutgoingMessage { target, message } = outgoing;
            let kind = message.kind();

            if let Err(e) = self.transport.send_to(&target, message).await {
                tracing::warn!("failed to send {} to {:?}: {}", kind, target, e);
            }
        }
    }

    /// Get a reference to the broadcaster.
    pub fn broadcaster(&self) -> &Broadcaster<I, D> {
        &self.broadcaster
    }

    /// Get a reference to the handle.
    pub fn handle(&self) -> &BroadcastHandle<I> {
        &self.handle
    }

    /// Shutdown the runner.
    pub fn shutdown(&self) {
        self.broadcaster.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        message::{BroadcastMessage, MessageId},
        transport::{ChannelTransport, NoopTransport},
        BroadcastConfig, NoopDelegate,
    };
    use std::{collections::HashMap, time::Duration};

    fn broadcaster(interval_ms: u64) -> (Broadcaster<u64>, BroadcastHandle<u64>) {
        let config = BroadcastConfig::default().with_gossip_interval(Duration::from_millis(interval_ms));
        let (node, handle) = Broadcaster::new(0u64, vec![0, 1, 2], config, NoopDelegate);

        let mut topology = HashMap::new();
        topology.insert(0u64, vec![1u64, 2]);
        node.handle_topology(&topology).unwrap();
        (node, handle)
    }

    #[tokio::test]
    async fn test_runner_delivers_updates_to_targets() {
        let (node, handle) = broadcaster(10);
        let (transport, rx) = ChannelTransport::bounded(64);
        let runner = BroadcastRunner::new(node.clone(), handle, transport);
        let task = tokio::spawn(runner.run());

        node.handle_broadcast(MessageId::new(5));

        let mut targets = Vec::new();
        while targets.len() < 2 {
            let (target, message) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                message,
                BroadcastMessage::Update {
                    messages: vec![MessageId::new(5)]
                }
            );
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets.sort();
        assert_eq!(targets, vec![1, 2]);

        node.shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_runner_survives_send_failures() {
        let (node, handle) = broadcaster(10);
        let (transport, rx) = ChannelTransport::bounded(1);
        drop(rx);

        let runner = BroadcastRunner::new(node.clone(), handle, transport);
        let task = tokio::spawn(runner.run());

        node.handle_broadcast(MessageId::new(1));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Nothing was acknowledged, so everything is still pending
        assert_eq!(node.stats().total_pending, 2);

        node.shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_runner_accessors() {
        let (node, handle) = broadcaster(150);
        let runner = BroadcastRunner::new(node, handle, NoopTransport);
        assert_eq!(*runner.broadcaster().local_id(), 0);
        assert!(!runner.handle().is_closed());

        runner.shutdown();
        assert!(runner.broadcaster().is_shutdown());
        runner.run().await;
    }
}
