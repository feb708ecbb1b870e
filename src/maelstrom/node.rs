//! Stdio event loop of a Maelstrom node.

use std::sync::Arc;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    task::{JoinHandle, JoinSet},
};

use super::{
    envelope::{decode_envelope, parse_payload, ControlMessage, Envelope, ErrorCode, Payload},
    transport::{MaelstromTransport, Outbox},
};
use crate::{
    broadcast::{BroadcastDelegate, Broadcaster, NoopDelegate},
    config::BroadcastConfig,
    error::{Error, Result},
    message::{BroadcastMessage, NodeId},
    runner::BroadcastRunner,
};

/// A broadcast node speaking the Maelstrom protocol.
///
/// The node is created empty; the `init` message assigns its identity and
/// cluster membership and starts the retransmission loop. Every later
/// request is handled on its own task.
pub struct Node<D = NoopDelegate> {
    config: BroadcastConfig,
    delegate: Arc<D>,
}

/// State that exists once the node has been initialized.
struct Session<D> {
    broadcaster: Broadcaster<NodeId, Arc<D>>,
    runner: JoinHandle<()>,
}

impl Node {
    /// Create a node with the given configuration.
    pub fn new(config: BroadcastConfig) -> Self {
        Self::with_delegate(config, NoopDelegate)
    }
}

impl<D> Node<D>
where
    D: BroadcastDelegate<NodeId>,
{
    /// Create a node that reports broadcast events to `delegate`.
    pub fn with_delegate(config: BroadcastConfig, delegate: D) -> Self {
        Self {
            config,
            delegate: Arc::new(delegate),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Run on the process's stdin and stdout.
    pub async fn run_stdio(self) -> Result<()> {
        self.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Run until `reader` reaches end of input or a fatal error occurs.
    ///
    /// Each input line is one envelope; each output line written to
    /// `writer` is one envelope.
    ///
    /// # Errors
    ///
    /// The fatal error that stopped the node (e.g.
    /// [`Error::MissingTopology`]) or an input error.
    pub async fn run<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, lines_rx) = Outbox::new();
        let writer_task = tokio::spawn(write_lines(writer, lines_rx));
        let (fatal_tx, fatal_rx) = async_channel::bounded::<Error>(1);

        let mut session: Option<Session<D>> = None;
        let mut handlers = JoinSet::new();
        let mut lines = reader.lines();

        let result = loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        self.dispatch(&line, &mut session, &outbox, &fatal_tx, &mut handlers);
                    }
                    Ok(None) => {
                        tracing::debug!("end of input");
                        break Ok(());
                    }
                    Err(e) => break Err(Error::Io(e)),
                },
                Ok(err) = fatal_rx.recv() => {
                    tracing::error!("stopping node: {}", err);
                    break Err(err);
                }
            }

            while handlers.try_join_next().is_some() {}
        };

        while handlers.join_next().await.is_some() {}

        if let Some(session) = session {
            session.broadcaster.shutdown();
            if let Err(e) = session.runner.await {
                tracing::warn!("broadcast runner failed: {}", e);
            }
        }

        outbox.close();
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("failed to write output: {}", e),
            Err(e) => tracing::warn!("output writer failed: {}", e),
        }

        result
    }

    fn dispatch(
        &self,
        line: &str,
        session: &mut Option<Session<D>>,
        outbox: &Outbox,
        fatal_tx: &async_channel::Sender<Error>,
        handlers: &mut JoinSet<()>,
    ) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let request = match decode_envelope(line.as_bytes()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("dropping undecodable input: {}", e);
                return;
            }
        };

        let payload = match parse_payload(&request.body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("rejecting request from {}: {}", request.src, e);
                log_failure(outbox.reply_error(&request, ErrorCode::for_error(&e), e.to_string()));
                return;
            }
        };

        match payload {
            Payload::Control(ControlMessage::Init { node_id, node_ids }) => {
                if session.is_some() {
                    log_failure(outbox.reply_error(
                        &request,
                        ErrorCode::PreconditionFailed,
                        "node is already initialized",
                    ));
                    return;
                }
                *session = Some(self.start_session(node_id, node_ids, outbox));
                log_failure(outbox.reply(&request, &ControlMessage::InitOk));
            }
            Payload::Control(ControlMessage::InitOk) => {
                tracing::debug!("ignoring init_ok from {}", request.src);
            }
            Payload::Control(ControlMessage::Error { code, text }) => {
                tracing::warn!("{} reported error {}: {}", request.src, code, text);
            }
            Payload::Broadcast(message) => {
                let Some(session) = session.as_ref() else {
                    let err = Error::NotInitialized;
                    log_failure(outbox.reply_error(
                        &request,
                        ErrorCode::for_error(&err),
                        err.to_string(),
                    ));
                    return;
                };

                let broadcaster = session.broadcaster.clone();
                let outbox = outbox.clone();
                let fatal_tx = fatal_tx.clone();
                handlers.spawn(async move {
                    handle_request(&broadcaster, &outbox, &fatal_tx, &request, message);
                });
            }
        }
    }

    fn start_session(&self, node_id: NodeId, node_ids: Vec<NodeId>, outbox: &Outbox) -> Session<D> {
        tracing::info!(
            "initialized as {} in a cluster of {} nodes",
            node_id,
            node_ids.len()
        );

        let (broadcaster, handle) = Broadcaster::new(
            node_id.clone(),
            node_ids,
            self.config.clone(),
            self.delegate.clone(),
        );
        if broadcaster.acks_suppressed() {
            tracing::info!("benchmark grid cluster: update_ok replies suppressed");
        }

        let transport = MaelstromTransport::new(node_id, outbox.clone());
        let runner = BroadcastRunner::new(broadcaster.clone(), handle, transport);

        Session {
            broadcaster,
            runner: tokio::spawn(runner.run()),
        }
    }
}

fn handle_request<D>(
    broadcaster: &Broadcaster<NodeId, Arc<D>>,
    outbox: &Outbox,
    fatal_tx: &async_channel::Sender<Error>,
    request: &Envelope,
    message: BroadcastMessage<NodeId>,
) where
    D: BroadcastDelegate<NodeId>,
{
    match broadcaster.handle_message(request.src.clone(), message) {
        Ok(Some(reply)) => log_failure(outbox.reply(request, &reply)),
        Ok(None) => {}
        Err(e) => {
            let code = ErrorCode::for_error(&e);
            if e.is_fatal() {
                tracing::error!("fatal error handling request from {}: {}", request.src, e);
                log_failure(outbox.reply_error(request, code, e.to_string()));
                // A full channel means a fatal error is already being handled
                let _ = fatal_tx.try_send(e);
            } else {
                tracing::warn!("failed to handle request from {}: {}", request.src, e);
                log_failure(outbox.reply_error(request, code, e.to_string()));
            }
        }
    }
}

fn log_failure(result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!("failed to queue reply: {}", e);
    }
}

async fn write_lines<W>(mut writer: W, lines: async_channel::Receiver<bytes::Bytes>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Ok(line) = lines.recv().await {
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
