//! Maelstrom broadcast node.
//!
//! Reads envelopes from stdin, writes envelopes to stdout and logs to stderr.
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;

use maelstrom_broadcast::{maelstrom::Node, BroadcastConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    #[cfg(feature = "metrics")]
    maelstrom_broadcast::metrics::init_metrics();

    let config = match BroadcastConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!("starting with {:?}", config);

    match Node::new(config).run_stdio().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("node stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
