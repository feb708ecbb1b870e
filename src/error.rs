//! Error types for the broadcast protocol.

use std::fmt;

/// Result type alias for broadcast operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during broadcast operations.
#[derive(Debug)]
pub enum Error {
    /// Failed to decode an inbound envelope or payload.
    Decode(String),

    /// Failed to encode an outbound envelope or payload.
    Encode(String),

    /// The topology description has no neighbor list for the local node.
    MissingTopology(String),

    /// The local node is not a member of the cluster.
    UnknownNode(String),

    /// The message kind is not handled by this node.
    NotSupported(String),

    /// A request arrived before the node was initialized.
    NotInitialized,

    /// The broadcaster has been shut down.
    Shutdown,

    /// Internal channel error.
    Channel(String),

    /// Configuration error.
    Config(String),

    /// Generic IO error.
    Io(std::io::Error),
}

impl Error {
    /// Returns true if the node cannot keep participating after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingTopology(_) | Error::UnknownNode(_) | Error::Config(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(msg) => {
                write!(f, "failed to decode message: {}", msg)
            }
            Error::Encode(msg) => {
                write!(f, "failed to encode message: {}", msg)
            }
            Error::MissingTopology(node) => {
                write!(f, "topology has no neighbor list for node {}", node)
            }
            Error::UnknownNode(node) => {
                write!(f, "node {} is not a cluster member", node)
            }
            Error::NotSupported(kind) => {
                write!(f, "unsupported message type: {}", kind)
            }
            Error::NotInitialized => {
                write!(f, "node has not been initialized")
            }
            Error::Shutdown => {
                write!(f, "broadcaster has been shut down")
            }
            Error::Channel(msg) => {
                write!(f, "channel error: {}", msg)
            }
            Error::Config(msg) => {
                write!(f, "configuration error: {}", msg)
            }
            Error::Io(err) => {
                write!(f, "IO error: {}", err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl<T> From<async_channel::SendError<T>> for Error {
    fn from(err: async_channel::SendError<T>) -> Self {
        Error::Channel(err.to_string())
    }
}

impl From<async_channel::RecvError> for Error {
    fn from(err: async_channel::RecvError) -> Self {
        Error::Channel(err.to_string())
    }
}
