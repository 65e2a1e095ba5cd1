//! Error types for the node.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors that can occur while running a node.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server answered but refused the request.
    #[error("server rejected request: {0}")]
    ServerRejected(String),

    /// Transport was closed.
    #[error("not connected to server")]
    NotConnected,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The identity file could not be read or written.
    #[error("identity file {path:?}: {source}")]
    IdentityIo {
        /// Identity file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The identity file does not hold an encoded string.
    #[error("identity file {path:?} is malformed: {message}")]
    IdentityParse {
        /// Identity file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Local and remote API versions are incompatible.
    #[error("mismatched version with server: server={remote}, local={local}")]
    VersionMismatch {
        /// Local API version.
        local: String,
        /// Server API version.
        remote: String,
    },

    /// Every configured server has gone offline.
    #[error("no servers online")]
    NoServersOnline,

    /// A background task was started twice.
    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    /// A background task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),
}

impl NodeError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed request may succeed on a later cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            NodeError::Transport { retryable, .. } => *retryable,
            NodeError::ServerRejected(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error must abort startup or the update loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::Config(_)
                | NodeError::IdentityIo { .. }
                | NodeError::IdentityParse { .. }
                | NodeError::VersionMismatch { .. }
                | NodeError::NoServersOnline
        )
    }
}

impl From<dirsync_protocol::ProtocolError> for NodeError {
    fn from(e: dirsync_protocol::ProtocolError) -> Self {
        NodeError::Protocol(e.to_string())
    }
}

impl From<tokio::task::JoinError> for NodeError {
    fn from(e: tokio::task::JoinError) -> Self {
        NodeError::Task(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(NodeError::transport_retryable("connection reset").is_retryable());
        assert!(!NodeError::transport_fatal("bad certificate").is_retryable());
        assert!(NodeError::ServerRejected("busy".into()).is_retryable());
        assert!(!NodeError::NoServersOnline.is_retryable());
    }

    #[test]
    fn fatal_errors() {
        assert!(NodeError::NoServersOnline.is_fatal());
        assert!(NodeError::Config("bad interval".into()).is_fatal());
        assert!(NodeError::VersionMismatch {
            local: "2.0.0".into(),
            remote: "1.0.0".into()
        }
        .is_fatal());
        assert!(!NodeError::transport_retryable("timeout").is_fatal());
    }

    #[test]
    fn version_mismatch_display_names_both_versions() {
        let err = NodeError::VersionMismatch {
            local: "2.1.0".into(),
            remote: "1.9.0".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2.1.0"));
        assert!(msg.contains("1.9.0"));
    }
}
