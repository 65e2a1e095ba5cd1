//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request from a node that never identified.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Requested entry is not in the index.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unrecognized endpoint.
    #[error("no such endpoint: {0}")]
    UnknownEndpoint(String),

    /// Server is refusing all requests.
    #[error("server unavailable")]
    Unavailable,

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] dirsync_protocol::ProtocolError),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::UnknownNode(_)
                | ServerError::NotFound(_)
                | ServerError::UnknownEndpoint(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Unavailable | ServerError::Codec(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::NotFound("a".into()).is_client_error());
        assert!(ServerError::Unavailable.is_server_error());
        assert!(!ServerError::UnknownNode("n".into()).is_server_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::UnknownEndpoint("/v2/x".into());
        assert!(err.to_string().contains("/v2/x"));
    }
}
