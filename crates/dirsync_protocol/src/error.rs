//! Error types for protocol encoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A message could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes did not decode into the expected message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message arrived on the wrong endpoint.
    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Message kind the receiver wanted.
        expected: &'static str,
        /// Message kind that arrived.
        actual: &'static str,
    },
}
