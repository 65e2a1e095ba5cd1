//! # dirsync Protocol
//!
//! Wire types and CBOR codecs shared by the dirsync node and server.
//!
//! This crate provides:
//! - `VersionInfo` and the API version gate helpers
//! - `SyncCandidate` index entries returned by a comparison
//! - Request/response messages (identify, heartbeat, compare, fetch)
//! - CBOR encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod index;
mod messages;
pub mod version;

pub use codec::{from_cbor, to_cbor, WireMessage};
pub use error::{ProtocolError, ProtocolResult};
pub use index::SyncCandidate;
pub use messages::{
    endpoint, CompareRequest, CompareResponse, FetchKind, FetchRequest, FetchResponse,
    HeartbeatRequest, HeartbeatResponse, IdentifyRequest, IdentifyResponse, SyncMessage,
    VersionInfo, VersionRequest,
};
