//! # dirsync Server
//!
//! Reference in-memory server for dirsync.
//!
//! This crate provides:
//! - Endpoints for version, identify, heartbeat, index comparison and fetch
//! - A directory index of files and directories
//! - Per-node sessions (last heartbeat, synced flag, delivered entries)
//!
//! # Protocol
//!
//! 1. Node asks for the server version and identifies itself
//! 2. Node sends periodic heartbeats
//! 3. Node asks which entries under its target directory it is missing
//! 4. Node fetches each missing entry; the server records the delivery
//!
//! Comparison is per-identity: an entry delivered to one node is still
//! reported as missing to every other node.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod index;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, NodeSession, RequestHandler};
pub use index::ServerIndex;
pub use server::SyncServer;
