//! # dirsync Node
//!
//! Node-side synchronization engine for dirsync.
//!
//! This crate provides:
//! - Persistent node identity
//! - Server liveness registry (missed heartbeats, online/offline)
//! - API version gate and server identification
//! - Cancellable heartbeat monitor
//! - Pull-based sync loop (index comparison → selective fetch)
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! The node runs two periodic activities against shared state:
//! 1. The heartbeat monitor probes every online server and marks servers
//!    offline once they miss too many beats
//! 2. The sync loop asks each online server which entries the node is
//!    missing and fetches them one by one
//!
//! ## Key Invariants
//!
//! - Servers are authoritative; the node only pulls
//! - Every configured address has exactly one registry entry
//! - An offline server never comes back online within a run
//! - The node stops syncing once no server is online

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod heartbeat;
mod http;
mod identity;
mod node;
mod registry;
mod shutdown;
mod transport;
mod version;

pub use config::{format_duration, parse_duration, MissedBeatPolicy, NodeConfig};
pub use engine::{CycleReport, SyncEngine, SyncPhase, SyncStats, SyncedFlag};
pub use error::{NodeError, NodeResult};
pub use heartbeat::{HeartbeatMonitor, HeartbeatReport};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use identity::NodeIdentity;
pub use node::Node;
pub use registry::{LivenessChange, ServerEntry, ServerRegistry};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use transport::{MockCall, MockTransport, ServerTransport, SharedTransport};
pub use version::{validate, IdentifyReport, VersionNegotiator};
