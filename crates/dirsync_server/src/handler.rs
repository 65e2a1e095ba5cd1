//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::index::ServerIndex;
use dirsync_protocol::{
    version, CompareRequest, CompareResponse, FetchKind, FetchRequest, FetchResponse,
    HeartbeatRequest, HeartbeatResponse, IdentifyRequest, IdentifyResponse, VersionInfo,
    VersionRequest,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the server knows about one identified node.
#[derive(Debug, Clone, Default)]
pub struct NodeSession {
    /// When the last heartbeat arrived.
    pub last_heartbeat: Option<Instant>,
    /// Synced flag carried by the last heartbeat.
    pub synced: bool,
    /// Heartbeats received.
    pub heartbeats: u64,
    /// Entries already served to this node.
    pub delivered: HashSet<String>,
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Entries this server serves.
    pub index: Arc<ServerIndex>,
    /// Node sessions (node_id -> session).
    sessions: RwLock<HashMap<String, NodeSession>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, index: Arc<ServerIndex>) -> Self {
        Self {
            config,
            index,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a node. Returns false if it was already known.
    fn register(&self, node_id: &str) -> bool {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(node_id) {
            return false;
        }
        sessions.insert(node_id.to_string(), NodeSession::default());
        true
    }

    /// Returns a copy of a node's session.
    pub fn session(&self, node_id: &str) -> Option<NodeSession> {
        self.sessions.read().get(node_id).cloned()
    }

    /// Returns the number of identified nodes.
    pub fn node_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn is_known(&self, node_id: &str) -> bool {
        self.sessions.read().contains_key(node_id)
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a version query.
    pub fn handle_version(&self, request: VersionRequest) -> ServerResult<VersionInfo> {
        let config = &self.context.config;
        if !version::is_compatible(&config.api_version, &request.api_version) {
            debug!(
                local = %config.api_version,
                remote = %request.api_version,
                "version query from incompatible node"
            );
        }
        Ok(VersionInfo::new(
            config.api_version.clone(),
            config.server_version.clone(),
        ))
    }

    /// Handles a node registration. Re-identifying keeps the existing session.
    pub fn handle_identify(&self, request: IdentifyRequest) -> ServerResult<IdentifyResponse> {
        if request.node_id.is_empty() {
            return Ok(IdentifyResponse::rejected("empty node id"));
        }
        if self.context.register(&request.node_id) {
            info!(node_id = %request.node_id, "node identified");
        }
        Ok(IdentifyResponse::accepted())
    }

    /// Handles a heartbeat.
    pub fn handle_heartbeat(&self, request: HeartbeatRequest) -> ServerResult<HeartbeatResponse> {
        let mut sessions = self.context.sessions.write();
        if !sessions.contains_key(&request.node_id)
            && !self.context.config.accept_unknown_heartbeats
        {
            warn!(node_id = %request.node_id, "heartbeat from unidentified node");
            return Ok(HeartbeatResponse::rejected(
                ServerError::UnknownNode(request.node_id).to_string(),
            ));
        }

        let session = sessions.entry(request.node_id).or_default();
        session.last_heartbeat = Some(Instant::now());
        session.synced = request.synced;
        session.heartbeats += 1;
        Ok(HeartbeatResponse::acknowledged())
    }

    /// Handles an index comparison.
    ///
    /// Returns the entries under the requested directory that have not yet
    /// been served to the requesting node, in index order.
    pub fn handle_compare(&self, request: CompareRequest) -> ServerResult<CompareResponse> {
        let sessions = self.context.sessions.read();
        let session = sessions
            .get(&request.node_id)
            .ok_or_else(|| ServerError::UnknownNode(request.node_id.clone()))?;

        let candidates = self
            .context
            .index
            .entries_under(&request.target_dir)
            .into_iter()
            .filter(|entry| !session.delivered.contains(&entry.name))
            .collect::<Vec<_>>();

        debug!(
            node_id = %request.node_id,
            target_dir = %request.target_dir,
            missing = candidates.len(),
            "index compared"
        );
        Ok(CompareResponse::new(candidates))
    }

    /// Handles a directory or file fetch.
    pub fn handle_fetch(&self, request: FetchRequest) -> ServerResult<FetchResponse> {
        if !self.context.is_known(&request.node_id) {
            return Err(ServerError::UnknownNode(request.node_id));
        }

        let Some(entry) = self.context.index.get(&request.name) else {
            return Ok(FetchResponse::error(
                ServerError::NotFound(request.name).to_string(),
            ));
        };

        let wants_dir = request.kind == FetchKind::Dir;
        if entry.is_dir != wants_dir {
            return Ok(FetchResponse::error(format!(
                "{} is not a {}",
                entry,
                if wants_dir { "directory" } else { "file" }
            )));
        }

        if let Some(session) = self.context.sessions.write().get_mut(&request.node_id) {
            session.delivered.insert(request.name);
        }
        Ok(FetchResponse::success())
    }
}
