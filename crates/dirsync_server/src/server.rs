//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, NodeSession, RequestHandler};
use crate::index::ServerIndex;
use dirsync_protocol::{
    endpoint, CompareRequest, FetchRequest, HeartbeatRequest, IdentifyRequest, ProtocolError,
    SyncMessage, VersionRequest, WireMessage,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The sync server.
///
/// This server answers node requests using the dirsync protocol. It keeps
/// an in-memory index of entries and a session per identified node.
///
/// # Example
///
/// ```
/// use dirsync_server::{SyncServer, ServerConfig};
///
/// let server = SyncServer::new(ServerConfig::default());
/// server.index().add_dir("docs");
/// server.index().add_file("docs/readme.md");
///
/// // In a real application, you would expose HTTP endpoints
/// // that call server.handle_post(path, body)
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    available: AtomicBool,
}

impl SyncServer {
    /// Creates a new sync server with an empty index.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_index(config, Arc::new(ServerIndex::new()))
    }

    /// Creates a sync server with an existing index.
    pub fn with_index(config: ServerConfig, index: Arc<ServerIndex>) -> Self {
        let context = Arc::new(HandlerContext::new(config, index));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            available: AtomicBool::new(true),
        }
    }

    /// Handles a sync message (dispatches to appropriate handler).
    pub fn handle_message(&self, message: SyncMessage) -> Result<SyncMessage, String> {
        if !self.is_available() {
            return Err(ServerError::Unavailable.to_string());
        }
        self.dispatch(message).map_err(|e| e.to_string())
    }

    /// Handles a POST to one of the protocol endpoints.
    ///
    /// The body is the CBOR-encoded request for that endpoint; the returned
    /// bytes are the CBOR-encoded response.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.route(path, body).map_err(|e| e.to_string())
    }

    fn route(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        if !self.is_available() {
            return Err(ServerError::Unavailable);
        }
        let request = match path {
            endpoint::VERSION => SyncMessage::VersionRequest(VersionRequest::decode(body)?),
            endpoint::IDENTIFY => SyncMessage::IdentifyRequest(IdentifyRequest::decode(body)?),
            endpoint::HEARTBEAT => SyncMessage::HeartbeatRequest(HeartbeatRequest::decode(body)?),
            endpoint::INDEX => SyncMessage::CompareRequest(CompareRequest::decode(body)?),
            endpoint::SYNC_DIR | endpoint::SYNC_FILE => {
                let request = FetchRequest::decode(body)?;
                if request.kind.endpoint() != path {
                    return Err(ServerError::InvalidRequest(format!(
                        "{:?} fetch posted to {}",
                        request.kind, path
                    )));
                }
                SyncMessage::FetchRequest(request)
            }
            other => return Err(ServerError::UnknownEndpoint(other.to_string())),
        };
        debug!(
            path,
            kind = request.kind(),
            code = request.type_code(),
            bytes = body.len(),
            "request"
        );

        Ok(self.dispatch(request)?.encode_body()?)
    }

    fn dispatch(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        let reply = match message {
            SyncMessage::VersionRequest(req) => {
                SyncMessage::VersionInfo(self.handler.handle_version(req)?)
            }
            SyncMessage::IdentifyRequest(req) => {
                SyncMessage::IdentifyResponse(self.handler.handle_identify(req)?)
            }
            SyncMessage::HeartbeatRequest(req) => {
                SyncMessage::HeartbeatResponse(self.handler.handle_heartbeat(req)?)
            }
            SyncMessage::CompareRequest(req) => {
                SyncMessage::CompareResponse(self.handler.handle_compare(req)?)
            }
            SyncMessage::FetchRequest(req) => {
                SyncMessage::FetchResponse(self.handler.handle_fetch(req)?)
            }
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: "request",
                    actual: other.kind(),
                }
                .into());
            }
        };
        Ok(reply)
    }

    /// Makes the server refuse (`false`) or accept (`true`) all requests.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if the server is accepting requests.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Returns the served index.
    pub fn index(&self) -> &ServerIndex {
        &self.context.index
    }

    /// Returns the number of identified nodes.
    pub fn node_count(&self) -> usize {
        self.context.node_count()
    }

    /// Returns the session of a node, if it identified.
    pub fn session(&self, node_id: &str) -> Option<NodeSession> {
        self.context.session(node_id)
    }

    /// Returns true if `name` has been served to `node_id`.
    pub fn was_delivered(&self, node_id: &str, name: &str) -> bool {
        self.session(node_id)
            .is_some_and(|s| s.delivered.contains(name))
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("api_version", &self.context.config.api_version)
            .field("entries", &self.context.index.len())
            .field("nodes", &self.node_count())
            .field("available", &self.is_available())
            .finish()
    }
}
