//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for talking to a dirsync
//! server. The actual HTTP client is abstracted via a trait so the node does
//! not depend on a particular HTTP library.

use crate::error::{NodeError, NodeResult};
use crate::transport::ServerTransport;
use dirsync_protocol::{
    endpoint, version, CompareRequest, CompareResponse, FetchRequest, FetchResponse,
    HeartbeatRequest, HeartbeatResponse, IdentifyRequest, IdentifyResponse, SyncCandidate,
    VersionInfo, VersionRequest, WireMessage,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based server transport.
///
/// Uses CBOR encoding for request/response bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the server (e.g., "http://files.example.com:8081").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Cleared by `close()`.
    connected: AtomicBool,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn post_cbor<Req, Res>(&self, endpoint: &str, request: &Req) -> NodeResult<Res>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(NodeError::NotConnected);
        }

        let body = request
            .encode()
            .map_err(|e| NodeError::Protocol(format!("Failed to encode request: {}", e)))?;

        let url = format!("{}{}", self.base_url, endpoint);
        let response_body = self.client.post(&url, body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            NodeError::transport_retryable(e)
        })?;

        *self.last_error.write() = None;

        Res::decode(&response_body)
            .map_err(|e| NodeError::Protocol(format!("Failed to decode response: {}", e)))
    }

    fn fetch(&self, request: FetchRequest) -> NodeResult<()> {
        let response: FetchResponse = self.post_cbor(request.kind.endpoint(), &request)?;
        if !response.success {
            return Err(NodeError::ServerRejected(
                response
                    .error
                    .unwrap_or_else(|| format!("fetch of {} failed", request.name)),
            ));
        }
        Ok(())
    }
}

impl<C: HttpClient> ServerTransport for HttpTransport<C> {
    fn address(&self) -> &str {
        &self.base_url
    }

    fn request_version(&self) -> NodeResult<VersionInfo> {
        self.post_cbor(endpoint::VERSION, &VersionRequest::new(version::api_version()))
    }

    fn identify(&self, node_id: &str) -> NodeResult<IdentifyResponse> {
        let response: IdentifyResponse =
            self.post_cbor(endpoint::IDENTIFY, &IdentifyRequest::new(node_id))?;
        if !response.accepted {
            return Err(NodeError::ServerRejected(
                response.error.unwrap_or_else(|| "identify refused".into()),
            ));
        }
        Ok(response)
    }

    fn send_heartbeat(&self, node_id: &str, synced: bool) -> NodeResult<HeartbeatResponse> {
        let response: HeartbeatResponse =
            self.post_cbor(endpoint::HEARTBEAT, &HeartbeatRequest::new(node_id, synced))?;
        if !response.acknowledged {
            return Err(NodeError::ServerRejected(
                response.error.unwrap_or_else(|| "heartbeat refused".into()),
            ));
        }
        Ok(response)
    }

    fn compare_index(&self, target_dir: &str, node_id: &str) -> NodeResult<Vec<SyncCandidate>> {
        let response: CompareResponse =
            self.post_cbor(endpoint::INDEX, &CompareRequest::new(target_dir, node_id))?;
        Ok(response.candidates)
    }

    fn request_sync_dir(&self, name: &str, node_id: &str) -> NodeResult<()> {
        self.fetch(FetchRequest::dir(name, node_id))
    }

    fn request_sync_file(&self, name: &str, node_id: &str) -> NodeResult<()> {
        self.fetch(FetchRequest::file(name, node_id))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> NodeResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let path = url.find("/v1/").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
