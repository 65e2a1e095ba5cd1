//! Server configuration.

use dirsync_protocol::version;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// API version reported to nodes.
    pub api_version: String,
    /// Server build version reported to nodes.
    pub server_version: String,
    /// Whether heartbeats from nodes that never identified are accepted.
    pub accept_unknown_heartbeats: bool,
}

impl ServerConfig {
    /// Creates a configuration reporting the given API version.
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            accept_unknown_heartbeats: false,
        }
    }

    /// Sets the reported server build version.
    pub fn with_server_version(mut self, server_version: impl Into<String>) -> Self {
        self.server_version = server_version.into();
        self
    }

    /// Accepts heartbeats from nodes that never identified.
    pub fn with_accept_unknown_heartbeats(mut self, accept: bool) -> Self {
        self.accept_unknown_heartbeats = accept;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(version::api_version())
    }
}
