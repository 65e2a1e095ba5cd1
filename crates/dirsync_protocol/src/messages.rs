//! Protocol messages exchanged between a node and a server.

use crate::codec::WireMessage;
use crate::error::ProtocolResult;
use crate::index::SyncCandidate;
use serde::{Deserialize, Serialize};

/// Endpoint paths on a dirsync server.
pub mod endpoint {
    /// Version query.
    pub const VERSION: &str = "/v1/version";
    /// Node registration.
    pub const IDENTIFY: &str = "/v1/identify";
    /// Liveness signal.
    pub const HEARTBEAT: &str = "/v1/heartbeat";
    /// Index comparison.
    pub const INDEX: &str = "/v1/index";
    /// Directory fetch.
    pub const SYNC_DIR: &str = "/v1/sync/dir";
    /// File fetch.
    pub const SYNC_FILE: &str = "/v1/sync/file";
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Version query.
    VersionRequest(VersionRequest),
    /// Version answer.
    VersionInfo(VersionInfo),
    /// Node registration.
    IdentifyRequest(IdentifyRequest),
    /// Registration answer.
    IdentifyResponse(IdentifyResponse),
    /// Heartbeat.
    HeartbeatRequest(HeartbeatRequest),
    /// Heartbeat answer.
    HeartbeatResponse(HeartbeatResponse),
    /// Index comparison.
    CompareRequest(CompareRequest),
    /// Comparison answer.
    CompareResponse(CompareResponse),
    /// Directory or file fetch.
    FetchRequest(FetchRequest),
    /// Fetch answer.
    FetchResponse(FetchResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::VersionRequest(_) => 1,
            SyncMessage::VersionInfo(_) => 2,
            SyncMessage::IdentifyRequest(_) => 3,
            SyncMessage::IdentifyResponse(_) => 4,
            SyncMessage::HeartbeatRequest(_) => 5,
            SyncMessage::HeartbeatResponse(_) => 6,
            SyncMessage::CompareRequest(_) => 7,
            SyncMessage::CompareResponse(_) => 8,
            SyncMessage::FetchRequest(_) => 9,
            SyncMessage::FetchResponse(_) => 10,
        }
    }

    /// Returns a short name for the message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::VersionRequest(_) => "version_request",
            SyncMessage::VersionInfo(_) => "version_info",
            SyncMessage::IdentifyRequest(_) => "identify_request",
            SyncMessage::IdentifyResponse(_) => "identify_response",
            SyncMessage::HeartbeatRequest(_) => "heartbeat_request",
            SyncMessage::HeartbeatResponse(_) => "heartbeat_response",
            SyncMessage::CompareRequest(_) => "compare_request",
            SyncMessage::CompareResponse(_) => "compare_response",
            SyncMessage::FetchRequest(_) => "fetch_request",
            SyncMessage::FetchResponse(_) => "fetch_response",
        }
    }

    /// Encodes the wrapped message on its own, as it travels on its
    /// endpoint.
    pub fn encode_body(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            SyncMessage::VersionRequest(m) => m.encode(),
            SyncMessage::VersionInfo(m) => m.encode(),
            SyncMessage::IdentifyRequest(m) => m.encode(),
            SyncMessage::IdentifyResponse(m) => m.encode(),
            SyncMessage::HeartbeatRequest(m) => m.encode(),
            SyncMessage::HeartbeatResponse(m) => m.encode(),
            SyncMessage::CompareRequest(m) => m.encode(),
            SyncMessage::CompareResponse(m) => m.encode(),
            SyncMessage::FetchRequest(m) => m.encode(),
            SyncMessage::FetchResponse(m) => m.encode(),
        }
    }
}

impl WireMessage for SyncMessage {}

/// Version query. Carries the caller's own API version for server logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequest {
    /// Caller's API version.
    pub api_version: String,
}

impl VersionRequest {
    /// Creates a version query for the given API version.
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
        }
    }
}

impl WireMessage for VersionRequest {}

/// Version information reported by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// API version the server speaks.
    pub api_version: String,
    /// Server build version.
    pub server_version: String,
}

impl VersionInfo {
    /// Creates version info.
    pub fn new(api_version: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            server_version: server_version.into(),
        }
    }
}

impl WireMessage for VersionInfo {}

/// Registration of a node identity with a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyRequest {
    /// Node identity.
    pub node_id: String,
}

impl IdentifyRequest {
    /// Creates an identify request.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

impl WireMessage for IdentifyRequest {}

/// Server answer to an identify request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    /// Whether the server accepted the node.
    pub accepted: bool,
    /// Reason for rejection.
    pub error: Option<String>,
}

impl IdentifyResponse {
    /// Creates an accepting response.
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    /// Creates a rejecting response.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            error: Some(message.into()),
        }
    }
}

impl WireMessage for IdentifyResponse {}

/// Heartbeat from a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Node identity.
    pub node_id: String,
    /// Whether the node's last comparison came back empty.
    pub synced: bool,
}

impl HeartbeatRequest {
    /// Creates a heartbeat.
    pub fn new(node_id: impl Into<String>, synced: bool) -> Self {
        Self {
            node_id: node_id.into(),
            synced,
        }
    }
}

impl WireMessage for HeartbeatRequest {}

/// Server answer to a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// Whether the heartbeat was recorded.
    pub acknowledged: bool,
    /// Reason for rejection.
    pub error: Option<String>,
}

impl HeartbeatResponse {
    /// Creates an acknowledging response.
    pub fn acknowledged() -> Self {
        Self {
            acknowledged: true,
            error: None,
        }
    }

    /// Creates a rejecting response.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            acknowledged: false,
            error: Some(message.into()),
        }
    }
}

impl WireMessage for HeartbeatResponse {}

/// Index comparison request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRequest {
    /// Directory the node replicates.
    pub target_dir: String,
    /// Node identity.
    pub node_id: String,
}

impl CompareRequest {
    /// Creates a comparison request.
    pub fn new(target_dir: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            target_dir: target_dir.into(),
            node_id: node_id.into(),
        }
    }
}

impl WireMessage for CompareRequest {}

/// Entries the node is missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompareResponse {
    /// Missing entries, in server order.
    pub candidates: Vec<SyncCandidate>,
}

impl CompareResponse {
    /// Creates a comparison response.
    pub fn new(candidates: Vec<SyncCandidate>) -> Self {
        Self { candidates }
    }
}

impl WireMessage for CompareResponse {}

/// What a fetch asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchKind {
    /// A directory entry.
    Dir,
    /// A file entry.
    File,
}

impl FetchKind {
    /// Returns the endpoint serving this kind of fetch.
    pub fn endpoint(&self) -> &'static str {
        match self {
            FetchKind::Dir => endpoint::SYNC_DIR,
            FetchKind::File => endpoint::SYNC_FILE,
        }
    }
}

/// Request for a single directory or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Entry name.
    pub name: String,
    /// Node identity.
    pub node_id: String,
    /// Entry kind.
    pub kind: FetchKind,
}

impl FetchRequest {
    /// Creates a directory fetch.
    pub fn dir(name: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_id: node_id.into(),
            kind: FetchKind::Dir,
        }
    }

    /// Creates a file fetch.
    pub fn file(name: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_id: node_id.into(),
            kind: FetchKind::File,
        }
    }
}

impl WireMessage for FetchRequest {}

/// Server answer to a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// Whether the entry was served.
    pub success: bool,
    /// Reason for failure.
    pub error: Option<String>,
}

impl FetchResponse {
    /// Creates a successful response.
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Creates a failed response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

impl WireMessage for FetchResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_response_preserves_order() {
        let response = CompareResponse::new(vec![
            SyncCandidate::file("b.txt"),
            SyncCandidate::dir("a"),
            SyncCandidate::file("a/c.txt"),
        ]);
        let decoded = CompareResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn heartbeat_carries_synced_flag() {
        let bytes = HeartbeatRequest::new("node-1", true).encode().unwrap();
        let decoded = HeartbeatRequest::decode(&bytes).unwrap();
        assert_eq!(decoded.node_id, "node-1");
        assert!(decoded.synced);
    }

    #[test]
    fn rejected_identify_has_reason() {
        let response = IdentifyResponse::rejected("unknown node");
        assert!(!response.accepted);
        assert_eq!(response.error.as_deref(), Some("unknown node"));
    }

    #[test]
    fn decoding_wrong_message_fails() {
        let bytes = VersionInfo::new("1.0.0", "0.4.0").encode().unwrap();
        assert!(CompareRequest::decode(&bytes).is_err());
    }

    #[test]
    fn body_drops_the_envelope() {
        let message = SyncMessage::CompareResponse(CompareResponse::new(vec![
            SyncCandidate::file("a.txt"),
        ]));
        let decoded = CompareResponse::decode(&message.encode_body().unwrap()).unwrap();
        assert_eq!(decoded.candidates, vec![SyncCandidate::file("a.txt")]);
    }

    #[test]
    fn fetch_kind_endpoints() {
        assert_eq!(FetchRequest::dir("a", "n").kind.endpoint(), endpoint::SYNC_DIR);
        assert_eq!(FetchRequest::file("a", "n").kind.endpoint(), endpoint::SYNC_FILE);
    }

    #[test]
    fn message_codes_are_distinct() {
        let messages = vec![
            SyncMessage::VersionRequest(VersionRequest::new("1.0.0")),
            SyncMessage::VersionInfo(VersionInfo::new("1.0.0", "0.4.0")),
            SyncMessage::IdentifyRequest(IdentifyRequest::new("n")),
            SyncMessage::IdentifyResponse(IdentifyResponse::accepted()),
            SyncMessage::HeartbeatRequest(HeartbeatRequest::new("n", false)),
            SyncMessage::HeartbeatResponse(HeartbeatResponse::acknowledged()),
            SyncMessage::CompareRequest(CompareRequest::new(".", "n")),
            SyncMessage::CompareResponse(CompareResponse::default()),
            SyncMessage::FetchRequest(FetchRequest::file("a", "n")),
            SyncMessage::FetchResponse(FetchResponse::success()),
        ];
        let mut codes: Vec<u8> = messages.iter().map(|m| m.type_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), messages.len());
    }

    #[test]
    fn sync_message_envelope() {
        let message = SyncMessage::FetchRequest(FetchRequest::dir("docs", "n"));
        let decoded = SyncMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded.kind(), "fetch_request");
        assert_eq!(decoded, message);
    }
}
