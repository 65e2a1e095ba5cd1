//! Transport abstraction for talking to one server.

use crate::error::{NodeError, NodeResult};
use dirsync_protocol::{HeartbeatResponse, IdentifyResponse, SyncCandidate, VersionInfo};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A transport handles request/response communication with one server.
///
/// Implementations are blocking; the node runs them on tokio's blocking
/// pool. Per-request timeouts are the transport's responsibility.
pub trait ServerTransport: Send + Sync {
    /// Returns the server address this transport talks to.
    fn address(&self) -> &str;

    /// Asks the server for its version.
    fn request_version(&self) -> NodeResult<VersionInfo>;

    /// Registers the node identity with the server.
    fn identify(&self, node_id: &str) -> NodeResult<IdentifyResponse>;

    /// Sends a liveness signal carrying the node's synced flag.
    fn send_heartbeat(&self, node_id: &str, synced: bool) -> NodeResult<HeartbeatResponse>;

    /// Asks the server which entries under `target_dir` the node is missing.
    fn compare_index(&self, target_dir: &str, node_id: &str) -> NodeResult<Vec<SyncCandidate>>;

    /// Fetches a directory entry.
    fn request_sync_dir(&self, name: &str, node_id: &str) -> NodeResult<()>;

    /// Fetches a file entry.
    fn request_sync_file(&self, name: &str, node_id: &str) -> NodeResult<()>;

    /// Returns true if the transport considers the server reachable.
    fn is_connected(&self) -> bool;

    /// Closes the transport.
    fn close(&self) -> NodeResult<()>;
}

/// A transport shared between the heartbeat task and the sync loop.
pub type SharedTransport = Arc<dyn ServerTransport>;

/// A call observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `request_version`.
    Version,
    /// `identify`.
    Identify(String),
    /// `send_heartbeat`.
    Heartbeat {
        /// Node identity.
        node_id: String,
        /// Synced flag sent.
        synced: bool,
    },
    /// `compare_index`.
    Compare {
        /// Target directory.
        target_dir: String,
        /// Node identity.
        node_id: String,
    },
    /// `request_sync_dir`.
    SyncDir(String),
    /// `request_sync_file`.
    SyncFile(String),
}

/// A scripted transport for testing.
#[derive(Debug)]
pub struct MockTransport {
    address: String,
    connected: AtomicBool,
    version: Mutex<Option<VersionInfo>>,
    fail_identify: AtomicBool,
    fail_heartbeat: AtomicBool,
    fail_compare: AtomicBool,
    compare_responses: Mutex<VecDeque<Vec<SyncCandidate>>>,
    failing_fetches: Mutex<HashSet<String>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockTransport {
    /// Creates a connected mock transport with no scripted responses.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connected: AtomicBool::new(true),
            version: Mutex::new(None),
            fail_identify: AtomicBool::new(false),
            fail_heartbeat: AtomicBool::new(false),
            fail_compare: AtomicBool::new(false),
            compare_responses: Mutex::new(VecDeque::new()),
            failing_fetches: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the API version reported by `request_version`.
    pub fn set_version(&self, api_version: impl Into<String>) {
        *self.version.lock() = Some(VersionInfo::new(api_version, "mock"));
    }

    /// Makes `identify` fail.
    pub fn set_fail_identify(&self, fail: bool) {
        self.fail_identify.store(fail, Ordering::SeqCst);
    }

    /// Makes `send_heartbeat` fail.
    pub fn set_fail_heartbeat(&self, fail: bool) {
        self.fail_heartbeat.store(fail, Ordering::SeqCst);
    }

    /// Makes `compare_index` fail.
    pub fn set_fail_compare(&self, fail: bool) {
        self.fail_compare.store(fail, Ordering::SeqCst);
    }

    /// Queues a comparison result. Once the queue is empty, comparisons
    /// return no candidates.
    pub fn push_compare_response(&self, candidates: Vec<SyncCandidate>) {
        self.compare_responses.lock().push_back(candidates);
    }

    /// Makes fetches of `name` fail.
    pub fn fail_fetch(&self, name: impl Into<String>) {
        self.failing_fetches.lock().insert(name.into());
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Returns the fetch calls made so far, in order.
    pub fn fetches(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, MockCall::SyncDir(_) | MockCall::SyncFile(_)))
            .cloned()
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }

    fn fetch(&self, name: &str) -> NodeResult<()> {
        if self.failing_fetches.lock().contains(name) {
            return Err(NodeError::ServerRejected(format!("no such entry: {}", name)));
        }
        Ok(())
    }
}

impl ServerTransport for MockTransport {
    fn address(&self) -> &str {
        &self.address
    }

    fn request_version(&self) -> NodeResult<VersionInfo> {
        self.record(MockCall::Version);
        if !self.is_connected() {
            return Err(NodeError::NotConnected);
        }
        self.version
            .lock()
            .clone()
            .ok_or_else(|| NodeError::Protocol("No mock version set".into()))
    }

    fn identify(&self, node_id: &str) -> NodeResult<IdentifyResponse> {
        self.record(MockCall::Identify(node_id.to_string()));
        if self.fail_identify.load(Ordering::SeqCst) {
            return Err(NodeError::transport_retryable("identify refused"));
        }
        Ok(IdentifyResponse::accepted())
    }

    fn send_heartbeat(&self, node_id: &str, synced: bool) -> NodeResult<HeartbeatResponse> {
        self.record(MockCall::Heartbeat {
            node_id: node_id.to_string(),
            synced,
        });
        if self.fail_heartbeat.load(Ordering::SeqCst) {
            return Err(NodeError::transport_retryable("heartbeat lost"));
        }
        Ok(HeartbeatResponse::acknowledged())
    }

    fn compare_index(&self, target_dir: &str, node_id: &str) -> NodeResult<Vec<SyncCandidate>> {
        self.record(MockCall::Compare {
            target_dir: target_dir.to_string(),
            node_id: node_id.to_string(),
        });
        if self.fail_compare.load(Ordering::SeqCst) {
            return Err(NodeError::transport_retryable("index unavailable"));
        }
        Ok(self.compare_responses.lock().pop_front().unwrap_or_default())
    }

    fn request_sync_dir(&self, name: &str, _node_id: &str) -> NodeResult<()> {
        self.record(MockCall::SyncDir(name.to_string()));
        self.fetch(name)
    }

    fn request_sync_file(&self, name: &str, _node_id: &str) -> NodeResult<()> {
        self.record(MockCall::SyncFile(name.to_string()));
        self.fetch(name)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> NodeResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
