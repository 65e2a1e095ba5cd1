//! Sync engine: index comparison and selective fetch.
//!
//! One cycle walks the servers in configuration order. Offline servers are
//! skipped. Each online server is asked which entries under the target
//! directory the node is missing, and every candidate is fetched in list
//! order. Failures are logged and skipped; a cycle may end partially
//! synced.

use crate::error::{NodeError, NodeResult};
use crate::identity::NodeIdentity;
use crate::registry::ServerRegistry;
use crate::transport::SharedTransport;
use dirsync_protocol::SyncCandidate;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Node-wide "last comparison came back empty" flag.
///
/// The flag only ever moves from false to true.
#[derive(Debug, Default)]
pub struct SyncedFlag(AtomicBool);

impl SyncedFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns the current value.
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sets the flag.
    pub fn mark_synced(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Where the sync loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Sleeping until the next cycle.
    WaitingToSync,
    /// Asking a server for missing entries.
    Comparing,
    /// Fetching candidates from a server.
    Fetching,
    /// No server is online; the loop has stopped for good.
    Fatal,
}

impl SyncPhase {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncPhase::Comparing | SyncPhase::Fetching)
    }
}

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of cycles completed.
    pub cycles_completed: u64,
    /// Total number of candidates fetched.
    pub candidates_fetched: u64,
    /// Total number of failed fetches.
    pub fetch_failures: u64,
    /// Total number of failed comparisons.
    pub compare_failures: u64,
    /// Last cycle time.
    pub last_cycle_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Servers whose index was compared.
    pub compared: Vec<String>,
    /// Servers skipped because they were offline.
    pub skipped_offline: Vec<String>,
    /// Servers whose comparison failed.
    pub compare_failed: Vec<String>,
    /// Candidates fetched successfully.
    pub fetched: u64,
    /// Candidates whose fetch failed.
    pub fetch_failed: u64,
    /// Duration of the cycle.
    pub duration: Duration,
}

/// The sync engine pulls missing entries from every online server.
pub struct SyncEngine {
    identity: NodeIdentity,
    registry: Arc<ServerRegistry>,
    servers: Arc<[SharedTransport]>,
    synced: Arc<SyncedFlag>,
    target_dir: String,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
    cycles: AtomicU64,
}

impl SyncEngine {
    /// Creates a new sync engine.
    pub fn new(
        identity: NodeIdentity,
        registry: Arc<ServerRegistry>,
        servers: Arc<[SharedTransport]>,
        synced: Arc<SyncedFlag>,
        target_dir: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            registry,
            servers,
            synced,
            target_dir: target_dir.into(),
            phase: RwLock::new(SyncPhase::WaitingToSync),
            stats: RwLock::new(SyncStats::default()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Gets the current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the number of cycles started, including a fatal one.
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    /// Runs one sync cycle.
    ///
    /// # Errors
    ///
    /// Returns `NoServersOnline` and enters [`SyncPhase::Fatal`] when no
    /// server is online. Once fatal, every later call fails the same way.
    pub fn run_cycle(&self) -> NodeResult<CycleReport> {
        if self.phase() == SyncPhase::Fatal {
            return Err(NodeError::NoServersOnline);
        }
        self.cycles.fetch_add(1, Ordering::SeqCst);

        if self.registry.count_online() == 0 {
            self.set_phase(SyncPhase::Fatal);
            self.stats.write().last_error = Some(NodeError::NoServersOnline.to_string());
            error!("no servers online, dying");
            return Err(NodeError::NoServersOnline);
        }

        let start = Instant::now();
        let mut report = CycleReport::default();

        for server in self.servers.iter() {
            let address = server.address();
            if !self.registry.is_online(address) {
                info!(address, "skipping offline server");
                report.skipped_offline.push(address.to_string());
                continue;
            }

            self.set_phase(SyncPhase::Comparing);
            let need = match server.compare_index(&self.target_dir, self.identity.as_str()) {
                Ok(need) => need,
                Err(e) => {
                    error!(address, error = %e, "index comparison failed");
                    report.compare_failed.push(address.to_string());
                    self.stats.write().last_error = Some(e.to_string());
                    continue;
                }
            };
            report.compared.push(address.to_string());

            if need.is_empty() {
                debug!(address, "in sync with server");
                self.synced.mark_synced();
                continue;
            }

            self.set_phase(SyncPhase::Fetching);
            let (fetched, failed) = self.fetch_all(server, &need);
            report.fetched += fetched;
            report.fetch_failed += failed;
        }

        self.set_phase(SyncPhase::WaitingToSync);
        report.duration = start.elapsed();

        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.candidates_fetched += report.fetched;
            stats.fetch_failures += report.fetch_failed;
            stats.compare_failures += report.compare_failed.len() as u64;
            stats.last_cycle_time = Some(Instant::now());
        }

        Ok(report)
    }

    /// Fetches every candidate from `server` in order. Returns
    /// `(fetched, failed)`.
    fn fetch_all(&self, server: &SharedTransport, need: &[SyncCandidate]) -> (u64, u64) {
        let address = server.address();
        let node_id = self.identity.as_str();
        let mut fetched = 0;
        let mut failed = 0;

        for candidate in need {
            info!(address, entry = %candidate, "need entry from server");
            let result = if candidate.is_dir {
                server.request_sync_dir(&candidate.name, node_id)
            } else {
                server.request_sync_file(&candidate.name, node_id)
            };
            match result {
                Ok(()) => fetched += 1,
                Err(e) => {
                    error!(address, entry = %candidate, error = %e, "fetch failed");
                    self.stats.write().last_error = Some(e.to_string());
                    failed += 1;
                }
            }
        }

        (fetched, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissedBeatPolicy;
    use crate::transport::{MockCall, MockTransport};

    struct Fixture {
        engine: SyncEngine,
        registry: Arc<ServerRegistry>,
        synced: Arc<SyncedFlag>,
        mocks: Vec<Arc<MockTransport>>,
    }

    fn fixture(addresses: &[&str]) -> Fixture {
        let mocks: Vec<Arc<MockTransport>> = addresses
            .iter()
            .map(|a| Arc::new(MockTransport::new(*a)))
            .collect();
        let servers: Arc<[SharedTransport]> = mocks
            .iter()
            .map(|m| Arc::clone(m) as SharedTransport)
            .collect();
        let registry = Arc::new(ServerRegistry::from_transports(
            &servers,
            2,
            MissedBeatPolicy::Accumulate,
        ));
        let synced = Arc::new(SyncedFlag::new());
        let engine = SyncEngine::new(
            NodeIdentity::from_string("node-1"),
            Arc::clone(&registry),
            servers,
            Arc::clone(&synced),
            "shared",
        );
        Fixture {
            engine,
            registry,
            synced,
            mocks,
        }
    }

    #[test]
    fn initial_state() {
        let f = fixture(&["mock://a"]);
        assert_eq!(f.engine.phase(), SyncPhase::WaitingToSync);
        assert_eq!(f.engine.stats().cycles_completed, 0);
        assert!(!f.synced.get());
    }

    #[test]
    fn empty_comparison_marks_synced() {
        let f = fixture(&["mock://a"]);
        let report = f.engine.run_cycle().unwrap();
        assert_eq!(report.compared, vec!["mock://a"]);
        assert!(f.synced.get());
        assert_eq!(
            f.mocks[0].calls(),
            vec![MockCall::Compare {
                target_dir: "shared".into(),
                node_id: "node-1".into()
            }]
        );
    }

    #[test]
    fn fetches_each_candidate_in_order() {
        let f = fixture(&["mock://a"]);
        f.mocks[0].push_compare_response(vec![
            SyncCandidate::file("shared/a.txt"),
            SyncCandidate::dir("shared/sub"),
            SyncCandidate::file("shared/sub/b.txt"),
        ]);

        let report = f.engine.run_cycle().unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(
            f.mocks[0].fetches(),
            vec![
                MockCall::SyncFile("shared/a.txt".into()),
                MockCall::SyncDir("shared/sub".into()),
                MockCall::SyncFile("shared/sub/b.txt".into()),
            ]
        );
        assert!(!f.synced.get());
    }

    #[test]
    fn failed_fetch_does_not_stop_the_rest() {
        let f = fixture(&["mock://a"]);
        f.mocks[0].push_compare_response(vec![
            SyncCandidate::file("a.txt"),
            SyncCandidate::file("b.txt"),
            SyncCandidate::dir("c"),
        ]);
        f.mocks[0].fail_fetch("b.txt");

        let report = f.engine.run_cycle().unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.fetch_failed, 1);
        assert_eq!(f.mocks[0].fetches().len(), 3);
        assert_eq!(f.mocks[0].fetches()[2], MockCall::SyncDir("c".into()));

        let stats = f.engine.stats();
        assert_eq!(stats.fetch_failures, 1);
        assert!(stats.last_error.is_some());
    }

    #[test]
    fn synced_flag_is_never_cleared() {
        let f = fixture(&["mock://a"]);
        f.engine.run_cycle().unwrap();
        assert!(f.synced.get());

        f.mocks[0].push_compare_response(vec![SyncCandidate::file("new.txt")]);
        f.engine.run_cycle().unwrap();
        assert!(f.synced.get());
    }

    #[test]
    fn offline_servers_are_skipped() {
        let f = fixture(&["mock://a", "mock://b"]);
        f.registry.record_failure("mock://a");
        f.registry.record_failure("mock://a");

        let report = f.engine.run_cycle().unwrap();
        assert_eq!(report.skipped_offline, vec!["mock://a"]);
        assert_eq!(report.compared, vec!["mock://b"]);
        assert!(f.mocks[0].calls().is_empty());
    }

    #[test]
    fn compare_failure_skips_only_that_server() {
        let f = fixture(&["mock://a", "mock://b"]);
        f.mocks[0].set_fail_compare(true);
        f.mocks[1].push_compare_response(vec![SyncCandidate::file("x")]);

        let report = f.engine.run_cycle().unwrap();
        assert_eq!(report.compare_failed, vec!["mock://a"]);
        assert_eq!(report.compared, vec!["mock://b"]);
        assert_eq!(report.fetched, 1);
        assert!(f.mocks[0].fetches().is_empty());
    }

    #[test]
    fn no_servers_online_is_fatal() {
        let f = fixture(&["mock://a", "mock://b"]);
        for addr in ["mock://a", "mock://b"] {
            f.registry.record_failure(addr);
            f.registry.record_failure(addr);
        }

        assert!(matches!(f.engine.run_cycle(), Err(NodeError::NoServersOnline)));
        assert_eq!(f.engine.phase(), SyncPhase::Fatal);
        assert!(matches!(f.engine.run_cycle(), Err(NodeError::NoServersOnline)));
        assert_eq!(f.engine.cycles_started(), 1);
        assert!(f.mocks.iter().all(|m| m.calls().is_empty()));
    }

    #[test]
    fn server_initially_disconnected_starts_offline() {
        let mock = Arc::new(MockTransport::new("mock://down"));
        mock.set_connected(false);
        let servers: Arc<[SharedTransport]> = vec![mock as SharedTransport].into();
        let registry = Arc::new(ServerRegistry::from_transports(
            &servers,
            3,
            MissedBeatPolicy::Accumulate,
        ));
        let engine = SyncEngine::new(
            NodeIdentity::from_string("n"),
            registry,
            servers,
            Arc::new(SyncedFlag::new()),
            ".",
        );
        assert!(matches!(engine.run_cycle(), Err(NodeError::NoServersOnline)));
    }
}
