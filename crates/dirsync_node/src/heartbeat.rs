//! Heartbeat monitor.
//!
//! A single background task that, every heartbeat interval, sends a
//! heartbeat to each online server and feeds the result into the
//! [`ServerRegistry`]. Servers that reach the missed-beat limit go offline
//! and are never probed again. A heartbeat that panics counts as missed.

use crate::engine::SyncedFlag;
use crate::error::{NodeError, NodeResult};
use crate::identity::NodeIdentity;
use crate::registry::{LivenessChange, ServerRegistry};
use crate::shutdown::Shutdown;
use crate::transport::SharedTransport;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of one heartbeat round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Servers that acknowledged the heartbeat.
    pub delivered: Vec<String>,
    /// Servers the heartbeat failed to reach.
    pub missed: Vec<String>,
    /// Servers that went offline during this round.
    pub went_offline: Vec<String>,
}

/// Periodically probes every online server.
pub struct HeartbeatMonitor {
    identity: NodeIdentity,
    registry: Arc<ServerRegistry>,
    servers: Arc<[SharedTransport]>,
    synced: Arc<SyncedFlag>,
    interval: Duration,
    started: AtomicBool,
    rounds: AtomicU64,
}

impl HeartbeatMonitor {
    /// Creates a monitor. Nothing runs until [`start`](Self::start).
    pub fn new(
        identity: NodeIdentity,
        registry: Arc<ServerRegistry>,
        servers: Arc<[SharedTransport]>,
        synced: Arc<SyncedFlag>,
        interval: Duration,
    ) -> Self {
        Self {
            identity,
            registry,
            servers,
            synced,
            interval,
            started: AtomicBool::new(false),
            rounds: AtomicU64::new(0),
        }
    }

    /// Returns true once the background task has been started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns the number of completed heartbeat rounds.
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }

    /// Spawns the heartbeat task on the current tokio runtime.
    ///
    /// The task runs until `shutdown` fires. A monitor can only be started
    /// once.
    pub fn start(self: &Arc<Self>, shutdown: Shutdown) -> NodeResult<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted("heartbeat"));
        }
        let monitor = Arc::clone(self);
        Ok(tokio::spawn(monitor.run(shutdown)))
    }

    async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        info!(interval = ?self.interval, "started heartbeat");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let monitor = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || monitor.beat()).await {
                Ok(report) => debug!(
                    delivered = report.delivered.len(),
                    missed = report.missed.len(),
                    "heartbeat round"
                ),
                Err(e) => error!(error = %e, "heartbeat round did not complete"),
            }
        }
        info!("heartbeat stopped");
    }

    /// Runs one heartbeat round against every online server.
    pub fn beat(&self) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();
        let synced = self.synced.get();

        for server in self.servers.iter() {
            let address = server.address();
            if !self.registry.is_online(address) {
                continue;
            }

            let sent = panic::catch_unwind(AssertUnwindSafe(|| {
                server.send_heartbeat(self.identity.as_str(), synced)
            }))
            .unwrap_or_else(|payload| Err(NodeError::Task(panic_message(&*payload))));

            match sent {
                Ok(_) => {
                    self.registry.record_success(address);
                    report.delivered.push(address.to_string());
                }
                Err(e) => {
                    warn!(address, error = %e, "heartbeat failed");
                    report.missed.push(address.to_string());
                    if self.registry.record_failure(address) == LivenessChange::WentOffline {
                        report.went_offline.push(address.to_string());
                    }
                }
            }
        }

        self.rounds.fetch_add(1, Ordering::SeqCst);
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    format!("heartbeat panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissedBeatPolicy;
    use crate::shutdown::shutdown_channel;
    use crate::transport::{MockCall, MockTransport, ServerTransport};
    use dirsync_protocol::{HeartbeatResponse, IdentifyResponse, SyncCandidate, VersionInfo};

    fn monitor(
        mocks: &[Arc<MockTransport>],
        max: u32,
        policy: MissedBeatPolicy,
        interval: Duration,
    ) -> (Arc<HeartbeatMonitor>, Arc<ServerRegistry>, Arc<SyncedFlag>) {
        let servers: Arc<[SharedTransport]> = mocks
            .iter()
            .map(|m| Arc::clone(m) as SharedTransport)
            .collect();
        let registry = Arc::new(ServerRegistry::from_transports(&servers, max, policy));
        let synced = Arc::new(SyncedFlag::new());
        let monitor = Arc::new(HeartbeatMonitor::new(
            NodeIdentity::from_string("node-1"),
            Arc::clone(&registry),
            servers,
            Arc::clone(&synced),
            interval,
        ));
        (monitor, registry, synced)
    }

    fn heartbeats(mock: &MockTransport) -> usize {
        mock.count_calls(|c| matches!(c, MockCall::Heartbeat { .. }))
    }

    #[test]
    fn beat_carries_identity_and_synced_flag() {
        let a = Arc::new(MockTransport::new("mock://a"));
        let (monitor, _, synced) = monitor(
            &[a.clone()],
            3,
            MissedBeatPolicy::Accumulate,
            Duration::from_secs(1),
        );

        monitor.beat();
        synced.mark_synced();
        monitor.beat();

        assert_eq!(
            a.calls(),
            vec![
                MockCall::Heartbeat {
                    node_id: "node-1".into(),
                    synced: false
                },
                MockCall::Heartbeat {
                    node_id: "node-1".into(),
                    synced: true
                },
            ]
        );
        assert_eq!(monitor.rounds(), 2);
    }

    #[test]
    fn failing_server_goes_offline_and_is_not_probed() {
        let a = Arc::new(MockTransport::new("mock://a"));
        let b = Arc::new(MockTransport::new("mock://b"));
        a.set_fail_heartbeat(true);
        let (monitor, registry, _) = monitor(
            &[a.clone(), b.clone()],
            2,
            MissedBeatPolicy::Accumulate,
            Duration::from_secs(1),
        );

        let first = monitor.beat();
        assert_eq!(first.missed, vec!["mock://a"]);
        assert!(first.went_offline.is_empty());

        let second = monitor.beat();
        assert_eq!(second.went_offline, vec!["mock://a"]);
        assert!(!registry.is_online("mock://a"));

        let third = monitor.beat();
        assert_eq!(third.delivered, vec!["mock://b"]);
        assert!(third.missed.is_empty());
        assert_eq!(heartbeats(&a), 2);
        assert_eq!(heartbeats(&b), 3);
        assert_eq!(registry.entry("mock://a").unwrap().missed_beats, 2);
    }

    #[test]
    fn intermittent_failures_accumulate_by_default() {
        let a = Arc::new(MockTransport::new("mock://a"));
        let (monitor, registry, _) = monitor(
            &[a.clone()],
            2,
            MissedBeatPolicy::Accumulate,
            Duration::from_secs(1),
        );

        a.set_fail_heartbeat(true);
        monitor.beat();
        a.set_fail_heartbeat(false);
        monitor.beat();
        a.set_fail_heartbeat(true);
        monitor.beat();

        assert!(!registry.is_online("mock://a"));
    }

    #[test]
    fn intermittent_failures_reset_when_configured() {
        let a = Arc::new(MockTransport::new("mock://a"));
        let (monitor, registry, _) = monitor(
            &[a.clone()],
            2,
            MissedBeatPolicy::ResetOnSuccess,
            Duration::from_secs(1),
        );

        a.set_fail_heartbeat(true);
        monitor.beat();
        a.set_fail_heartbeat(false);
        monitor.beat();
        a.set_fail_heartbeat(true);
        monitor.beat();

        assert!(registry.is_online("mock://a"));
        assert_eq!(registry.entry("mock://a").unwrap().missed_beats, 1);
    }

    #[tokio::test]
    async fn start_twice_is_refused() {
        let a = Arc::new(MockTransport::new("mock://a"));
        let (monitor, _, _) = monitor(
            &[a],
            3,
            MissedBeatPolicy::Accumulate,
            Duration::from_secs(60),
        );
        let (trigger, shutdown) = shutdown_channel();

        let handle = monitor.start(shutdown.clone()).unwrap();
        assert!(monitor.is_started());
        assert!(matches!(
            monitor.start(shutdown),
            Err(NodeError::AlreadyStarted(_))
        ));

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn background_task_beats_until_cancelled() {
        let a = Arc::new(MockTransport::new("mock://a"));
        let (monitor, _, _) = monitor(
            &[a.clone()],
            3,
            MissedBeatPolicy::Accumulate,
            Duration::from_millis(10),
        );
        let (trigger, shutdown) = shutdown_channel();
        let handle = monitor.start(shutdown).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor.rounds() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let after_stop = heartbeats(&a);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(heartbeats(&a), after_stop);
        assert!(after_stop >= 3);
    }

    /// Panics on its first heartbeat, then fails every later one.
    struct PanicsOnceTransport {
        heartbeats: AtomicU64,
    }

    impl ServerTransport for PanicsOnceTransport {
        fn address(&self) -> &str {
            "mock://panics"
        }

        fn request_version(&self) -> NodeResult<VersionInfo> {
            Ok(VersionInfo::new(dirsync_protocol::version::API_VERSION, "mock"))
        }

        fn identify(&self, _node_id: &str) -> NodeResult<IdentifyResponse> {
            Ok(IdentifyResponse::accepted())
        }

        fn send_heartbeat(&self, _node_id: &str, _synced: bool) -> NodeResult<HeartbeatResponse> {
            if self.heartbeats.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("connection pool poisoned");
            }
            Err(NodeError::transport_retryable("unreachable"))
        }

        fn compare_index(
            &self,
            _target_dir: &str,
            _node_id: &str,
        ) -> NodeResult<Vec<SyncCandidate>> {
            Ok(Vec::new())
        }

        fn request_sync_dir(&self, _name: &str, _node_id: &str) -> NodeResult<()> {
            Ok(())
        }

        fn request_sync_file(&self, _name: &str, _node_id: &str) -> NodeResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn close(&self) -> NodeResult<()> {
            Ok(())
        }
    }

    #[test]
    fn panicking_heartbeat_counts_as_missed() {
        let panicky = Arc::new(PanicsOnceTransport {
            heartbeats: AtomicU64::new(0),
        });
        let servers: Arc<[SharedTransport]> = vec![panicky as SharedTransport].into();
        let registry = Arc::new(ServerRegistry::from_transports(
            &servers,
            2,
            MissedBeatPolicy::Accumulate,
        ));
        let monitor = HeartbeatMonitor::new(
            NodeIdentity::from_string("node-1"),
            Arc::clone(&registry),
            servers,
            Arc::new(SyncedFlag::new()),
            Duration::from_secs(1),
        );

        let first = monitor.beat();
        assert_eq!(first.missed, vec!["mock://panics".to_string()]);
        assert_eq!(registry.entry("mock://panics").unwrap().missed_beats, 1);
        assert_eq!(monitor.rounds(), 1);

        let second = monitor.beat();
        assert_eq!(second.went_offline, vec!["mock://panics".to_string()]);
        assert_eq!(registry.count_online(), 0);
    }

    #[tokio::test]
    async fn background_task_survives_a_panicking_heartbeat() {
        let panicky = Arc::new(PanicsOnceTransport {
            heartbeats: AtomicU64::new(0),
        });
        let servers: Arc<[SharedTransport]> = vec![Arc::clone(&panicky) as SharedTransport].into();
        let registry = Arc::new(ServerRegistry::from_transports(
            &servers,
            2,
            MissedBeatPolicy::Accumulate,
        ));
        let monitor = Arc::new(HeartbeatMonitor::new(
            NodeIdentity::from_string("node-1"),
            Arc::clone(&registry),
            servers,
            Arc::new(SyncedFlag::new()),
            Duration::from_millis(5),
        ));
        let (trigger, shutdown) = shutdown_channel();
        let handle = monitor.start(shutdown).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.count_online() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(panicky.heartbeats.load(Ordering::SeqCst) >= 2);

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
