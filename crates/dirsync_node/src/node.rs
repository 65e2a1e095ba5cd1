//! Node orchestration.
//!
//! Startup runs in a fixed order: identity → version check and identify
//! with every server → start the heartbeat → sync loop. The sync loop runs
//! until no server is online, which ends the loop with
//! [`NodeError::NoServersOnline`](crate::NodeError::NoServersOnline).

use crate::config::{format_duration, NodeConfig};
use crate::engine::{SyncEngine, SyncedFlag};
use crate::error::NodeResult;
use crate::heartbeat::HeartbeatMonitor;
use crate::identity::NodeIdentity;
use crate::registry::ServerRegistry;
use crate::shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
use crate::transport::SharedTransport;
use crate::version::{IdentifyReport, VersionNegotiator};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A node replicating a directory from one or more servers.
pub struct Node {
    config: NodeConfig,
    identity: NodeIdentity,
    registry: Arc<ServerRegistry>,
    servers: Arc<[SharedTransport]>,
    synced: Arc<SyncedFlag>,
    negotiator: VersionNegotiator,
    heartbeat: Arc<HeartbeatMonitor>,
    engine: Arc<SyncEngine>,
    shutdown: ShutdownTrigger,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Validates the configuration, acquires the persisted identity and
    /// connects a transport to every configured server.
    ///
    /// # Errors
    ///
    /// Returns `Config` for invalid configuration and `IdentityIo` or
    /// `IdentityParse` if the identity cannot be loaded or persisted.
    pub fn initialize<F>(config: NodeConfig, mut connect: F) -> NodeResult<Self>
    where
        F: FnMut(&str) -> SharedTransport,
    {
        config.validate()?;
        let identity = NodeIdentity::acquire(&config.identity_path)?;
        let servers = config.servers.iter().map(|a| connect(a)).collect();
        Self::with_identity(config, identity, servers)
    }

    /// Builds a node from an already acquired identity and transports.
    pub fn with_identity(
        config: NodeConfig,
        identity: NodeIdentity,
        servers: Vec<SharedTransport>,
    ) -> NodeResult<Self> {
        config.validate()?;

        let mut seen = HashSet::new();
        let servers: Arc<[SharedTransport]> = servers
            .into_iter()
            .filter(|s| seen.insert(s.address().to_string()))
            .collect();

        let registry = Arc::new(ServerRegistry::from_transports(
            &servers,
            config.max_missed_beats,
            config.missed_beat_policy,
        ));
        let synced = Arc::new(SyncedFlag::new());
        let heartbeat = Arc::new(HeartbeatMonitor::new(
            identity.clone(),
            Arc::clone(&registry),
            Arc::clone(&servers),
            Arc::clone(&synced),
            config.heartbeat_interval,
        ));
        let engine = Arc::new(SyncEngine::new(
            identity.clone(),
            Arc::clone(&registry),
            Arc::clone(&servers),
            Arc::clone(&synced),
            config.target_directory.clone(),
        ));
        let negotiator = VersionNegotiator::new(config.ignore_version_mismatch);
        let (shutdown, _) = shutdown_channel();

        Ok(Self {
            config,
            identity,
            registry,
            servers,
            synced,
            negotiator,
            heartbeat,
            engine,
            shutdown,
            heartbeat_task: Mutex::new(None),
        })
    }

    /// Replaces the version negotiator.
    pub fn with_negotiator(mut self, negotiator: VersionNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    /// Returns the node identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Returns the configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Returns the server registry.
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Returns the sync engine.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Returns the heartbeat monitor.
    pub fn heartbeat(&self) -> &Arc<HeartbeatMonitor> {
        &self.heartbeat
    }

    /// Returns true once any comparison has come back empty.
    pub fn is_synced(&self) -> bool {
        self.synced.get()
    }

    /// Returns a signal that fires when the node stops.
    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.subscribe()
    }

    /// Stops the heartbeat and the update loop at their next wait point.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Waits for the heartbeat task to finish after [`stop`](Self::stop).
    pub async fn join_heartbeat(&self) -> NodeResult<()> {
        let handle = self.heartbeat_task.lock().take();
        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }

    /// Runs the identification phase and starts the heartbeat.
    ///
    /// # Errors
    ///
    /// Any failed version request or incompatible server aborts the phase;
    /// the heartbeat is not started in that case.
    pub async fn identify(&self) -> NodeResult<IdentifyReport> {
        let negotiator = self.negotiator.clone();
        let servers = Arc::clone(&self.servers);
        let identity = self.identity.clone();
        let report =
            tokio::task::spawn_blocking(move || negotiator.identify_all(&servers, &identity))
                .await??;

        let handle = self.heartbeat.start(self.shutdown.subscribe())?;
        *self.heartbeat_task.lock() = Some(handle);
        Ok(report)
    }

    /// Identifies with every server, then runs sync cycles forever.
    ///
    /// Returns `Ok(())` only if [`stop`](Self::stop) was called. Startup
    /// errors are returned as-is. When a cycle finds no server online the
    /// heartbeat is signalled to stop (without waiting for it) and
    /// `NoServersOnline` is returned.
    pub async fn run_update_loop(&self) -> NodeResult<()> {
        self.identify().await?;
        info!(
            interval = %format_duration(self.config.update_interval),
            servers = ?self.registry.addresses(),
            "running as a node"
        );

        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("update loop stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.update_interval) => {}
            }

            let engine = Arc::clone(&self.engine);
            match tokio::task::spawn_blocking(move || engine.run_cycle()).await? {
                Ok(report) => debug!(
                    compared = report.compared.len(),
                    fetched = report.fetched,
                    failed = report.fetch_failed,
                    "sync cycle complete"
                ),
                Err(e) => {
                    error!(error = %e, "sync loop stopped");
                    self.shutdown.trigger();
                    return Err(e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("identity", &self.identity)
            .field("servers", &self.registry.addresses())
            .field("online", &self.registry.count_online())
            .field("synced", &self.synced.get())
            .finish()
    }
}
