//! Server liveness registry.
//!
//! The registry owns one [`ServerEntry`] per configured address for the life
//! of the process. The heartbeat task and the sync loop share it; every
//! mutation goes through the internal lock.
//!
//! Liveness only moves one way: once a server reaches the missed-beat limit
//! it is marked offline, its counter freezes and nothing brings it back.

use crate::config::MissedBeatPolicy;
use crate::transport::SharedTransport;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Liveness state of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// Server address (unique key).
    pub address: String,
    /// Whether the server is still trusted for heartbeats and syncs.
    pub online: bool,
    /// Heartbeats that failed to reach the server.
    pub missed_beats: u32,
}

/// Outcome of a liveness update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessChange {
    /// Counter may have moved but the server kept its online state.
    Unchanged,
    /// The server just reached the missed-beat limit.
    WentOffline,
    /// The missed-beat counter was reset.
    Reset,
    /// The address is not in the registry.
    UnknownServer,
}

/// The set of known servers and their liveness.
#[derive(Debug)]
pub struct ServerRegistry {
    entries: RwLock<Vec<ServerEntry>>,
    index: HashMap<String, usize>,
    max_missed_beats: u32,
    policy: MissedBeatPolicy,
}

impl ServerRegistry {
    /// Creates a registry where every server starts online.
    pub fn new<I, S>(addresses: I, max_missed_beats: u32, policy: MissedBeatPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_initial_state(
            addresses.into_iter().map(|a| (a.into(), true)),
            max_missed_beats,
            policy,
        )
    }

    /// Creates a registry from transports, taking each server's initial
    /// state from [`ServerTransport::is_connected`](crate::ServerTransport::is_connected).
    pub fn from_transports(
        transports: &[SharedTransport],
        max_missed_beats: u32,
        policy: MissedBeatPolicy,
    ) -> Self {
        Self::with_initial_state(
            transports
                .iter()
                .map(|t| (t.address().to_string(), t.is_connected())),
            max_missed_beats,
            policy,
        )
    }

    /// Creates a registry with explicit initial online states.
    ///
    /// Duplicate addresses collapse into the first occurrence.
    pub fn with_initial_state<I>(
        servers: I,
        max_missed_beats: u32,
        policy: MissedBeatPolicy,
    ) -> Self
    where
        I: IntoIterator<Item = (String, bool)>,
    {
        let mut entries = Vec::new();
        let mut index = HashMap::new();
        for (address, online) in servers {
            if index.contains_key(&address) {
                warn!(address = %address, "duplicate server address ignored");
                continue;
            }
            index.insert(address.clone(), entries.len());
            entries.push(ServerEntry {
                address,
                online,
                missed_beats: 0,
            });
        }

        Self {
            entries: RwLock::new(entries),
            index,
            max_missed_beats,
            policy,
        }
    }

    /// Returns the number of servers.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no servers are registered.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the configured missed-beat limit.
    pub fn max_missed_beats(&self) -> u32 {
        self.max_missed_beats
    }

    /// Returns the missed-beat policy.
    pub fn policy(&self) -> MissedBeatPolicy {
        self.policy
    }

    /// Returns the number of online servers.
    pub fn count_online(&self) -> usize {
        self.entries.read().iter().filter(|e| e.online).count()
    }

    /// Returns true if the server is registered and online.
    pub fn is_online(&self, address: &str) -> bool {
        self.entry(address).map(|e| e.online).unwrap_or(false)
    }

    /// Returns a copy of one entry.
    pub fn entry(&self, address: &str) -> Option<ServerEntry> {
        let i = *self.index.get(address)?;
        self.entries.read().get(i).cloned()
    }

    /// Returns a copy of every entry, in configuration order.
    pub fn snapshot(&self) -> Vec<ServerEntry> {
        self.entries.read().clone()
    }

    /// Returns every address, in configuration order.
    pub fn addresses(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.address.clone()).collect()
    }

    /// Returns the addresses of online servers, in configuration order.
    pub fn online_addresses(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.online)
            .map(|e| e.address.clone())
            .collect()
    }

    /// Records a failed heartbeat.
    ///
    /// Offline servers are left untouched so their counter stays frozen.
    pub fn record_failure(&self, address: &str) -> LivenessChange {
        let Some(&i) = self.index.get(address) else {
            return LivenessChange::UnknownServer;
        };

        let mut entries = self.entries.write();
        let entry = &mut entries[i];
        if !entry.online {
            return LivenessChange::Unchanged;
        }

        entry.missed_beats += 1;
        debug!(address, missed_beats = entry.missed_beats, "missed heartbeat");

        if entry.missed_beats >= self.max_missed_beats {
            entry.online = false;
            error!(
                address,
                missed_beats = entry.missed_beats,
                "server has missed max heartbeats, ignoring"
            );
            return LivenessChange::WentOffline;
        }
        LivenessChange::Unchanged
    }

    /// Records a successful heartbeat.
    ///
    /// Under [`MissedBeatPolicy::Accumulate`] this does nothing. Under
    /// [`MissedBeatPolicy::ResetOnSuccess`] an online server's counter goes
    /// back to zero. Offline servers are never revived.
    pub fn record_success(&self, address: &str) -> LivenessChange {
        let Some(&i) = self.index.get(address) else {
            return LivenessChange::UnknownServer;
        };

        match self.policy {
            MissedBeatPolicy::Accumulate => LivenessChange::Unchanged,
            MissedBeatPolicy::ResetOnSuccess => {
                let mut entries = self.entries.write();
                let entry = &mut entries[i];
                if entry.online && entry.missed_beats > 0 {
                    entry.missed_beats = 0;
                    LivenessChange::Reset
                } else {
                    LivenessChange::Unchanged
                }
            }
        }
    }
}
