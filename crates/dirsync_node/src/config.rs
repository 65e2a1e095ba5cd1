//! Configuration for a node.

use crate::error::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a successful heartbeat does to a server's missed-beat counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedBeatPolicy {
    /// Missed beats accumulate for the life of the process; a success
    /// leaves the counter alone.
    #[default]
    Accumulate,
    /// A successful heartbeat resets the counter of an online server.
    ResetOnSuccess,
}

/// Configuration for a node.
///
/// Intervals are written as duration strings in configuration files
/// (`"500ms"`, `"5s"`, `"1m30s"`, `"2h"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Server base addresses, in the order they are contacted.
    pub servers: Vec<String>,
    /// Delay between heartbeat rounds.
    #[serde(with = "duration_str")]
    pub heartbeat_interval: Duration,
    /// Delay between sync cycles.
    #[serde(with = "duration_str")]
    pub update_interval: Duration,
    /// Consecutive heartbeat failures before a server is marked offline.
    pub max_missed_beats: u32,
    /// File holding the persisted node identity.
    pub identity_path: PathBuf,
    /// Directory replicated from the servers.
    pub target_directory: String,
    /// Skip the API version check during identification.
    pub ignore_version_mismatch: bool,
    /// Missed-beat counter behavior on success.
    pub missed_beat_policy: MissedBeatPolicy,
}

impl NodeConfig {
    /// Creates a configuration for the given servers with default settings.
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parses a JSON configuration document.
    pub fn from_json_str(json: &str) -> NodeResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn from_json_file(path: &Path) -> NodeResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Checks that the configuration can drive a node.
    pub fn validate(&self) -> NodeResult<()> {
        if self.servers.is_empty() {
            return Err(NodeError::Config("no servers configured".into()));
        }
        if let Some(i) = self.servers.iter().position(|s| s.trim().is_empty()) {
            return Err(NodeError::Config(format!("server #{} has an empty address", i)));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(NodeError::Config("heartbeat_interval must be positive".into()));
        }
        if self.update_interval.is_zero() {
            return Err(NodeError::Config("update_interval must be positive".into()));
        }
        if self.max_missed_beats == 0 {
            return Err(NodeError::Config("max_missed_beats must be at least 1".into()));
        }
        if self.identity_path.as_os_str().is_empty() {
            return Err(NodeError::Config("identity_path is empty".into()));
        }
        Ok(())
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the update interval.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Sets the number of missed heartbeats before a server goes offline.
    pub fn with_max_missed_beats(mut self, max: u32) -> Self {
        self.max_missed_beats = max;
        self
    }

    /// Sets the identity file path.
    pub fn with_identity_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_path = path.into();
        self
    }

    /// Sets the replicated directory.
    pub fn with_target_directory(mut self, dir: impl Into<String>) -> Self {
        self.target_directory = dir.into();
        self
    }

    /// Disables the API version check.
    pub fn with_ignore_version_mismatch(mut self, ignore: bool) -> Self {
        self.ignore_version_mismatch = ignore;
        self
    }

    /// Sets the missed-beat policy.
    pub fn with_missed_beat_policy(mut self, policy: MissedBeatPolicy) -> Self {
        self.missed_beat_policy = policy;
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            heartbeat_interval: Duration::from_secs(5),
            update_interval: Duration::from_secs(10),
            max_missed_beats: 3,
            identity_path: PathBuf::from("node_id.json"),
            target_directory: ".".into(),
            ignore_version_mismatch: false,
            missed_beat_policy: MissedBeatPolicy::Accumulate,
        }
    }
}

/// Parses a duration string such as `"250ms"`, `"5s"`, `"1m30s"` or `"1.5h"`.
pub fn parse_duration(input: &str) -> NodeResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(NodeError::Config("empty duration".into()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = |why: &str| NodeError::Config(format!("invalid duration {:?}: {}", input, why));

    let mut total_secs = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(invalid("expected a number"));
        }
        let value: f64 = rest[..num_end]
            .parse()
            .map_err(|_| invalid("malformed number"))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };
        total_secs += value * scale;
        rest = &rest[unit_end..];
    }

    Duration::try_from_secs_f64(total_secs).map_err(|_| invalid("out of range"))
}

/// Formats a duration in the shortest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".into();
    }
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = millis / 1000;
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

mod duration_str {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
