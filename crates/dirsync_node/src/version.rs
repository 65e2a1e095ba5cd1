//! Protocol-version gate and server identification.

use crate::error::{NodeError, NodeResult};
use crate::identity::NodeIdentity;
use crate::transport::SharedTransport;
use dirsync_protocol::version;
use tracing::{error, info, warn};

/// Validates server versions and registers the node with each server.
#[derive(Debug, Clone)]
pub struct VersionNegotiator {
    local_version: String,
    ignore_mismatch: bool,
}

/// Outcome of a completed identification phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyReport {
    /// Servers that accepted the node identity.
    pub identified: Vec<String>,
    /// Servers whose identify request failed (non-fatal).
    pub failed: Vec<String>,
}

impl VersionNegotiator {
    /// Creates a negotiator for this build's API version.
    pub fn new(ignore_mismatch: bool) -> Self {
        Self::with_local_version(version::api_version(), ignore_mismatch)
    }

    /// Creates a negotiator for an explicit local version.
    pub fn with_local_version(local_version: impl Into<String>, ignore_mismatch: bool) -> Self {
        Self {
            local_version: local_version.into(),
            ignore_mismatch,
        }
    }

    /// Returns the local API version.
    pub fn local_version(&self) -> &str {
        &self.local_version
    }

    /// Returns true if version checks are bypassed.
    pub fn ignores_mismatch(&self) -> bool {
        self.ignore_mismatch
    }

    /// Checks a remote version against the local one.
    ///
    /// Exact matches pass; otherwise the major components (before the first
    /// `.`) must agree. Always passes when mismatches are ignored.
    pub fn validate(&self, remote: &str) -> NodeResult<()> {
        if self.ignore_mismatch {
            return Ok(());
        }
        validate(&self.local_version, remote)
    }

    /// Asks every server for its version, validates it and registers the
    /// node identity, in order.
    ///
    /// A failed version request or an incompatible version aborts the whole
    /// phase immediately. A failed identify is logged and skipped.
    pub fn identify_all(
        &self,
        servers: &[SharedTransport],
        identity: &NodeIdentity,
    ) -> NodeResult<IdentifyReport> {
        let mut report = IdentifyReport::default();

        for server in servers {
            let address = server.address();
            let remote = server.request_version().map_err(|e| {
                error!(address, error = %e, "version request failed");
                e
            })?;

            if let Err(e) = self.validate(&remote.api_version) {
                error!(address, error = %e, "incompatible server");
                return Err(e);
            }

            match server.identify(identity.as_str()) {
                Ok(_) => {
                    info!(address, remote_version = %remote.api_version, "identified with server");
                    report.identified.push(address.to_string());
                }
                Err(e) => {
                    warn!(address, error = %e, "failed to identify with server");
                    report.failed.push(address.to_string());
                }
            }
        }

        Ok(report)
    }
}

/// Checks `remote` against `local`: equal strings pass, otherwise the major
/// components must match.
pub fn validate(local: &str, remote: &str) -> NodeResult<()> {
    if version::is_compatible(local, remote) {
        Ok(())
    } else {
        Err(NodeError::VersionMismatch {
            local: local.to_string(),
            remote: remote.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockCall, MockTransport};
    use std::sync::Arc;

    fn server(address: &str, api_version: &str) -> Arc<MockTransport> {
        let t = Arc::new(MockTransport::new(address));
        t.set_version(api_version);
        t
    }

    fn shared(servers: &[Arc<MockTransport>]) -> Vec<SharedTransport> {
        servers
            .iter()
            .map(|s| Arc::clone(s) as SharedTransport)
            .collect()
    }

    #[test]
    fn validate_rules() {
        assert!(validate("2.1.0", "2.1.0").is_ok());
        assert!(validate("2.1.0", "2.0.7").is_ok());
        match validate("2.1.0", "1.9.0") {
            Err(NodeError::VersionMismatch { local, remote }) => {
                assert_eq!(local, "2.1.0");
                assert_eq!(remote, "1.9.0");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn bypass_accepts_anything() {
        let negotiator = VersionNegotiator::with_local_version("2.1.0", true);
        assert!(negotiator.validate("0.0.1").is_ok());
        assert!(negotiator.validate("").is_ok());
    }

    #[test]
    fn identifies_compatible_servers() {
        let a = server("mock://a", "2.1.0");
        let b = server("mock://b", "2.4.0");
        let negotiator = VersionNegotiator::with_local_version("2.1.0", false);
        let identity = NodeIdentity::from_string("node-1");

        let report = negotiator.identify_all(&shared(&[a.clone(), b.clone()]), &identity).unwrap();
        assert_eq!(report.identified, vec!["mock://a", "mock://b"]);
        assert!(report.failed.is_empty());
        assert!(a.calls().contains(&MockCall::Identify("node-1".into())));
    }

    #[test]
    fn mismatch_aborts_before_later_servers() {
        let a = server("mock://a", "2.1.0");
        let b = server("mock://b", "1.9.0");
        let c = server("mock://c", "2.1.0");
        let negotiator = VersionNegotiator::with_local_version("2.1.0", false);
        let identity = NodeIdentity::from_string("node-1");

        let result =
            negotiator.identify_all(&shared(&[a.clone(), b.clone(), c.clone()]), &identity);
        assert!(matches!(result, Err(NodeError::VersionMismatch { .. })));

        assert_eq!(a.count_calls(|c| matches!(c, MockCall::Identify(_))), 1);
        assert_eq!(b.count_calls(|c| matches!(c, MockCall::Identify(_))), 0);
        assert!(c.calls().is_empty());
    }

    #[test]
    fn mismatch_ignored_when_bypassed() {
        let a = server("mock://a", "1.9.0");
        let negotiator = VersionNegotiator::with_local_version("2.1.0", true);
        let report = negotiator
            .identify_all(&shared(&[a]), &NodeIdentity::from_string("n"))
            .unwrap();
        assert_eq!(report.identified, vec!["mock://a"]);
    }

    #[test]
    fn version_request_failure_aborts() {
        let a = server("mock://a", "2.1.0");
        a.set_connected(false);
        let b = server("mock://b", "2.1.0");
        let negotiator = VersionNegotiator::with_local_version("2.1.0", false);

        let result =
            negotiator.identify_all(&shared(&[a, b.clone()]), &NodeIdentity::from_string("n"));
        assert!(matches!(result, Err(NodeError::NotConnected)));
        assert!(b.calls().is_empty());
    }

    #[test]
    fn identify_failure_is_not_fatal() {
        let a = server("mock://a", "2.1.0");
        a.set_fail_identify(true);
        let b = server("mock://b", "2.1.0");
        let negotiator = VersionNegotiator::with_local_version("2.1.0", false);

        let report = negotiator
            .identify_all(&shared(&[a, b]), &NodeIdentity::from_string("n"))
            .unwrap();
        assert_eq!(report.failed, vec!["mock://a"]);
        assert_eq!(report.identified, vec!["mock://b"]);
    }
}
