//! Persistent node identity.
//!
//! The identity is a UUID v4 string generated on first run and stored as a
//! JSON string literal at the configured path:
//!
//! ```text
//! "7b0e4c57-2f7d-4a57-9a3e-0f7c1f3f9d21"
//! ```
//!
//! Later runs only read the file, so the identity survives restarts.

use crate::error::{NodeError, NodeResult};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Stable identifier of this node.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    /// Loads the identity persisted at `path`, or generates and persists a
    /// fresh one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `IdentityIo` if the file cannot be read or written, and
    /// `IdentityParse` if it does not hold a JSON-encoded string.
    pub fn acquire(path: &Path) -> NodeResult<Self> {
        match fs::read(path) {
            Ok(bytes) => {
                let identity = Self::parse(path, &bytes)?;
                info!(identity = %identity, path = %path.display(), "read node identity");
                Ok(identity)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let identity = Self::generate();
                identity.persist(path)?;
                info!(
                    identity = %identity,
                    path = %path.display(),
                    "generated and wrote node identity"
                );
                Ok(identity)
            }
            Err(source) => Err(NodeError::IdentityIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Generates a new random identity without persisting it.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parse(path: &Path, bytes: &[u8]) -> NodeResult<Self> {
        let id: String = serde_json::from_slice(bytes).map_err(|e| NodeError::IdentityParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if id.trim().is_empty() {
            return Err(NodeError::IdentityParse {
                path: path.to_path_buf(),
                message: "identity is empty".into(),
            });
        }
        Ok(Self(id))
    }

    /// Writes to `<path>.tmp` and renames it into place.
    fn persist(&self, path: &Path) -> NodeResult<()> {
        let io_err = |source| NodeError::IdentityIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let serial = serde_json::to_string_pretty(&self.0).map_err(|e| NodeError::IdentityParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = Path::new(&tmp);

        let written = fs::File::create(tmp).and_then(|mut file| {
            file.write_all(serial.as_bytes())?;
            file.sync_all()
        });
        if let Err(source) = written.and_then(|()| fs::rename(tmp, path)) {
            let _ = fs::remove_file(tmp);
            return Err(io_err(source));
        }
        Ok(())
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeIdentity({})", self.0)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
