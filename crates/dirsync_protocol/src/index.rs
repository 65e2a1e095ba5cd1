//! Index entries exchanged during a comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An index entry the server reports as missing on the node.
///
/// Candidates are transient: they are produced by one comparison and
/// consumed by the fetch step of the same sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncCandidate {
    /// Path of the entry, relative to the server root.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl SyncCandidate {
    /// Creates a file candidate.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    /// Creates a directory candidate.
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }

    /// Returns true if this entry lives under `dir`.
    ///
    /// `"."`, `""` and `"/"` match everything.
    pub fn is_under(&self, dir: &str) -> bool {
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() || dir == "." {
            return true;
        }
        match self.name.strip_prefix(dir) {
            Some("") => true,
            Some(rest) => rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for SyncCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "{}/", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        assert!(SyncCandidate::dir("a").is_dir);
        assert!(!SyncCandidate::file("a/b.txt").is_dir);
    }

    #[test]
    fn under_root() {
        let c = SyncCandidate::file("docs/readme.md");
        assert!(c.is_under("."));
        assert!(c.is_under(""));
        assert!(c.is_under("/"));
    }

    #[test]
    fn under_prefix_respects_components() {
        let c = SyncCandidate::file("docs/readme.md");
        assert!(c.is_under("docs"));
        assert!(c.is_under("docs/"));
        assert!(!c.is_under("doc"));
        assert!(!c.is_under("src"));
        assert!(SyncCandidate::dir("docs").is_under("docs"));
    }

    #[test]
    fn display_marks_directories() {
        assert_eq!(SyncCandidate::dir("a").to_string(), "a/");
        assert_eq!(SyncCandidate::file("a").to_string(), "a");
    }
}
