//! Server-side directory index.

use dirsync_protocol::SyncCandidate;
use parking_lot::RwLock;

/// The entries a server can serve, in insertion order.
#[derive(Debug, Default)]
pub struct ServerIndex {
    entries: RwLock<Vec<SyncCandidate>>,
}

impl ServerIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file. Re-adding an existing name replaces its kind.
    pub fn add_file(&self, name: impl Into<String>) {
        self.insert(SyncCandidate::file(name));
    }

    /// Adds a directory.
    pub fn add_dir(&self, name: impl Into<String>) {
        self.insert(SyncCandidate::dir(name));
    }

    fn insert(&self, entry: SyncCandidate) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Removes an entry. Returns true if it existed.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        entries.len() != before
    }

    /// Looks up an entry by name.
    pub fn get(&self, name: &str) -> Option<SyncCandidate> {
        self.entries.read().iter().find(|e| e.name == name).cloned()
    }

    /// Returns entries under `dir`, in insertion order.
    pub fn entries_under(&self, dir: &str) -> Vec<SyncCandidate> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.is_under(dir))
            .cloned()
            .collect()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
