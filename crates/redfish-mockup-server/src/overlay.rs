//! In-memory write overlay.
//!
//! Every mutation the server accepts lands here instead of on disk; fixture
//! files are never rewritten. Entries are keyed by the absolute filesystem
//! path of the resource's `index.json` and live for the process lifetime.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// What the overlay knows about one resource path.
#[derive(Debug, Clone)]
pub enum OverlayEntry {
    /// The resource's current document, shadowing any fixture file.
    Override(Value),
    /// The resource was deleted. Distinct from "never existed": the fixture
    /// file may still be present on disk underneath.
    Tombstone,
}

/// Process-wide map of overridden and deleted resources.
///
/// Reads and writes go through an `RwLock` so the server's per-connection
/// tasks can share it; entries are never removed.
#[derive(Default)]
pub struct OverlayStore {
    entries: RwLock<HashMap<PathBuf, OverlayEntry>>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entry for `path`, if any mutation ever touched it.
    pub fn get(&self, path: &Path) -> Option<OverlayEntry> {
        self.entries.read().get(path).cloned()
    }

    /// Record `document` as the live representation of `path`.
    pub fn put_override(&self, path: PathBuf, document: Value) {
        self.entries.write().insert(path, OverlayEntry::Override(document));
    }

    /// Mark `path` deleted. Replaces any previous override outright, so a
    /// stale document cannot resurface behind the tombstone.
    pub fn put_tombstone(&self, path: PathBuf) {
        self.entries.write().insert(path, OverlayEntry::Tombstone);
    }

    /// Number of paths ever mutated.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
