//! In-memory index of blocked elements.
//!
//! Entries are keyed by element id, with a reverse index keyed by blocker id
//! so "what is waiting on X" is a single lookup. The index owns no truth of
//! its own; [`crate::BlockingEngine`] keeps it in line with the graph.

use gk_core::BlockedEntry;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct BlockedCache {
    entries: HashMap<String, BlockedEntry>,
    by_blocker: HashMap<String, HashSet<String>>,
}

impl BlockedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, element_id: &str) -> Option<&BlockedEntry> {
        self.entries.get(element_id)
    }

    pub fn contains(&self, element_id: &str) -> bool {
        self.entries.contains_key(element_id)
    }

    /// All entries, ordered by element id.
    pub fn all(&self) -> Vec<BlockedEntry> {
        let mut entries: Vec<BlockedEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.element_id.cmp(&b.element_id));
        entries
    }

    /// Ids of elements whose entry names `blocker_id`, ordered.
    pub fn blocked_by(&self, blocker_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .by_blocker
            .get(blocker_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upsert. Returns the entry that was replaced, if any.
    pub fn insert(&mut self, entry: BlockedEntry) -> Option<BlockedEntry> {
        let previous = self.remove(&entry.element_id);
        self.by_blocker
            .entry(entry.blocked_by.clone())
            .or_default()
            .insert(entry.element_id.clone());
        self.entries.insert(entry.element_id.clone(), entry);
        previous
    }

    pub fn remove(&mut self, element_id: &str) -> Option<BlockedEntry> {
        let entry = self.entries.remove(element_id)?;
        if let Some(ids) = self.by_blocker.get_mut(&entry.blocked_by) {
            ids.remove(element_id);
            if ids.is_empty() {
                self.by_blocker.remove(&entry.blocked_by);
            }
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_blocker.clear();
    }
}

impl FromIterator<BlockedEntry> for BlockedCache {
    fn from_iter<I: IntoIterator<Item = BlockedEntry>>(iter: I) -> Self {
        let mut cache = BlockedCache::new();
        for entry in iter {
            cache.insert(entry);
        }
        cache
    }
}
