//! Secondary indexes: inverted posting lists for equality filters.

use std::collections::{HashMap, HashSet};

/// An equality index over one dotted field path.
///
/// Maps the canonical serialization of a field value to the set of ids
/// whose documents currently carry that value. Empty posting lists are
/// removed eagerly so a lookup miss means "no documents".
#[derive(Debug)]
pub struct SecondaryIndex {
    path: String,
    postings: HashMap<Vec<u8>, HashSet<String>>,
}

impl SecondaryIndex {
    /// Creates an empty index over `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            postings: HashMap::new(),
        }
    }

    /// The indexed dotted path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Adds `id` to the posting list for `key`.
    pub fn insert(&mut self, key: Vec<u8>, id: &str) {
        self.postings.entry(key).or_default().insert(id.to_string());
    }

    /// Removes `id` from the posting list for `key`, dropping the list if
    /// it becomes empty.
    pub fn remove(&mut self, key: &[u8], id: &str) {
        if let Some(set) = self.postings.get_mut(key) {
            set.remove(id);
            if set.is_empty() {
                self.postings.remove(key);
            }
        }
    }

    /// Returns the posting list for `key`.
    #[must_use]
    pub fn lookup(&self, key: &[u8]) -> Option<&HashSet<String>> {
        self.postings.get(key)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.postings.len()
    }

    /// Whether `id` appears under any key.
    #[must_use]
    pub fn references(&self, id: &str) -> bool {
        self.postings.values().any(|set| set.contains(id))
    }

    /// `(key, ids)` pairs for persistence, sorted by key for a
    /// deterministic file image.
    #[must_use]
    pub fn entries(&self) -> Vec<(&Vec<u8>, &HashSet<String>)> {
        let mut entries: Vec<_> = self.postings.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Drops every posting list.
    pub fn clear(&mut self) {
        self.postings.clear();
    }
}
