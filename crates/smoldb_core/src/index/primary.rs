//! The primary index: `id → DocumentLocation`, insertion-ordered.

use crate::types::DocumentLocation;
use std::collections::HashMap;

/// Insertion-stable map from document id to current location.
///
/// Iteration order is the order ids were first inserted, which compaction
/// relies on to produce deterministic output. Removal keeps the relative
/// order of the survivors.
#[derive(Debug, Default)]
pub struct PrimaryIndex {
    locations: HashMap<String, DocumentLocation>,
    order: Vec<String>,
}

impl PrimaryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the location for `id`, appending it to the order on first
    /// insert.
    pub fn insert(&mut self, id: &str, location: DocumentLocation) {
        if self.locations.insert(id.to_string(), location).is_none() {
            self.order.push(id.to_string());
        }
    }

    /// Returns the location for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<DocumentLocation> {
        self.locations.get(id).copied()
    }

    /// Whether `id` is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.locations.contains_key(id)
    }

    /// Removes `id`, returning its last location.
    pub fn remove(&mut self, id: &str) -> Option<DocumentLocation> {
        let location = self.locations.remove(id)?;
        if let Some(pos) = self.order.iter().position(|entry| entry == id) {
            self.order.remove(pos);
        }
        Some(location)
    }

    /// Number of live documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// `(id, location)` pairs in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, DocumentLocation)> {
        self.order
            .iter()
            .filter_map(|id| self.locations.get(id).map(|loc| (id.clone(), *loc)))
            .collect()
    }

    /// Overwrites locations in bulk (after compaction). Ids not already
    /// present are ignored; the insertion order is unchanged.
    pub fn apply_locations(&mut self, updates: &[(String, DocumentLocation)]) {
        for (id, location) in updates {
            if let Some(entry) = self.locations.get_mut(id) {
                *entry = *location;
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.locations.clear();
        self.order.clear();
    }
}
