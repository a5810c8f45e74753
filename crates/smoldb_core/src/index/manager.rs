//! The index manager: primary map, secondary posting lists, and filter
//! planning.

use crate::error::EngineResult;
use crate::index::persistence::{decode_index_file, encode_index_file};
use crate::index::primary::PrimaryIndex;
use crate::index::secondary::SecondaryIndex;
use crate::types::DocumentLocation;
use serde_json::{Map, Value};
use smoldb_codec::{get_nested, serialize_index_key};
use std::collections::HashSet;

/// How a filter will be answered.
///
/// `candidates` is in primary-index insertion order. When `fully_covered`
/// is true every filter key was answered from posting lists, so id-only
/// queries (`count`, `find_ids`) need zero document reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Candidate ids, possibly requiring post-filtering.
    pub candidates: Vec<String>,
    /// Whether every filter key was resolved through an index.
    pub fully_covered: bool,
}

/// Owns the primary index and all secondary indexes of one collection.
///
/// Mutation hooks keep the posting lists consistent with the primary map;
/// the `dirty` flag records unpersisted changes and is the only
/// persistence coordination — callers decide when to write the file.
#[derive(Debug, Default)]
pub struct IndexManager {
    primary: PrimaryIndex,
    secondaries: Vec<SecondaryIndex>,
    dirty: bool,
}

impl IndexManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a manager from a persisted index file image.
    ///
    /// # Errors
    ///
    /// Propagates format and corruption errors from the decoder.
    pub fn from_bytes(data: &[u8], path: &str) -> EngineResult<Self> {
        let (primary, secondaries) = decode_index_file(data, path)?;
        Ok(Self {
            primary,
            secondaries,
            dirty: false,
        })
    }

    /// Encodes the full index file image.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_index_file(&self.primary, &self.secondaries)
    }

    // === Primary accessors ===

    /// Location of `id`, if live.
    #[must_use]
    pub fn location_of(&self, id: &str) -> Option<DocumentLocation> {
        self.primary.get(id)
    }

    /// Whether `id` is live.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.primary.contains(id)
    }

    /// Number of live documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// All ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.primary.ids()
    }

    /// All `(id, location)` pairs in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, DocumentLocation)> {
        self.primary.entries()
    }

    /// Whether any secondary index exists (mutators use this to skip
    /// reading the old document when there is nothing to unindex).
    #[must_use]
    pub fn has_secondaries(&self) -> bool {
        !self.secondaries.is_empty()
    }

    /// Indexed paths in creation order.
    #[must_use]
    pub fn indexed_paths(&self) -> Vec<String> {
        self.secondaries
            .iter()
            .map(|index| index.path().to_string())
            .collect()
    }

    /// Whether `path` has a secondary index.
    #[must_use]
    pub fn has_index(&self, path: &str) -> bool {
        self.secondaries.iter().any(|index| index.path() == path)
    }

    /// Whether unpersisted changes exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag after a successful persist.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    // === Mutation hooks ===

    /// Records a newly inserted document.
    pub fn on_insert(&mut self, id: &str, location: DocumentLocation, doc: &Value) {
        self.primary.insert(id, location);
        for index in &mut self.secondaries {
            if let Some(value) = get_nested(doc, index.path()) {
                index.insert(serialize_index_key(value), id);
            }
        }
        self.dirty = true;
    }

    /// Records an updated document. `old_doc` is required whenever any
    /// secondary index exists, to remove the id from its old posting
    /// lists.
    pub fn on_update(
        &mut self,
        id: &str,
        location: DocumentLocation,
        old_doc: Option<&Value>,
        new_doc: &Value,
    ) {
        self.primary.insert(id, location);
        for index in &mut self.secondaries {
            if let Some(old) = old_doc {
                if let Some(value) = get_nested(old, index.path()) {
                    index.remove(&serialize_index_key(value), id);
                }
            }
            if let Some(value) = get_nested(new_doc, index.path()) {
                index.insert(serialize_index_key(value), id);
            }
        }
        self.dirty = true;
    }

    /// Records a deleted document.
    pub fn on_remove(&mut self, id: &str, old_doc: Option<&Value>) {
        self.primary.remove(id);
        for index in &mut self.secondaries {
            if let Some(old) = old_doc {
                if let Some(value) = get_nested(old, index.path()) {
                    index.remove(&serialize_index_key(value), id);
                }
            }
        }
        self.dirty = true;
    }

    /// Installs new locations after compaction.
    pub fn apply_new_locations(&mut self, updates: &[(String, DocumentLocation)]) {
        self.primary.apply_locations(updates);
        self.dirty = true;
    }

    /// Creates an empty secondary index over `path` and populates it from
    /// `docs`. Idempotent: an already-indexed path is left untouched and
    /// `docs` is not consumed.
    pub fn create_index<I>(&mut self, path: &str, docs: I) -> bool
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if self.has_index(path) {
            return false;
        }

        let mut index = SecondaryIndex::new(path);
        for (id, doc) in docs {
            if let Some(value) = get_nested(&doc, path) {
                index.insert(serialize_index_key(value), &id);
            }
        }
        self.secondaries.push(index);
        self.dirty = true;
        true
    }

    /// Removes every document from the primary and all posting lists,
    /// keeping the index definitions.
    pub fn clear_documents(&mut self) {
        self.primary.clear();
        for index in &mut self.secondaries {
            index.clear();
        }
        self.dirty = true;
    }

    /// Removes everything, index definitions included.
    pub fn clear_all(&mut self) {
        self.primary.clear();
        self.secondaries.clear();
        self.dirty = true;
    }

    /// Whether `id` appears in any posting list (test support).
    #[must_use]
    pub fn any_posting_references(&self, id: &str) -> bool {
        self.secondaries.iter().any(|index| index.references(id))
    }

    // === Query planning ===

    /// Plans a filter query per the intersection algorithm.
    ///
    /// Indexed keys intersect their posting lists; a missing posting list
    /// short-circuits to an empty, fully covered plan. If no filter key is
    /// indexed, every live id becomes a candidate and the caller must
    /// post-filter.
    #[must_use]
    pub fn plan_query(&self, filter: &Map<String, Value>) -> QueryPlan {
        let mut candidates: Option<HashSet<&str>> = None;
        let mut fully_covered = true;
        let mut matched_any_index = false;

        for (path, value) in filter {
            let Some(index) = self.secondaries.iter().find(|s| s.path() == path.as_str()) else {
                fully_covered = false;
                continue;
            };
            matched_any_index = true;

            let key = serialize_index_key(value);
            let Some(postings) = index.lookup(&key) else {
                return QueryPlan {
                    candidates: Vec::new(),
                    fully_covered: true,
                };
            };

            candidates = Some(match candidates {
                None => postings.iter().map(String::as_str).collect(),
                Some(existing) => existing
                    .into_iter()
                    .filter(|id| postings.contains(*id))
                    .collect(),
            });

            if candidates.as_ref().is_some_and(HashSet::is_empty) {
                return QueryPlan {
                    candidates: Vec::new(),
                    fully_covered: true,
                };
            }
        }

        if !matched_any_index {
            return QueryPlan {
                candidates: self.primary.ids(),
                fully_covered: false,
            };
        }

        let members = candidates.unwrap_or_default();
        // Report candidates in insertion order for deterministic results.
        let ordered = self
            .primary
            .ids()
            .into_iter()
            .filter(|id| members.contains(id.as_str()))
            .collect();

        QueryPlan {
            candidates: ordered,
            fully_covered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loc(offset: u64) -> DocumentLocation {
        DocumentLocation {
            offset,
            length: 10,
            slab_size: 1024,
            is_blob: false,
        }
    }

    fn filter(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn sample_manager() -> IndexManager {
        let mut manager = IndexManager::new();
        manager.create_index("role", Vec::new());
        manager.create_index("active", Vec::new());

        manager.on_insert(
            "user_1",
            loc(64),
            &json!({"role": "admin", "active": true}),
        );
        manager.on_insert(
            "user_2",
            loc(1088),
            &json!({"role": "admin", "active": false}),
        );
        manager.on_insert(
            "user_3",
            loc(2112),
            &json!({"role": "user", "active": true}),
        );
        manager
    }

    #[test]
    fn intersection_of_two_indexes() {
        let manager = sample_manager();
        let plan = manager.plan_query(&filter(json!({"role": "admin", "active": true})));

        assert!(plan.fully_covered);
        assert_eq!(plan.candidates, vec!["user_1"]);
    }

    #[test]
    fn single_index_lookup() {
        let manager = sample_manager();
        let plan = manager.plan_query(&filter(json!({"role": "admin"})));

        assert!(plan.fully_covered);
        assert_eq!(plan.candidates, vec!["user_1", "user_2"]);
    }

    #[test]
    fn missing_value_short_circuits_empty() {
        let manager = sample_manager();
        let plan = manager.plan_query(&filter(json!({"role": "nobody"})));

        assert!(plan.fully_covered);
        assert!(plan.candidates.is_empty());
    }

    #[test]
    fn unindexed_key_forces_post_filter() {
        let manager = sample_manager();
        let plan = manager.plan_query(&filter(json!({"role": "admin", "name": "x"})));

        assert!(!plan.fully_covered);
        assert_eq!(plan.candidates, vec!["user_1", "user_2"]);
    }

    #[test]
    fn no_indexed_keys_scans_everything() {
        let manager = sample_manager();
        let plan = manager.plan_query(&filter(json!({"name": "x"})));

        assert!(!plan.fully_covered);
        assert_eq!(plan.candidates.len(), 3);
    }

    #[test]
    fn update_moves_postings() {
        let mut manager = sample_manager();
        manager.on_update(
            "user_2",
            loc(1088),
            Some(&json!({"role": "admin", "active": false})),
            &json!({"role": "user", "active": false}),
        );

        let plan = manager.plan_query(&filter(json!({"role": "admin"})));
        assert_eq!(plan.candidates, vec!["user_1"]);

        let plan = manager.plan_query(&filter(json!({"role": "user"})));
        assert_eq!(plan.candidates, vec!["user_2", "user_3"]);
    }

    #[test]
    fn remove_purges_postings() {
        let mut manager = sample_manager();
        manager.on_remove("user_1", Some(&json!({"role": "admin", "active": true})));

        assert!(!manager.contains("user_1"));
        assert!(!manager.any_posting_references("user_1"));
    }

    #[test]
    fn create_index_scans_existing_docs() {
        let mut manager = IndexManager::new();
        manager.on_insert("a", loc(64), &json!({"kind": "x"}));
        manager.on_insert("b", loc(1088), &json!({"kind": "y"}));

        let docs = vec![
            ("a".to_string(), json!({"kind": "x"})),
            ("b".to_string(), json!({"kind": "y"})),
        ];
        assert!(manager.create_index("kind", docs));

        let plan = manager.plan_query(&filter(json!({"kind": "x"})));
        assert!(plan.fully_covered);
        assert_eq!(plan.candidates, vec!["a"]);
    }

    #[test]
    fn create_index_is_idempotent() {
        let mut manager = IndexManager::new();
        assert!(manager.create_index("role", Vec::new()));
        assert!(!manager.create_index("role", Vec::new()));
        assert_eq!(manager.indexed_paths(), vec!["role"]);
    }

    #[test]
    fn nested_path_indexing() {
        let mut manager = IndexManager::new();
        manager.create_index("profile.country", Vec::new());
        manager.on_insert("a", loc(64), &json!({"profile": {"country": "US"}}));
        manager.on_insert("b", loc(1088), &json!({"profile": {"country": "DE"}}));
        manager.on_insert("c", loc(2112), &json!({"profile": {}}));

        let plan = manager.plan_query(&filter(json!({"profile.country": "US"})));
        assert!(plan.fully_covered);
        assert_eq!(plan.candidates, vec!["a"]);
    }

    #[test]
    fn absent_values_are_not_indexed() {
        let mut manager = IndexManager::new();
        manager.create_index("tag", Vec::new());
        manager.on_insert("a", loc(64), &json!({"other": 1}));

        assert!(!manager.any_posting_references("a"));
    }

    #[test]
    fn persistence_roundtrip() {
        let manager = sample_manager();
        let bytes = manager.to_bytes();

        let loaded = IndexManager::from_bytes(&bytes, "test.idx").unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.indexed_paths(), vec!["role", "active"]);

        let plan = loaded.plan_query(&filter(json!({"role": "admin", "active": true})));
        assert_eq!(plan.candidates, vec!["user_1"]);
    }

    #[test]
    fn dirty_tracking() {
        let mut manager = IndexManager::new();
        assert!(!manager.is_dirty());

        manager.on_insert("a", loc(64), &json!({}));
        assert!(manager.is_dirty());

        manager.mark_clean();
        assert!(!manager.is_dirty());
    }
}
