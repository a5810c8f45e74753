//! The collection coordinator.
//!
//! Wires one storage engine to one index manager, threads secondary-index
//! maintenance through every mutation, and fronts reads with an optional
//! LRU cache. Mutations run inside the engine's write lock so a reader
//! always observes a consistent `(slot, index)` pair.

use crate::cache::ReadCache;
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{EngineError, EngineResult};
use crate::index::IndexManager;
use crate::shared::SharedState;
use crate::stats::{EngineStats, EngineStatsSnapshot};
use crate::store::{StorageEngine, WriteBatch};
use crate::types::DocumentLocation;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use smoldb_codec::matches;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// A named collection of JSON documents.
pub struct Collection {
    name: String,
    engine: Arc<StorageEngine>,
    indexes: RwLock<IndexManager>,
    cache: ReadCache,
    stats: Arc<EngineStats>,
    index_path: PathBuf,
}

/// Counters and sizes for one collection, returned by
/// [`Collection::stats`].
#[derive(Debug, Clone)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Live document count.
    pub document_count: u64,
    /// Logical data-file size in bytes.
    pub file_size: u64,
    /// Live payload bytes.
    pub live_data_size: u64,
    /// Free-list entries awaiting reuse.
    pub free_slots: usize,
    /// Number of secondary indexes.
    pub secondary_indexes: usize,
    /// Documents currently cached.
    pub cache_entries: usize,
    /// Operation counters.
    pub counters: EngineStatsSnapshot,
}

impl Collection {
    /// Opens (or creates) the collection's files under `dir`.
    pub(crate) fn open(
        dir: &DatabaseDir,
        name: &str,
        config: &Config,
        shared: Arc<SharedState>,
    ) -> EngineResult<Self> {
        let stats = Arc::new(EngineStats::new());
        let engine = StorageEngine::open(
            &dir.data_path(name),
            dir.blobs_dir(name),
            config.blob_threshold,
            shared,
            Arc::clone(&stats),
        )?;

        let index_path = dir.index_path(name);
        let indexes = if index_path.exists() {
            let bytes = std::fs::read(&index_path)?;
            IndexManager::from_bytes(&bytes, &index_path.display().to_string())?
        } else {
            IndexManager::new()
        };

        debug!(collection = name, documents = indexes.len(), "opened collection");

        Ok(Self {
            name: name.to_string(),
            engine: Arc::new(engine),
            indexes: RwLock::new(indexes),
            cache: ReadCache::new(config.cache_size),
            stats,
            index_path,
        })
    }

    /// The collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // === Mutations ===

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::DuplicateId`] if `id` already exists.
    pub fn insert(&self, id: &str, doc: Value) -> EngineResult<()> {
        self.batch(|ops| ops.insert(id, doc))
    }

    /// Replaces an existing document.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::DocumentNotFound`] if `id` does not
    /// exist.
    pub fn update(&self, id: &str, doc: Value) -> EngineResult<()> {
        self.batch(|ops| ops.update(id, doc))
    }

    /// Inserts or replaces a document.
    pub fn upsert(&self, id: &str, doc: Value) -> EngineResult<()> {
        self.batch(|ops| ops.upsert(id, doc))
    }

    /// Deletes a document. Returns whether it existed.
    pub fn delete(&self, id: &str) -> EngineResult<bool> {
        self.batch(|ops| ops.delete(id))
    }

    /// Runs several mutations under one write-lock acquisition, flushing
    /// metadata once at the end.
    pub fn batch<T>(
        &self,
        f: impl FnOnce(&mut BatchOps<'_, '_>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.engine.batch(|batch| {
            let mut ops = BatchOps {
                collection: self,
                batch,
            };
            f(&mut ops)
        })
    }

    /// Bulk insert via a single contiguous data-file write.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::DuplicateId`] (before writing anything)
    /// if any id already exists or repeats within `items`.
    pub fn insert_many(&self, items: Vec<(String, Value)>) -> EngineResult<()> {
        self.engine.batch(|batch| {
            {
                let indexes = self.indexes.read();
                let mut seen = HashSet::new();
                for (id, _) in &items {
                    if indexes.contains(id) || !seen.insert(id.as_str()) {
                        return Err(EngineError::duplicate_id(id));
                    }
                }
            }

            let encoded = items
                .iter()
                .map(|(id, doc)| Ok((id.clone(), serde_json::to_vec(doc)?)))
                .collect::<EngineResult<Vec<_>>>()?;

            let locations = batch.write_many(&encoded)?;

            let mut indexes = self.indexes.write();
            for ((id, doc), location) in items.into_iter().zip(locations) {
                indexes.on_insert(&id, location, &doc);
                self.cache.put(&id, doc);
            }
            Ok(())
        })
    }

    // === Reads ===

    /// Reads a document by id.
    pub fn get(&self, id: &str) -> EngineResult<Option<Value>> {
        if let Some(doc) = self.cache.get(id) {
            self.stats.record_cache_hit();
            return Ok(Some(doc));
        }
        if self.cache.is_enabled() {
            self.stats.record_cache_miss();
        }

        let Some(location) = self.indexes.read().location_of(id) else {
            return Ok(None);
        };

        let doc = self.read_document(&location)?;
        self.cache.put(id, doc.clone());
        Ok(Some(doc))
    }

    /// Whether a document exists.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.indexes.read().contains(id)
    }

    /// Counts documents, optionally restricted by an equality filter.
    ///
    /// A filter whose every key is indexed is answered from posting lists
    /// without reading a single document.
    pub fn count(&self, filter: Option<&Map<String, Value>>) -> EngineResult<usize> {
        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return Ok(self.indexes.read().len());
        };

        let plan = self.indexes.read().plan_query(filter);
        if plan.fully_covered {
            return Ok(plan.candidates.len());
        }

        let mut count = 0;
        for id in plan.candidates {
            if let Some(doc) = self.get(&id)? {
                if matches(&doc, filter) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Returns `(id, document)` pairs matching the filter, in insertion
    /// order.
    pub fn find(&self, filter: &Map<String, Value>) -> EngineResult<Vec<(String, Value)>> {
        let plan = self.indexes.read().plan_query(filter);
        let mut results = Vec::new();
        for id in plan.candidates {
            let Some(doc) = self.get(&id)? else { continue };
            if plan.fully_covered || matches(&doc, filter) {
                results.push((id, doc));
            }
        }
        Ok(results)
    }

    /// Returns the first matching `(id, document)` pair, if any.
    pub fn find_one(&self, filter: &Map<String, Value>) -> EngineResult<Option<(String, Value)>> {
        let plan = self.indexes.read().plan_query(filter);
        for id in plan.candidates {
            let Some(doc) = self.get(&id)? else { continue };
            if plan.fully_covered || matches(&doc, filter) {
                return Ok(Some((id, doc)));
            }
        }
        Ok(None)
    }

    /// Returns ids matching the filter. Fully indexed filters are
    /// answered without document I/O.
    pub fn find_ids(&self, filter: &Map<String, Value>) -> EngineResult<Vec<String>> {
        let plan = self.indexes.read().plan_query(filter);
        if plan.fully_covered {
            return Ok(plan.candidates);
        }

        let mut ids = Vec::new();
        for id in plan.candidates {
            if let Some(doc) = self.get(&id)? {
                if matches(&doc, filter) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Returns every `(id, document)` pair, in insertion order.
    pub fn get_all(&self) -> EngineResult<Vec<(String, Value)>> {
        self.iter().collect()
    }

    /// All document ids, in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.indexes.read().ids()
    }

    /// Lazily iterates `(id, document)` pairs from a snapshot of the
    /// primary index.
    #[must_use]
    pub fn iter(&self) -> CollectionIter {
        CollectionIter {
            engine: Arc::clone(&self.engine),
            entries: self.indexes.read().entries().into_iter(),
        }
    }

    // === Indexes ===

    /// Creates a secondary index over a dotted path, scanning every live
    /// document to populate it. Idempotent.
    pub fn create_index(&self, path: &str) -> EngineResult<()> {
        self.engine.batch(|_batch| {
            if self.indexes.read().has_index(path) {
                return Ok(());
            }

            let entries = self.indexes.read().entries();
            let mut docs = Vec::with_capacity(entries.len());
            for (id, location) in entries {
                docs.push((id, self.read_document(&location)?));
            }

            self.indexes.write().create_index(path, docs);
            Ok(())
        })
    }

    /// Indexed paths in creation order.
    #[must_use]
    pub fn get_indexes(&self) -> Vec<String> {
        self.indexes.read().indexed_paths()
    }

    /// Writes the index file if anything changed since the last persist.
    pub fn persist_index(&self) -> EngineResult<()> {
        let mut indexes = self.indexes.write();
        if !indexes.is_dirty() {
            return Ok(());
        }
        std::fs::write(&self.index_path, indexes.to_bytes())?;
        indexes.mark_clean();
        Ok(())
    }

    // === Maintenance ===

    /// Deletes every document, keeping secondary-index definitions.
    pub fn clear(&self) -> EngineResult<()> {
        self.engine.reset()?;
        self.engine.blobs().clear()?;
        self.indexes.write().clear_documents();
        self.cache.clear();
        self.persist_index()
    }

    /// Deletes every document and drops all secondary indexes.
    pub fn reset(&self) -> EngineResult<()> {
        self.engine.reset()?;
        self.engine.blobs().clear()?;
        self.indexes.write().clear_all();
        self.cache.clear();
        self.persist_index()
    }

    /// Rebuilds a packed data file, returning the bytes freed. The index
    /// file is persisted with the new locations before returning.
    pub fn compact(&self) -> EngineResult<u64> {
        let bytes_freed = self.engine.batch(|batch| {
            let entries = self.indexes.read().entries();
            let outcome = batch.compact(&entries)?;
            self.indexes.write().apply_new_locations(&outcome.new_locations);
            Ok(outcome.bytes_freed)
        })?;
        self.persist_index()?;
        Ok(bytes_freed)
    }

    /// Snapshots counters and sizes.
    #[must_use]
    pub fn stats(&self) -> CollectionStats {
        let storage = self.engine.stats();
        CollectionStats {
            name: self.name.clone(),
            document_count: storage.document_count,
            file_size: storage.file_size,
            live_data_size: storage.live_data_size,
            free_slots: storage.free_slots,
            secondary_indexes: self.indexes.read().indexed_paths().len(),
            cache_entries: self.cache.len(),
            counters: self.stats.snapshot(),
        }
    }

    /// Flushes metadata, persists the index, and purges the cache.
    pub fn close(&self) -> EngineResult<()> {
        self.engine.flush()?;
        self.persist_index()?;
        self.cache.clear();
        Ok(())
    }

    fn read_document(&self, location: &DocumentLocation) -> EngineResult<Value> {
        let bytes = self.engine.read(location)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("documents", &self.indexes.read().len())
            .finish_non_exhaustive()
    }
}

/// Mutation handle passed to [`Collection::batch`] closures.
///
/// All operations run under the write lock acquired when the batch
/// started; the data-file header is flushed once when the batch ends.
pub struct BatchOps<'a, 'b> {
    collection: &'a Collection,
    batch: &'a mut WriteBatch<'b>,
}

impl BatchOps<'_, '_> {
    /// Inserts a new document.
    pub fn insert(&mut self, id: &str, doc: Value) -> EngineResult<()> {
        if self.collection.indexes.read().contains(id) {
            return Err(EngineError::duplicate_id(id));
        }

        let bytes = serde_json::to_vec(&doc)?;
        let location = self.batch.write(id, &bytes)?;
        self.collection.indexes.write().on_insert(id, location, &doc);
        self.collection.cache.put(id, doc);
        Ok(())
    }

    /// Replaces an existing document.
    pub fn update(&mut self, id: &str, doc: Value) -> EngineResult<()> {
        let old = self
            .collection
            .indexes
            .read()
            .location_of(id)
            .ok_or_else(|| EngineError::document_not_found(id))?;

        let old_doc = self.read_old_for_unindex(&old)?;
        let bytes = serde_json::to_vec(&doc)?;
        let location = self.batch.update(id, &bytes, old)?;
        self.collection
            .indexes
            .write()
            .on_update(id, location, old_doc.as_ref(), &doc);
        self.collection.cache.put(id, doc);
        Ok(())
    }

    /// Inserts or replaces a document.
    pub fn upsert(&mut self, id: &str, doc: Value) -> EngineResult<()> {
        if self.collection.indexes.read().contains(id) {
            self.update(id, doc)
        } else {
            self.insert(id, doc)
        }
    }

    /// Deletes a document. Returns whether it existed.
    pub fn delete(&mut self, id: &str) -> EngineResult<bool> {
        let Some(old) = self.collection.indexes.read().location_of(id) else {
            return Ok(false);
        };

        let old_doc = self.read_old_for_unindex(&old)?;
        self.batch.delete(old)?;
        self.collection.indexes.write().on_remove(id, old_doc.as_ref());
        self.collection.cache.remove(id);
        Ok(true)
    }

    /// Reads the old document when posting lists need unindexing; skipped
    /// entirely when no secondary index exists.
    fn read_old_for_unindex(
        &self,
        location: &DocumentLocation,
    ) -> EngineResult<Option<Value>> {
        if !self.collection.indexes.read().has_secondaries() {
            return Ok(None);
        }
        Ok(Some(self.collection.read_document(location)?))
    }
}

/// Lazy iterator over a snapshot of the collection.
pub struct CollectionIter {
    engine: Arc<StorageEngine>,
    entries: std::vec::IntoIter<(String, DocumentLocation)>,
}

impl Iterator for CollectionIter {
    type Item = EngineResult<(String, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (id, location) = self.entries.next()?;
        Some(self.engine.read(&location).and_then(|bytes| {
            let doc = serde_json::from_slice(&bytes)?;
            Ok((id, doc))
        }))
    }
}
