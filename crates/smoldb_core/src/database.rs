//! Database facade: collection registry, GC control, lifecycle.

use crate::collection::{Collection, CollectionStats};
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{EngineError, EngineResult};
use crate::shared::{GcStatusSnapshot, SharedState, CMD_TRIGGER_GC};
use crate::worker::{CollectionRegistry, CompactionWorker, GcEvent, GcEventFeed};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::info;

/// The main database handle.
///
/// Owns the directory lock, the collection registry, the shared state
/// buffer, and (when enabled) the background compaction worker.
///
/// # Example
///
/// ```rust,ignore
/// let db = Database::open(Path::new("my_db"))?;
/// let users = db.collection("users")?;
/// users.insert("user_1", json!({"name": "Alice"}))?;
/// db.close()?;
/// ```
pub struct Database {
    dir: DatabaseDir,
    config: Config,
    shared: Arc<SharedState>,
    collections: CollectionRegistry,
    worker: Mutex<Option<CompactionWorker>>,
    events: Arc<GcEventFeed>,
    is_open: AtomicBool,
}

/// Aggregate statistics, returned by [`Database::stats`].
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Per-collection statistics for every open collection.
    pub collections: Vec<CollectionStats>,
    /// Current GC cells.
    pub gc: GcStatusSnapshot,
}

impl Database {
    /// Opens a database with default configuration.
    pub fn open(path: &Path) -> EngineResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database with custom configuration.
    ///
    /// Acquires the directory lock, then starts the background worker
    /// unless `gc_enabled` is off.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::DatabaseLocked`] if another process holds
    /// the directory, or on I/O errors.
    pub fn open_with_config(path: &Path, config: Config) -> EngineResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        let shared = Arc::new(SharedState::new());
        let collections: CollectionRegistry = Arc::new(RwLock::new(HashMap::new()));
        let events = Arc::new(GcEventFeed::new());

        let worker = if config.gc_enabled {
            Some(CompactionWorker::spawn(
                Arc::clone(&shared),
                Arc::clone(&collections),
                config.gc_trigger_ratio,
                Arc::clone(&events),
            )?)
        } else {
            None
        };

        info!(path = %path.display(), gc = config.gc_enabled, "opened database");

        Ok(Self {
            dir,
            config,
            shared,
            collections,
            worker: Mutex::new(worker),
            events,
            is_open: AtomicBool::new(true),
        })
    }

    /// Returns (opening if needed) the named collection.
    pub fn collection(&self, name: &str) -> EngineResult<Arc<Collection>> {
        self.ensure_open()?;

        if let Some(collection) = self.collections.read().get(name) {
            return Ok(Arc::clone(collection));
        }

        let mut registry = self.collections.write();
        // Double-checked: another thread may have opened it meanwhile.
        if let Some(collection) = registry.get(name) {
            return Ok(Arc::clone(collection));
        }

        let collection = Arc::new(Collection::open(
            &self.dir,
            name,
            &self.config,
            Arc::clone(&self.shared),
        )?);
        registry.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Collection names present on disk.
    pub fn list_collections(&self) -> EngineResult<Vec<String>> {
        self.ensure_open()?;
        self.dir.list_collections()
    }

    /// Deletes a collection's files. Returns whether it existed.
    pub fn drop_collection(&self, name: &str) -> EngineResult<bool> {
        self.ensure_open()?;
        let in_registry = self.collections.write().remove(name).is_some();
        let on_disk = self.dir.data_path(name).exists();
        self.dir.remove_collection_files(name)?;
        Ok(in_registry || on_disk)
    }

    /// Compacts every collection on disk, returning total bytes freed.
    pub fn compact(&self) -> EngineResult<u64> {
        self.ensure_open()?;
        let mut bytes_freed = 0;
        for name in self.dir.list_collections()? {
            bytes_freed += self.collection(&name)?.compact()?;
        }
        Ok(bytes_freed)
    }

    /// Asks the background worker for a compaction pass.
    ///
    /// No-op (beyond setting the command cell) when the worker is
    /// disabled.
    pub fn trigger_gc(&self) -> EngineResult<()> {
        self.ensure_open()?;
        self.shared.send_command(CMD_TRIGGER_GC);
        Ok(())
    }

    /// Snapshots the GC status cells.
    #[must_use]
    pub fn gc_status(&self) -> GcStatusSnapshot {
        self.shared.gc_status()
    }

    /// Subscribes to worker events (completion reports, per-collection
    /// failures).
    pub fn subscribe(&self) -> Receiver<GcEvent> {
        self.events.subscribe()
    }

    /// Persists the index file of every open collection.
    pub fn persist_all_indexes(&self) -> EngineResult<()> {
        self.ensure_open()?;
        for collection in self.collections.read().values() {
            collection.persist_index()?;
        }
        Ok(())
    }

    /// Aggregate statistics over all open collections.
    #[must_use]
    pub fn stats(&self) -> DatabaseStats {
        let mut collections: Vec<CollectionStats> = self
            .collections
            .read()
            .values()
            .map(|collection| collection.stats())
            .collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));

        DatabaseStats {
            collections,
            gc: self.shared.gc_status(),
        }
    }

    /// Whether the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    /// Shuts down the worker, flushes every collection, and persists all
    /// indexes. Idempotent.
    pub fn close(&self) -> EngineResult<()> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown(&self.shared);
        }

        for collection in self.collections.read().values() {
            collection.close()?;
        }
        self.collections.write().clear();

        info!(path = %self.dir.path().display(), "closed database");
        Ok(())
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.dir.path())
            .field("open", &self.is_open())
            .field("collections", &self.collections.read().len())
            .finish_non_exhaustive()
    }
}
