//! The background compaction worker.
//!
//! A dedicated thread that shares the atomic cell buffer with the
//! foreground. It sleeps on the command cell with a 5-second timeout;
//! each wake-up either executes a command (trigger / shutdown) or uses
//! the published size counters to decide whether dead space has crossed
//! the trigger ratio.
//!
//! Compaction runs through the foreground's own `Collection` handles,
//! under each collection's write lock, so the worker never builds a
//! second view of a live collection. Failures are reported on the event
//! feed and never take the thread down.

use crate::collection::Collection;
use crate::shared::{
    SharedCell, SharedState, CMD_NONE, CMD_SHUTDOWN, CMD_TRIGGER_GC, GC_IDLE, GC_RUNNING,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// How long the worker sleeps between auto-trigger checks.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Events emitted by the background worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcEvent {
    /// A compaction pass began.
    Started,
    /// A compaction pass finished.
    Completed {
        /// Total bytes reclaimed across all collections.
        bytes_freed: u64,
    },
    /// Compacting one collection failed; the pass continued.
    Failed {
        /// The collection that failed.
        collection: String,
        /// The error it failed with.
        message: String,
    },
}

/// Fan-out channel for worker events.
#[derive(Debug, Default)]
pub(crate) struct GcEventFeed {
    subscribers: RwLock<Vec<Sender<GcEvent>>>,
}

impl GcEventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> Receiver<GcEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event, dropping disconnected subscribers.
    pub fn emit(&self, event: GcEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

pub(crate) type CollectionRegistry = Arc<RwLock<HashMap<String, Arc<Collection>>>>;

/// Handle to the worker thread.
pub(crate) struct CompactionWorker {
    handle: Option<JoinHandle<()>>,
}

impl CompactionWorker {
    /// Spawns the worker thread.
    pub fn spawn(
        shared: Arc<SharedState>,
        collections: CollectionRegistry,
        trigger_ratio: f64,
        events: Arc<GcEventFeed>,
    ) -> std::io::Result<Self> {
        let handle = std::thread::Builder::new()
            .name("smoldb-gc".to_string())
            .spawn(move || worker_loop(&shared, &collections, trigger_ratio, &events))?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Signals shutdown and joins the thread.
    pub fn shutdown(mut self, shared: &SharedState) {
        shared.send_command(CMD_SHUTDOWN);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    shared: &SharedState,
    collections: &CollectionRegistry,
    trigger_ratio: f64,
    events: &GcEventFeed,
) {
    debug!("compaction worker started");
    loop {
        match shared.wait_command(POLL_INTERVAL) {
            CMD_SHUTDOWN => break,
            CMD_TRIGGER_GC => {
                // Consume the command first so a shutdown arriving during
                // the pass is seen on the next iteration.
                shared.store(SharedCell::Command, CMD_NONE);
                run_gc(shared, collections, events);
            }
            _ => {
                if should_auto_trigger(shared, trigger_ratio) {
                    debug!("dead-space ratio exceeded, compacting");
                    run_gc(shared, collections, events);
                }
            }
        }
    }
    debug!("compaction worker stopped");
}

fn should_auto_trigger(shared: &SharedState, trigger_ratio: f64) -> bool {
    if shared.load(SharedCell::GcStatus) != GC_IDLE {
        return false;
    }
    let file_size = f64::from(shared.load(SharedCell::FileSize));
    let live = f64::from(shared.load(SharedCell::LiveDataSize));
    live > 0.0 && file_size / live > trigger_ratio
}

fn run_gc(shared: &SharedState, collections: &CollectionRegistry, events: &GcEventFeed) {
    shared.store(SharedCell::GcStatus, GC_RUNNING);
    shared.store(SharedCell::GcProgress, 0);
    events.emit(GcEvent::Started);

    // Snapshot the registry; collections opened mid-pass wait for the
    // next one.
    let mut snapshot: Vec<(String, Arc<Collection>)> = collections
        .read()
        .iter()
        .map(|(name, collection)| (name.clone(), Arc::clone(collection)))
        .collect();
    snapshot.sort_by(|a, b| a.0.cmp(&b.0));

    let total = snapshot.len();
    let mut bytes_freed = 0u64;

    for (i, (name, collection)) in snapshot.into_iter().enumerate() {
        match collection.compact() {
            Ok(freed) => bytes_freed += freed,
            Err(e) => {
                warn!(collection = name.as_str(), error = %e, "compaction failed");
                events.emit(GcEvent::Failed {
                    collection: name,
                    message: e.to_string(),
                });
            }
        }
        let progress = ((i + 1) * 100 / total.max(1)) as u32;
        shared.store(SharedCell::GcProgress, progress);
    }

    shared.store(
        SharedCell::GcBytesFreed,
        u32::try_from(bytes_freed).unwrap_or(u32::MAX),
    );
    shared.store(SharedCell::GcProgress, 100);
    shared.store(SharedCell::GcStatus, GC_IDLE);
    events.emit(GcEvent::Completed { bytes_freed });
}
