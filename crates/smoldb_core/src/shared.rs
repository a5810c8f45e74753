//! Shared state between the foreground and the compaction worker.
//!
//! Eight `u32` cells mirroring a 64-byte shared buffer. Counters and
//! status are only ever touched through atomic load/store; the command
//! cell is additionally paired with a condvar so the worker can sleep
//! between commands instead of spinning.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Cell indices within the shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SharedCell {
    /// Data-file size published on every metadata flush.
    FileSize = 0,
    /// Live payload bytes published on every metadata flush.
    LiveDataSize = 1,
    /// Document count published on every metadata flush.
    DocCount = 2,
    /// Compaction status (`GC_IDLE` / `GC_RUNNING` / `GC_COMPLETE`).
    GcStatus = 3,
    /// Compaction progress, 0–100.
    GcProgress = 4,
    /// Bytes freed by the last compaction run.
    GcBytesFreed = 5,
    /// Reserved.
    Lock = 6,
    /// Worker command (`CMD_NONE` / `CMD_TRIGGER_GC` / `CMD_SHUTDOWN`).
    Command = 7,
}

/// GC status: worker idle.
pub const GC_IDLE: u32 = 0;
/// GC status: compaction in progress.
pub const GC_RUNNING: u32 = 1;
/// GC status: compaction finished (transient; the worker returns to idle).
pub const GC_COMPLETE: u32 = 2;

/// Command: nothing requested.
pub const CMD_NONE: u32 = 0;
/// Command: run a compaction pass now.
pub const CMD_TRIGGER_GC: u32 = 1;
/// Command: worker should exit.
pub const CMD_SHUTDOWN: u32 = 2;

/// The shared buffer of atomic cells.
#[derive(Debug, Default)]
pub struct SharedState {
    cells: [AtomicU32; 8],
    signal: Mutex<()>,
    signal_cv: Condvar,
}

impl SharedState {
    /// Creates a zeroed shared state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically loads a cell.
    #[must_use]
    pub fn load(&self, cell: SharedCell) -> u32 {
        self.cells[cell as usize].load(Ordering::SeqCst)
    }

    /// Atomically stores a cell.
    pub fn store(&self, cell: SharedCell, value: u32) {
        self.cells[cell as usize].store(value, Ordering::SeqCst);
    }

    /// Publishes the counters updated on every write-path flush.
    ///
    /// Values beyond `u32::MAX` saturate; the cells are 32-bit by layout.
    pub fn publish_counters(&self, file_size: u64, live_data_size: u64, doc_count: u64) {
        let clamp = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);
        self.store(SharedCell::FileSize, clamp(file_size));
        self.store(SharedCell::LiveDataSize, clamp(live_data_size));
        self.store(SharedCell::DocCount, clamp(doc_count));
    }

    /// Stores a command and wakes the worker.
    pub fn send_command(&self, command: u32) {
        let _guard = self.signal.lock();
        self.store(SharedCell::Command, command);
        self.signal_cv.notify_all();
    }

    /// Blocks until a command arrives or `timeout` elapses, then returns
    /// the current command cell.
    ///
    /// A command stored before this call is observed immediately; the
    /// check happens under the signal lock, so no wake-up can be lost.
    pub fn wait_command(&self, timeout: Duration) -> u32 {
        let mut guard = self.signal.lock();
        if self.load(SharedCell::Command) != CMD_NONE {
            return self.load(SharedCell::Command);
        }
        let _ = self.signal_cv.wait_for(&mut guard, timeout);
        self.load(SharedCell::Command)
    }
}

/// Point-in-time view of the GC cells, returned by
/// [`crate::Database::gc_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStatusSnapshot {
    /// Current status (`GC_IDLE` / `GC_RUNNING` / `GC_COMPLETE`).
    pub status: u32,
    /// Progress of the current or last run, 0–100.
    pub progress: u32,
    /// Bytes freed by the last completed run.
    pub bytes_freed: u32,
}

impl SharedState {
    /// Snapshots the GC cells.
    #[must_use]
    pub fn gc_status(&self) -> GcStatusSnapshot {
        GcStatusSnapshot {
            status: self.load(SharedCell::GcStatus),
            progress: self.load(SharedCell::GcProgress),
            bytes_freed: self.load(SharedCell::GcBytesFreed),
        }
    }
}
