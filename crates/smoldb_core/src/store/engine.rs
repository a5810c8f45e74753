//! The per-collection storage engine.
//!
//! Owns the data-file handle, the in-memory header, and the free list.
//! All mutations run under a single write lock (the engine state mutex);
//! reads go straight to the backend and validate the slot they land on,
//! so they never contend with writers.
//!
//! ## Write protocol
//!
//! Inserts route to an inline slot or, beyond `blob_threshold`, to a blob
//! file plus a reference slot. Updates rewrite in place when the new
//! payload fits the existing slab, otherwise they free the old slot and
//! relocate. Deletes clear the ACTIVE bit with a 4-byte positional write
//! and recycle the slot through the free list.
//!
//! There is no durability fence: writes are positional writes to an open
//! handle, and the in-memory header is only written back at batch
//! boundaries. On reopen the header is authoritative; trailing bytes
//! beyond `next_slot_offset` are ignored.

use crate::error::{EngineError, EngineResult};
use crate::shared::SharedState;
use crate::slab::{slab_for_payload, FreeList, FreeSlot};
use crate::stats::EngineStats;
use crate::store::blob::{BlobRef, BlobStore};
use crate::store::header::DataFileHeader;
use crate::store::slot::{build_slot, build_slot_prefix, SlotHeader, FLAG_BLOB};
use crate::types::{DocumentLocation, DATA_HEADER_SIZE, SLOT_HEADER_SIZE};
use parking_lot::{Mutex, MutexGuard, RwLock};
use smoldb_codec::crc32;
use smoldb_storage::{FileBackend, StorageBackend, StorageError};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Mutable engine state guarded by the write lock.
pub(crate) struct EngineState {
    pub(crate) header: DataFileHeader,
    pub(crate) free: FreeList,
    batch_depth: u32,
    meta_dirty: bool,
}

/// Point-in-time storage counters, returned by [`StorageEngine::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Logical data-file size in bytes.
    pub file_size: u64,
    /// Sum of live payload bytes.
    pub live_data_size: u64,
    /// Number of live documents.
    pub document_count: u64,
    /// Offset of the next appended slot.
    pub next_slot_offset: u64,
    /// Entries currently on the free list.
    pub free_slots: usize,
}

/// The slab-allocating storage engine for one collection.
pub struct StorageEngine {
    path_label: String,
    backend: RwLock<Box<dyn StorageBackend>>,
    state: Mutex<EngineState>,
    blobs: BlobStore,
    shared: Arc<SharedState>,
    stats: Arc<EngineStats>,
    blob_threshold: usize,
}

impl StorageEngine {
    /// Opens or creates the data file at `data_path`.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::InvalidFileFormat`] if an existing file
    /// has the wrong magic or version, or on I/O errors.
    pub fn open(
        data_path: &Path,
        blob_dir: std::path::PathBuf,
        blob_threshold: usize,
        shared: Arc<SharedState>,
        stats: Arc<EngineStats>,
    ) -> EngineResult<Self> {
        let backend = FileBackend::open_with_create_dirs(data_path)?;
        Self::with_backend(
            Box::new(backend),
            data_path.display().to_string(),
            blob_dir,
            blob_threshold,
            shared,
            stats,
        )
    }

    /// Opens an engine over an arbitrary backend.
    ///
    /// # Errors
    ///
    /// Same conditions as [`StorageEngine::open`].
    pub fn with_backend(
        mut backend: Box<dyn StorageBackend>,
        path_label: String,
        blob_dir: std::path::PathBuf,
        blob_threshold: usize,
        shared: Arc<SharedState>,
        stats: Arc<EngineStats>,
    ) -> EngineResult<Self> {
        let size = backend.size()?;
        let header = if size == 0 {
            let header = DataFileHeader::new_empty();
            backend.write_at(0, &header.encode())?;
            header
        } else {
            let bytes = backend
                .read_at(0, DATA_HEADER_SIZE as usize)
                .map_err(|_| {
                    EngineError::invalid_file_format(&path_label, "file shorter than header")
                })?;
            DataFileHeader::decode(&bytes, &path_label)?
        };

        shared.publish_counters(
            header.file_size,
            header.live_data_size,
            header.document_count,
        );

        Ok(Self {
            path_label,
            backend: RwLock::new(backend),
            state: Mutex::new(EngineState {
                header,
                free: FreeList::new(),
                batch_depth: 0,
                meta_dirty: false,
            }),
            blobs: BlobStore::new(blob_dir),
            shared,
            stats,
            blob_threshold,
        })
    }

    /// Path label used in error messages.
    #[must_use]
    pub fn path_label(&self) -> &str {
        &self.path_label
    }

    pub(crate) fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Runs `f` with the write lock held, flushing metadata on exit.
    ///
    /// Nested use goes through the same [`WriteBatch`] handle; the flush
    /// happens once, when the outermost batch ends.
    pub fn batch<T>(
        &self,
        f: impl FnOnce(&mut WriteBatch<'_>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut state = self.state.lock();
        state.batch_depth += 1;

        let mut batch = WriteBatch {
            engine: self,
            state,
        };
        let result = f(&mut batch);

        let mut state = batch.state;
        state.batch_depth -= 1;
        if state.batch_depth == 0 && state.meta_dirty {
            let flushed = self.flush_metadata(&mut state);
            if result.is_ok() {
                flushed?;
            }
        }
        result
    }

    /// Reads and validates the document payload at `location`.
    ///
    /// Blob references are followed transparently: the returned bytes are
    /// always the document's JSON encoding.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::CorruptedData`] on an inactive or
    /// malformed slot and [`EngineError::ChecksumMismatch`] on CRC
    /// failures in the slot payload or blob body.
    pub fn read(&self, location: &DocumentLocation) -> EngineResult<Vec<u8>> {
        let payload = self.read_slot_payload(location)?;
        if location.is_blob {
            let reference: BlobRef = serde_json::from_slice(&payload)?;
            let body = self.blobs.read(&reference)?;
            self.stats.record_read(body.len() as u64);
            Ok(body)
        } else {
            self.stats.record_read(payload.len() as u64);
            Ok(payload)
        }
    }

    /// Reads the validated slot payload without blob indirection.
    pub(crate) fn read_slot_payload(&self, location: &DocumentLocation) -> EngineResult<Vec<u8>> {
        let len = SLOT_HEADER_SIZE as usize + location.length as usize;
        let buf = match self.backend.read().read_at(location.offset, len) {
            Ok(buf) => buf,
            Err(StorageError::ReadPastEnd { .. }) => {
                return Err(EngineError::corrupted_data(
                    location.offset,
                    "slot extends beyond end of file",
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let header = SlotHeader::decode(&buf).ok_or_else(|| {
            EngineError::corrupted_data(location.offset, "slot header truncated")
        })?;

        if !header.is_active() {
            return Err(EngineError::corrupted_data(
                location.offset,
                "slot is not active",
            ));
        }
        if header.data_length != location.length {
            return Err(EngineError::corrupted_data(
                location.offset,
                format!(
                    "length mismatch: slot says {}, index says {}",
                    header.data_length, location.length
                ),
            ));
        }
        if header.is_blob() != location.is_blob {
            return Err(EngineError::corrupted_data(
                location.offset,
                "blob flag mismatch",
            ));
        }

        let payload = &buf[SLOT_HEADER_SIZE as usize..];
        let actual = crc32(payload);
        if actual != header.crc32 {
            return Err(EngineError::ChecksumMismatch {
                expected: header.crc32,
                actual,
            });
        }

        Ok(payload.to_vec())
    }

    /// Reads the blob reference stored at `location`.
    pub(crate) fn read_blob_ref(&self, location: &DocumentLocation) -> EngineResult<BlobRef> {
        let payload = self.read_slot_payload(location)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Truncates the data file to a fresh, empty state.
    ///
    /// Blob files are not touched; callers clear them separately.
    pub fn reset(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        let header = DataFileHeader::new_empty();

        {
            let mut backend = self.backend.write();
            backend.truncate(0)?;
            backend.write_at(0, &header.encode())?;
        }

        state.header = header;
        state.free.clear();
        state.meta_dirty = false;
        self.shared.publish_counters(
            header.file_size,
            header.live_data_size,
            header.document_count,
        );
        Ok(())
    }

    /// Writes the header back and publishes counters, if anything changed.
    pub fn flush(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.meta_dirty {
            self.flush_metadata(&mut state)?;
        }
        Ok(())
    }

    /// Snapshots the storage counters.
    #[must_use]
    pub fn stats(&self) -> StorageStats {
        let state = self.state.lock();
        StorageStats {
            file_size: state.header.file_size,
            live_data_size: state.header.live_data_size,
            document_count: state.header.document_count,
            next_slot_offset: state.header.next_slot_offset,
            free_slots: state.free.len(),
        }
    }

    pub(crate) fn backend(&self) -> &RwLock<Box<dyn StorageBackend>> {
        &self.backend
    }

    pub(crate) fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub(crate) fn engine_stats(&self) -> &EngineStats {
        &self.stats
    }

    fn flush_metadata(&self, state: &mut EngineState) -> EngineResult<()> {
        self.backend.write().write_at(0, &state.header.encode())?;
        self.shared.publish_counters(
            state.header.file_size,
            state.header.live_data_size,
            state.header.document_count,
        );
        state.meta_dirty = false;
        Ok(())
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StorageEngine")
            .field("path", &self.path_label)
            .field("document_count", &state.header.document_count)
            .field("file_size", &state.header.file_size)
            .field("free_slots", &state.free.len())
            .finish_non_exhaustive()
    }
}

/// Write-lock handle for one or more mutations.
///
/// Obtained through [`StorageEngine::batch`]; every mutation method runs
/// under the held lock, and the data-file header is flushed once when the
/// batch ends.
pub struct WriteBatch<'a> {
    pub(crate) engine: &'a StorageEngine,
    pub(crate) state: MutexGuard<'a, EngineState>,
}

impl WriteBatch<'_> {
    /// Inserts a new document payload and returns its location.
    pub fn write(&mut self, id: &str, payload: &[u8]) -> EngineResult<DocumentLocation> {
        let location = if payload.len() > self.engine.blob_threshold {
            let reference = self.engine.blobs.write(id, payload)?;
            let ref_bytes = serde_json::to_vec(&reference)?;
            self.write_slot(&ref_bytes, true)?
        } else {
            self.write_slot(payload, false)?
        };

        self.state.header.document_count += 1;
        self.state.header.live_data_size += payload.len() as u64;
        self.state.meta_dirty = true;
        Ok(location)
    }

    /// Replaces the document at `old` with `payload`.
    ///
    /// Rewrites in place when the new encoding fits the existing slab,
    /// otherwise relocates; handles every inline/blob transition.
    pub fn update(
        &mut self,
        id: &str,
        payload: &[u8],
        old: DocumentLocation,
    ) -> EngineResult<DocumentLocation> {
        let old_payload_bytes: u64 = if old.is_blob {
            self.engine.read_blob_ref(&old)?.size
        } else {
            u64::from(old.length)
        };

        let new_is_blob = payload.len() > self.engine.blob_threshold;

        let location = match (old.is_blob, new_is_blob) {
            (false, false) => {
                if payload.len() as u32 + SLOT_HEADER_SIZE <= old.slab_size {
                    self.rewrite_in_place(&old, payload, false)?
                } else {
                    self.free_slot(&old)?;
                    self.write_slot(payload, false)?
                }
            }
            (false, true) => {
                self.free_slot(&old)?;
                let reference = self.engine.blobs.write(id, payload)?;
                let ref_bytes = serde_json::to_vec(&reference)?;
                self.write_slot(&ref_bytes, true)?
            }
            (true, true) => {
                let reference = self.engine.blobs.write(id, payload)?;
                let ref_bytes = serde_json::to_vec(&reference)?;
                if ref_bytes.len() as u32 + SLOT_HEADER_SIZE <= old.slab_size {
                    self.rewrite_in_place(&old, &ref_bytes, true)?
                } else {
                    self.free_slot(&old)?;
                    self.write_slot(&ref_bytes, true)?
                }
            }
            (true, false) => {
                self.engine.blobs.delete_by_id(id)?;
                self.free_slot(&old)?;
                self.write_slot(payload, false)?
            }
        };

        let header = &mut self.state.header;
        header.live_data_size = header
            .live_data_size
            .saturating_sub(old_payload_bytes)
            + payload.len() as u64;
        self.state.meta_dirty = true;
        Ok(location)
    }

    /// Deletes the document at `old`, recycling its slot.
    pub fn delete(&mut self, old: DocumentLocation) -> EngineResult<()> {
        let freed_bytes = if old.is_blob {
            let reference = self.engine.read_blob_ref(&old)?;
            self.engine.blobs.delete(&reference)?;
            reference.size
        } else {
            u64::from(old.length)
        };

        self.free_slot(&old)?;

        let header = &mut self.state.header;
        header.live_data_size = header.live_data_size.saturating_sub(freed_bytes);
        header.document_count = header.document_count.saturating_sub(1);
        self.state.meta_dirty = true;
        self.engine.stats.record_delete();
        Ok(())
    }

    /// Bulk-inserts inline-sized payloads with a single contiguous write.
    ///
    /// If any item exceeds the blob threshold, the call degrades to a
    /// regular per-item sequence under the same held lock.
    pub fn write_many(
        &mut self,
        items: &[(String, Vec<u8>)],
    ) -> EngineResult<Vec<DocumentLocation>> {
        if items
            .iter()
            .any(|(_, payload)| payload.len() > self.engine.blob_threshold)
        {
            return items
                .iter()
                .map(|(id, payload)| self.write(id, payload))
                .collect();
        }

        let start = self.state.header.next_slot_offset;
        let mut buf = Vec::new();
        let mut locations = Vec::with_capacity(items.len());
        let mut offset = start;
        let mut payload_bytes = 0u64;

        for (_, payload) in items {
            let slab = slab_for_payload(payload.len() as u32);
            buf.extend_from_slice(&build_slot(payload, slab, false));
            locations.push(DocumentLocation {
                offset,
                length: payload.len() as u32,
                slab_size: slab,
                is_blob: false,
            });
            offset += u64::from(slab);
            payload_bytes += payload.len() as u64;
        }

        self.engine.backend.write().write_at(start, &buf)?;

        let header = &mut self.state.header;
        header.next_slot_offset = offset;
        header.file_size = offset;
        header.document_count += items.len() as u64;
        header.live_data_size += payload_bytes;
        self.state.meta_dirty = true;
        self.engine.stats.record_write(payload_bytes);

        debug!(
            items = items.len(),
            bytes = buf.len(),
            "bulk write at offset {start}"
        );
        Ok(locations)
    }

    /// Allocates a slot (free-list first fit, then append) and writes a
    /// complete slab-sized buffer into it.
    fn write_slot(&mut self, payload: &[u8], is_blob: bool) -> EngineResult<DocumentLocation> {
        let needed = slab_for_payload(payload.len() as u32);
        let (offset, slab_size, reused) = match self.state.free.take_first_fit(needed) {
            Some(free) => (free.offset, free.slab_size, true),
            None => (self.state.header.next_slot_offset, needed, false),
        };

        let buf = build_slot(payload, slab_size, is_blob);
        if let Err(e) = self.engine.backend.write().write_at(offset, &buf) {
            // Put the slot back so a failed write doesn't leak it.
            if reused {
                self.state.free.push(FreeSlot { offset, slab_size });
            }
            return Err(e.into());
        }

        if !reused {
            self.state.header.next_slot_offset += u64::from(slab_size);
            self.state.header.file_size += u64::from(slab_size);
        }
        self.engine.stats.record_write(payload.len() as u64);

        Ok(DocumentLocation {
            offset,
            length: payload.len() as u32,
            slab_size,
            is_blob,
        })
    }

    /// Rewrites header + payload at the slot's existing offset.
    fn rewrite_in_place(
        &mut self,
        old: &DocumentLocation,
        payload: &[u8],
        is_blob: bool,
    ) -> EngineResult<DocumentLocation> {
        let buf = build_slot_prefix(payload, old.slab_size, is_blob);
        self.engine.backend.write().write_at(old.offset, &buf)?;
        self.engine.stats.record_write(payload.len() as u64);

        Ok(DocumentLocation {
            offset: old.offset,
            length: payload.len() as u32,
            slab_size: old.slab_size,
            is_blob,
        })
    }

    /// Clears the slot's ACTIVE bit on disk and adds it to the free list.
    fn free_slot(&mut self, old: &DocumentLocation) -> EngineResult<()> {
        let flags: u32 = if old.is_blob { FLAG_BLOB } else { 0 };
        self.engine
            .backend
            .write()
            .write_at(old.offset, &flags.to_le_bytes())?;
        self.state.free.push(FreeSlot {
            offset: old.offset,
            slab_size: old.slab_size,
        });
        Ok(())
    }
}
