//! Data-file compaction.
//!
//! Compaction rebuilds the data file so that only live slots remain,
//! packed back-to-back at their minimal slab classes, then atomically
//! swaps the new file over the old one. Blob bodies are untouched; only
//! their reference slots move.
//!
//! ## Invariants
//!
//! - Compaction never changes logical state: every live document reads
//!   back identically before and after.
//! - Output order is the primary index's insertion order, so compacting
//!   an already-compacted file reproduces it byte for byte.
//! - The caller holds the write lock for the whole rebuild; no foreground
//!   mutation can observe a half-rewritten file.

use crate::error::EngineResult;
use crate::slab::slab_for_payload;
use crate::store::blob::BlobRef;
use crate::store::engine::WriteBatch;
use crate::store::header::DataFileHeader;
use crate::store::slot::build_slot;
use crate::types::{DocumentLocation, DATA_HEADER_SIZE};
use tracing::info;

/// Result of a compaction run.
#[derive(Debug)]
pub struct CompactionOutcome {
    /// Bytes reclaimed (`old file size − new file size`).
    pub bytes_freed: u64,
    /// Replacement locations for every live document, in input order.
    pub new_locations: Vec<(String, DocumentLocation)>,
}

impl WriteBatch<'_> {
    /// Rebuilds the data file from the given live entries.
    ///
    /// `entries` must be the primary index's `(id, location)` pairs in
    /// insertion order. Returns the bytes freed and the new location of
    /// every document; the caller is responsible for installing the new
    /// locations into the primary index and persisting it.
    ///
    /// # Errors
    ///
    /// Fails if any live slot fails validation, or if the file swap
    /// fails — in which case the old file and in-memory state are left
    /// untouched.
    pub fn compact(
        &mut self,
        entries: &[(String, DocumentLocation)],
    ) -> EngineResult<CompactionOutcome> {
        let old_file_size = self.state.header.file_size;

        let mut slots = Vec::new();
        let mut new_locations = Vec::with_capacity(entries.len());
        let mut packed = DATA_HEADER_SIZE;
        let mut live_data_size = 0u64;

        for (id, old) in entries {
            // For inline slots this is the document JSON; for blob slots
            // it is the reference JSON. Either way the payload is copied
            // verbatim with a freshly computed checksum.
            let payload = self.engine.read_slot_payload(old)?;

            live_data_size += if old.is_blob {
                serde_json::from_slice::<BlobRef>(&payload)?.size
            } else {
                payload.len() as u64
            };

            // An in-place update may have left the old slab oversized;
            // the rebuilt slot shrinks to its minimal class.
            let slab = slab_for_payload(payload.len() as u32);
            slots.extend_from_slice(&build_slot(&payload, slab, old.is_blob));

            new_locations.push((
                id.clone(),
                DocumentLocation {
                    offset: packed,
                    length: payload.len() as u32,
                    slab_size: slab,
                    is_blob: old.is_blob,
                },
            ));
            packed += u64::from(slab);
        }

        let header = DataFileHeader {
            file_size: packed,
            live_data_size,
            document_count: entries.len() as u64,
            next_slot_offset: packed,
        };

        let mut file = header.encode();
        file.extend_from_slice(&slots);
        self.engine.backend().write().replace(&file)?;

        self.state.header = header;
        self.state.free.clear();
        self.engine.shared().publish_counters(
            header.file_size,
            header.live_data_size,
            header.document_count,
        );
        self.engine.engine_stats().record_compaction();

        let bytes_freed = old_file_size.saturating_sub(packed);
        info!(
            path = self.engine.path_label(),
            bytes_freed,
            documents = entries.len(),
            "compacted data file"
        );

        Ok(CompactionOutcome {
            bytes_freed,
            new_locations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::SharedState;
    use crate::stats::EngineStats;
    use crate::store::engine::StorageEngine;
    use smoldb_storage::InMemoryBackend;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn mem_engine(dir: &TempDir, threshold: usize) -> StorageEngine {
        StorageEngine::with_backend(
            Box::new(InMemoryBackend::new()),
            "test.data".to_string(),
            dir.path().join("blobs"),
            threshold,
            Arc::new(SharedState::new()),
            Arc::new(EngineStats::new()),
        )
        .unwrap()
    }

    #[test]
    fn compaction_reclaims_deleted_space() {
        let dir = tempdir().unwrap();
        let engine = mem_engine(&dir, 1024 * 1024);

        let mut entries = Vec::new();
        for i in 0..10 {
            let id = format!("doc_{i}");
            let loc = engine
                .batch(|b| b.write(&id, &vec![i as u8; 128]))
                .unwrap();
            entries.push((id, loc));
        }

        // Delete every other document.
        let mut live = Vec::new();
        for (i, (id, loc)) in entries.into_iter().enumerate() {
            if i % 2 == 0 {
                engine.batch(|b| b.delete(loc)).unwrap();
            } else {
                live.push((id, loc));
            }
        }

        let before = engine.stats();
        let outcome = engine.batch(|b| b.compact(&live)).unwrap();

        assert!(outcome.bytes_freed > 0);
        let after = engine.stats();
        assert!(after.file_size < before.file_size);
        assert_eq!(after.file_size, DATA_HEADER_SIZE + 5 * 1024);
        assert_eq!(after.document_count, 5);
        assert_eq!(after.free_slots, 0);

        // Survivors read back through their new locations.
        for (i, (_, loc)) in outcome.new_locations.iter().enumerate() {
            let expected = vec![(i * 2 + 1) as u8; 128];
            assert_eq!(engine.read(loc).unwrap(), expected);
        }
    }

    #[test]
    fn compaction_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.data");
        let engine = StorageEngine::open(
            &path,
            dir.path().join("blobs"),
            1024 * 1024,
            Arc::new(SharedState::new()),
            Arc::new(EngineStats::new()),
        )
        .unwrap();

        let mut live = Vec::new();
        for i in 0..4 {
            let id = format!("doc_{i}");
            let loc = engine.batch(|b| b.write(&id, &vec![i as u8; 64])).unwrap();
            if i % 2 == 0 {
                live.push((id, loc));
            } else {
                engine.batch(|b| b.delete(loc)).unwrap();
            }
        }

        let first = engine.batch(|b| b.compact(&live)).unwrap();
        assert!(first.bytes_freed > 0);
        let after_first = std::fs::read(&path).unwrap();

        let second = engine.batch(|b| b.compact(&first.new_locations)).unwrap();
        assert_eq!(second.bytes_freed, 0);
        let after_second = std::fs::read(&path).unwrap();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn compaction_shrinks_oversized_slabs() {
        let dir = tempdir().unwrap();
        let engine = mem_engine(&dir, 1024 * 1024);

        // Allocate an 8 KiB slab, then shrink the payload in place.
        let loc = engine.batch(|b| b.write("doc", &vec![1u8; 2000])).unwrap();
        let loc = engine
            .batch(|b| b.update("doc", &[2u8; 100], loc))
            .unwrap();
        assert_eq!(loc.slab_size, 8192);

        let outcome = engine
            .batch(|b| b.compact(&[("doc".to_string(), loc)]))
            .unwrap();

        let (_, new_loc) = &outcome.new_locations[0];
        assert_eq!(new_loc.slab_size, 1024);
        assert_eq!(engine.read(new_loc).unwrap(), vec![2u8; 100]);
    }

    #[test]
    fn blob_references_survive_compaction() {
        let dir = tempdir().unwrap();
        let engine = mem_engine(&dir, 256);

        let body = vec![b'x'; 5000];
        let loc = engine.batch(|b| b.write("blobby", &body)).unwrap();
        let filler = engine.batch(|b| b.write("filler", &[0u8; 10])).unwrap();
        engine.batch(|b| b.delete(filler)).unwrap();

        let outcome = engine
            .batch(|b| b.compact(&[("blobby".to_string(), loc)]))
            .unwrap();

        let (_, new_loc) = &outcome.new_locations[0];
        assert!(new_loc.is_blob);
        assert_eq!(engine.read(new_loc).unwrap(), body);
        // Accounting uses the blob's own size, not the reference slot's.
        assert_eq!(engine.stats().live_data_size, 5000);
    }

    #[test]
    fn empty_collection_compacts_to_bare_header() {
        let dir = tempdir().unwrap();
        let engine = mem_engine(&dir, 1024 * 1024);

        let loc = engine.batch(|b| b.write("doc", &[1u8; 100])).unwrap();
        engine.batch(|b| b.delete(loc)).unwrap();

        let outcome = engine.batch(|b| b.compact(&[])).unwrap();
        assert_eq!(outcome.bytes_freed, 1024);
        assert_eq!(engine.stats().file_size, DATA_HEADER_SIZE);
    }
}
