//! Blob files for oversized documents.
//!
//! A document whose JSON encoding exceeds the blob threshold is written to
//! `<blobs_dir>/<id>.blob` and represented in the data file by a reference
//! slot carrying `{path, size, crc32}`. The slot's own checksum protects
//! the reference; the checksum inside the reference protects the blob
//! body.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use smoldb_codec::crc32;
use std::fs;
use std::path::PathBuf;

/// The JSON payload of a blob-reference slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// File name relative to the collection's blob directory.
    pub path: String,
    /// Size of the blob body in bytes.
    pub size: u64,
    /// CRC-32 of the blob body.
    pub crc32: u32,
}

/// Reads and writes blob files for one collection.
#[derive(Debug)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// the first write.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file_name(id: &str) -> String {
        format!("{id}.blob")
    }

    /// Writes (or overwrites) the blob for `id` and returns its reference.
    pub fn write(&self, id: &str, body: &[u8]) -> EngineResult<BlobRef> {
        fs::create_dir_all(&self.dir)?;
        let name = Self::file_name(id);
        fs::write(self.dir.join(&name), body)?;

        Ok(BlobRef {
            path: name,
            size: body.len() as u64,
            crc32: crc32(body),
        })
    }

    /// Reads and checksum-verifies the blob behind `reference`.
    pub fn read(&self, reference: &BlobRef) -> EngineResult<Vec<u8>> {
        let body = fs::read(self.dir.join(&reference.path))?;
        let actual = crc32(&body);
        if actual != reference.crc32 {
            return Err(EngineError::ChecksumMismatch {
                expected: reference.crc32,
                actual,
            });
        }
        Ok(body)
    }

    /// Deletes the blob file named by `reference`, if it exists.
    pub fn delete(&self, reference: &BlobRef) -> EngineResult<()> {
        match fs::remove_file(self.dir.join(&reference.path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes the blob for `id`, if it exists.
    pub fn delete_by_id(&self, id: &str) -> EngineResult<()> {
        match fs::remove_file(self.dir.join(Self::file_name(id))) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every blob file in this store.
    pub fn clear(&self) -> EngineResult<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a blob file exists for `id`.
    #[must_use]
    pub fn exists(&self, id: &str) -> bool {
        self.dir.join(Self::file_name(id)).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("blobs"));

        let body = vec![0xAB; 5000];
        let reference = store.write("doc_1", &body).unwrap();

        assert_eq!(reference.path, "doc_1.blob");
        assert_eq!(reference.size, 5000);
        assert_eq!(store.read(&reference).unwrap(), body);
    }

    #[test]
    fn overwrite_reuses_filename() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("blobs"));

        let first = store.write("doc_1", b"first").unwrap();
        let second = store.write("doc_1", b"second body").unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(store.read(&second).unwrap(), b"second body");
        // The stale reference now fails its checksum.
        assert!(matches!(
            store.read(&first),
            Err(EngineError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_body_detected() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("blobs"));

        let reference = store.write("doc_1", b"payload").unwrap();

        let path = dir.path().join("blobs").join("doc_1.blob");
        let mut body = std::fs::read(&path).unwrap();
        body[0] ^= 0xFF;
        std::fs::write(&path, body).unwrap();

        assert!(matches!(
            store.read(&reference),
            Err(EngineError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("blobs"));

        let reference = store.write("doc_1", b"x").unwrap();
        store.delete(&reference).unwrap();
        store.delete(&reference).unwrap();
        assert!(!store.exists("doc_1"));
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("blobs"));

        store.write("a", b"1").unwrap();
        store.write("b", b"2").unwrap();
        store.clear().unwrap();

        assert!(!store.exists("a"));
        assert!(!store.exists("b"));
    }
}
