//! Database directory management.
//!
//! File system layout:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK                     # advisory lock for single-process access
//! ├─ <collection>.data        # slot storage
//! ├─ <collection>.idx         # primary + secondary indexes
//! └─ blobs/<collection>/      # oversized documents, one file per id
//! ```
//!
//! The LOCK file ensures only one process opens the database at a time.

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const BLOBS_DIR: &str = "blobs";
const DATA_EXT: &str = "data";
const INDEX_EXT: &str = "idx";

/// Owns the database directory and its exclusive lock.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::DatabaseLocked`] if another process holds
    /// the lock, [`EngineError::NotInitialized`] if the directory is
    /// missing and `create_if_missing` is false, or on I/O errors.
    pub fn open(path: &Path, create_if_missing: bool) -> EngineResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(EngineError::NotInitialized);
            }
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The database root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a collection's data file.
    #[must_use]
    pub fn data_path(&self, collection: &str) -> PathBuf {
        self.path.join(format!("{collection}.{DATA_EXT}"))
    }

    /// Path of a collection's index file.
    #[must_use]
    pub fn index_path(&self, collection: &str) -> PathBuf {
        self.path.join(format!("{collection}.{INDEX_EXT}"))
    }

    /// Blob directory of a collection.
    #[must_use]
    pub fn blobs_dir(&self, collection: &str) -> PathBuf {
        self.path.join(BLOBS_DIR).join(collection)
    }

    /// Collection names found on disk, by scanning for `*.data` files.
    pub fn list_collections(&self) -> EngineResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(DATA_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes a collection's data file, index file, and blob directory.
    pub fn remove_collection_files(&self, collection: &str) -> EngineResult<()> {
        for path in [self.data_path(collection), self.index_path(collection)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        match fs::remove_dir_all(self.blobs_dir(collection)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
