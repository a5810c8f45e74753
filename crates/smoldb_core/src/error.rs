//! Error types for SmolDB core operations.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in SmolDB core operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] smoldb_storage::StorageError),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `insert` was called with an id that already exists.
    #[error("duplicate id: {id}")]
    DuplicateId {
        /// The offending document id.
        id: String,
    },

    /// `update` was called with an id that does not exist.
    #[error("document not found: {id}")]
    DocumentNotFound {
        /// The missing document id.
        id: String,
    },

    /// A slot header is invalid, its ACTIVE bit is unexpectedly clear, or
    /// the slot extends beyond the end of the file.
    #[error("corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset of the damaged slot.
        offset: u64,
        /// Description of what failed validation.
        message: String,
    },

    /// CRC mismatch on a slot payload or blob body.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum recorded on disk.
        expected: u32,
        /// Checksum computed from the bytes read.
        actual: u32,
    },

    /// Wrong magic bytes or unsupported format version.
    #[error("invalid file format in {path}: {reason}")]
    InvalidFileFormat {
        /// Path of the offending file.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The index file is shorter than its header or otherwise malformed.
    #[error("index corrupted: {message}")]
    IndexCorrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A document exceeds the maximum supported encoded size.
    ///
    /// Currently informational; no upper bound is enforced.
    #[error("document too large: {size} bytes (limit {limit})")]
    DocumentTooLarge {
        /// Encoded size of the document.
        size: u64,
        /// The configured limit.
        limit: u64,
    },

    /// An operation was issued before the database was opened, or after it
    /// was closed.
    #[error("database not initialized")]
    NotInitialized,

    /// Another process holds the database lock.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,
}

impl EngineError {
    /// Creates a corrupted-data error.
    pub fn corrupted_data(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid-file-format error.
    pub fn invalid_file_format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFileFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an index-corrupted error.
    pub fn index_corrupted(message: impl Into<String>) -> Self {
        Self::IndexCorrupted {
            message: message.into(),
        }
    }

    /// Creates a duplicate-id error.
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Creates a document-not-found error.
    pub fn document_not_found(id: impl Into<String>) -> Self {
        Self::DocumentNotFound { id: id.into() }
    }
}
