//! The 64-byte data-file header.

use crate::error::{EngineError, EngineResult};
use crate::types::{DATA_HEADER_SIZE, DATA_MAGIC, FORMAT_VERSION};
use smoldb_codec::{write_u32, write_u64, ByteReader};

/// In-memory mirror of the data-file header.
///
/// The header is written at offset 0 on every metadata flush and is the
/// authoritative record of the file's logical extent: bytes beyond
/// `next_slot_offset` are ignored on reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFileHeader {
    /// Logical file size in bytes (equals `next_slot_offset`).
    pub file_size: u64,
    /// Sum of live payload bytes (blob bodies counted at their own size).
    pub live_data_size: u64,
    /// Number of live documents.
    pub document_count: u64,
    /// Offset at which the next appended slot begins.
    pub next_slot_offset: u64,
}

impl DataFileHeader {
    /// Header for a freshly created, empty data file.
    #[must_use]
    pub fn new_empty() -> Self {
        Self {
            file_size: DATA_HEADER_SIZE,
            live_data_size: 0,
            document_count: 0,
            next_slot_offset: DATA_HEADER_SIZE,
        }
    }

    /// Encodes the header into its 64-byte on-disk form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DATA_HEADER_SIZE as usize);
        write_u32(&mut buf, DATA_MAGIC);
        write_u32(&mut buf, FORMAT_VERSION);
        write_u64(&mut buf, self.file_size);
        write_u64(&mut buf, self.live_data_size);
        write_u64(&mut buf, self.document_count);
        write_u64(&mut buf, self.next_slot_offset);
        buf.resize(DATA_HEADER_SIZE as usize, 0);
        buf
    }

    /// Decodes and validates a header read from `path`.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::InvalidFileFormat`] on a short header,
    /// wrong magic, or unsupported version.
    pub fn decode(data: &[u8], path: &str) -> EngineResult<Self> {
        if data.len() < DATA_HEADER_SIZE as usize {
            return Err(EngineError::invalid_file_format(
                path,
                format!("header truncated: {} bytes", data.len()),
            ));
        }

        let mut r = ByteReader::new(data);
        let magic = r
            .read_u32()
            .map_err(|e| EngineError::invalid_file_format(path, e.to_string()))?;
        if magic != DATA_MAGIC {
            return Err(EngineError::invalid_file_format(
                path,
                format!("bad magic {magic:#010x}"),
            ));
        }

        let version = r
            .read_u32()
            .map_err(|e| EngineError::invalid_file_format(path, e.to_string()))?;
        if version != FORMAT_VERSION {
            return Err(EngineError::invalid_file_format(
                path,
                format!("unsupported version {version}"),
            ));
        }

        let read = |r: &mut ByteReader<'_>| {
            r.read_u64()
                .map_err(|e| EngineError::invalid_file_format(path, e.to_string()))
        };

        Ok(Self {
            file_size: read(&mut r)?,
            live_data_size: read(&mut r)?,
            document_count: read(&mut r)?,
            next_slot_offset: read(&mut r)?,
        })
    }
}
