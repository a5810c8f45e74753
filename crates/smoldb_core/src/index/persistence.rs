//! Binary persistence of the index file.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! 0..4    magic "SIDX"
//! 4..8    version
//! 8..10   secondary index count (u16)
//! 10..14  primary entry count (u32)
//! 14..18  primary section offset (u32)
//! 18..22  secondary section offset (u32)
//! 22..64  reserved
//! ```
//!
//! Primary entries are `(idLen u16, id, offset u64, length u32,
//! slabSize u32, flags u32)` in insertion order. Each secondary block is
//! `(pathLen u16, path, entryCount u32)` followed by
//! `(valueLen u32, value, idCount u32, ids…)` entries.
//!
//! Load and save are whole-file operations: the writer sizes one buffer
//! and the caller issues a single write.

use crate::error::{EngineError, EngineResult};
use crate::index::primary::PrimaryIndex;
use crate::index::secondary::SecondaryIndex;
use crate::types::{DocumentLocation, FORMAT_VERSION, INDEX_HEADER_SIZE, INDEX_MAGIC};
use smoldb_codec::{write_str16, write_str32, write_u16, write_u32, write_u64, ByteReader};

/// Flag bit in a primary entry: the location is a blob reference.
const ENTRY_FLAG_BLOB: u32 = 0x01;

/// Encodes the full index file image.
#[must_use]
pub fn encode_index_file(primary: &PrimaryIndex, secondaries: &[SecondaryIndex]) -> Vec<u8> {
    let mut primary_section = Vec::new();
    let entries = primary.entries();
    for (id, location) in &entries {
        write_str16(&mut primary_section, id);
        write_u64(&mut primary_section, location.offset);
        write_u32(&mut primary_section, location.length);
        write_u32(&mut primary_section, location.slab_size);
        write_u32(
            &mut primary_section,
            if location.is_blob { ENTRY_FLAG_BLOB } else { 0 },
        );
    }

    let mut secondary_section = Vec::new();
    for index in secondaries {
        write_str16(&mut secondary_section, index.path());
        let posting_entries = index.entries();
        write_u32(&mut secondary_section, posting_entries.len() as u32);
        for (key, ids) in posting_entries {
            write_str32(&mut secondary_section, key);
            let mut sorted: Vec<&String> = ids.iter().collect();
            sorted.sort();
            write_u32(&mut secondary_section, sorted.len() as u32);
            for id in sorted {
                write_str16(&mut secondary_section, id);
            }
        }
    }

    let primary_offset = INDEX_HEADER_SIZE;
    let secondary_offset = primary_offset + primary_section.len();

    let mut buf =
        Vec::with_capacity(INDEX_HEADER_SIZE + primary_section.len() + secondary_section.len());
    write_u32(&mut buf, INDEX_MAGIC);
    write_u32(&mut buf, FORMAT_VERSION);
    write_u16(&mut buf, secondaries.len() as u16);
    write_u32(&mut buf, entries.len() as u32);
    write_u32(&mut buf, primary_offset as u32);
    write_u32(&mut buf, secondary_offset as u32);
    buf.resize(INDEX_HEADER_SIZE, 0);
    buf.extend_from_slice(&primary_section);
    buf.extend_from_slice(&secondary_section);
    buf
}

/// Decodes an index file image read from `path`.
///
/// # Errors
///
/// Fails with [`EngineError::InvalidFileFormat`] on wrong magic or
/// version, and [`EngineError::IndexCorrupted`] on a short or malformed
/// file.
pub fn decode_index_file(
    data: &[u8],
    path: &str,
) -> EngineResult<(PrimaryIndex, Vec<SecondaryIndex>)> {
    if data.len() < INDEX_HEADER_SIZE {
        return Err(EngineError::index_corrupted(format!(
            "index file shorter than header: {} bytes",
            data.len()
        )));
    }

    let corrupted =
        |e: smoldb_codec::CodecError| EngineError::index_corrupted(e.to_string());

    let mut r = ByteReader::new(data);
    let magic = r.read_u32().map_err(corrupted)?;
    if magic != INDEX_MAGIC {
        return Err(EngineError::invalid_file_format(
            path,
            format!("bad index magic {magic:#010x}"),
        ));
    }
    let version = r.read_u32().map_err(corrupted)?;
    if version != FORMAT_VERSION {
        return Err(EngineError::invalid_file_format(
            path,
            format!("unsupported index version {version}"),
        ));
    }

    let secondary_count = r.read_u16().map_err(corrupted)?;
    let primary_count = r.read_u32().map_err(corrupted)?;
    let primary_offset = r.read_u32().map_err(corrupted)? as usize;
    let secondary_offset = r.read_u32().map_err(corrupted)? as usize;

    if primary_offset > data.len() || secondary_offset > data.len() {
        return Err(EngineError::index_corrupted(
            "section offset beyond end of file",
        ));
    }

    let mut primary = PrimaryIndex::new();
    let mut r = ByteReader::at(data, primary_offset);
    for _ in 0..primary_count {
        let id = r.read_str16().map_err(corrupted)?;
        let offset = r.read_u64().map_err(corrupted)?;
        let length = r.read_u32().map_err(corrupted)?;
        let slab_size = r.read_u32().map_err(corrupted)?;
        let flags = r.read_u32().map_err(corrupted)?;
        primary.insert(
            &id,
            DocumentLocation {
                offset,
                length,
                slab_size,
                is_blob: flags & ENTRY_FLAG_BLOB != 0,
            },
        );
    }

    let mut secondaries = Vec::with_capacity(usize::from(secondary_count));
    let mut r = ByteReader::at(data, secondary_offset);
    for _ in 0..secondary_count {
        let field_path = r.read_str16().map_err(corrupted)?;
        let mut index = SecondaryIndex::new(field_path);
        let entry_count = r.read_u32().map_err(corrupted)?;
        for _ in 0..entry_count {
            let key = r.read_bytes32().map_err(corrupted)?;
            let id_count = r.read_u32().map_err(corrupted)?;
            for _ in 0..id_count {
                let id = r.read_str16().map_err(corrupted)?;
                index.insert(key.clone(), &id);
            }
        }
        secondaries.push(index);
    }

    Ok((primary, secondaries))
}
