//! Core type and format constants for SmolDB.

/// Magic bytes of the data file: `'S','M','O','L'` read as a
/// little-endian u32.
pub const DATA_MAGIC: u32 = 0x4C4F_4D53;

/// Magic bytes of the index file: `'S','I','D','X'` read as a
/// little-endian u32.
pub const INDEX_MAGIC: u32 = 0x5844_4953;

/// On-disk format version for both files.
pub const FORMAT_VERSION: u32 = 1;

/// Reserved size of the data-file header.
pub const DATA_HEADER_SIZE: u64 = 64;

/// Reserved size of the index-file header.
pub const INDEX_HEADER_SIZE: usize = 64;

/// Size of the per-slot header (flags, length, slab size, checksum).
pub const SLOT_HEADER_SIZE: u32 = 16;

/// Where a document currently lives in the data file.
///
/// Locations are produced by the allocator on every write or relocation and
/// referenced by the primary index. A location is invalidated when its slot
/// is freed, and all locations change after compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentLocation {
    /// Absolute byte offset of the slot in the data file.
    pub offset: u64,
    /// Payload bytes stored in the slot.
    pub length: u32,
    /// Allocated slab bytes (`length + SLOT_HEADER_SIZE <= slab_size`).
    pub slab_size: u32,
    /// Whether the slot holds a blob reference instead of inline JSON.
    pub is_blob: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_magic_spells_smol() {
        assert_eq!(&DATA_MAGIC.to_le_bytes(), b"SMOL");
    }

    #[test]
    fn index_magic_spells_sidx() {
        assert_eq!(&INDEX_MAGIC.to_le_bytes(), b"SIDX");
    }
}
