//! The 16-byte slot header and slot buffer construction.

use crate::types::SLOT_HEADER_SIZE;
use smoldb_codec::{crc32, write_u32, ByteReader};

/// Flag bit: the slot holds a live document.
pub const FLAG_ACTIVE: u32 = 0x01;
/// Flag bit: the slot payload is a blob reference, not inline JSON.
pub const FLAG_BLOB: u32 = 0x02;

/// Parsed slot header.
///
/// Every slot starts with four little-endian u32 fields: flags, payload
/// length, slab size, and the CRC-32 of the payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    /// Flag bits (`FLAG_ACTIVE`, `FLAG_BLOB`).
    pub flags: u32,
    /// Payload bytes stored after the header.
    pub data_length: u32,
    /// Total allocated bytes of this slot, header included.
    pub slab_size: u32,
    /// CRC-32 of the payload bytes.
    pub crc32: u32,
}

impl SlotHeader {
    /// Whether the ACTIVE bit is set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.flags & FLAG_ACTIVE != 0
    }

    /// Whether the BLOB bit is set.
    #[must_use]
    pub fn is_blob(&self) -> bool {
        self.flags & FLAG_BLOB != 0
    }

    /// Encodes the header into its 16-byte on-disk form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SLOT_HEADER_SIZE as usize);
        write_u32(&mut buf, self.flags);
        write_u32(&mut buf, self.data_length);
        write_u32(&mut buf, self.slab_size);
        write_u32(&mut buf, self.crc32);
        buf
    }

    /// Decodes a header from the first 16 bytes of `data`.
    ///
    /// Returns `None` if `data` is shorter than a header. Field validation
    /// (ACTIVE bit, length, checksum) is the engine's job, not the
    /// decoder's.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = ByteReader::new(data);
        Some(Self {
            flags: r.read_u32().ok()?,
            data_length: r.read_u32().ok()?,
            slab_size: r.read_u32().ok()?,
            crc32: r.read_u32().ok()?,
        })
    }
}

/// Builds a complete slot buffer: header, payload, zero padding out to
/// `slab_size`.
///
/// The checksum is computed over the payload bytes only, so an in-place
/// payload rewrite (which skips the padding) stays verifiable.
#[must_use]
pub fn build_slot(payload: &[u8], slab_size: u32, is_blob: bool) -> Vec<u8> {
    let flags = if is_blob {
        FLAG_ACTIVE | FLAG_BLOB
    } else {
        FLAG_ACTIVE
    };

    let header = SlotHeader {
        flags,
        data_length: payload.len() as u32,
        slab_size,
        crc32: crc32(payload),
    };

    let mut buf = Vec::with_capacity(slab_size as usize);
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf.resize(slab_size as usize, 0);
    buf
}

/// Builds just the header-plus-payload prefix of a slot, for in-place
/// rewrites that leave existing padding untouched.
#[must_use]
pub fn build_slot_prefix(payload: &[u8], slab_size: u32, is_blob: bool) -> Vec<u8> {
    let mut buf = build_slot(payload, slab_size, is_blob);
    buf.truncate(SLOT_HEADER_SIZE as usize + payload.len());
    buf
}
