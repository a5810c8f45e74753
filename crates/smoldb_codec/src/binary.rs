//! Little-endian integer and length-prefixed string encoding.
//!
//! All multi-byte integers in SmolDB's on-disk formats are little-endian.
//! Identifiers and field paths carry a `u16` length prefix; serialized
//! index values carry a `u32` prefix.

use crate::error::{CodecError, CodecResult};

/// Appends a `u16` in little-endian order.
pub fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Appends a `u32` in little-endian order.
pub fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Appends a `u64` in little-endian order.
pub fn write_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Appends a `u16` length prefix followed by the string's UTF-8 bytes.
///
/// Used for document ids and field paths, which are bounded well below
/// 64 KiB.
pub fn write_str16(buf: &mut Vec<u8>, s: &str) {
    write_u16(buf, s.len() as u16);
    buf.extend_from_slice(s.as_bytes());
}

/// Appends a `u32` length prefix followed by the raw bytes.
///
/// Used for serialized secondary-index values, which may embed whole JSON
/// documents.
pub fn write_str32(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

/// Sequential reader over a byte slice.
///
/// Every read advances an internal cursor and fails with
/// [`CodecError::UnexpectedEof`] instead of panicking when the input is
/// short.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a reader positioned at `offset`.
    #[must_use]
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, pos: offset }
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes remaining after the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        self.take(len)
    }

    /// Reads a `u16`-prefixed UTF-8 string.
    pub fn read_str16(&mut self) -> CodecResult<String> {
        let len = self.read_u16()? as usize;
        let offset = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8 { offset })
    }

    /// Reads a `u32`-prefixed byte string.
    pub fn read_bytes32(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_roundtrip() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0xBEEF);
        write_u32(&mut buf, 0xDEAD_BEEF);
        write_u64(&mut buf, 0x0123_4567_89AB_CDEF);

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_u64().unwrap(), 0x0123_4567_89AB_CDEF);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn little_endian_layout() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 1);
        assert_eq!(buf, [1, 0, 0, 0]);
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = Vec::new();
        write_str16(&mut buf, "profile.country");

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_str16().unwrap(), "profile.country");
    }

    #[test]
    fn bytes32_roundtrip() {
        let mut buf = Vec::new();
        write_str32(&mut buf, &[0xCA, 0xFE]);

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_bytes32().unwrap(), vec![0xCA, 0xFE]);
    }

    #[test]
    fn short_input_fails() {
        let mut r = ByteReader::new(&[1, 2]);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof { needed: 4, .. }));
    }

    #[test]
    fn invalid_utf8_fails() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 2);
        buf.extend_from_slice(&[0xFF, 0xFE]);

        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            r.read_str16(),
            Err(CodecError::InvalidUtf8 { .. })
        ));
    }
}
