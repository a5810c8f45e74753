//! # SmolDB Codec
//!
//! Low-level encoding utilities shared by the SmolDB storage engine and
//! index manager:
//!
//! - Little-endian integer and length-prefixed string read/write
//! - CRC-32 (reflected IEEE polynomial)
//! - Canonical serialization of JSON values for secondary-index keys
//! - Dotted-path lookup and structural filter matching over
//!   [`serde_json::Value`]
//!
//! This crate has no knowledge of files, slots, or indexes. It operates on
//! byte slices and JSON values only.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binary;
mod crc;
mod error;
mod filter;
mod path;
mod value;

pub use binary::{write_str16, write_str32, write_u16, write_u32, write_u64, ByteReader};
pub use crc::crc32;
pub use error::{CodecError, CodecResult};
pub use filter::{deep_equal, matches};
pub use path::get_nested;
pub use value::serialize_index_key;
