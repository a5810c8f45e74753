//! Error types for codec operations.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding binary data.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input ended before the expected field.
    #[error("unexpected end of input: needed {needed} bytes at offset {offset}, have {remaining}")]
    UnexpectedEof {
        /// Byte offset at which the read was attempted.
        offset: usize,
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 {
        /// Byte offset of the string payload.
        offset: usize,
    },
}
