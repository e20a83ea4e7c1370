//! # Error Types
//!
//! Errors raised while decoding wire data.

use thiserror::Error;

/// Malformed bytes on the wire.
///
/// A decode error is fatal to the stream it came from; callers never retry
/// decoding the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before the value was complete.
    #[error("Unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A var-int used a longer form than necessary.
    #[error("Non-canonical var-int encoding")]
    NonCanonicalVarInt,

    /// A length prefix exceeded the allowed maximum.
    #[error("Length {len} exceeds maximum {max}")]
    LengthTooLarge { len: u64, max: u64 },

    /// Bytes remained after the value was decoded.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// Structurally valid bytes with an invalid value.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_message() {
        let err = DecodeError::UnexpectedEof {
            needed: 32,
            available: 4,
        };
        assert!(err.to_string().contains("needed 32"));
    }

    #[test]
    fn test_length_too_large_message() {
        let err = DecodeError::LengthTooLarge { len: 60000, max: 50000 };
        assert!(err.to_string().contains("50000"));
    }
}
