//! Error types for skein-common.

use thiserror::Error;

/// Common error type for low-level binary I/O.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A null-terminated string ran past its allowed maximum.
    #[error("string exceeds maximum length of {max} bytes without a null terminator")]
    UnterminatedString { max: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Unrecognized byte-order symbol.
    #[error("unknown byte-order symbol {0:?} (expected '<' or '>')")]
    UnknownByteOrder(char),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
