//! Error types for stream cipher and hashing operations.

use thiserror::Error;

/// Errors that can occur while keying or framing an encrypted stream.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key was supplied in a size that cannot be interpreted as a 128-bit key.
    #[error("invalid key size: expected 16 bytes (32 hex digits), got {actual}")]
    InvalidKeySize {
        /// Size actually supplied, in bytes.
        actual: usize,
    },

    /// The key string was not valid hex.
    #[error("invalid key: {0}")]
    InvalidKeyFormat(#[from] hex::FromHexError),

    /// A BTEA stream was opened without a key.
    #[error("BTEA streams require an explicit encryption key")]
    MissingKey,

    /// A write-mode stream was opened without an explicit encryption kind.
    #[error("writable encrypted streams require an explicit encryption type")]
    UnspecifiedWriteEncryption,

    /// The stream header was shorter than 16 bytes.
    #[error("truncated stream header")]
    TruncatedHeader,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
