//! Error types for resource-page (PRP) and age file parsing.

use thiserror::Error;

/// Errors that can occur while reading an age or page file.
#[derive(Error, Debug)]
pub enum PageError {
    /// The page header did not carry the expected version number.
    #[error("unsupported page version: {0} (expected 6)")]
    UnsupportedVersion(u32),

    /// A safe-string's bytes were not valid UTF-8.
    #[error("safe-string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// An age file line was not blank, a comment, or `key=value`.
    #[error("malformed age file line: {0:?}")]
    MalformedAgeLine(String),

    /// I/O failure while reading the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying stream codec failed (decryption, bad magic, ...).
    #[error("stream codec error: {0}")]
    Codec(#[from] dni_crypto::CryptoError),
}

/// Result alias for page/age parsing operations.
pub type Result<T> = std::result::Result<T, PageError>;
