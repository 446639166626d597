//! Error types for the manifest database back-ends.

use thiserror::Error;

/// Errors that can occur while reading or writing a manifest DB back-end.
#[derive(Error, Debug)]
pub enum ManifestDbError {
    /// A manifest or secure-list line did not have the expected field count.
    #[error("malformed {kind} line in '{path}' at line {line}")]
    MalformedLine {
        /// `"manifest"` or `"secure list"`.
        kind: &'static str,
        /// The file being read.
        path: String,
        /// 1-based line number.
        line: usize,
    },

    /// A secure-list filename did not split into `<directory>_<extension>`.
    #[error("malformed secure list filename: {0:?}")]
    MalformedListFilename(String),

    /// A binary manifest entry's declared byte length did not match what was
    /// actually consumed.
    #[error("entry length mismatch in '{0}'")]
    EntryLengthMismatch(String),

    /// A UTF-16LE string field was not terminated before EOF.
    #[error("unterminated UTF-16 string in '{0}'")]
    UnterminatedString(String),

    /// A UTF-16LE string field contained invalid code unit sequences.
    #[error("invalid UTF-16 string in '{0}'")]
    InvalidUtf16(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The encryption key could not be parsed.
    #[error("key error: {0}")]
    Key(#[from] dni_crypto::CryptoError),
}

/// Result alias for manifest DB operations.
pub type Result<T> = std::result::Result<T, ManifestDbError>;
