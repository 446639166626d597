//! Error types for SDL descriptor parsing.

use thiserror::Error;

/// Errors that can occur while tokenizing or parsing an SDL descriptor file.
#[derive(Error, Debug)]
pub enum SdlError {
    /// A token appeared where the grammar did not expect one.
    #[error("unexpected token: {0:?}")]
    UnexpectedToken(String),

    /// Text followed the `STATEDESC` name that wasn't `{`.
    #[error("unexpected token after STATEDESC name: {0:?}")]
    UnexpectedAfterStatedesc(String),

    /// `VERSION` was not followed by an integer.
    #[error("STATEDESC {descriptor} version should be an integer, not {token:?}")]
    InvalidVersion {
        /// The descriptor being parsed.
        descriptor: String,
        /// The offending token.
        token: String,
    },

    /// A `VAR` declared a type this parser doesn't recognize.
    #[error("variable in {descriptor}#{version} has unknown type {token:?}")]
    UnknownVariableType {
        /// The descriptor being parsed.
        descriptor: String,
        /// The descriptor's version.
        version: i64,
        /// The offending token.
        token: String,
    },

    /// A `VAR`'s `[...]` range was not an integer.
    #[error("variable range {descriptor}#{version}->{variable} should be an integer, not {token:?}")]
    InvalidRange {
        /// The descriptor being parsed.
        descriptor: String,
        /// The descriptor's version.
        version: i64,
        /// The variable being parsed.
        variable: String,
        /// The offending token.
        token: String,
    },

    /// The file ended while a `STATEDESC` or `VAR` was still open.
    #[error("unexpected end of file while parsing SDL")]
    UnexpectedEof,

    /// An SDL file in this role carried an encryption header, which is
    /// forbidden.
    #[error("SDL file must not be encrypted")]
    UnexpectedEncryption,

    /// A requested client-core descriptor could not be found in any loaded
    /// file.
    #[error("missing required client-core SDL descriptor: {0}")]
    MissingClientCoreDescriptor(String),

    /// I/O failure reading the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents were not valid UTF-8.
    #[error("SDL file is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Result alias for SDL parsing operations.
pub type Result<T> = std::result::Result<T, SdlError>;
