//! Error types for the pipeline orchestrator and Python pack builder.
//!
//! Spec §7 distinguishes two kinds: `AssetError` for recoverable top-level
//! faults (missing inputs, malformed configuration, unrecoverable encryption
//! mismatches) and `ProgrammingError` for anything that should never happen
//! given a correctly-wired caller. We model the latter as
//! [`PipelineError::Internal`] rather than a panic so a caller can still log
//! and exit non-zero without unwinding across an async boundary.

use thiserror::Error;

/// Recoverable faults: logged and surfaced as a non-zero exit, never a panic.
#[derive(Error, Debug)]
pub enum AssetError {
    /// Underlying asset-index failure.
    #[error("asset index error: {0}")]
    Index(#[from] dni_assets::AssetIndexError),

    /// Underlying dependency-resolution failure.
    #[error("dependency resolution error: {0}")]
    Resolver(#[from] dni_resolver::ResolverError),

    /// Underlying manifest DB failure.
    #[error("manifest DB error: {0}")]
    ManifestDb(#[from] dni_formats::manifestdb::ManifestDbError),

    /// Underlying cipher/key failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] dni_crypto::CryptoError),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A source file claims to be BTEA-encrypted already, but the desired
    /// encryption for its extension is not BTEA. The encrypt stage has no
    /// way to safely undo foreign encryption (spec §4.7 step 1, §7 fatal).
    #[error("'{client_path}' is already encrypted in an incompatible cipher")]
    IncorrectEncryption {
        /// The staged asset's client path.
        client_path: String,
    },

    /// Two Python sources resolved to the same dotted module name while
    /// building the pack archive (spec §4.8).
    #[error("module name collision: '{0}'")]
    ModuleNameCollision(String),

    /// The external byte-compiler sub-process reported a non-success result
    /// code for a source file (spec §6 `PyToolsResultCodes`).
    #[error("byte-compiler reported {code:?} for '{py_file_path}'{detail}")]
    CompilerFailure {
        /// `py_file_path` that failed to compile.
        py_file_path: String,
        /// The reported result code.
        code: CompileResultCode,
        /// Formatted traceback, if the sub-process returned one.
        detail: String,
    },

    /// The reuse path was requested but no cached `Python/*.pak` secure-list
    /// entry exists, or the file it names is missing from disk.
    #[error("no reusable Python.pak found in the cached secure list")]
    NoReusablePak,

    /// A configured source tree does not exist or is not a directory.
    #[error("source path '{0}' is not a directory")]
    MissingSourceTree(String),
}

/// Result code the external byte-compiler sub-process reports back (spec
/// §6 `PyToolsResultCodes`); `Success` never reaches [`AssetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileResultCode {
    /// The sub-process itself raised an uncaught exception.
    ToolsCrashed,
    /// The request's `cmd` field was not recognized.
    InvalidCommand,
    /// The source compiled with a Python-level syntax/traceback error.
    ModuleTraceback,
    /// The named source file could not be opened.
    FileNotFound,
}

/// Result alias for recoverable pipeline operations.
pub type AssetResult<T> = std::result::Result<T, AssetError>;

/// Top-level pipeline error: either a recoverable [`AssetError`], or an
/// internal invariant violation standing in for spec §7's "ProgrammingError".
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A recoverable, expected failure mode.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// An invariant the orchestrator assumes was already enforced upstream
    /// did not hold (e.g. a manifest member with no corresponding staged
    /// entry). Always a defect, never user-correctable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<dni_assets::AssetIndexError> for PipelineError {
    fn from(e: dni_assets::AssetIndexError) -> Self {
        Self::Asset(AssetError::from(e))
    }
}

impl From<dni_resolver::ResolverError> for PipelineError {
    fn from(e: dni_resolver::ResolverError) -> Self {
        Self::Asset(AssetError::from(e))
    }
}

impl From<dni_formats::manifestdb::ManifestDbError> for PipelineError {
    fn from(e: dni_formats::manifestdb::ManifestDbError) -> Self {
        Self::Asset(AssetError::from(e))
    }
}

impl From<dni_crypto::CryptoError> for PipelineError {
    fn from(e: dni_crypto::CryptoError) -> Self {
        Self::Asset(AssetError::from(e))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Asset(AssetError::from(e))
    }
}

/// Result alias for top-level pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
