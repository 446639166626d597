//! Error types for the asset data model and asset index.

use thiserror::Error;

/// Errors that can occur while loading or merging the asset index.
#[derive(Error, Debug)]
pub enum AssetIndexError {
    /// A gather-package control file was not valid JSON.
    #[error("malformed control file '{path}': {source}")]
    MalformedControlFile {
        /// The control file that failed to parse.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A control file's `folders` entry (or a path derived from `*`)
    /// attempted to escape the gather package root.
    #[error("path traversal attempt in '{0}'")]
    PathTraversal(String),

    /// A control file named a category this crate does not recognize.
    #[error("unknown asset category '{0}' in '{1}'")]
    UnknownCategory(String, String),

    /// Two assets with different client paths mapped to the same server
    /// path (spec §3 invariant I1). Fatal: the index cannot disambiguate
    /// which one the download server should serve.
    #[error("server path conflict: '{server_path}' claimed by both '{first}' and '{second}'")]
    ServerPathConflict {
        /// The colliding server path.
        server_path: String,
        /// The client path that claimed it first.
        first: String,
        /// The client path that tried to claim it second.
        second: String,
    },

    /// An asset's categories do not map to any known server-path bucket.
    #[error("no server-path bucket for client path '{0}' (categories: {1:?})")]
    NoServerPathBucket(String, Vec<String>),

    /// A prebuilt asset list line did not have the expected field count.
    #[error("malformed prebuilt asset line at '{path}' line {line}")]
    MalformedPrebuiltLine {
        /// The file being read.
        path: String,
        /// 1-based line number.
        line: usize,
    },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for asset index operations.
pub type Result<T> = std::result::Result<T, AssetIndexError>;
