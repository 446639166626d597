//! Error types for the dependency resolver.

use thiserror::Error;

/// Errors the dependency resolver can surface. Everything here is fatal
/// per spec §7 — recoverable conditions (missing age pages, unresolved
/// optional SDL descriptors, ...) are logged as warnings and do not
/// produce an `Err`.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// A root "client core" SDL descriptor (spec §4.5 pass 3's fixed
    /// root set) was not found in any loaded SDL file.
    #[error("missing required client-core SDL descriptor '{0}'")]
    MissingCoreDescriptor(String),

    /// An SDL descriptor reachable from an already-resolved descriptor
    /// via an embedded `$descriptor` variable was not found.
    #[error("descriptor '{parent}' embeds missing descriptor '{child}'")]
    EmbeddedDescriptorMissing {
        /// The descriptor that embeds the missing one.
        parent: String,
        /// The name of the missing embedded descriptor.
        child: String,
    },

    /// A reachable descriptor's source SDL file is not present in the
    /// asset index under the path the `Manager` loaded it from. This
    /// should never happen if the same index built the manager in the
    /// first place.
    #[error("descriptor '{descriptor}' source file '{source}' is not indexed")]
    SdlSourceUnindexed {
        /// The descriptor whose source file went missing.
        descriptor: String,
        /// The on-disk path the manager loaded it from.
        source: String,
    },

    /// Underlying SDL parse failure.
    #[error("SDL error: {0}")]
    Sdl(#[from] dni_formats::sdl::SdlError),

    /// Underlying page/age parse failure.
    #[error("page error: {0}")]
    Page(#[from] dni_formats::page::PageError),

    /// Underlying asset-index failure.
    #[error("asset index error: {0}")]
    AssetIndex(#[from] dni_assets::AssetIndexError),

    /// A spawned page-parsing task panicked or was cancelled.
    #[error("page-parsing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;
