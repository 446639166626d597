//! The asset data model and asset index for the D'ni content-manifest
//! pipeline.
//!
//! This crate answers one question: for a given piece of game content,
//! where does it live on the build machine, and where does the client
//! expect to find it once published? [`asset`] defines that mapping,
//! [`gather`] discovers assets staged in JSON-controlled gather packages,
//! and [`index`] discovers assets already compiled into the build
//! machine's data/scripts trees and merges the two sources.

#![warn(missing_docs)]

pub mod asset;
pub mod error;
pub mod gather;
pub mod index;
pub mod server_path;

pub use asset::{client_path_for, Asset, CATEGORY_DIRECTORY};
pub use error::{AssetIndexError, Result};
pub use gather::load_gather_assets;
pub use index::{load_prebuilt_assets, merge_asset_dicts};
pub use server_path::{fold as fold_server_path, server_path_for};
