//! Binary and text format parsers for the D'ni content-manifest pipeline.
//!
//! This crate owns the game's proprietary on-disk formats that the
//! dependency resolver and orchestrator need to understand: age text files
//! and resource pages (PRP), SDL state-descriptor definitions, and the two
//! manifest-database back-ends (text and binary) that publish the result.
//! The low-level stream ciphers that frame many of these files live in
//! [`dni_crypto`]; this crate builds on top of them.

#![warn(missing_docs)]

pub mod age;
pub mod manifestdb;
pub mod page;
pub mod sdl;

pub use age::{parse_age, read_age_file, AgeInfo};
pub use manifestdb::flags::ManifestFlags;
pub use manifestdb::{AssetDatabase, ListEntry, ManifestBackend, ManifestEntry};
pub use page::{read_page, read_page_file, write_safe_string, ParsedPage};
pub use sdl::{Descriptor, Manager, Variable, VariableType};
