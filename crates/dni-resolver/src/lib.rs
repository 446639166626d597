//! Dependency resolution for the D'ni content-manifest pipeline (spec §4.5).
//!
//! Given the merged asset index built by [`dni_assets`], this crate
//! answers "what must be published, and to which manifests" by running
//! three independent passes over it:
//!
//! 1. [`age`] walks every age's declared pages and the keyed objects
//!    inside each page, staging page dependencies (sound buffers, Python
//!    file mods, relevance regions).
//! 2. [`client_surface`] assigns installer prerequisites and launcher
//!    trees to their manifest triples, and adds every core client file
//!    (ages, fonts, localization, movies) to every known client manifest.
//! 3. [`script`] resolves the SDL descriptor closure reachable from the
//!    fixed client-core set and the Python file mods pass 1 found.
//!
//! [`resolve_dependencies`] runs all three and returns one [`Resolved`]
//! set. The three passes populate disjoint flag bits and manifest keys,
//! so running them in this order (age, then client surface, then script)
//! is required only because pass 3 reads the `PYTHON_FILE_MOD` flag pass
//! 1 sets; the other two orderings don't interact.

#![warn(missing_docs)]

pub mod age;
pub mod client_surface;
pub mod closure;
pub mod error;
pub mod script;
pub mod staged;

pub use client_surface::full_and_thin_manifest_names;
pub use error::{ResolverError, Result};
pub use staged::{Resolved, StagedAsset};

use std::collections::HashMap;

use dni_assets::asset::Asset;
use dni_crypto::CipherKey;

/// Run all three dependency-resolution passes over `index` and return the
/// combined result.
pub async fn resolve_dependencies(index: &HashMap<String, Asset>, droid_key: Option<CipherKey>) -> Result<Resolved> {
    let mut resolved = Resolved::default();

    age::resolve_age_dependencies(index, droid_key, &mut resolved).await?;
    client_surface::resolve_client_dependencies(index, &mut resolved);
    script::resolve_script_dependencies(index, &mut resolved)?;

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dni_assets::server_path::fold;
    use std::io::Write;
    use std::path::PathBuf;

    fn asset(source: PathBuf, client_path: &str, category: &str) -> Asset {
        Asset::new(source, client_path.to_string(), category)
    }

    fn write_core_sdl(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("core.sdl");
        let mut file = std::fs::File::create(&path).unwrap();
        for name in crate::closure::CORE_DESCRIPTORS {
            writeln!(file, "STATEDESC {name} {{\nVERSION 1\n}}\n").unwrap();
        }
        path
    }

    #[tokio::test]
    async fn full_resolution_stages_client_surface_and_core_sdl() {
        let dir = tempfile::tempdir().unwrap();
        let sdl_path = write_core_sdl(&dir);

        let mut index = HashMap::new();
        index.insert(
            fold("client/windows32/external/UruLauncher.exe"),
            asset(PathBuf::from("/dev/null"), "UruLauncher.exe", "external"),
        );
        index.insert(
            fold("scripts/sdl/core.sdl"),
            asset(sdl_path, "SDL/core.sdl", "sdl"),
        );

        let resolved = resolve_dependencies(&index, None).await.unwrap();
        assert!(resolved.staged.contains_key(&fold("client/windows32/external/UruLauncher.exe")));
        assert!(resolved.staged.contains_key(&fold("scripts/sdl/core.sdl")));
    }

    #[tokio::test]
    async fn missing_core_sdl_is_fatal() {
        let mut index = HashMap::new();
        index.insert(
            fold("client/windows32/external/UruLauncher.exe"),
            asset(PathBuf::from("/dev/null"), "UruLauncher.exe", "external"),
        );
        let err = resolve_dependencies(&index, None).await.unwrap_err();
        assert!(matches!(err, ResolverError::MissingCoreDescriptor(_)));
    }
}
