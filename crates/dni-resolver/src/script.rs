//! Script-dependency resolution: spec §4.5 pass 3.
//!
//! Loads every `.sdl` asset into one [`Manager`], walks the descriptor
//! closure (core descriptors plus one optional root per Python file mod
//! already staged by the age pass), and stages the SDL files that carry
//! each reachable descriptor with `SCRIPT`. Also marks every `.py` asset
//! `SCRIPT | CONSUMABLE` so the pack builder knows to byte-compile it even
//! if no page ever referenced it directly.

use std::collections::HashMap;
use std::path::PathBuf;

use dni_assets::asset::Asset;
use dni_formats::sdl::Manager;
use dni_formats::ManifestFlags;

use crate::closure::resolve_closure;
use crate::error::{ResolverError, Result};
use crate::staged::Resolved;

/// Load every `.sdl` asset in `index` into a single [`Manager`], failing
/// if any carries a recognized encryption header (SDL files consumed by
/// the resolver must always be the plaintext source form).
pub fn load_sdl_manager(index: &HashMap<String, Asset>) -> Result<Manager> {
    let mut manager = Manager::new();
    let mut sdl_assets: Vec<&Asset> = index
        .values()
        .filter(|a| a.client_path.to_lowercase().ends_with(".sdl"))
        .collect();
    sdl_assets.sort_by(|a, b| a.client_path.cmp(&b.client_path));

    for asset in sdl_assets {
        tracing::trace!(path = %asset.client_path, "reading SDL descriptor file");
        manager.load_file(&asset.source_path)?;
    }
    Ok(manager)
}

fn python_file_mod_stems(resolved: &Resolved) -> Vec<String> {
    resolved
        .staged
        .values()
        .filter(|a| ManifestFlags::new(a.flags).has(ManifestFlags::PYTHON_FILE_MOD))
        .filter_map(|a| {
            std::path::Path::new(&a.client_path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .collect()
}

fn asset_by_source_path<'a>(index: &'a HashMap<String, Asset>, path: &PathBuf) -> Option<(&'a str, &'a Asset)> {
    index
        .iter()
        .find(|(_, a)| &a.source_path == path)
        .map(|(k, v)| (k.as_str(), v))
}

/// Resolve script dependencies, staging required SDL files and marking
/// every known Python source `CONSUMABLE`.
pub fn resolve_script_dependencies(index: &HashMap<String, Asset>, resolved: &mut Resolved) -> Result<()> {
    tracing::info!("finding script dependencies");

    let manager = load_sdl_manager(index)?;
    let extra_roots = python_file_mod_stems(resolved);
    let members = resolve_closure(&manager, &extra_roots)?;

    for member in &members {
        for source in &member.sources {
            match asset_by_source_path(index, source) {
                Some((server_path, asset)) => {
                    resolved.stage(server_path, &asset.client_path, ManifestFlags::SCRIPT);
                }
                None => {
                    return Err(ResolverError::SdlSourceUnindexed {
                        descriptor: member.name.clone(),
                        source: source.display().to_string(),
                    });
                }
            }
        }
    }

    for (server_path, asset) in index {
        if asset.client_path.to_lowercase().ends_with(".py") {
            resolved.stage(server_path, &asset.client_path, ManifestFlags::SCRIPT | ManifestFlags::CONSUMABLE);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_file_mod_stems_strip_extension() {
        let mut resolved = Resolved::default();
        resolved.stage("scripts/python_code/xfoo.py", "Python/xFoo.py", ManifestFlags::PYTHON_FILE_MOD);
        let stems = python_file_mod_stems(&resolved);
        assert_eq!(stems, vec!["xFoo".to_string()]);
    }
}
