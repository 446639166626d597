//! The asset index: prebuilt content discovered by walking the build
//! machine's compiled data/scripts trees, merged with gather-package
//! content (spec §4.4, grounded on `assets.py`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::asset::{Asset, CATEGORY_DIRECTORY};
use crate::error::{AssetIndexError, Result};
use crate::server_path::{fold, server_path_for};

fn relative_client_path(base: &Path, entry: &Path) -> String {
    entry
        .strip_prefix(base)
        .unwrap_or(entry)
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Insert an asset into a server-path-keyed map, enforcing spec §3
/// invariant I1: a server path may be claimed by only one client path.
fn insert_by_server_path(out: &mut HashMap<String, Asset>, asset: Asset) -> Result<()> {
    let Some(server_path) = server_path_for(&asset.client_path, &asset.categories) else {
        return Err(AssetIndexError::NoServerPathBucket(
            asset.client_path.clone(),
            asset.categories.clone(),
        ));
    };
    let key = fold(&server_path);
    if let Some(existing) = out.get(&key) {
        if existing.client_path != asset.client_path {
            return Err(AssetIndexError::ServerPathConflict {
                server_path,
                first: existing.client_path.clone(),
                second: asset.client_path.clone(),
            });
        }
    }
    out.insert(key, asset);
    Ok(())
}

fn walk_prebuilts(
    category: Option<&str>,
    base_path: &Path,
    source_path: &Path,
    follow_dirs: bool,
    out: &mut HashMap<String, Asset>,
) -> Result<()> {
    let Ok(entries) = std::fs::read_dir(source_path) else {
        return Ok(());
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_file() {
            let client_path = relative_client_path(base_path, &path);
            // The client root (no category) carries loose files like the
            // launcher executable and server.ini that have no known
            // server-path bucket; stage them under client_path itself so
            // they are still discoverable, rather than erroring the run.
            if category.is_none() {
                out.insert(fold(&client_path), Asset::new(path, client_path, ""));
                continue;
            }
            insert_by_server_path(out, Asset::new(path, client_path, category.unwrap_or_default()))?;
        } else if path.is_dir() && follow_dirs {
            walk_prebuilts(category, base_path, &path, follow_dirs, out)?;
        }
    }
    Ok(())
}

/// Walk a build machine's compiled `data_path` and `scripts_path` trees,
/// discovering one asset per file under each category's client directory,
/// plus the handful of loose files at the client root (the executable,
/// `server.ini`, and similar). The returned map is keyed by case-folded
/// server path (spec §3 `ServerPath`), not client path.
///
/// When both trees contain a category's directory, files under
/// `data_path` take precedence — the scripts tree tends to carry stale
/// pages left behind from the asset-management workstation.
pub fn load_prebuilt_assets(data_path: &Path, scripts_path: &Path) -> Result<HashMap<String, Asset>> {
    tracing::info!("loading prebuilt assets");
    let mut prebuilts = HashMap::new();

    for (category, client_directory) in CATEGORY_DIRECTORY.iter() {
        if client_directory.is_empty() {
            continue;
        }
        let data_source = data_path.join(client_directory);
        let scripts_source = scripts_path.join(client_directory);
        if !data_source.is_dir() && !scripts_source.is_dir() {
            return Err(AssetIndexError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{client_directory}' missing from sources"),
            )));
        }

        if scripts_source.is_dir() {
            walk_prebuilts(Some(category), scripts_path, &scripts_source, true, &mut prebuilts)?;
        }
        if data_source.is_dir() {
            walk_prebuilts(Some(category), data_path, &data_source, true, &mut prebuilts)?;
        }
    }

    // The client root (launcher executable, ini files, ...) is not
    // recursed into and carries no category.
    walk_prebuilts(None, data_path, data_path, false, &mut prebuilts)?;

    tracing::debug!(count = prebuilts.len(), "loaded prebuilt assets");
    Ok(prebuilts)
}

/// Merge prebuilt and gather-package asset maps, both keyed by case-folded
/// server path. Gather assets win on collision, since they represent
/// content staged specifically for this manifest build.
pub fn merge_asset_dicts(
    prebuilts: HashMap<String, Asset>,
    gathers: HashMap<String, Asset>,
) -> HashMap<String, Asset> {
    tracing::info!("merging staged assets");
    let mut assets = prebuilts;
    assets.extend(gathers);
    tracing::debug!(count = assets.len(), "total known assets");
    assets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_category_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let scripts = dir.path().join("scripts");
        fs::create_dir_all(data.join("dat/sub")).unwrap();
        fs::create_dir_all(&scripts).unwrap();
        fs::write(data.join("dat/sub/Garden.prp"), b"x").unwrap();

        let mut out = HashMap::new();
        walk_prebuilts(Some("data"), &data, &data.join("dat"), true, &mut out).unwrap();
        assert!(out.contains_key(&fold("data/prp/sub/Garden.prp")));
    }

    #[test]
    fn gather_assets_override_prebuilts_on_merge() {
        let mut prebuilts = HashMap::new();
        prebuilts.insert(
            fold("data/age/Garden.age"),
            Asset::new(PathBuf::from("/prebuilt/Garden.age"), "dat/Garden.age".to_string(), "data"),
        );
        let mut gathers = HashMap::new();
        gathers.insert(
            fold("data/age/Garden.age"),
            Asset::new(PathBuf::from("/gather/Garden.age"), "dat/Garden.age".to_string(), "data"),
        );

        let merged = merge_asset_dicts(prebuilts, gathers);
        assert_eq!(
            merged[&fold("data/age/Garden.age")].source_path,
            PathBuf::from("/gather/Garden.age")
        );
    }

    #[test]
    fn missing_category_in_both_sources_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let scripts = dir.path().join("scripts");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&scripts).unwrap();
        assert!(load_prebuilt_assets(&data, &scripts).is_err());
    }
}
