//! Gather packages: directories of staged content plus a JSON control file
//! that describes which files land in which manifest category (spec §4.1,
//! grounded on `assets.py::load_gather_assets`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::asset::{client_path_for, is_path_traversal, Asset, CATEGORY_DIRECTORY};
use crate::error::{AssetIndexError, Result};
use crate::server_path::{fold, server_path_for};

/// Load every gather package found as an immediate subdirectory of any of
/// `roots`, merging their assets into a single server-path-keyed map
/// (spec §3 `ServerPath`; case-folded per invariant I4).
pub fn load_gather_assets(roots: &[PathBuf]) -> Result<HashMap<String, Asset>> {
    let mut gathers = HashMap::new();
    for root in roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        for entry in entries {
            let path = entry?.path();
            if !path.is_dir() {
                tracing::warn!(path = %path.display(), "skipping non-directory gather path");
                continue;
            }
            let count_before = gathers.len();
            handle_gather_package(&path, None, &mut gathers)?;
            tracing::trace!(
                package = %path.display(),
                loaded = gathers.len() - count_before,
                "loaded gather package"
            );
        }
    }
    Ok(gathers)
}

fn handle_gather_package(
    gather_path: &Path,
    control_path: Option<PathBuf>,
    gathers: &mut HashMap<String, Asset>,
) -> Result<()> {
    let (control_path, source_path) = match control_path {
        Some(p) => {
            let parent = p.parent().unwrap_or(gather_path).to_path_buf();
            (p, parent)
        }
        None => {
            let mut candidates: Vec<PathBuf> = std::fs::read_dir(gather_path)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect();
            candidates.sort();
            let Some(first) = candidates.first().cloned() else {
                tracing::error!(package = %gather_path.display(), "control file missing for gather package");
                return Ok(());
            };
            if candidates.len() > 1 {
                tracing::warn!(package = %gather_path.display(), "multiple control file candidates");
            }
            (first, gather_path.to_path_buf())
        }
    };

    if !control_path.is_file() {
        tracing::error!(path = %control_path.display(), "control file does not exist");
        return Ok(());
    }

    tracing::trace!(path = %control_path.display(), "reading gather control file");
    let text = std::fs::read_to_string(&control_path)?;
    let control: Value =
        serde_json::from_str(&text).map_err(|source| AssetIndexError::MalformedControlFile {
            path: control_path.display().to_string(),
            source,
        })?;

    let Value::Object(sections) = control else {
        tracing::error!(path = %control_path.display(), "control file is not a JSON object");
        return Ok(());
    };

    for (key, value) in sections {
        if key.eq_ignore_ascii_case("folders") {
            let Value::Object(folders) = value else {
                continue;
            };
            for (subdir_name, subcontrol_name) in folders {
                let Some(subcontrol_name) = subcontrol_name.as_str() else {
                    continue;
                };
                if is_path_traversal(&subdir_name) || is_path_traversal(subcontrol_name) {
                    tracing::error!(path = %source_path.display(), "security: attempt to escape cwd via folders section");
                    continue;
                }
                let subcontrol_path = source_path.join(&subdir_name).join(subcontrol_name);
                handle_gather_package(gather_path, Some(subcontrol_path), gathers)?;
            }
            continue;
        }

        if !CATEGORY_DIRECTORY.contains_key(key.as_str()) {
            tracing::warn!(section = %key, path = %control_path.display(), "invalid section in control file");
            continue;
        }

        let Value::Array(items) = value else {
            continue;
        };
        let mut names: Vec<String> = items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let wildcard = names.iter().any(|n| n == "*");
        if wildcard {
            names.retain(|n| n != "*");
            if !names.is_empty() {
                tracing::warn!(section = %key, "wildcard and explicit file list used together");
            }
            let mut dir_entries: Vec<PathBuf> = std::fs::read_dir(&source_path)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            dir_entries.sort();
            for asset_path in dir_entries {
                let relative = asset_path.strip_prefix(&source_path).unwrap_or(&asset_path);
                append_asset(gather_path, &asset_path, &key, relative, gathers)?;
            }
        }

        for name in &names {
            if is_path_traversal(name) {
                tracing::error!(path = %source_path.display(), "security: attempt to escape cwd");
                continue;
            }
            let asset_path = source_path.join(name);
            append_asset(gather_path, &asset_path, &key, Path::new(name), gathers)?;
        }
    }

    Ok(())
}

/// Stage one gather-package file. Returns an error (fatal per spec I1)
/// only when this server path was already claimed by a *different*
/// client path; re-staging the same client path under a second category
/// is expected and merely adds to `categories`.
fn append_asset(
    gather_path: &Path,
    asset_path: &Path,
    category: &str,
    relative: &Path,
    gathers: &mut HashMap<String, Asset>,
) -> Result<()> {
    let Some(client_path) = client_path_for(category, relative) else {
        return Ok(());
    };
    // Control files themselves are never assets.
    if client_path.to_lowercase().ends_with(".json") {
        return Ok(());
    }

    let Some(server_path) = server_path_for(&client_path, std::slice::from_ref(&category.to_string()))
    else {
        return Err(AssetIndexError::NoServerPathBucket(client_path, vec![category.to_string()]));
    };
    let key = fold(&server_path);

    if let Some(existing) = gathers.get(&key) {
        if existing.client_path != client_path {
            return Err(AssetIndexError::ServerPathConflict {
                server_path,
                first: existing.client_path.clone(),
                second: client_path,
            });
        }
    }

    if !asset_path.exists() {
        tracing::error!(path = %asset_path.display(), "asset not available");
        return Ok(());
    }

    let entry = gathers
        .entry(key)
        .or_insert_with(|| Asset::new(asset_path.to_path_buf(), client_path.clone(), category));
    entry.gather_path = Some(gather_path.to_path_buf());
    entry.source_path = asset_path.to_path_buf();
    if !entry.categories.iter().any(|c| c == category) {
        entry.categories.push(category.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_explicit_file_list() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("MyGarden");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("Garden.age"), b"age text").unwrap();
        fs::write(
            pkg.join("control.json"),
            r#"{"data": ["Garden.age"]}"#,
        )
        .unwrap();

        let gathers = load_gather_assets(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(gathers.len(), 1);
        assert!(gathers.contains_key(&fold("data/age/Garden.age")));
    }

    #[test]
    fn wildcard_gathers_whole_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("Sounds");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("a.ogg"), b"1").unwrap();
        fs::write(pkg.join("b.ogg"), b"2").unwrap();
        fs::write(pkg.join("control.json"), r#"{"sfx": ["*"]}"#).unwrap();

        let gathers = load_gather_assets(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(gathers.len(), 2);
        assert!(gathers.contains_key(&fold("audio/a.ogg")));
        assert!(gathers.contains_key(&fold("audio/b.ogg")));
    }

    #[test]
    fn server_path_conflict_across_different_client_paths_is_fatal() {
        // "SDL/one.sdl" and "Python/one.sdl" both fold to server path
        // "scripts/sdl/one.sdl" (same bucket, same suffix-subdirectory),
        // but they are two different client paths — an I1 violation.
        let dir = tempfile::tempdir().unwrap();
        let pkg_a = dir.path().join("PakA");
        fs::create_dir_all(&pkg_a).unwrap();
        fs::write(pkg_a.join("one.sdl"), b"one").unwrap();
        fs::write(pkg_a.join("control.json"), r#"{"sdl": ["one.sdl"]}"#).unwrap();

        let pkg_b = dir.path().join("PakB");
        fs::create_dir_all(&pkg_b).unwrap();
        fs::write(pkg_b.join("one.sdl"), b"two").unwrap();
        fs::write(pkg_b.join("control.json"), r#"{"python": ["one.sdl"]}"#).unwrap();

        let result = load_gather_assets(&[dir.path().to_path_buf()]);
        assert!(matches!(result, Err(AssetIndexError::ServerPathConflict { .. })));
    }

    #[test]
    fn path_traversal_entry_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("Evil");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join("control.json"),
            r#"{"data": ["../../etc/passwd"]}"#,
        )
        .unwrap();

        let gathers = load_gather_assets(&[dir.path().to_path_buf()]).unwrap();
        assert!(gathers.is_empty());
    }

    #[test]
    fn json_files_are_never_assets() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("Weird");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("extra.json"), b"{}").unwrap();
        fs::write(
            pkg.join("control.json"),
            r#"{"data": ["extra.json"]}"#,
        )
        .unwrap();

        let gathers = load_gather_assets(&[dir.path().to_path_buf()]).unwrap();
        assert!(gathers.is_empty());
    }
}
