//! Python Pack Builder (spec §4.8): byte-compile every Python source into
//! `Python/Python.pak`, a single BTEA-encrypted archive.
//!
//! If a `.pak` is already staged (a build that ships a prebuilt pack),
//! this stage is skipped entirely and the prebuilt file is used as-is. The
//! reuse path lets a caller adopt a cached pack from the previous run's
//! secure list without re-invoking the byte-compiler at all.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dni_assets::asset::Asset;
use dni_crypto::{CipherKey, CipherWriter, Encryption};
use dni_formats::manifestdb::ListEntry;
use dni_formats::page::write_safe_string;
use dni_formats::ManifestFlags;

use crate::compile::{self, PfmVerdict};
use crate::config::PythonConfig;
use crate::error::{AssetError, Result};

/// The archive's fixed server/client identity (spec §4.8).
pub const PACK_CLIENT_PATH: &str = "Python/Python.pak";

/// One Python source queued for compilation.
struct Job {
    source_path: PathBuf,
    module_name: String,
    is_file_mod: bool,
}

/// Derive a dotted module name by walking up from `path` under `python_root`,
/// stopping at the first ancestor directory that has no `__init__.py`
/// sibling (i.e. is not itself a package), and joining stems root-to-leaf.
fn module_name_for(python_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(python_root).unwrap_or(path);
    let mut components: Vec<&std::ffi::OsStr> = relative
        .parent()
        .map(|p| p.iter().collect())
        .unwrap_or_default();

    // Walk from the file's immediate parent upward, keeping only the
    // directories that are themselves packages.
    let mut package_dirs = Vec::new();
    let mut probe = python_root.to_path_buf();
    for component in &components {
        probe.push(component);
        if probe.join("__init__.py").is_file() {
            package_dirs.push(*component);
        } else {
            package_dirs.clear();
        }
    }
    components = package_dirs;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut parts: Vec<String> = components.iter().map(|c| c.to_string_lossy().into_owned()).collect();
    parts.push(stem);
    parts.join(".")
}

/// Whether any `.pak` is already present in the gather/prebuilt `python`
/// category (spec §4.8: if so, skip the builder and stage it as-is).
fn find_prebuilt_pak(index: &HashMap<String, Asset>) -> Option<(String, PathBuf)> {
    index.values().find_map(|a| {
        if a.categories.iter().any(|c| c == "python") && a.client_path.to_lowercase().ends_with(".pak") {
            Some((a.client_path.clone(), a.source_path.clone()))
        } else {
            None
        }
    })
}

fn python_root(index: &HashMap<String, Asset>) -> Option<PathBuf> {
    index
        .values()
        .find(|a| a.categories.iter().any(|c| c == "python") && a.client_path.starts_with("Python/"))
        .map(|a| {
            let depth = a.client_path.matches('/').count();
            let mut root = a.source_path.clone();
            for _ in 0..depth {
                root.pop();
            }
            root
        })
}

/// Serialize `entries` (module name → compiled blob) into the BTEA-encrypted
/// archive wire format (spec §4.8).
fn write_archive(out_path: &Path, entries: &[(String, Vec<u8>)], key: CipherKey) -> Result<()> {
    let mut index_bytes: Vec<u8> = Vec::new();
    index_bytes.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    let header_size: u64 = 4
        + entries
            .iter()
            .map(|(name, _)| 2 + name.len() as u64 + 4)
            .sum::<u64>();

    let mut offset = header_size;
    for (name, blob) in entries {
        write_safe_string(&mut index_bytes, name);
        index_bytes.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += 4 + blob.len() as u64;
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(out_path)?;
    let mut writer = CipherWriter::create(file, Encryption::Btea, key).map_err(AssetError::from)?;
    use std::io::Write as _;
    writer.write_all(&index_bytes)?;
    for (_, blob) in entries {
        writer.write_all(&(blob.len() as u32).to_le_bytes())?;
        writer.write_all(blob)?;
    }
    writer.finish().map_err(AssetError::from)?;
    Ok(())
}

/// Build `Python/Python.pak` from every Python source in the index's
/// `python` category, or adopt a prebuilt one if already present.
///
/// Returns the archive's on-disk path and its client path, for the
/// orchestrator to stage with [`ManifestFlags::DONT_ENCRYPT`].
pub async fn build_pack(
    index: &HashMap<String, Asset>,
    flagged_file_mods: &std::collections::HashSet<String>,
    python: &PythonConfig,
    out_path: &Path,
    droid_key: CipherKey,
) -> Result<(PathBuf, String)> {
    if let Some((client_path, source_path)) = find_prebuilt_pak(index) {
        tracing::warn!(path = %client_path, "prebuilt Python.pak already present, skipping pack builder");
        return Ok((source_path, client_path));
    }

    let (Some(py_exe), Some(tool_script)) = (python.path.as_deref(), python.tool_script.as_deref()) else {
        return Err(AssetError::MissingSourceTree("python.path/python.tool_script".to_string()).into());
    };

    let Some(root) = python_root(index) else {
        return Err(AssetError::MissingSourceTree("Python/".to_string()).into());
    };

    let mut jobs = Vec::new();
    let mut seen_names: HashMap<String, String> = HashMap::new();
    let mut sources: Vec<(&String, &Asset)> = index
        .iter()
        .filter(|(_, a)| a.categories.iter().any(|c| c == "python") && a.client_path.to_lowercase().ends_with(".py"))
        .collect();
    sources.sort_by(|a, b| a.1.client_path.cmp(&b.1.client_path));

    for (server_path, asset) in sources {
        let module_name = module_name_for(&root, &asset.source_path);
        if let Some(prior) = seen_names.get(&module_name) {
            tracing::error!(module = %module_name, first = %prior, second = %asset.client_path, "module name collision, skipping file");
            continue;
        }
        seen_names.insert(module_name.clone(), asset.client_path.clone());
        jobs.push(Job {
            source_path: asset.source_path.clone(),
            module_name,
            is_file_mod: flagged_file_mods.contains(server_path),
        });
    }

    let mut set = tokio::task::JoinSet::new();
    for job in jobs {
        let py_exe = py_exe.to_path_buf();
        let tool_script = tool_script.to_path_buf();
        let glue_path = python.glue_path.clone();
        set.spawn(async move {
            let outcome = compile::compyle(
                &py_exe,
                &tool_script,
                &job.source_path,
                if job.is_file_mod { glue_path.as_deref() } else { None },
                &job.module_name,
                job.is_file_mod,
            )
            .await?;

            if job.is_file_mod && outcome.pfm != PfmVerdict::Indeed {
                tracing::warn!(
                    module = %job.module_name,
                    "page reader flagged this as a PythonFileMod but the AST disagrees"
                );
            }

            Ok::<(String, Vec<u8>), crate::error::PipelineError>((job.module_name, outcome.code))
        });
    }

    let mut entries = Vec::new();
    while let Some(outcome) = set.join_next().await {
        let (module_name, code) = outcome.map_err(|e| crate::error::PipelineError::Internal(e.to_string()))??;
        entries.push((module_name, code));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    write_archive(out_path, &entries, droid_key)?;

    Ok((out_path.to_path_buf(), PACK_CLIENT_PATH.to_string()))
}

/// Adopt a cached `Python/*.pak` from the previous run's secure list
/// instead of re-running the byte-compiler (spec §4.8 reuse path).
pub fn reuse_cached_pack(
    lists: &HashMap<(String, String), Vec<ListEntry>>,
    output_dir: &Path,
) -> Result<(PathBuf, String)> {
    let entries = lists
        .get(&("python_pak".to_string(), "pak".to_string()))
        .ok_or(AssetError::NoReusablePak)?;
    let entry = entries.first().ok_or(AssetError::NoReusablePak)?;
    let path = output_dir.join(&entry.file_name);
    if !path.is_file() {
        return Err(AssetError::NoReusablePak.into());
    }
    Ok((path, PACK_CLIENT_PATH.to_string()))
}

/// Flag bits the orchestrator must OR into the pack's staged entry: already
/// encrypted, never re-encrypted (spec §4.8).
pub const PACK_FLAGS: u16 = ManifestFlags::DONT_ENCRYPT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_name_strips_to_package_relative_dotted_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Python");
        std::fs::create_dir_all(root.join("system")).unwrap();
        std::fs::write(root.join("system/__init__.py"), b"").unwrap();
        std::fs::write(root.join("system/xFoo.py"), b"").unwrap();

        let name = module_name_for(&root, &root.join("system/xFoo.py"));
        assert_eq!(name, "system.xFoo");
    }

    #[test]
    fn module_name_without_init_py_has_no_package_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Python");
        std::fs::create_dir_all(root.join("loose")).unwrap();
        std::fs::write(root.join("loose/xBar.py"), b"").unwrap();

        let name = module_name_for(&root, &root.join("loose/xBar.py"));
        assert_eq!(name, "xBar");
    }

    #[test]
    fn archive_header_size_and_offsets_are_precomputed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("Python.pak");
        let entries = vec![
            ("xFoo".to_string(), vec![1, 2, 3]),
            ("xBar".to_string(), vec![4, 5]),
        ];
        write_archive(&out, &entries, CipherKey::default()).unwrap();
        assert!(out.is_file());
    }

    #[test]
    fn reuse_path_requires_cached_entry() {
        let dir = tempfile::tempdir().unwrap();
        let lists = HashMap::new();
        let err = reuse_cached_pack(&lists, dir.path()).unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::Asset(AssetError::NoReusablePak)));
    }
}
