//! Pipeline Orchestrator (spec §4.7): the ten ordered stages that turn a
//! resolved staged set into published manifests, secure lists, and a
//! download tree.
//!
//! Stages run in a fixed order because each one reads state an earlier one
//! produced: encryption must settle before hashing can be meaningful,
//! hashing before dirty comparison, dirty comparison before the compress
//! stage decides whether to redo expensive gzip work. Within a stage, file
//! I/O is farmed out to a `tokio::task::JoinSet` of `spawn_blocking` jobs,
//! the same worker-pool shape [`dni_resolver::age`] uses for page parsing
//! (spec §5).

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, Write as _};
use std::path::{Path, PathBuf};

use dni_assets::asset::Asset;
use dni_crypto::{CipherKey, CipherReader, CipherWriter, Encryption};
use dni_formats::manifestdb::{AssetDatabase, CachedAsset, ListEntry, ManifestEntry};
use dni_formats::ManifestFlags;
use dni_resolver::Resolved;

use crate::error::{AssetError, PipelineError, Result};

/// One staged asset's working manifest-entry state, built up stage by
/// stage. Smaller than [`ManifestEntry`] plus [`Asset`] combined only in
/// that it tracks the on-disk location the rest of the stages should read
/// from next, which may move (the encrypt stage rewrites it to a
/// re-encrypted temp file per spec §4.7 step 1 / §3 Resource rules).
#[derive(Debug, Clone)]
struct Working {
    entry: ManifestEntry,
    source_path: PathBuf,
}

/// Static configuration the orchestrator needs beyond the resolved/cached
/// state, mirroring the `server.*`/`output.*` configuration keys (spec §6).
pub struct OrchestratorConfig<'a> {
    /// `server.droid_key`, parsed.
    pub droid_key: CipherKey,
    /// `output.downloads`: where gzip download blobs are written.
    pub downloads_dir: &'a Path,
    /// `output.secure`: where plaintext secure-download copies are published.
    pub secure_dir: &'a Path,
    /// `server.age_directory`, if configured.
    pub age_directory: Option<&'a Path>,
    /// `server.sdl_directory`, if configured.
    pub sdl_directory: Option<&'a Path>,
    /// `server.secure_manifest`: whether secure-download members also join
    /// a `SecurePreloader` manifest.
    pub secure_manifest: bool,
    /// Scratch directory for the encrypt stage's re-encrypted temp files.
    pub work_dir: &'a Path,
}

/// Everything the orchestrator produced, ready for [`crate::config`]'s
/// chosen [`dni_formats::manifestdb::ManifestBackend`] to persist (stage 10
/// is a diff-and-write the caller drives, since the write itself is a
/// back-end concern, not an orchestrator one).
pub struct OrchestratorOutput {
    /// Every published manifest's final member entries.
    pub manifests: HashMap<String, Vec<ManifestEntry>>,
    /// Every secure list's final member entries.
    pub lists: HashMap<(String, String), Vec<ListEntry>>,
    /// Manifest names whose member set changed and must be rewritten
    /// (spec §9 open question (a), via [`dni_formats::manifestdb::is_manifest_dirty`]).
    pub dirty_manifests: Vec<String>,
    /// Manifest names present in the cached database but not this run's
    /// output, to be deleted.
    pub orphaned_manifests: Vec<String>,
    /// Secure-list keys present in the cached database but not this run's
    /// output, to be deleted.
    pub orphaned_lists: Vec<(String, String)>,
    /// Client paths present in the cached database but no longer staged,
    /// whose download blobs and secure copies have been removed from disk.
    pub orphaned_assets: Vec<String>,
}

fn extension_of(client_path: &str) -> String {
    Path::new(client_path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()).to_lowercase())
        .unwrap_or_default()
}

fn encryption_for_extension(ext: &str) -> Option<Encryption> {
    match ext {
        ".age" | ".csv" | ".fni" => Some(Encryption::Xtea),
        ".pak" | ".sdl" => Some(Encryption::Btea),
        _ => None,
    }
}

/// The secure-download directory/extension key a `.pak`/`.sdl` server path
/// falls under: the path's own containing directory, matching
/// [`crate::pack::reuse_cached_pack`]'s `("python_pak", "pak")` convention.
fn containing_directory(server_path: &str) -> String {
    let parts: Vec<&str> = server_path.split('/').collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2].to_string()
    } else {
        String::new()
    }
}

fn temp_path_for(work_dir: &Path, server_path: &str) -> PathBuf {
    let sanitized: String = server_path
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    work_dir.join(format!("{sanitized}.reencrypted"))
}

fn build_working_map(resolved: &Resolved, index: &HashMap<String, Asset>) -> Result<HashMap<String, Working>> {
    let mut out = HashMap::new();
    for (server_path, staged) in &resolved.staged {
        let asset = index.get(server_path).ok_or_else(|| {
            PipelineError::Internal(format!("staged server path '{server_path}' missing from asset index"))
        })?;
        out.insert(
            server_path.clone(),
            Working {
                entry: ManifestEntry {
                    file_name: staged.client_path.clone(),
                    flags: ManifestFlags::new(staged.flags),
                    ..Default::default()
                },
                source_path: asset.source_path.clone(),
            },
        );
    }
    Ok(out)
}

fn reencrypt(source_path: &Path, dest_path: &Path, current: Encryption, desired: Encryption, key: CipherKey) -> Result<()> {
    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let plaintext = if current == Encryption::Unspecified {
        std::fs::read(source_path)?
    } else {
        let file = std::fs::File::open(source_path)?;
        let mut reader = CipherReader::open(file, current, key).map_err(AssetError::from)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        buf
    };

    let out = std::fs::File::create(dest_path)?;
    let mut writer = CipherWriter::create(out, desired, key).map_err(AssetError::from)?;
    writer.write_all(&plaintext)?;
    writer.finish().map_err(AssetError::from)?;
    Ok(())
}

/// Stage 1: bring every staged asset's on-disk encryption into line with
/// what its extension requires (spec §4.7 step 1).
async fn stage_encrypt(working: &mut HashMap<String, Working>, key: CipherKey, work_dir: &Path) -> Result<()> {
    let mut set = tokio::task::JoinSet::new();
    let items: Vec<(String, PathBuf, bool, Option<Encryption>)> = working
        .iter()
        .map(|(server_path, w)| {
            let desired = encryption_for_extension(&extension_of(&w.entry.file_name));
            (
                server_path.clone(),
                w.source_path.clone(),
                w.entry.flags.has(ManifestFlags::DONT_ENCRYPT),
                desired,
            )
        })
        .collect();

    for (server_path, source_path, dont_encrypt, desired) in items {
        let Some(desired) = desired else { continue };
        if dont_encrypt {
            continue;
        }
        let work_dir = work_dir.to_path_buf();
        set.spawn_blocking(move || -> Result<(String, Option<PathBuf>, bool)> {
            let mut file = std::fs::File::open(&source_path)?;
            let current = dni_crypto::detect_from_reader(&mut file)?;
            match current {
                c if c == desired && c == Encryption::Btea => {
                    tracing::warn!(path = %server_path, "source already BTEA-encrypted; leaving in place rather than double-encrypting");
                    Ok((server_path, None, false))
                }
                c if c == desired => Ok((server_path, None, false)),
                Encryption::Btea => Err(AssetError::IncorrectEncryption {
                    client_path: server_path.clone(),
                }
                .into()),
                current => {
                    let temp_path = temp_path_for(&work_dir, &server_path);
                    reencrypt(&source_path, &temp_path, current, desired, key)?;
                    Ok((server_path, Some(temp_path), true))
                }
            }
        });
    }

    while let Some(outcome) = set.join_next().await {
        let (server_path, new_path, force_dirty) =
            outcome.map_err(|e| PipelineError::Internal(e.to_string()))??;
        if let Some(w) = working.get_mut(&server_path) {
            if let Some(path) = new_path {
                w.source_path = path;
            }
            if force_dirty {
                // REDESIGN FLAG (c): a re-encrypted file is always treated as
                // dirty, even if its plaintext content didn't change, since
                // the pipeline has no cheap way to tell "re-encrypted" from
                // "actually changed" apart without hashing the old cipher
                // form too.
                w.entry.flags.set(ManifestFlags::DIRTY);
            }
        }
    }
    Ok(())
}

/// Stage 2: MD5 every staged asset's authoritative bytes, skipping
/// [`ManifestFlags::CONSUMABLE`] entries (spec I3: never published, so
/// never hashed).
async fn stage_hash(working: &mut HashMap<String, Working>) -> Result<()> {
    let mut set = tokio::task::JoinSet::new();
    let items: Vec<(String, PathBuf)> = working
        .iter()
        .filter(|(_, w)| !w.entry.flags.has(ManifestFlags::CONSUMABLE))
        .map(|(server_path, w)| (server_path.clone(), w.source_path.clone()))
        .collect();

    for (server_path, source_path) in items {
        set.spawn_blocking(move || -> Result<(String, String, u64)> {
            let (hash, size) = dni_crypto::hash::md5_file(&source_path)?;
            Ok((server_path, hash, size))
        });
    }

    while let Some(outcome) = set.join_next().await {
        let (server_path, hash, size) = outcome.map_err(|e| PipelineError::Internal(e.to_string()))??;
        if let Some(w) = working.get_mut(&server_path) {
            w.entry.file_hash = hash;
            w.entry.file_size = size;
        }
    }
    Ok(())
}

/// Added/changed/deleted server paths found by stage 3, for callers that
/// want to log or report the run's shape.
pub struct DirtyReport {
    /// Newly staged client paths absent from the cached database.
    pub added: Vec<String>,
    /// Staged client paths whose hash changed from the cached database.
    pub changed: Vec<String>,
}

/// Stage 3: compare hashes against [`AssetDatabase::assets`] (keyed by
/// client path), marking changed/new entries [`ManifestFlags::DIRTY`] and
/// seeding unchanged entries' download fields from the cache so stage 6 can
/// skip recompression.
fn stage_dirty_compare(working: &mut HashMap<String, Working>, cached: &AssetDatabase) -> DirtyReport {
    let mut added = Vec::new();
    let mut changed = Vec::new();
    for w in working.values_mut() {
        match cached.assets.get(&w.entry.file_name) {
            Some(Some(c)) if c.file_hash == w.entry.file_hash => {
                w.entry.download_hash = c.download_hash.clone();
                w.entry.download_size = c.download_size;
            }
            Some(Some(_)) => {
                w.entry.flags.set(ManifestFlags::DIRTY);
                changed.push(w.entry.file_name.clone());
            }
            Some(None) => {
                // Previously discarded as conflicting (spec §9 open question
                // (b)): treat as unknown and force a republish.
                w.entry.flags.set(ManifestFlags::DIRTY);
                changed.push(w.entry.file_name.clone());
            }
            None => {
                w.entry.flags.set(ManifestFlags::DIRTY);
                added.push(w.entry.file_name.clone());
            }
        }
    }
    DirtyReport { added, changed }
}

/// Stage 4: every `.pak`/`.sdl` joins its `(directory, extension)` secure
/// list, and (if `server.secure_manifest` is set) a `SecurePreloader`
/// manifest (spec §4.7 step 4).
fn stage_secure_download(
    working: &HashMap<String, Working>,
    secure_manifest: bool,
) -> (HashMap<(String, String), Vec<ListEntry>>, Vec<String>) {
    let mut lists: HashMap<(String, String), Vec<ListEntry>> = HashMap::new();
    let mut secure_members = Vec::new();
    for (server_path, w) in working {
        let ext = extension_of(&w.entry.file_name);
        if ext == ".pak" || ext == ".sdl" {
            let key = (containing_directory(server_path), ext.trim_start_matches('.').to_string());
            lists.entry(key).or_default().push(ListEntry {
                file_name: w.entry.file_name.clone(),
                file_size: w.entry.file_size,
            });
            if secure_manifest {
                secure_members.push(server_path.clone());
            }
        }
    }
    (lists, secure_members)
}

/// Stage 5: union age-manifest entries into every full client install, and
/// secure-manifest entries into both thin and full installs (spec §4.7
/// step 5).
fn stage_manifest_merge(resolved: &Resolved, secure_members: &[String]) -> HashMap<String, Vec<String>> {
    let mut manifest_members = resolved.manifests.clone();
    if !secure_members.is_empty() {
        manifest_members
            .entry("SecurePreloader".to_string())
            .or_default()
            .extend(secure_members.iter().cloned());
    }

    let variant_names = dni_resolver::client_surface::all_variant_manifest_names();
    let age_names: Vec<String> = resolved
        .manifests
        .keys()
        .filter(|name| !variant_names.contains(name.as_str()))
        .cloned()
        .collect();

    for (thin, full) in dni_resolver::full_and_thin_manifest_names() {
        if let Some(full_name) = full {
            if manifest_members.contains_key(full_name) {
                for age_name in &age_names {
                    if let Some(age_members) = resolved.manifests.get(age_name) {
                        let members = manifest_members.entry(full_name.to_string()).or_default();
                        for m in age_members {
                            if !members.contains(m) {
                                members.push(m.clone());
                            }
                        }
                    }
                }
                let members = manifest_members.entry(full_name.to_string()).or_default();
                for m in secure_members {
                    if !members.contains(m) {
                        members.push(m.clone());
                    }
                }
            }
        }
        if let Some(thin_name) = thin {
            if manifest_members.contains_key(thin_name) {
                let members = manifest_members.entry(thin_name.to_string()).or_default();
                for m in secure_members {
                    if !members.contains(m) {
                        members.push(m.clone());
                    }
                }
            }
        }
    }

    manifest_members
}

/// Stage 6: gzip every asset referenced by any manifest, reusing the
/// cached download hash/size when the file wasn't marked dirty (spec §4.7
/// step 6).
async fn stage_compress(
    working: &mut HashMap<String, Working>,
    manifest_members: &HashMap<String, Vec<String>>,
    downloads_dir: &Path,
) -> Result<()> {
    let referenced: HashSet<String> = manifest_members.values().flatten().cloned().collect();

    let mut set = tokio::task::JoinSet::new();
    for server_path in &referenced {
        let Some(w) = working.get(server_path) else { continue };
        let dirty = w.entry.flags.has(ManifestFlags::DIRTY);
        if !dirty && !w.entry.download_hash.is_empty() {
            continue;
        }
        let source_path = w.source_path.clone();
        let download_name = format!("{}.gz", w.entry.file_name);
        let dest_path = downloads_dir.join(&download_name);
        let server_path = server_path.clone();
        set.spawn_blocking(move || -> Result<(String, String, u64)> {
            let (hash, size) = dni_crypto::hash::gzip_and_hash(&source_path, &dest_path)?;
            Ok((server_path, hash, size))
        });
    }

    while let Some(outcome) = set.join_next().await {
        let (server_path, hash, size) = outcome.map_err(|e| PipelineError::Internal(e.to_string()))??;
        if let Some(w) = working.get_mut(&server_path) {
            w.entry.download_hash = hash;
            w.entry.download_size = size;
        }
    }

    for server_path in &referenced {
        if let Some(w) = working.get_mut(server_path) {
            w.entry.download_name = format!("{}.gz", w.entry.file_name);
            w.entry.flags.set(ManifestFlags::FILE_GZIPPED);
        }
    }
    Ok(())
}

/// Stage 7: publish the plaintext secure-download copies (`.pak`/`.sdl`)
/// auth-server downloads serve directly, skipping unchanged content (spec
/// §4.7 step 7).
async fn stage_secure_copy(
    working: &HashMap<String, Working>,
    lists: &HashMap<(String, String), Vec<ListEntry>>,
    secure_dir: &Path,
    key: CipherKey,
) -> Result<()> {
    let mut members = HashSet::new();
    for entries in lists.values() {
        for e in entries {
            members.insert(e.file_name.clone());
        }
    }

    let mut set = tokio::task::JoinSet::new();
    for w in working.values() {
        if !members.contains(&w.entry.file_name) {
            continue;
        }
        let source_path = w.source_path.clone();
        let dest_path = secure_dir.join(&w.entry.file_name);
        let key = key;
        set.spawn_blocking(move || -> Result<()> {
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let unchanged = dest_path.is_file() && dni_crypto::hash::content_equal(&source_path, &dest_path, key)?;
            if !unchanged {
                std::fs::copy(&source_path, &dest_path)?;
            }
            Ok(())
        });
    }

    while let Some(outcome) = set.join_next().await {
        outcome.map_err(|e| PipelineError::Internal(e.to_string()))??;
    }
    Ok(())
}

fn decrypt_to(source_path: &Path, dest_path: &Path, key: CipherKey) -> Result<()> {
    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::open(source_path)?;
    let encryption = dni_crypto::detect_from_reader(&mut file)?;
    let mut plaintext = Vec::new();
    if encryption == Encryption::Unspecified {
        file.rewind()?;
        file.read_to_end(&mut plaintext)?;
    } else {
        file.rewind()?;
        let mut reader = CipherReader::open(file, encryption, key).map_err(AssetError::from)?;
        reader.read_to_end(&mut plaintext)?;
    }
    std::fs::write(dest_path, plaintext)?;
    Ok(())
}

/// Stage 8: server-side consumers (the age/SDL logic running in-process on
/// the server) need plaintext `.age`/`.sdl` files of their own, decrypted
/// on the fly from whatever the encrypt stage left behind (spec §4.7
/// step 8: `data`-category `.age` files and `sdl`-category `.sdl` files
/// only, not every asset that merely carries the extension).
async fn stage_server_asset_copy(
    working: &HashMap<String, Working>,
    index: &HashMap<String, Asset>,
    age_directory: Option<&Path>,
    sdl_directory: Option<&Path>,
    key: CipherKey,
) -> Result<()> {
    let mut set = tokio::task::JoinSet::new();
    for (server_path, w) in working {
        let Some(asset) = index.get(server_path) else { continue };
        let ext = extension_of(&w.entry.file_name);
        let dir = if ext == ".age" && asset.categories.iter().any(|c| c == "data") {
            age_directory
        } else if ext == ".sdl" && asset.categories.iter().any(|c| c == "sdl") {
            sdl_directory
        } else {
            None
        };
        let Some(dir) = dir else { continue };
        let file_name = Path::new(&w.entry.file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| w.entry.file_name.clone());
        let dest_path = dir.join(file_name);
        let source_path = w.source_path.clone();
        set.spawn_blocking(move || decrypt_to(&source_path, &dest_path, key));
    }

    while let Some(outcome) = set.join_next().await {
        outcome.map_err(|e| PipelineError::Internal(e.to_string()))??;
    }
    Ok(())
}

/// Stage 9: remove download blobs and secure copies for client paths the
/// cached database knows about but this run no longer stages (spec §4.7
/// step 9).
fn stage_orphan_removal(
    working: &HashMap<String, Working>,
    cached: &AssetDatabase,
    downloads_dir: &Path,
    secure_dir: &Path,
) -> Result<Vec<String>> {
    let staged_names: HashSet<&str> = working.values().map(|w| w.entry.file_name.as_str()).collect();
    let mut orphans = Vec::new();
    for client_path in cached.assets.keys() {
        if staged_names.contains(client_path.as_str()) {
            continue;
        }
        orphans.push(client_path.clone());

        let blob_path = downloads_dir.join(format!("{client_path}.gz"));
        if blob_path.is_file() {
            std::fs::remove_file(&blob_path)?;
        }
        let secure_path = secure_dir.join(client_path);
        if secure_path.is_file() {
            std::fs::remove_file(&secure_path)?;
        }
    }
    orphans.sort();
    Ok(orphans)
}

/// Run stages 1 through 9 and prepare stage 10's diff (spec §4.7). The
/// caller (the crate's `lib.rs` entry point) drives the actual manifest
/// DB write via whichever [`dni_formats::manifestdb::ManifestBackend`]
/// `server.type` selected — persistence is a back-end concern, not an
/// orchestrator one.
pub async fn run(
    resolved: &Resolved,
    index: &HashMap<String, Asset>,
    cached: &AssetDatabase,
    cfg: &OrchestratorConfig<'_>,
) -> Result<OrchestratorOutput> {
    std::fs::create_dir_all(cfg.work_dir)?;
    std::fs::create_dir_all(cfg.downloads_dir)?;
    std::fs::create_dir_all(cfg.secure_dir)?;

    let mut working = build_working_map(resolved, index)?;

    stage_encrypt(&mut working, cfg.droid_key, cfg.work_dir).await?;
    stage_hash(&mut working).await?;
    let dirty = stage_dirty_compare(&mut working, cached);
    tracing::info!(added = dirty.added.len(), changed = dirty.changed.len(), "dirty comparison complete");

    let (lists, secure_members) = stage_secure_download(&working, cfg.secure_manifest);
    let manifest_members = stage_manifest_merge(resolved, &secure_members);
    stage_compress(&mut working, &manifest_members, cfg.downloads_dir).await?;
    stage_secure_copy(&working, &lists, cfg.secure_dir, cfg.droid_key).await?;
    stage_server_asset_copy(&working, index, cfg.age_directory, cfg.sdl_directory, cfg.droid_key).await?;
    let orphaned_assets = stage_orphan_removal(&working, cached, cfg.downloads_dir, cfg.secure_dir)?;

    let mut manifests: HashMap<String, Vec<ManifestEntry>> = HashMap::new();
    for (name, members) in &manifest_members {
        let mut entries = Vec::new();
        for server_path in members {
            let Some(w) = working.get(server_path) else {
                return Err(PipelineError::Internal(format!(
                    "manifest '{name}' references unstaged server path '{server_path}'"
                )));
            };
            entries.push(w.entry.clone());
        }
        manifests.insert(name.clone(), entries);
    }

    let mut dirty_manifests = Vec::new();
    for (name, entries) in &manifests {
        let cached_entries = cached.manifests.get(name).map(Vec::as_slice).unwrap_or(&[]);
        if dni_formats::manifestdb::is_manifest_dirty(cached_entries, entries) {
            dirty_manifests.push(name.clone());
        }
    }

    let manifest_names: HashSet<&str> = manifests.keys().map(String::as_str).collect();
    let orphaned_manifests: Vec<String> = cached
        .manifests
        .keys()
        .filter(|name| !manifest_names.contains(name.as_str()))
        .cloned()
        .collect();

    let list_keys: HashSet<&(String, String)> = lists.keys().collect();
    let orphaned_lists: Vec<(String, String)> = cached
        .lists
        .keys()
        .filter(|key| !list_keys.contains(key))
        .cloned()
        .collect();

    Ok(OrchestratorOutput {
        manifests,
        lists,
        dirty_manifests,
        orphaned_manifests,
        orphaned_lists,
        orphaned_assets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file_name: &str, hash: &str, flags: u16) -> ManifestEntry {
        ManifestEntry {
            file_name: file_name.to_string(),
            file_hash: hash.to_string(),
            flags: ManifestFlags::new(flags),
            ..Default::default()
        }
    }

    #[test]
    fn containing_directory_is_second_from_last_path_segment() {
        assert_eq!(containing_directory("scripts/python_pak/Python.pak"), "python_pak");
        assert_eq!(containing_directory("scripts/sdl/core.sdl"), "sdl");
        assert_eq!(containing_directory("lonely.pak"), "");
    }

    #[test]
    fn dirty_compare_seeds_download_fields_when_unchanged() {
        let mut working = HashMap::new();
        working.insert(
            "dat/garden.age".to_string(),
            Working {
                entry: entry("dat/Garden.age", "abc123", 0),
                source_path: PathBuf::from("/dev/null"),
            },
        );

        let mut cached = AssetDatabase::default();
        cached.assets.insert(
            "dat/Garden.age".to_string(),
            Some(CachedAsset {
                file_hash: "abc123".to_string(),
                download_hash: "cachedhash".to_string(),
                file_size: 10,
                download_size: 4,
            }),
        );

        let report = stage_dirty_compare(&mut working, &cached);
        assert!(report.added.is_empty());
        assert!(report.changed.is_empty());
        let w = &working["dat/garden.age"];
        assert_eq!(w.entry.download_hash, "cachedhash");
        assert!(!w.entry.flags.has(ManifestFlags::DIRTY));
    }

    #[test]
    fn dirty_compare_flags_changed_hash_as_dirty() {
        let mut working = HashMap::new();
        working.insert(
            "dat/garden.age".to_string(),
            Working {
                entry: entry("dat/Garden.age", "newhash", 0),
                source_path: PathBuf::from("/dev/null"),
            },
        );

        let mut cached = AssetDatabase::default();
        cached.assets.insert(
            "dat/Garden.age".to_string(),
            Some(CachedAsset {
                file_hash: "oldhash".to_string(),
                download_hash: "cachedhash".to_string(),
                file_size: 10,
                download_size: 4,
            }),
        );

        let report = stage_dirty_compare(&mut working, &cached);
        assert_eq!(report.changed, vec!["dat/Garden.age".to_string()]);
        assert!(working["dat/garden.age"].entry.flags.has(ManifestFlags::DIRTY));
    }

    #[test]
    fn dirty_compare_flags_new_entries_as_added() {
        let mut working = HashMap::new();
        working.insert(
            "dat/newage.age".to_string(),
            Working {
                entry: entry("dat/NewAge.age", "hash", 0),
                source_path: PathBuf::from("/dev/null"),
            },
        );
        let cached = AssetDatabase::default();
        let report = stage_dirty_compare(&mut working, &cached);
        assert_eq!(report.added, vec!["dat/NewAge.age".to_string()]);
    }

    #[test]
    fn secure_download_stages_pak_and_sdl_into_lists() {
        let mut working = HashMap::new();
        working.insert(
            "scripts/python_pak/python.pak".to_string(),
            Working {
                entry: entry("Python/Python.pak", "h", 0),
                source_path: PathBuf::from("/dev/null"),
            },
        );
        working.insert(
            "scripts/sdl/core.sdl".to_string(),
            Working {
                entry: entry("SDL/core.sdl", "h", 0),
                source_path: PathBuf::from("/dev/null"),
            },
        );
        working.insert(
            "dat/garden.age".to_string(),
            Working {
                entry: entry("dat/Garden.age", "h", 0),
                source_path: PathBuf::from("/dev/null"),
            },
        );

        let (lists, secure_members) = stage_secure_download(&working, true);
        assert_eq!(lists[&("python_pak".to_string(), "pak".to_string())].len(), 1);
        assert_eq!(lists[&("sdl".to_string(), "sdl".to_string())].len(), 1);
        assert_eq!(secure_members.len(), 2);
    }

    #[test]
    fn manifest_merge_unions_age_entries_into_full_installs_only() {
        let mut resolved = Resolved::default();
        resolved.add_to_manifest("Garden", "dat/garden.age");
        resolved.add_to_manifest("External", "client/windows32/external/UruLauncher.exe");
        resolved.add_to_manifest("ThinExternal", "client/windows32/external/UruLauncher.exe");

        let members = stage_manifest_merge(&resolved, &[]);
        assert!(members["External"].contains(&"dat/garden.age".to_string()));
        assert!(!members["ThinExternal"].contains(&"dat/garden.age".to_string()));
    }

    #[test]
    fn manifest_merge_unions_secure_members_into_both_thin_and_full() {
        let mut resolved = Resolved::default();
        resolved.add_to_manifest("External", "client/windows32/external/UruLauncher.exe");
        resolved.add_to_manifest("ThinExternal", "client/windows32/external/UruLauncher.exe");

        let secure_members = vec!["scripts/sdl/core.sdl".to_string()];
        let members = stage_manifest_merge(&resolved, &secure_members);
        assert!(members["External"].contains(&"scripts/sdl/core.sdl".to_string()));
        assert!(members["ThinExternal"].contains(&"scripts/sdl/core.sdl".to_string()));
    }

    #[test]
    fn orphan_removal_lists_cached_paths_no_longer_staged() {
        let working: HashMap<String, Working> = HashMap::new();
        let mut cached = AssetDatabase::default();
        cached.assets.insert(
            "dat/Retired.age".to_string(),
            Some(CachedAsset::default()),
        );

        let dir = tempfile::tempdir().unwrap();
        let orphans = stage_orphan_removal(&working, &cached, dir.path(), dir.path()).unwrap();
        assert_eq!(orphans, vec!["dat/Retired.age".to_string()]);
    }
}
