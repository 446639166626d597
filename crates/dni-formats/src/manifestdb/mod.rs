//! Manifest database: two interchangeable on-disk schemas for the
//! orchestrator's final staged state (spec §4.6).
//!
//! Back-end A ("plain") is one comma-separated text file per manifest and
//! one per secure list, with backslash-separated paths. Back-end B
//! ("binary") is length-prefixed, UTF-16LE-encoded, big-endian-integer
//! records, one file per manifest and one per secure-list *directory*
//! (merging extensions), plus a sidecar `encryption.key`.

pub mod error;
pub mod flags;

use std::collections::HashMap;
use std::path::Path;

pub use error::{ManifestDbError, Result};
use flags::ManifestFlags;

/// A single entry in a secure (auth-server) list: no hashes, just identity
/// and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Client path, canonical forward-slash form.
    pub file_name: String,
    /// Authoritative file size in bytes.
    pub file_size: u64,
}

/// One row of a published manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Client path the game requests, canonical forward-slash form.
    pub file_name: String,
    /// Server-relative download path (usually `file_name` plus `.gz`).
    pub download_name: String,
    /// MD5 of the authoritative (plain or encrypted) file.
    pub file_hash: String,
    /// MD5 of the gzip download blob.
    pub download_hash: String,
    /// Size of the authoritative file.
    pub file_size: u64,
    /// Size of the download blob.
    pub download_size: u64,
    /// Full flag bitfield, including internal-only bits not written to disk.
    pub flags: ManifestFlags,
}

impl Default for ManifestEntry {
    fn default() -> Self {
        Self {
            file_name: String::new(),
            download_name: String::new(),
            file_hash: String::new(),
            download_hash: String::new(),
            file_size: 0,
            download_size: 0,
            flags: ManifestFlags::new(0),
        }
    }
}

/// A loaded asset's four comparison fields, used to seed dirty detection
/// (spec §3 `AssetDatabase`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachedAsset {
    /// Cached `file_hash`.
    pub file_hash: String,
    /// Cached `download_hash`.
    pub download_hash: String,
    /// Cached `file_size`.
    pub file_size: u64,
    /// Cached `download_size`.
    pub download_size: u64,
}

impl CachedAsset {
    fn from_entry(e: &ManifestEntry) -> Self {
        Self {
            file_hash: e.file_hash.clone(),
            download_hash: e.download_hash.clone(),
            file_size: e.file_size,
            download_size: e.download_size,
        }
    }
}

/// The previously-published state, loaded once at start of a run.
#[derive(Debug, Clone, Default)]
pub struct AssetDatabase {
    /// Server path → comparison fields, deduplicated across all manifests
    /// that reference it. `None` marks a path that had conflicting entries
    /// across manifests and was discarded (spec §9 open question (b)).
    pub assets: HashMap<String, Option<CachedAsset>>,
    /// Manifest name → its entries, in file order.
    pub manifests: HashMap<String, Vec<ManifestEntry>>,
    /// `(directory, extension)` → its secure-list entries.
    pub lists: HashMap<(String, String), Vec<ListEntry>>,
}

impl AssetDatabase {
    /// Merge `manifests` into a single deduplicated asset map, counting and
    /// discarding conflicting entries (REDESIGN FLAG (b): increments by one
    /// per conflict, not the original's no-op `conflicts += conflicts`).
    pub fn from_manifests(manifests: HashMap<String, Vec<ManifestEntry>>,
                          lists: HashMap<(String, String), Vec<ListEntry>>) -> Self {
        let mut assets: HashMap<String, Option<CachedAsset>> = HashMap::new();
        let mut conflicts = 0u64;
        for entries in manifests.values() {
            for entry in entries {
                let candidate = CachedAsset::from_entry(entry);
                match assets.get(&entry.file_name) {
                    None => {
                        assets.insert(entry.file_name.clone(), Some(candidate));
                    }
                    Some(Some(existing)) if *existing == candidate => {}
                    Some(None) => {}
                    Some(_) => {
                        tracing::warn!(file_name = %entry.file_name, "CONFLICT: discarding asset entry");
                        conflicts += 1;
                        assets.insert(entry.file_name.clone(), None);
                    }
                }
            }
        }
        if conflicts > 0 {
            tracing::warn!(conflicts, "discarded conflicting asset entries");
        }
        Self {
            assets,
            manifests,
            lists,
        }
    }
}

/// `is_dirty` per spec §9 open question (a): a manifest is dirty if its
/// member-set changed or any staged member carries [`ManifestFlags::DIRTY`].
pub fn is_manifest_dirty(cached: &[ManifestEntry], staged: &[ManifestEntry]) -> bool {
    let cached_names: std::collections::HashSet<&str> =
        cached.iter().map(|e| e.file_name.as_str()).collect();
    let staged_names: std::collections::HashSet<&str> =
        staged.iter().map(|e| e.file_name.as_str()).collect();
    if cached_names != staged_names {
        return true;
    }
    staged
        .iter()
        .any(|e| ManifestFlags::new(e.flags.0).has(ManifestFlags::DIRTY))
}

fn to_windows_path(p: &str) -> String {
    p.replace('/', "\\")
}

fn from_windows_path(p: &str) -> String {
    p.replace('\\', "/")
}

/// A manifest-DB back-end, selected by `server.type` configuration.
pub trait ManifestBackend {
    /// Load every manifest (`*.mfs` / `*.mbm`) and secure list (`*.list` /
    /// `*.mbam`) found under the given directories.
    fn load_db(&self, mfs_path: &Path, list_path: &Path) -> Result<AssetDatabase>;

    /// Write one manifest's entries.
    fn write_manifest(&self, mfs_path: &Path, name: &str, entries: &[ManifestEntry]) -> Result<()>;

    /// Write every secure list, plus (for the binary back-end) the
    /// `encryption.key` sidecar.
    fn write_lists(
        &self,
        list_path: &Path,
        droid_key: dni_crypto::CipherKey,
        lists: &HashMap<(String, String), Vec<ListEntry>>,
    ) -> Result<()>;

    /// Delete manifest files whose names are no longer staged.
    fn delete_manifests(&self, mfs_path: &Path, names: &[String]) -> Result<()>;

    /// Delete secure-list files whose keys are no longer staged.
    fn delete_lists(&self, list_path: &Path, keys: &[(String, String)]) -> Result<()>;
}

/// Back-end A: one `.mfs` text file per manifest, one `<dir>_<ext>.list`
/// text file per secure list.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainBackend;

impl PlainBackend {
    fn read_manifest_file(&self, path: &Path) -> Result<Vec<ManifestEntry>> {
        let text = std::fs::read_to_string(path)?;
        let mut out = Vec::new();
        for (line_no, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 7 {
                tracing::error!(path = %path.display(), line = line_no + 1, "malformed manifest line");
                continue;
            }
            let Ok(file_size) = fields[4].parse() else { continue };
            let Ok(download_size) = fields[5].parse() else { continue };
            let Ok(flags) = fields[6].parse::<u16>() else { continue };
            out.push(ManifestEntry {
                file_name: from_windows_path(fields[0]),
                download_name: from_windows_path(fields[1]),
                file_hash: fields[2].to_string(),
                download_hash: fields[3].to_string(),
                file_size,
                download_size,
                flags: ManifestFlags::new(flags),
            });
        }
        Ok(out)
    }

    fn read_list_file(&self, path: &Path) -> Result<Vec<ListEntry>> {
        let text = std::fs::read_to_string(path)?;
        let mut out = Vec::new();
        for (line_no, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 2 {
                tracing::error!(path = %path.display(), line = line_no + 1, "malformed secure list line");
                continue;
            }
            let Ok(file_size) = fields[1].parse() else { continue };
            out.push(ListEntry {
                file_name: from_windows_path(fields[0]),
                file_size,
            });
        }
        Ok(out)
    }
}

impl ManifestBackend for PlainBackend {
    fn load_db(&self, mfs_path: &Path, list_path: &Path) -> Result<AssetDatabase> {
        let mut manifests = HashMap::new();
        if mfs_path.is_dir() {
            for entry in std::fs::read_dir(mfs_path)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("mfs") {
                    let name = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string();
                    manifests.insert(name, self.read_manifest_file(&path)?);
                }
            }
        }

        let mut lists = HashMap::new();
        if list_path.is_dir() {
            for entry in std::fs::read_dir(list_path)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("list") {
                    let stem = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string();
                    let Some((dir, ext)) = stem.split_once('_') else {
                        tracing::error!(path = %path.display(), "malformed list filename");
                        continue;
                    };
                    lists.insert(
                        (dir.to_string(), ext.to_string()),
                        self.read_list_file(&path)?,
                    );
                }
            }
        }

        Ok(AssetDatabase::from_manifests(manifests, lists))
    }

    fn write_manifest(&self, mfs_path: &Path, name: &str, entries: &[ManifestEntry]) -> Result<()> {
        std::fs::create_dir_all(mfs_path)?;
        let out_path = mfs_path.join(name).with_extension("mfs");
        let mut text = String::new();
        for e in entries {
            text.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                to_windows_path(&e.file_name),
                to_windows_path(&e.download_name),
                e.file_hash,
                e.download_hash,
                e.file_size,
                e.download_size,
                e.flags.persisted()
            ));
        }
        std::fs::write(out_path, text)?;
        Ok(())
    }

    fn write_lists(
        &self,
        list_path: &Path,
        _droid_key: dni_crypto::CipherKey,
        lists: &HashMap<(String, String), Vec<ListEntry>>,
    ) -> Result<()> {
        std::fs::create_dir_all(list_path)?;
        for ((dir, ext), entries) in lists {
            let out_path = list_path.join(format!("{dir}_{ext}")).with_extension("list");
            let mut text = String::new();
            for e in entries {
                text.push_str(&format!("{},{}\n", to_windows_path(&e.file_name), e.file_size));
            }
            std::fs::write(out_path, text)?;
        }
        Ok(())
    }

    fn delete_manifests(&self, mfs_path: &Path, names: &[String]) -> Result<()> {
        for name in names {
            let path = mfs_path.join(name).with_extension("mfs");
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn delete_lists(&self, list_path: &Path, keys: &[(String, String)]) -> Result<()> {
        for (dir, ext) in keys {
            let path = list_path.join(format!("{dir}_{ext}")).with_extension("list");
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn write_wstr(buf: &mut Vec<u8>, value: &str) {
    for unit in value.encode_utf16() {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf.extend_from_slice(&0u16.to_le_bytes());
}

fn write_int_be(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
}

fn read_wstr(buf: &[u8], pos: &mut usize, path: &str) -> Result<String> {
    let mut units = Vec::new();
    loop {
        if *pos + 2 > buf.len() {
            return Err(ManifestDbError::UnterminatedString(path.to_string()));
        }
        let unit = u16::from_le_bytes([buf[*pos], buf[*pos + 1]]);
        *pos += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| ManifestDbError::InvalidUtf16(path.to_string()))
}

fn read_int_be(buf: &[u8], pos: &mut usize) -> Result<u32> {
    if *pos + 6 > buf.len() {
        return Err(ManifestDbError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated integer field",
        )));
    }
    let value = u32::from_be_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 6; // 4-byte int + 2-byte NUL terminator
    Ok(value)
}

/// Back-end B: one `.mbm` binary file per manifest, one `<dir>.mbam` per
/// secure-list directory (merging all extensions), and a sidecar
/// `encryption.key`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryBackend;

impl BinaryBackend {
    fn read_manifest_file(&self, path: &Path) -> Result<Vec<ManifestEntry>> {
        let buf = std::fs::read(path)?;
        let path_str = path.display().to_string();
        if buf.is_empty() {
            return Ok(Vec::new());
        }
        let mut pos = 0usize;
        let num_entries = read_raw_u32(&buf, &mut pos)?;
        let mut out = Vec::with_capacity(num_entries as usize);
        for _ in 0..num_entries {
            let length = read_raw_u32(&buf, &mut pos)? as usize;
            let end = pos + length;
            if end > buf.len() {
                return Err(ManifestDbError::EntryLengthMismatch(path_str));
            }
            let file_name = read_wstr(&buf, &mut pos, &path_str)?;
            let download_name = read_wstr(&buf, &mut pos, &path_str)?;
            let file_hash = read_wstr(&buf, &mut pos, &path_str)?;
            let download_hash = read_wstr(&buf, &mut pos, &path_str)?;
            let file_size = read_int_be(&buf, &mut pos)?;
            let download_size = read_int_be(&buf, &mut pos)?;
            let flags = read_int_be(&buf, &mut pos)?;
            if pos != end {
                tracing::warn!(path = %path_str, "manifest entry underrun");
                pos = end;
            }
            out.push(ManifestEntry {
                file_name: from_windows_path(&file_name),
                download_name: from_windows_path(&download_name),
                file_hash,
                download_hash,
                file_size: u64::from(file_size),
                download_size: u64::from(download_size),
                flags: ManifestFlags::new(flags as u16),
            });
        }
        Ok(out)
    }

    fn read_list_file(&self, path: &Path) -> Result<Vec<ListEntry>> {
        let buf = std::fs::read(path)?;
        let path_str = path.display().to_string();
        let mut pos = 0usize;
        let mut out = Vec::new();
        while pos < buf.len() {
            let file_name = read_wstr(&buf, &mut pos, &path_str)?;
            let file_size = read_int_be(&buf, &mut pos)?;
            out.push(ListEntry {
                file_name: from_windows_path(&file_name),
                file_size: u64::from(file_size),
            });
        }
        Ok(out)
    }
}

fn read_raw_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    if *pos + 4 > buf.len() {
        return Err(ManifestDbError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated length-prefix field",
        )));
    }
    let v = u32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

impl ManifestBackend for BinaryBackend {
    fn load_db(&self, mfs_path: &Path, list_path: &Path) -> Result<AssetDatabase> {
        let mut manifests = HashMap::new();
        if mfs_path.is_dir() {
            for entry in std::fs::read_dir(mfs_path)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("mbm") {
                    let name = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string();
                    manifests.insert(name, self.read_manifest_file(&path)?);
                }
            }
        }

        let mut lists = HashMap::new();
        if list_path.is_dir() {
            for entry in std::fs::read_dir(list_path)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("mbam") {
                    let dir_name = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string();
                    for entry in self.read_list_file(&path)? {
                        let ext = Path::new(&entry.file_name)
                            .extension()
                            .and_then(|e| e.to_str())
                            .unwrap_or_default()
                            .to_string();
                        lists
                            .entry((dir_name.clone(), ext))
                            .or_insert_with(Vec::new)
                            .push(entry);
                    }
                }
            }
        }

        Ok(AssetDatabase::from_manifests(manifests, lists))
    }

    fn write_manifest(&self, mfs_path: &Path, name: &str, entries: &[ManifestEntry]) -> Result<()> {
        std::fs::create_dir_all(mfs_path)?;
        let out_path = mfs_path.join(name).with_extension("mbm");
        let mut out = Vec::new();
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for e in entries {
            let mut body = Vec::new();
            write_wstr(&mut body, &to_windows_path(&e.file_name));
            write_wstr(&mut body, &to_windows_path(&e.download_name));
            write_wstr(&mut body, &e.file_hash);
            write_wstr(&mut body, &e.download_hash);
            write_int_be(&mut body, e.file_size as u32);
            write_int_be(&mut body, e.download_size as u32);
            write_int_be(&mut body, u32::from(e.flags.persisted()));
            out.extend_from_slice(&(body.len() as u32).to_le_bytes());
            out.extend_from_slice(&body);
        }
        std::fs::write(out_path, out)?;
        Ok(())
    }

    fn write_lists(
        &self,
        list_path: &Path,
        droid_key: dni_crypto::CipherKey,
        lists: &HashMap<(String, String), Vec<ListEntry>>,
    ) -> Result<()> {
        std::fs::create_dir_all(list_path)?;

        let key_path = list_path.join("encryption.key");
        let mut key_bytes = Vec::with_capacity(16);
        for word in droid_key.to_le_words() {
            key_bytes.extend_from_slice(&word.to_le_bytes());
        }
        std::fs::write(key_path, key_bytes)?;

        let mut by_dir: HashMap<&str, Vec<&ListEntry>> = HashMap::new();
        for ((dir, _ext), entries) in lists {
            by_dir.entry(dir.as_str()).or_default().extend(entries.iter());
        }
        for (dir, entries) in by_dir {
            let out_path = list_path.join(dir).with_extension("mbam");
            let mut out = Vec::new();
            for e in entries {
                write_wstr(&mut out, &to_windows_path(&e.file_name));
                write_int_be(&mut out, e.file_size as u32);
            }
            std::fs::write(out_path, out)?;
        }
        Ok(())
    }

    fn delete_manifests(&self, mfs_path: &Path, names: &[String]) -> Result<()> {
        for name in names {
            let path = mfs_path.join(name).with_extension("mbm");
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn delete_lists(&self, list_path: &Path, keys: &[(String, String)]) -> Result<()> {
        let mut dirs: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for (dir, _ext) in keys {
            dirs.insert(dir.as_str());
        }
        for dir in dirs {
            let path = list_path.join(dir).with_extension("mbam");
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
