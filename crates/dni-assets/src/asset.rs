//! The asset data model: where a file comes from, and where the client
//! expects to find it (spec §3).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maps a gather-package category name (also used as a prebuilt-source
/// sub-directory key) to the client-relative directory its files are
/// staged under. An empty string means "client root" — used by the
/// installer-executable categories, which live alongside `UruLauncher.exe`.
///
/// Grounded on `constants.py`'s `gather_lut`, extended with the 64-bit and
/// macOS client-surface categories the manifest spec names but the
/// original Python never needed (it only ever shipped one platform/arch
/// pair per server instance).
pub static CATEGORY_DIRECTORY: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("data", "dat"),
        ("sdl", "SDL"),
        ("python", "Python"),
        ("sfx", "sfx"),
        ("avi", "avi"),
        ("external", ""),
        ("external64", ""),
        ("internal", ""),
        ("internal64", ""),
        ("mac", ""),
        ("macExternal", ""),
        ("macInternal", ""),
        ("macBundleExternal", ""),
        ("macBundleInternal", ""),
        ("prereq", ""),
        ("prereq64", ""),
    ])
});

/// Path fragments that, if present in a control-file-supplied relative
/// path, indicate an attempt to escape the gather package root
/// (`constants.py`'s `naughty_path_sequences`).
pub const NAUGHTY_PATH_SEQUENCES: [&str; 3] = ["..", "../", "..\\"];

/// Returns true if `fragment` contains any path-traversal sequence.
pub fn is_path_traversal(fragment: &str) -> bool {
    NAUGHTY_PATH_SEQUENCES.iter().any(|seq| fragment.contains(seq))
}

/// A single known asset: where it was found, and where the client expects
/// it on the manifest server.
#[derive(Debug, Clone, Default)]
pub struct Asset {
    /// The gather package (or prebuilt source root) this asset came from,
    /// if any. `None` for assets loaded straight from a prebuilt source
    /// tree with no corresponding gather package.
    pub gather_path: Option<PathBuf>,
    /// Absolute path to the real file on the build machine.
    pub source_path: PathBuf,
    /// Client-relative path (forward-slash canonical form), e.g.
    /// `"dat/Garden_District_GZMarkerRm.prp"`.
    pub client_path: String,
    /// Every gather-package category this asset was staged under. Usually
    /// one, but the control-file format allows the same file to be listed
    /// in more than one section.
    pub categories: Vec<String>,
}

impl Asset {
    /// Build a new asset entry, recording its first category.
    pub fn new(source_path: PathBuf, client_path: String, category: impl Into<String>) -> Self {
        Self {
            gather_path: None,
            source_path,
            client_path,
            categories: vec![category.into()],
        }
    }
}

/// Join a category's client directory (if any) with a relative path,
/// producing the canonical forward-slash client path.
pub fn client_path_for(category: &str, relative: &Path) -> Option<String> {
    let directory = *CATEGORY_DIRECTORY.get(category)?;
    let mut parts: Vec<String> = Vec::new();
    if !directory.is_empty() {
        parts.push(directory.to_string());
    }
    for component in relative.components() {
        if let std::path::Component::Normal(part) = component {
            parts.push(part.to_string_lossy().into_owned());
        }
    }
    Some(parts.join("/"))
}
