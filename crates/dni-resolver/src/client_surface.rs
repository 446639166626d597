//! Client-surface dependency resolution: spec §4.5 pass 2.
//!
//! Two independent jobs live here: every client-surface asset (installer
//! prerequisites, the Windows/macOS launcher trees) is assigned to its
//! thin/patcher/full manifest triple by category, and every core client
//! file (ages, fonts, localization, and the movies the client still
//! loads directly rather than through a Python script) is added to every
//! known client manifest.

use std::collections::HashMap;
use std::sync::LazyLock;

use dni_assets::asset::Asset;
use dni_formats::ManifestFlags;

use crate::staged::Resolved;

/// The thin/patcher/full manifest names a gather category's assets are
/// staged into. `None` means that tier doesn't exist for the category.
/// Grounded on `constants.py`'s `gather_manifests`.
struct ManifestTriple {
    thin: Option<&'static str>,
    patcher: Option<&'static str>,
    full: Option<&'static str>,
}

static GATHER_MANIFESTS: LazyLock<HashMap<&'static str, ManifestTriple>> = LazyLock::new(|| {
    HashMap::from([
        (
            "external",
            ManifestTriple {
                thin: Some("ThinExternal"),
                patcher: Some("ExternalPatcher"),
                full: Some("External"),
            },
        ),
        (
            "internal",
            ManifestTriple {
                thin: Some("ThinInternal"),
                patcher: Some("InternalPatcher"),
                full: Some("Internal"),
            },
        ),
        (
            "prereq",
            ManifestTriple {
                thin: None,
                patcher: Some("DependencyPatcher"),
                full: None,
            },
        ),
        (
            "prereq64",
            ManifestTriple {
                thin: None,
                patcher: Some("DependencyPatcher"),
                full: None,
            },
        ),
        (
            "mac",
            ManifestTriple {
                thin: None,
                patcher: None,
                full: Some("macExternal"),
            },
        ),
    ])
});

/// Categories whose members must be flagged [`ManifestFlags::INSTALLER`]
/// (spec §4.5 flag policy: `category ∈ {prereq, prereq64}`). Grounded on
/// `constants.py`'s `gather_installers`.
static GATHER_INSTALLERS: LazyLock<std::collections::HashSet<&'static str>> =
    LazyLock::new(|| std::collections::HashSet::from(["prereq", "prereq64"]));

/// A category's patcher only claims patcher-manifest membership when its
/// own executable is the one being staged, so a single patcher category
/// doesn't drag every prerequisite installer into its own manifest.
/// Grounded on `constants.py`'s `patcher_lut`.
static PATCHER_LUT: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| HashMap::from([("external", "UruLauncher.exe"), ("internal", "plUruLauncher.exe")]));

/// File suffixes the client loads directly without going through a
/// Python script, so every known client manifest must carry them.
const CORE_CLIENT_SUFFIXES: [&str; 3] = [".age", ".p2f", ".loc"];
/// Movie suffixes played back outside of any Python script. Kept separate
/// per the original's own `FIXME` about removing this if movie playback
/// from Python is ever detected.
const MOVIE_SUFFIXES: [&str; 3] = [".avi", ".bik", ".webm"];

/// Every known variant's `(thin, full)` manifest name pair, for the
/// orchestrator's manifest-merge stage (spec §4.7 step 5): full installs
/// carry every age; both thin and full installs carry the secure-download
/// manifest.
pub fn full_and_thin_manifest_names() -> Vec<(Option<&'static str>, Option<&'static str>)> {
    GATHER_MANIFESTS.values().map(|t| (t.thin, t.full)).collect()
}

/// Every manifest name this pass itself can populate: the thin/patcher/full
/// triples plus `SecurePreloader` (spec §4.7 step 5, §6). The orchestrator
/// subtracts this set from [`crate::Resolved::manifests`]'s keys to find the
/// age-named manifests pass 1 created, which are unioned into full installs
/// only.
pub fn all_variant_manifest_names() -> std::collections::HashSet<&'static str> {
    let mut names: std::collections::HashSet<&'static str> = GATHER_MANIFESTS
        .values()
        .flat_map(|t| [t.thin, t.patcher, t.full])
        .flatten()
        .collect();
    names.insert("SecurePreloader");
    names
}

fn suffix_of(client_path: &str) -> String {
    std::path::Path::new(client_path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()).to_lowercase())
        .unwrap_or_default()
}

/// Resolve client-surface dependencies for every asset in `index`, staging
/// results and manifest membership into `resolved`.
pub fn resolve_client_dependencies(index: &HashMap<String, Asset>, resolved: &mut Resolved) {
    tracing::info!("finding client dependencies");

    for (server_path, asset) in index {
        for category in &asset.categories {
            let Some(triple) = GATHER_MANIFESTS.get(category.as_str()) else {
                continue;
            };

            let flags = if GATHER_INSTALLERS.contains(category.as_str()) {
                ManifestFlags::INSTALLER
            } else {
                ManifestFlags::NONE
            };
            resolved.stage(server_path, &asset.client_path, flags);

            let file_name = asset.client_path.rsplit('/').next().unwrap_or(&asset.client_path);
            let patcher_owns_this_file = PATCHER_LUT
                .get(category.as_str())
                .is_none_or(|exe| *exe == file_name);

            for name in [triple.thin, triple.full] {
                if let Some(name) = name {
                    resolved.add_to_manifest(name, server_path);
                }
            }
            if patcher_owns_this_file {
                if let Some(name) = triple.patcher {
                    resolved.add_to_manifest(name, server_path);
                }
            }
        }

        let suffix = suffix_of(&asset.client_path);
        if CORE_CLIENT_SUFFIXES.contains(&suffix.as_str()) || MOVIE_SUFFIXES.contains(&suffix.as_str()) {
            resolved.stage(server_path, &asset.client_path, ManifestFlags::NONE);
            for triple in GATHER_MANIFESTS.values() {
                for name in [triple.thin, triple.full] {
                    if let Some(name) = name {
                        if resolved.manifests.contains_key(name) {
                            resolved.add_to_manifest(name, server_path);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(client_path: &str, category: &str) -> Asset {
        Asset::new(std::path::PathBuf::from("/dev/null"), client_path.to_string(), category)
    }

    #[test]
    fn prereq_category_is_flagged_installer_and_patcher_only() {
        let mut index = HashMap::new();
        index.insert("dependencies/x86/vcredist.exe".to_string(), asset("vcredist.exe", "prereq"));
        let mut resolved = Resolved::default();
        resolve_client_dependencies(&index, &mut resolved);

        let staged = &resolved.staged["dependencies/x86/vcredist.exe"];
        assert!(ManifestFlags::new(staged.flags).has(ManifestFlags::INSTALLER));
        assert_eq!(resolved.manifests["DependencyPatcher"], vec!["dependencies/x86/vcredist.exe".to_string()]);
        assert!(!resolved.manifests.contains_key("External"));
    }

    #[test]
    fn external_patcher_membership_requires_matching_executable() {
        let mut index = HashMap::new();
        index.insert(
            "client/windows32/external/otherfile.dat".to_string(),
            asset("otherfile.dat", "external"),
        );
        let mut resolved = Resolved::default();
        resolve_client_dependencies(&index, &mut resolved);

        assert!(!resolved.manifests.contains_key("ExternalPatcher"));
        assert!(resolved.manifests["External"].contains(&"client/windows32/external/otherfile.dat".to_string()));
    }

    #[test]
    fn age_file_joins_every_known_client_manifest() {
        let mut index = HashMap::new();
        index.insert(
            "client/windows32/external/UruLauncher.exe".to_string(),
            asset("UruLauncher.exe", "external"),
        );
        index.insert("data/age/Garden.age".to_string(), asset("dat/Garden.age", "data"));
        let mut resolved = Resolved::default();
        resolve_client_dependencies(&index, &mut resolved);

        assert!(resolved.manifests["External"].contains(&"data/age/Garden.age".to_string()));
    }
}
