//! The staged map: server path → discovered dependency, plus the
//! per-manifest membership sets the three resolver passes populate
//! (spec §4.5).

use std::collections::HashMap;

use dni_formats::ManifestFlags;

/// One server path the resolver has decided must be published, and the
/// flag bits discovered for it so far. This is deliberately smaller than
/// [`dni_formats::ManifestEntry`] — the resolver only knows identity and
/// flags; the orchestrator's hash/compress stages fill in the rest.
#[derive(Debug, Clone, Default)]
pub struct StagedAsset {
    /// Client path the game requests (spec §3 `ManifestEntry::file_name`).
    pub client_path: String,
    /// Flag bits OR-ed in across every pass that staged this asset.
    pub flags: u16,
}

/// The resolver's full output: every server path that must be published,
/// and which manifests each belongs to.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    /// Server path (case-folded) → discovered asset.
    pub staged: HashMap<String, StagedAsset>,
    /// Manifest name → member server paths, insertion-ordered and
    /// deduplicated.
    pub manifests: HashMap<String, Vec<String>>,
}

impl Resolved {
    /// Stage `server_path`, OR-ing `flags` into any existing entry.
    pub fn stage(&mut self, server_path: &str, client_path: &str, flags: u16) {
        let entry = self.staged.entry(server_path.to_string()).or_insert_with(|| StagedAsset {
            client_path: client_path.to_string(),
            flags: 0,
        });
        entry.flags |= flags;
    }

    /// Add `server_path` to `manifest`, unless already a member.
    pub fn add_to_manifest(&mut self, manifest: &str, server_path: &str) {
        let members = self.manifests.entry(manifest.to_string()).or_default();
        if !members.iter().any(|m| m == server_path) {
            members.push(server_path.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ors_flags_across_passes() {
        let mut r = Resolved::default();
        r.stage("audio/a.ogg", "sfx/a.ogg", ManifestFlags::SOUND_CACHE_STEREO);
        r.stage("audio/a.ogg", "sfx/a.ogg", ManifestFlags::INSTALLER);
        assert_eq!(
            r.staged["audio/a.ogg"].flags,
            ManifestFlags::SOUND_CACHE_STEREO | ManifestFlags::INSTALLER
        );
    }

    #[test]
    fn add_to_manifest_deduplicates() {
        let mut r = Resolved::default();
        r.add_to_manifest("Garden", "data/age/Garden.age");
        r.add_to_manifest("Garden", "data/age/Garden.age");
        assert_eq!(r.manifests["Garden"].len(), 1);
    }
}
