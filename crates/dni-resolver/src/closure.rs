//! SDL descriptor transitive closure: spec §4.5 pass 3.
//!
//! The client always needs a fixed core set of `STATEDESC` descriptors
//! (the avatar, physical, and messaging machinery every age references
//! implicitly) plus whatever a Python file mod's own state descriptor
//! embeds transitively via `$descriptor` variables. This module walks
//! that closure over an already-loaded [`Manager`] and reports, for each
//! reachable descriptor name, every source file that carries it.

use std::collections::HashSet;
use std::path::PathBuf;

use dni_formats::sdl::Manager;

use crate::error::{ResolverError, Result};

/// Descriptors the client requires regardless of which pages or Python
/// file mods a build happens to reference. Grounded on the fixed root
/// list `plasma_python.py`'s `find_python_sdl` seeds its closure with
/// before ever looking at a specific mod's own descriptor.
pub const CORE_DESCRIPTORS: [&str; 12] = [
    "AGMaster",
    "avatar",
    "avatarPhysical",
    "CloneMessage",
    "clothing",
    "Layer",
    "MorphSequence",
    "ParticleSystem",
    "physical",
    "Responder",
    "Sound",
    "XRegion",
];

/// One descriptor name reachable from the closure, and which file(s) it
/// was loaded from.
#[derive(Debug, Clone)]
pub struct ClosureMember {
    /// The descriptor's name as recorded in the manager (case preserved
    /// from whichever file declared it first).
    pub name: String,
    /// Every source file carrying at least one version of this descriptor.
    pub sources: Vec<PathBuf>,
}

/// Walk the descriptor closure starting from [`CORE_DESCRIPTORS`] plus
/// `extra_roots` (typically the per-Python-file-mod descriptor names a
/// build's script-dependency pass has already found), following embedded
/// `$descriptor` variables until no new names appear.
///
/// Missing core descriptors are fatal ([`ResolverError::MissingCoreDescriptor`]);
/// a missing `extra_roots` entry is logged and skipped. A descriptor
/// embedded by one already in the closure is always fatal if missing,
/// since by that point the client's own code assumes its presence.
pub fn resolve_closure(manager: &Manager, extra_roots: &[String]) -> Result<Vec<ClosureMember>> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: Vec<(String, bool)> = Vec::new();

    for name in CORE_DESCRIPTORS {
        queue.push((name.to_string(), true));
    }
    for name in extra_roots {
        queue.push((name.clone(), false));
    }

    let mut members = Vec::new();

    while let Some((name, required)) = queue.pop() {
        let folded = name.to_ascii_lowercase();
        if !visited.insert(folded) {
            continue;
        }

        let matches: Vec<&dni_formats::sdl::Descriptor> = manager.find_descriptors(&name).collect();
        if matches.is_empty() {
            if required {
                return Err(ResolverError::MissingCoreDescriptor(name));
            }
            tracing::warn!(descriptor = %name, "optional SDL descriptor root not found, skipping");
            continue;
        }

        let sources = matches.iter().filter_map(|d| d.source.clone()).collect();
        members.push(ClosureMember {
            name: name.clone(),
            sources,
        });

        for descriptor in &matches {
            for var in &descriptor.variables {
                if let Some(child) = &var.descriptor {
                    if manager.find_descriptor(child).is_none() {
                        return Err(ResolverError::EmbeddedDescriptorMissing {
                            parent: name.clone(),
                            child: child.clone(),
                        });
                    }
                    queue.push((child.clone(), true));
                }
            }
        }
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(descs: &[&str]) -> Manager {
        let mut mgr = Manager::new();
        for text in descs {
            mgr.read_descriptors(text).unwrap();
        }
        mgr
    }

    #[test]
    fn missing_core_descriptor_is_fatal() {
        let mgr = Manager::new();
        let err = resolve_closure(&mgr, &[]).unwrap_err();
        assert!(matches!(err, ResolverError::MissingCoreDescriptor(_)));
    }

    #[test]
    fn follows_embedded_descriptor_chain() {
        let mgr = manager_with(&[
            "STATEDESC AGMaster {\nVERSION 1\n}\n",
            "STATEDESC avatar {\nVERSION 1\n}\n",
            "STATEDESC avatarPhysical {\nVERSION 1\n}\n",
            "STATEDESC CloneMessage {\nVERSION 1\n}\n",
            "STATEDESC clothing {\nVERSION 1\n}\n",
            "STATEDESC Layer {\nVERSION 1\n}\n",
            "STATEDESC MorphSequence {\nVERSION 1\n}\n",
            "STATEDESC ParticleSystem {\nVERSION 1\n}\n",
            "STATEDESC physical {\nVERSION 1\n}\n",
            "STATEDESC Responder {\nVERSION 1\n}\n",
            "STATEDESC Sound {\nVERSION 1\n}\n",
            "STATEDESC XRegion {\nVERSION 1\n}\n",
            "STATEDESC xMyPythonMod {\nVERSION 1\nVAR $standardStage stages[]\n}\n",
            "STATEDESC standardStage {\nVERSION 1\n}\n",
        ]);
        let members = resolve_closure(&mgr, &["xMyPythonMod".to_string()]).unwrap();
        let names: HashSet<String> = members.iter().map(|m| m.name.clone()).collect();
        assert!(names.contains("standardStage"));
        assert!(names.contains("xMyPythonMod"));
    }

    #[test]
    fn missing_embedded_descriptor_is_fatal() {
        let mgr = manager_with(&[
            "STATEDESC AGMaster {\nVERSION 1\n}\n",
            "STATEDESC avatar {\nVERSION 1\n}\n",
            "STATEDESC avatarPhysical {\nVERSION 1\n}\n",
            "STATEDESC CloneMessage {\nVERSION 1\n}\n",
            "STATEDESC clothing {\nVERSION 1\n}\n",
            "STATEDESC Layer {\nVERSION 1\n}\n",
            "STATEDESC MorphSequence {\nVERSION 1\n}\n",
            "STATEDESC ParticleSystem {\nVERSION 1\n}\n",
            "STATEDESC physical {\nVERSION 1\n}\n",
            "STATEDESC Responder {\nVERSION 1\n}\n",
            "STATEDESC Sound {\nVERSION 1\n}\n",
            "STATEDESC XRegion {\nVERSION 1\n}\n",
            "STATEDESC xMyPythonMod {\nVERSION 1\nVAR $missingDescriptor stages[]\n}\n",
        ]);
        let err = resolve_closure(&mgr, &["xMyPythonMod".to_string()]).unwrap_err();
        assert!(matches!(err, ResolverError::EmbeddedDescriptorMissing { .. }));
    }

    #[test]
    fn optional_root_missing_is_only_a_warning() {
        let mgr = manager_with(&[
            "STATEDESC AGMaster {\nVERSION 1\n}\n",
            "STATEDESC avatar {\nVERSION 1\n}\n",
            "STATEDESC avatarPhysical {\nVERSION 1\n}\n",
            "STATEDESC CloneMessage {\nVERSION 1\n}\n",
            "STATEDESC clothing {\nVERSION 1\n}\n",
            "STATEDESC Layer {\nVERSION 1\n}\n",
            "STATEDESC MorphSequence {\nVERSION 1\n}\n",
            "STATEDESC ParticleSystem {\nVERSION 1\n}\n",
            "STATEDESC physical {\nVERSION 1\n}\n",
            "STATEDESC Responder {\nVERSION 1\n}\n",
            "STATEDESC Sound {\nVERSION 1\n}\n",
            "STATEDESC XRegion {\nVERSION 1\n}\n",
        ]);
        let members = resolve_closure(&mgr, &["xNeverLoaded".to_string()]).unwrap();
        assert_eq!(members.len(), CORE_DESCRIPTORS.len());
    }
}
