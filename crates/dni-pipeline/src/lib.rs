//! Build pipeline orchestrator and Python pack builder for the D'ni
//! content-manifest pipeline (spec §1 overview, §4.7, §4.8).
//!
//! This crate is the top of the workspace: it wires [`dni_assets`]'s asset
//! index, [`dni_resolver`]'s dependency resolution, [`dni_formats`]'s
//! manifest database back-ends, and [`dni_crypto`]'s stream codec into one
//! end-to-end run. [`run_pipeline`] is the whole thing; [`compile`],
//! [`pack`], and [`orchestrator`] are usable independently by a caller that
//! wants finer control (e.g. a CLI running stages interactively).

#![warn(missing_docs)]

pub mod compile;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pack;

use std::collections::HashSet;

use dni_assets::asset::Asset;
use dni_formats::manifestdb::AssetDatabase;
use dni_formats::ManifestFlags;

use config::PipelineConfig;
use error::{AssetError, Result};
use orchestrator::OrchestratorConfig;

/// Stage the just-built (or reused) Python pack into the merged asset index
/// and the resolver's staged/manifest state, since it is produced after
/// [`dni_resolver::resolve_dependencies`] already ran (spec §4.8: "staged
/// with `dont_encrypt` and tagged category `python`").
fn stage_pack(
    index: &mut std::collections::HashMap<String, Asset>,
    resolved: &mut dni_resolver::Resolved,
    pack_path: std::path::PathBuf,
    client_path: String,
) -> Result<()> {
    let server_path = dni_assets::server_path_for(&client_path, &["python".to_string()])
        .ok_or_else(|| error::PipelineError::Internal(format!("no server-path bucket for '{client_path}'")))?;
    let key = dni_assets::fold_server_path(&server_path);

    index.insert(key.clone(), Asset::new(pack_path, client_path.clone(), "python"));
    resolved.stage(&key, &client_path, pack::PACK_FLAGS);

    // Every known client install needs the interpreter's byte-code, the
    // same way §4.5 pass 2 broadcasts core client files to every manifest
    // that already exists.
    for (thin, full) in dni_resolver::full_and_thin_manifest_names() {
        for name in [thin, full] {
            if let Some(name) = name {
                if resolved.manifests.contains_key(name) {
                    resolved.add_to_manifest(name, &key);
                }
            }
        }
    }
    Ok(())
}

/// Run the complete pipeline once: load the cached database, build the
/// merged asset index, resolve dependencies, build or reuse the Python
/// pack, run the ten orchestrator stages, and persist the result through
/// the configured manifest DB back-end.
///
/// `reuse_pack` selects [`pack::reuse_cached_pack`] over
/// [`pack::build_pack`] (spec §4.8 reuse path) — set when the caller wants
/// to avoid re-invoking the external byte-compiler for an unchanged tree.
pub async fn run_pipeline(config: &PipelineConfig, reuse_pack: bool) -> Result<orchestrator::OrchestratorOutput> {
    let backend = config.server.kind.backend();
    let droid_key = config.server.droid_key()?;

    tracing::info!("loading cached manifest database");
    let cached: AssetDatabase = backend
        .load_db(&config.output.manifests, &config.output.lists)
        .map_err(AssetError::from)?;

    let prebuilts = dni_assets::load_prebuilt_assets(&config.source.data_path, &config.source.scripts_path)
        .map_err(AssetError::from)?;
    let gathers = dni_assets::load_gather_assets(std::slice::from_ref(&config.source.gather_path))
        .map_err(AssetError::from)?;
    let mut index = dni_assets::merge_asset_dicts(prebuilts, gathers);

    let mut resolved = dni_resolver::resolve_dependencies(&index, Some(droid_key)).await?;

    let flagged_file_mods: HashSet<String> = resolved
        .staged
        .iter()
        .filter(|(_, staged)| ManifestFlags::new(staged.flags).has(ManifestFlags::PYTHON_FILE_MOD))
        .map(|(server_path, _)| server_path.clone())
        .collect();

    let pack_out_path = config.output.manifests.join("Python.pak");
    let (pack_path, pack_client_path) = if reuse_pack {
        pack::reuse_cached_pack(&cached.lists, &config.output.lists)?
    } else {
        pack::build_pack(&index, &flagged_file_mods, &config.python, &pack_out_path, droid_key).await?
    };
    stage_pack(&mut index, &mut resolved, pack_path, pack_client_path)?;

    let work_dir = config.output.manifests.join(".reencrypt-work");
    let orchestrator_cfg = OrchestratorConfig {
        droid_key,
        downloads_dir: &config.output.downloads,
        secure_dir: &config.output.secure,
        age_directory: config.server.age_directory.as_deref(),
        sdl_directory: config.server.sdl_directory.as_deref(),
        secure_manifest: config.server.secure_manifest,
        work_dir: &work_dir,
    };

    let output = orchestrator::run(&resolved, &index, &cached, &orchestrator_cfg).await?;

    for name in &output.dirty_manifests {
        let entries = &output.manifests[name];
        backend
            .write_manifest(&config.output.manifests, name, entries)
            .map_err(AssetError::from)?;
    }
    backend
        .write_lists(&config.output.lists, droid_key, &output.lists)
        .map_err(AssetError::from)?;
    backend
        .delete_manifests(&config.output.manifests, &output.orphaned_manifests)
        .map_err(AssetError::from)?;
    backend
        .delete_lists(&config.output.lists, &output.orphaned_lists)
        .map_err(AssetError::from)?;

    tracing::info!(
        manifests = output.manifests.len(),
        dirty = output.dirty_manifests.len(),
        orphaned = output.orphaned_assets.len(),
        "pipeline run complete"
    );

    Ok(output)
}
