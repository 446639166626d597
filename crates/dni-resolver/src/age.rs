//! Age-dependency resolution: spec §4.5 pass 1.
//!
//! For every `.age` asset in the index, walk its declared (plus implied
//! common) pages, parse each found page in parallel, and stage both the
//! pages themselves and the dependencies their keyed objects reveal
//! (sound buffers, Python file mods, relevance regions).

use std::collections::HashMap;
use std::path::PathBuf;

use dni_assets::asset::Asset;
use dni_assets::server_path::{fold, server_path_for};
use dni_crypto::CipherKey;
use dni_formats::age::{page_client_path, read_age_file};
use dni_formats::page::ParsedPage;
use dni_formats::ManifestFlags;

use crate::error::Result;
use crate::staged::Resolved;

fn lookup<'a>(index: &'a HashMap<String, Asset>, client_path: &str, category: &str) -> Option<(&'a str, &'a Asset)> {
    let server_path = server_path_for(client_path, std::slice::from_ref(&category.to_string()))?;
    let key = fold(&server_path);
    index.get_key_value(&key).map(|(k, v)| (k.as_str(), v))
}

fn age_name_from_client_path(client_path: &str) -> &str {
    client_path
        .rsplit('/')
        .next()
        .unwrap_or(client_path)
        .trim_end_matches(".age")
        .trim_end_matches(".Age")
}

struct PageParseJob {
    server_path: String,
    path: PathBuf,
}

/// Resolve every `.age` asset's page and dependency tree, staging results
/// into `resolved`. Page parsing runs across a `tokio` worker pool, one
/// blocking task per page (spec §5: suspension points sit between
/// stages, not within one).
pub async fn resolve_age_dependencies(
    index: &HashMap<String, Asset>,
    droid_key: Option<CipherKey>,
    resolved: &mut Resolved,
) -> Result<()> {
    let age_assets: Vec<(String, Asset)> = index
        .values()
        .filter(|a| a.categories.iter().any(|c| c == "data") && a.client_path.to_lowercase().ends_with(".age"))
        .map(|a| (a.client_path.clone(), a.clone()))
        .collect();

    for (client_path, asset) in age_assets {
        let age_name = age_name_from_client_path(&client_path).to_string();
        tracing::info!(age = %age_name, "resolving age dependencies");

        let Some(age_server_path) = server_path_for(&client_path, &["data".to_string()]) else {
            continue;
        };
        resolved.stage(&fold(&age_server_path), &client_path, ManifestFlags::NONE);
        resolved.add_to_manifest(&age_name, &fold(&age_server_path));

        // Companion funny-number file, if present.
        let fni_client_path = client_path.replacen(".age", ".fni", 1);
        if let Some((fni_server_path, _)) = lookup(index, &fni_client_path, "data") {
            resolved.stage(fni_server_path, &fni_client_path, ManifestFlags::NONE);
            resolved.add_to_manifest(&age_name, fni_server_path);
        }

        let info = read_age_file(&asset.source_path, droid_key)?;

        let mut jobs = Vec::new();
        for page_name in info.all_pages() {
            let page_client_path = page_client_path(&age_name, page_name);
            match lookup(index, &page_client_path, "data") {
                Some((server_path, page_asset)) => {
                    resolved.stage(server_path, &page_client_path, ManifestFlags::NONE);
                    resolved.add_to_manifest(&age_name, server_path);
                    jobs.push(PageParseJob {
                        server_path: server_path.to_string(),
                        path: page_asset.source_path.clone(),
                    });
                }
                None => {
                    tracing::warn!(age = %age_name, page = %page_name, "age page missing, skipping");
                }
            }
        }

        let mut set = tokio::task::JoinSet::new();
        for job in jobs {
            set.spawn_blocking(move || -> Result<(String, ParsedPage)> {
                let parsed = dni_formats::page::read_page_file(&job.path, droid_key)?;
                Ok((job.server_path, parsed))
            });
        }

        while let Some(outcome) = set.join_next().await {
            let (_page_server_path, parsed) = outcome??;
            for dep in parsed.dependencies {
                let dep_category = dependency_category(&dep.client_path);
                match lookup(index, &dep.client_path, dep_category) {
                    Some((dep_server_path, _)) => {
                        resolved.stage(dep_server_path, &dep.client_path, dep.flags);
                        if !ManifestFlags::new(dep.flags).has(ManifestFlags::SCRIPT) {
                            resolved.add_to_manifest(&age_name, dep_server_path);
                        }
                    }
                    None => {
                        tracing::warn!(
                            dependency = %dep.client_path,
                            "page dependency not found in asset index, skipping"
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

/// The category a page dependency's client path belongs to, by its
/// top-level client directory. Used to compute the dependency's server
/// path for index lookup.
fn dependency_category(client_path: &str) -> &'static str {
    if client_path.starts_with("sfx/") {
        "sfx"
    } else if client_path.starts_with("Python/") {
        "python"
    } else {
        "data"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_name_strips_extension() {
        assert_eq!(age_name_from_client_path("dat/Garden.age"), "Garden");
    }

    #[test]
    fn dependency_category_routes_by_prefix() {
        assert_eq!(dependency_category("sfx/ambient.ogg"), "sfx");
        assert_eq!(dependency_category("Python/xFoo.py"), "python");
        assert_eq!(dependency_category("dat/Garden.csv"), "data");
    }
}
