//! Pipeline configuration (spec §6).
//!
//! The INI-style configuration loader and CLI dispatcher are external
//! collaborators (spec §1 Non-goals); this module defines the typed
//! destination they populate. Everything here is a plain `serde`
//! `Deserialize` target — no parsing of the INI text itself happens in this
//! crate.

use std::path::PathBuf;

use dni_crypto::CipherKey;
use dni_formats::manifestdb::{BinaryBackend, ManifestBackend, PlainBackend};
use serde::Deserialize;

use crate::error::{AssetError, Result};

/// Which manifest DB back-end to use, selected by `server.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Back-end A: `.mfs`/`.list` text files.
    Plain,
    /// Back-end B: `.mbm`/`.mbam` binary files plus `encryption.key`.
    Binary,
}

impl BackendKind {
    /// The concrete [`ManifestBackend`] implementation for this kind.
    pub fn backend(self) -> Box<dyn ManifestBackend> {
        match self {
            Self::Plain => Box::new(PlainBackend),
            Self::Binary => Box::new(BinaryBackend),
        }
    }
}

/// `server.*` configuration keys.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `server.type`.
    #[serde(rename = "type")]
    pub kind: BackendKind,
    /// `server.droid_key`: 32 hex digits.
    pub droid_key: String,
    /// `server.secure_manifest`.
    pub secure_manifest: bool,
    /// `server.age_directory`, if the build also publishes decrypted `.age`
    /// files directly to a server-consumption directory.
    pub age_directory: Option<PathBuf>,
    /// `server.sdl_directory`, the `.sdl` counterpart of `age_directory`.
    pub sdl_directory: Option<PathBuf>,
}

impl ServerConfig {
    /// Parse [`Self::droid_key`] into a [`CipherKey`].
    pub fn droid_key(&self) -> Result<CipherKey> {
        Ok(CipherKey::from_hex(&self.droid_key).map_err(AssetError::from)?)
    }
}

/// `python.*` configuration keys, all optional: absent entirely when the
/// Python Pack Builder stage is skipped (a pack was already supplied).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PythonConfig {
    /// `python.major`.
    pub major: Option<u32>,
    /// `python.minor`.
    pub minor: Option<u32>,
    /// `python.path`: the external interpreter binary (spec §6).
    pub path: Option<PathBuf>,
    /// `python.tool_script`: the helper script invoked as `<py_exe>
    /// <tool_script>` that speaks the `compyle`/`get_python_lib` RPC on
    /// its standard streams.
    pub tool_script: Option<PathBuf>,
    /// `python.glue_path`: source appended to a `PythonFileMod` whose AST
    /// verdict confirms it (spec §4.8), if the build wants glue injection.
    pub glue_path: Option<PathBuf>,
}

/// `output.*` configuration keys.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// `output.manifests`: directory manifest DB files (`.mfs`/`.mbm`) land in.
    pub manifests: PathBuf,
    /// `output.lists`: directory secure-list files (`.list`/`.mbam`) and the
    /// binary back-end's `encryption.key` sidecar land in.
    pub lists: PathBuf,
    /// `output.downloads`: directory the compress stage writes `<server_path>.gz`
    /// blobs into (spec §4.7 step 6, §8 scenario 6).
    pub downloads: PathBuf,
    /// `output.secure`: directory the secure-copy stage publishes the
    /// plaintext `.pak`/`.sdl` files legacy auth-server downloads serve
    /// directly (spec §4.7 step 7).
    pub secure: PathBuf,
}

/// `source.*` configuration keys.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// `source.data_path`: the build machine's compiled data tree.
    pub data_path: PathBuf,
    /// `source.scripts_path`: the build machine's compiled scripts tree.
    pub scripts_path: PathBuf,
    /// `source.gather_path`: root(s) containing gather packages.
    pub gather_path: PathBuf,
}

/// The complete typed configuration a pipeline run needs (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// `server.*`.
    pub server: ServerConfig,
    /// `python.*`.
    #[serde(default)]
    pub python: PythonConfig,
    /// `output.*`.
    pub output: OutputConfig,
    /// `source.*`.
    pub source: SourceConfig,
    /// Worker pool size. `None` or non-positive means "host CPU count"
    /// (spec §5).
    #[serde(default)]
    pub ncpus: Option<usize>,
}

impl PipelineConfig {
    /// The worker pool size to use, resolving the "host CPU count" default.
    pub fn worker_count(&self) -> usize {
        match self.ncpus {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_config() {
        let json = r#"{
            "server": {"type": "plain", "droid_key": "31415926535897932384626433832795", "secure_manifest": true},
            "output": {"manifests": "/out/mfs", "lists": "/out/lists", "downloads": "/out/downloads", "secure": "/out/secure"},
            "source": {"data_path": "/src/data", "scripts_path": "/src/scripts", "gather_path": "/src/gather"}
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.kind, BackendKind::Plain);
        assert!(config.server.age_directory.is_none());
        assert!(config.python.path.is_none());
    }

    #[test]
    fn zero_ncpus_falls_back_to_host_count() {
        let json = r#"{
            "server": {"type": "binary", "droid_key": "31415926535897932384626433832795", "secure_manifest": false},
            "output": {"manifests": "/out/mfs", "lists": "/out/lists", "downloads": "/out/downloads", "secure": "/out/secure"},
            "source": {"data_path": "/src/data", "scripts_path": "/src/scripts", "gather_path": "/src/gather"},
            "ncpus": 0
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert!(config.worker_count() >= 1);
    }
}
