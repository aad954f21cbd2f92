use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use camsync_index::{DiskIndexCache, IndexCache, MemoryIndexCache};
use camsync_media::OpenOptions;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub decode: DecodeConfig,
}

/// Where frame indexes are kept between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// `<video>.idx` next to each video
    #[default]
    Sidecar,
    /// One shared directory, files named by fingerprint
    Directory,
    /// Process memory only; indexes are rebuilt on every run
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub mode: CacheMode,

    /// Index directory for `mode = "directory"`. `~` is expanded.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    /// The configured cache directory with `~` expanded.
    pub fn expanded_dir(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| {
            let dir = dir.to_string_lossy();
            PathBuf::from(shellexpand::tilde(dir.as_ref()).as_ref())
        })
    }

    /// Build the index cache for this configuration.
    pub fn build(&self) -> Arc<dyn IndexCache> {
        match (self.mode, self.expanded_dir()) {
            (CacheMode::Directory, Some(dir)) => Arc::new(DiskIndexCache::in_directory(dir)),
            (CacheMode::Memory, _) => Arc::new(MemoryIndexCache::new()),
            _ => Arc::new(DiskIndexCache::sidecar()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DecodeConfig {
    /// Decode to single-channel luma instead of RGB
    #[serde(default)]
    pub grey: bool,

    /// Ignore cached indexes and rebuild them
    #[serde(default)]
    pub reindex: bool,
}

impl Config {
    /// Options for opening videos under this configuration.
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::new()
            .grey(self.decode.grey)
            .reindex(self.decode.reindex)
            .cache(self.cache.build())
    }

    /// Settings that are accepted but probably not what was intended.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match (self.cache.mode, &self.cache.dir) {
            (CacheMode::Directory, None) => warnings.push(
                "cache.mode is \"directory\" but cache.dir is not set; using side-car files"
                    .to_string(),
            ),
            (CacheMode::Sidecar | CacheMode::Memory, Some(dir)) => warnings.push(format!(
                "cache.dir {:?} is ignored unless cache.mode is \"directory\"",
                dir
            )),
            _ => {}
        }

        if self.cache.mode == CacheMode::Memory && !self.decode.reindex {
            warnings.push(
                "cache.mode is \"memory\"; indexes are rebuilt for every process".to_string(),
            );
        }

        warnings
    }
}
