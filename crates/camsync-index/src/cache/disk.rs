//! On-disk index cache.
//!
//! File layout: the 4-byte magic `CSIX`, the format version as a
//! little-endian `u32`, then a bincode encoded [`StoredIndex`].

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use camsync_common::paths::{sidecar_index_path, INDEX_EXTENSION};
use camsync_common::{Error, Result};

use super::IndexCache;
use crate::fingerprint::Fingerprint;
use crate::index::{FrameIndex, IndexRecord, INDEX_FORMAT_VERSION};

/// Magic bytes at the start of every index file.
pub const INDEX_MAGIC: &[u8; 4] = b"CSIX";

/// Where index files are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    /// `<video>.idx` next to the video file.
    Sidecar,
    /// `<dir>/<fingerprint>.idx` in a shared directory.
    Directory(PathBuf),
}

/// Contents of one index file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredIndex {
    pub fingerprint: Fingerprint,
    pub record: IndexRecord,
}

impl StoredIndex {
    /// Serialise with magic and version header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| Error::format(format!("Failed to encode index: {e}")))?;
        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse an index file, rejecting foreign or outdated files.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 8 || &data[..4] != INDEX_MAGIC {
            return Err(Error::format("Not an index file"));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&data[4..8]);
        let version = u32::from_le_bytes(version);
        if version != INDEX_FORMAT_VERSION {
            return Err(Error::format(format!(
                "Index format version {version}, expected {INDEX_FORMAT_VERSION}"
            )));
        }
        bincode::deserialize(&data[8..])
            .map_err(|e| Error::format(format!("Corrupt index: {e}")))
    }
}

/// Index cache backed by files.
#[derive(Debug, Clone)]
pub struct DiskIndexCache {
    location: CacheLocation,
}

impl DiskIndexCache {
    pub fn new(location: CacheLocation) -> Self {
        Self { location }
    }

    /// Cache writing `<video>.idx` side-car files.
    pub fn sidecar() -> Self {
        Self::new(CacheLocation::Sidecar)
    }

    /// Cache writing into a shared directory keyed by fingerprint.
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self::new(CacheLocation::Directory(dir.into()))
    }

    pub fn location(&self) -> &CacheLocation {
        &self.location
    }

    /// Path of the index file for `video`.
    pub fn path_for(&self, video: &Path, fingerprint: &Fingerprint) -> PathBuf {
        match &self.location {
            CacheLocation::Sidecar => sidecar_index_path(video),
            CacheLocation::Directory(dir) => {
                dir.join(format!("{}.{}", fingerprint, INDEX_EXTENSION))
            }
        }
    }

    /// Read and parse an index file without any fingerprint check.
    pub fn inspect(path: &Path) -> Result<StoredIndex> {
        let data = std::fs::read(path).map_err(|e| Error::from_open(path, e))?;
        StoredIndex::decode(&data)
    }

    /// Whether the file at `path` holds a readable index for `fingerprint`.
    fn holds(path: &Path, fingerprint: &Fingerprint) -> bool {
        matches!(Self::inspect(path), Ok(stored) if &stored.fingerprint == fingerprint)
    }
}

impl IndexCache for DiskIndexCache {
    fn name(&self) -> &'static str {
        match self.location {
            CacheLocation::Sidecar => "sidecar",
            CacheLocation::Directory(_) => "directory",
        }
    }

    fn load(&self, video: &Path, fingerprint: &Fingerprint) -> Result<Option<FrameIndex>> {
        let path = self.path_for(video, fingerprint);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Index cache miss");
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let stored = match StoredIndex::decode(&data) {
            Ok(stored) => stored,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Discarding unreadable index");
                return Ok(None);
            }
        };

        if &stored.fingerprint != fingerprint {
            debug!(path = %path.display(), "Discarding stale index");
            return Ok(None);
        }

        debug!(
            path = %path.display(),
            frames = stored.record.entries.len(),
            "Index cache hit"
        );
        Ok(Some(FrameIndex::from_record(stored.record)))
    }

    fn store(&self, video: &Path, fingerprint: &Fingerprint, index: &FrameIndex) -> Result<()> {
        let path = self.path_for(video, fingerprint);
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if let CacheLocation::Directory(_) = self.location {
            std::fs::create_dir_all(&dir)?;
        }

        let stored = StoredIndex {
            fingerprint: fingerprint.clone(),
            record: index.to_record(),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&stored.encode()?)?;
        tmp.flush()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(path = %path.display(), "Stored index");
                Ok(())
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                if Self::holds(&path, fingerprint) {
                    debug!(path = %path.display(), "Index already published");
                    return Ok(());
                }
                debug!(path = %path.display(), "Replacing stale index");
                e.file.persist(&path).map_err(|e| Error::Io(e.error))?;
                Ok(())
            }
            Err(e) => Err(Error::Io(e.error)),
        }
    }
}
