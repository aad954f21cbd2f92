//! Content fingerprints used as index cache keys.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use camsync_common::{Codec, Error, Result};

/// SHA-256 over a file's absolute path, size, modification time, and codec.
///
/// Any change to one of these produces a different fingerprint, which makes
/// a cached index for the old file unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

/// File attributes that feed a [`Fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: PathBuf,
    pub size: u64,
    pub modified_ns: u128,
}

impl FileStat {
    /// Stat `path`, resolving it to an absolute path.
    pub fn read(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| Error::from_open(path, e))?;
        let path = std::fs::canonicalize(path).map_err(|e| Error::from_open(path, e))?;
        let modified_ns = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(Self {
            path,
            size: metadata.len(),
            modified_ns,
        })
    }
}

impl Fingerprint {
    /// Fingerprint of the file at `path` holding a `codec` stream.
    pub fn compute(path: &Path, codec: Codec) -> Result<Self> {
        Ok(Self::from_stat(&FileStat::read(path)?, codec))
    }

    /// Fingerprint from already collected attributes.
    pub fn from_stat(stat: &FileStat, codec: Codec) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(stat.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(stat.size.to_le_bytes());
        hasher.update(stat.modified_ns.to_le_bytes());
        hasher.update(codec.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
