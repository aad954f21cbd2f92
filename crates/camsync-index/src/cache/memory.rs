use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;

use camsync_common::Result;

use super::IndexCache;
use crate::fingerprint::Fingerprint;
use crate::index::FrameIndex;

/// Process-local index cache. Nothing touches the filesystem.
#[derive(Debug, Default)]
pub struct MemoryIndexCache {
    entries: RwLock<HashMap<Fingerprint, FrameIndex>>,
}

impl MemoryIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached indexes.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every cached index.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl IndexCache for MemoryIndexCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, _video: &Path, fingerprint: &Fingerprint) -> Result<Option<FrameIndex>> {
        Ok(self.entries.read().get(fingerprint).cloned())
    }

    fn store(&self, _video: &Path, fingerprint: &Fingerprint, index: &FrameIndex) -> Result<()> {
        self.entries
            .write()
            .entry(fingerprint.clone())
            .or_insert_with(|| index.clone());
        Ok(())
    }
}
