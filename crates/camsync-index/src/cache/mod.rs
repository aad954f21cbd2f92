//! Index cache abstraction.
//!
//! A cache maps a [`Fingerprint`] to a previously built [`FrameIndex`]. A
//! miss, a stale entry, or an unreadable entry all look the same to the
//! caller: `load` returns `None` and the index is rebuilt.

mod disk;
mod memory;

pub use disk::{CacheLocation, DiskIndexCache, StoredIndex, INDEX_MAGIC};
pub use memory::MemoryIndexCache;

use std::path::Path;

use camsync_common::Result;

use crate::fingerprint::Fingerprint;
use crate::index::FrameIndex;

/// Key-value store for frame indexes.
pub trait IndexCache: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Return the cached index for `video` if one exists for `fingerprint`.
    fn load(&self, video: &Path, fingerprint: &Fingerprint) -> Result<Option<FrameIndex>>;

    /// Publish an index for `video`.
    ///
    /// Concurrent stores for the same fingerprint must leave a complete
    /// entry behind; losing the race is not an error.
    fn store(&self, video: &Path, fingerprint: &Fingerprint, index: &FrameIndex) -> Result<()>;
}
