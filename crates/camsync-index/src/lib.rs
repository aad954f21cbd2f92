//! Frame indexing for recorded camera video.
//!
//! A [`FrameIndex`] lists every frame of a container file as a
//! `(pts, byte offset, keyframe)` triple sorted by pts, together with the
//! calibrated offset between the decoder clock and wall-clock time. Indexes
//! are expensive to build (a full pass over the file) so they are cached
//! behind the [`IndexCache`] trait, keyed by a [`Fingerprint`] of the file.

pub mod cache;
pub mod entry;
pub mod fingerprint;
pub mod index;

pub use cache::{CacheLocation, DiskIndexCache, IndexCache, MemoryIndexCache, StoredIndex};
pub use entry::IndexEntry;
pub use fingerprint::{FileStat, Fingerprint};
pub use index::{FrameIndex, FrameIndexBuilder, IndexRecord, INDEX_FORMAT_VERSION};
