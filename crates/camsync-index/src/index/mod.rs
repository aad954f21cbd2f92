//! Sorted frame index for one container file.
//!
//! The index is built once by a forward scan over packet headers and is
//! immutable afterwards. It answers three questions without decoding: how
//! many frames the file holds, where the nearest preceding keyframe of a
//! frame is, and what wall-clock time each frame was captured at.

mod builder;

pub use builder::FrameIndexBuilder;

use serde::{Deserialize, Serialize};

use camsync_common::time::{micros_to_secs, systime_secs};
use camsync_common::{Codec, Error, Result};

use crate::entry::IndexEntry;

/// Current on-disk format version. Caches written with any other version are
/// discarded and rebuilt.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Frame index of one container file.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameIndex {
    codec: Codec,
    entries: Vec<IndexEntry>,
    clock_offset: i64,
    keyframes: Vec<usize>,
}

/// Serialisable form of a [`FrameIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub codec: Codec,
    pub clock_offset: i64,
    pub entries: Vec<IndexEntry>,
}

impl FrameIndex {
    /// Create a new index builder.
    pub fn builder(codec: Codec) -> FrameIndexBuilder {
        FrameIndexBuilder::new(codec)
    }

    /// Assemble an index from unsorted entries.
    pub fn from_parts(codec: Codec, mut entries: Vec<IndexEntry>, clock_offset: i64) -> Self {
        entries.sort_by_key(|e| e.pts);
        let keyframes = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_keyframe)
            .map(|(i, _)| i)
            .collect();
        Self {
            codec,
            entries,
            clock_offset,
            keyframes,
        }
    }

    /// Rebuild an index from its stored form.
    pub fn from_record(record: IndexRecord) -> Self {
        Self::from_parts(record.codec, record.entries, record.clock_offset)
    }

    /// Stored form of this index.
    pub fn to_record(&self) -> IndexRecord {
        IndexRecord {
            codec: self.codec,
            clock_offset: self.clock_offset,
            entries: self.entries.clone(),
        }
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Wall-clock minus decode-clock, in microseconds.
    pub fn clock_offset(&self) -> i64 {
        self.clock_offset
    }

    /// All entries, sorted by pts.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Entry at position `i`.
    pub fn entry(&self, i: usize) -> Option<&IndexEntry> {
        self.entries.get(i)
    }

    /// Positions of all keyframes, ascending.
    pub fn keyframes(&self) -> &[usize] {
        &self.keyframes
    }

    /// pts of the first frame, used to rebase `timestamp`.
    pub fn first_pts(&self) -> Option<i64> {
        self.entries.first().map(|e| e.pts)
    }

    /// Whether frame times can be mapped to wall-clock from the index alone.
    pub fn has_wallclock(&self) -> bool {
        self.codec.has_native_timestamps()
    }

    /// Find the greatest keyframe position at or before `i`.
    pub fn keyframe_at_or_before(&self, i: usize) -> Option<usize> {
        let n = self.keyframes.partition_point(|&k| k <= i);
        if n == 0 {
            None
        } else {
            Some(self.keyframes[n - 1])
        }
    }

    /// Wall-clock seconds of every frame.
    ///
    /// Fails with a capability error for codecs whose index pts are not on
    /// the wall-clock timeline.
    pub fn systimes(&self) -> Result<Vec<f64>> {
        if !self.has_wallclock() {
            return Err(Error::capability(format!(
                "{} streams carry no wall-clock timestamps in the index",
                self.codec
            )));
        }
        Ok(self
            .entries
            .iter()
            .map(|e| systime_secs(e.pts, self.clock_offset))
            .collect())
    }

    /// Duration between the first and last frame in seconds.
    pub fn span_secs(&self) -> f64 {
        match (self.entries.first(), self.entries.last()) {
            (Some(a), Some(b)) => micros_to_secs(b.pts - a.pts),
            _ => 0.0,
        }
    }
}
