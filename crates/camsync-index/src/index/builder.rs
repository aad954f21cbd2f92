//! Frame index builder.

use camsync_common::Codec;

use super::FrameIndex;
use crate::entry::IndexEntry;

/// Collects entries during a forward scan, then sorts them into a
/// [`FrameIndex`].
pub struct FrameIndexBuilder {
    codec: Codec,
    entries: Vec<IndexEntry>,
}

impl FrameIndexBuilder {
    /// Create a new builder for a stream of the given codec.
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            entries: Vec::new(),
        }
    }

    /// Record one packet.
    pub fn push(&mut self, pts: i64, offset: u64, is_keyframe: bool) -> &mut Self {
        self.entries.push(IndexEntry::new(pts, offset, is_keyframe));
        self
    }

    /// Number of entries collected so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finish the scan.
    ///
    /// Entries are sorted by pts; packets with equal pts keep their container
    /// order. `clock_offset` is the calibrated wall-clock minus decode-clock
    /// difference in microseconds.
    pub fn build(self, clock_offset: i64) -> FrameIndex {
        FrameIndex::from_parts(self.codec, self.entries, clock_offset)
    }
}
