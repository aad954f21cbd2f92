//! A single row of the frame index.

use serde::{Deserialize, Serialize};

/// Position of one frame inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Decoder pts in microseconds.
    pub pts: i64,
    /// Byte offset of the packet (for keyframes, the seek target).
    pub offset: u64,
    /// Whether the frame is decodable without prior frames.
    pub is_keyframe: bool,
}

impl IndexEntry {
    pub fn new(pts: i64, offset: u64, is_keyframe: bool) -> Self {
        Self {
            pts,
            offset,
            is_keyframe,
        }
    }
}
