//! Frame-accurate random access over camera video.
//!
//! [`VideoSource`] decodes any frame of an indexed container by position,
//! reusing its decoder for forward reads and reseeking from the nearest
//! keyframe otherwise. Sources compose through the [`FrameSequence`]
//! protocol:
//!
//! - [`LazyView`] windows any sequence with Python-style slices.
//! - [`FilterView`] maps every frame through a per-frame transform.
//! - [`ConcatenatedSource`] stitches blocks into one sequence with rebased
//!   clocks, and [`Recording`] builds one from an Axis recording folder.
//! - [`SyncedStreamSet`] samples several streams onto one timeline.
//!
//! Demuxing and decoding are delegated to a [`Backend`]. The synthetic
//! [`memory::MemoryBackend`] serves videos described in code.

pub mod concat;
pub mod decoder;
pub mod filter;
pub mod memory;
pub mod open;
pub mod recording;
pub mod sequence;
pub mod source;
pub mod sync;
pub mod view;

pub use concat::{Block, ConcatenatedSource};
pub use decoder::{
    Backend, CompositeBackend, DecodeStatus, Decoder, DecoderHandle, Demuxer, Packet, Picture,
};
pub use filter::FilterView;
pub use open::{is_recording, open_video};
pub use recording::{read_recording_xml, Recording, RecordingBlock, RecordingMetadata};
pub use sequence::{
    FrameSequence, IndexRange, Property, PropertyValue, SeqIter, Slice, TimeSeries,
};
pub use source::{build_index, FrameStream, OpenOptions, VideoSource};
pub use sync::{Aligner, SyncedStreamSet, Timed};
pub use view::{LazyView, Overrides, Resolver};
