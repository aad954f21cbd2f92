//! Axis camera recording folders.
//!
//! A recording is a `recording.xml` describing the whole capture plus one
//! sub-directory per block, each holding a block XML and its video:
//!
//! ```text
//! recording.xml
//! 20190808_141501_32D4/
//!     20190808_141501_32D4.xml
//!     20190808_141501_32D4.mkv
//! ```
//!
//! Blocks are stitched into one [`ConcatenatedSource`] whose frame times are
//! rebased onto the capture times recorded in the block XML.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use camsync_common::paths::has_extension;
use camsync_common::time::{micros_to_secs, systime_secs};
use camsync_common::{Error, Frame, Result};

use crate::concat::{Block, ConcatenatedSource};
use crate::decoder::Backend;
use crate::sequence::{FrameSequence, Property, PropertyValue, SeqIter, Slice};
use crate::source::{OpenOptions, VideoSource};
use crate::view::LazyView;

/// File name that identifies a recording folder.
pub const RECORDING_XML: &str = "recording.xml";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// One block of a recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingBlock {
    /// Capture start, epoch seconds.
    pub start: f64,
    /// Capture stop, epoch seconds.
    pub stop: f64,
    /// The block's video file.
    pub path: PathBuf,
    pub status: String,
}

impl RecordingBlock {
    /// Seconds of capture covered by the block.
    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }

    fn order(&self, other: &Self) -> Ordering {
        self.start
            .total_cmp(&other.start)
            .then(self.stop.total_cmp(&other.stop))
            .then_with(|| self.path.cmp(&other.path))
    }
}

/// Contents of a `recording.xml` and its blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingMetadata {
    pub recording_id: String,
    pub channel: u32,
    pub start: f64,
    pub stop: f64,
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    /// Blocks ordered by start, stop, then path.
    pub blocks: Vec<RecordingBlock>,
}

/// Parse an Axis timestamp such as `2019-08-12T09:30:00.813188Z` into
/// epoch seconds.
pub fn parse_timestamp(text: &str) -> Result<f64> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| Error::format(format!("invalid timestamp {text:?}: {e}")))?;
    Ok(micros_to_secs(naive.and_utc().timestamp_micros()))
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::from_open(path, e))
}

fn parse_document<'a>(path: &Path, xml: &'a str) -> Result<roxmltree::Document<'a>> {
    roxmltree::Document::parse(xml)
        .map_err(|e| Error::format(format!("{}: XML parse error: {e}", path.display())))
}

/// Text of the first descendant element named `tag`.
fn find_text<'a>(path: &Path, root: roxmltree::Node<'a, '_>, tag: &str) -> Result<&'a str> {
    root.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
        .and_then(|n| n.text())
        .map(str::trim)
        .ok_or_else(|| Error::format(format!("{}: missing <{tag}>", path.display())))
}

fn find_number<T: std::str::FromStr>(
    path: &Path,
    root: roxmltree::Node<'_, '_>,
    tag: &str,
) -> Result<T> {
    let text = find_text(path, root, tag)?;
    text.parse()
        .map_err(|_| Error::format(format!("{}: invalid <{tag}> {text:?}", path.display())))
}

/// The video next to a block XML: `.mkv` preferred, `.mjpg` accepted.
fn block_video(xml_path: &Path) -> Result<PathBuf> {
    ["mkv", "mjpg"]
        .iter()
        .map(|ext| xml_path.with_extension(ext))
        .find(|p| p.is_file())
        .ok_or_else(|| Error::not_found(xml_path.with_extension("mkv")))
}

fn read_block(xml_path: &Path) -> Result<RecordingBlock> {
    let path = block_video(xml_path)?;
    let xml = read_document(xml_path)?;
    let doc = parse_document(xml_path, &xml)?;
    let root = doc.root_element();

    let status = find_text(xml_path, root, "Status")?;
    if status != "Complete" {
        return Err(Error::format(format!(
            "{}: expected status \"Complete\", was {status:?}",
            xml_path.display()
        )));
    }

    Ok(RecordingBlock {
        start: parse_timestamp(find_text(xml_path, root, "StartTime")?)?,
        stop: parse_timestamp(find_text(xml_path, root, "StopTime")?)?,
        path,
        status: status.to_string(),
    })
}

/// Read `recording.xml` and discover its blocks.
///
/// Block XML files are looked up one directory below the recording. Every
/// block must be complete and have its video present.
pub fn read_recording_xml(path: impl AsRef<Path>) -> Result<RecordingMetadata> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::not_found(path));
    }
    let xml = read_document(path)?;
    let doc = parse_document(path, &xml)?;
    let root = doc.root_element();

    let folder = path.parent().unwrap_or_else(|| Path::new("."));
    let mut blocks = Vec::new();
    for entry in WalkDir::new(folder).min_depth(2).max_depth(2) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() && has_extension(entry.path(), "xml") {
            blocks.push(read_block(entry.path())?);
        }
    }
    blocks.sort_by(RecordingBlock::order);
    debug!(path = %path.display(), blocks = blocks.len(), "Read recording metadata");

    let recording_id = root
        .attribute("RecordingToken")
        .ok_or_else(|| Error::format(format!("{}: missing RecordingToken", path.display())))?
        .to_string();

    Ok(RecordingMetadata {
        recording_id,
        channel: find_number(path, root, "SourceToken")?,
        start: parse_timestamp(find_text(path, root, "StartTime")?)?,
        stop: parse_timestamp(find_text(path, root, "StopTime")?)?,
        width: find_number(path, root, "Width")?,
        height: find_number(path, root, "Height")?,
        framerate: find_number(path, root, "Framerate")?,
        blocks,
    })
}

/// A recording played back as one continuous sequence.
///
/// Timestamps run on from one block to the next; systimes follow each
/// block's recorded start time.
#[derive(Debug)]
pub struct Recording {
    metadata: RecordingMetadata,
    frames: ConcatenatedSource,
}

impl Recording {
    /// Open every block of `metadata`.
    pub fn open(
        metadata: RecordingMetadata,
        backend: Arc<dyn Backend>,
        options: &OpenOptions,
    ) -> Result<Self> {
        if metadata.blocks.is_empty() {
            return Err(Error::invalid_input(format!(
                "recording {} has no blocks",
                metadata.recording_id
            )));
        }

        let mut blocks = Vec::with_capacity(metadata.blocks.len());
        let mut timestamp_offset = 0.0;
        for blk in &metadata.blocks {
            let source = VideoSource::open(&blk.path, Arc::clone(&backend), options)?;
            if !source.index().has_wallclock() {
                return Err(Error::capability(format!(
                    "{}: {} blocks are not supported in recordings",
                    blk.path.display(),
                    source.codec()
                )));
            }
            let first = source
                .index()
                .first_pts()
                .map_or(0.0, |pts| systime_secs(pts, source.clock_offset()));
            let systime_offset = blk.start - first;
            blocks.push(Block::with_offsets(
                source,
                Some(timestamp_offset),
                Some(systime_offset),
            ));
            timestamp_offset += blk.duration();
        }

        Ok(Self {
            metadata,
            frames: ConcatenatedSource::new(blocks)?,
        })
    }

    /// Read `recording.xml` at `path` and open it.
    pub fn open_path(
        path: impl AsRef<Path>,
        backend: Arc<dyn Backend>,
        options: &OpenOptions,
    ) -> Result<Self> {
        Self::open(read_recording_xml(path)?, backend, options)
    }

    pub fn metadata(&self) -> &RecordingMetadata {
        &self.metadata
    }

    /// Systimes of every frame in the recording.
    pub fn systimes(&mut self) -> Result<Vec<f64>> {
        self.frames.systimes()
    }

    pub fn view(&mut self, slice: impl Into<Slice>) -> Result<LazyView<&mut ConcatenatedSource>> {
        self.frames.view(slice)
    }

    pub fn into_inner(self) -> ConcatenatedSource {
        self.frames
    }
}

impl FrameSequence for Recording {
    type Item = Frame;

    fn len(&self) -> usize {
        self.frames.len()
    }

    fn get(&mut self, i: usize) -> Result<Frame> {
        self.frames.get(i)
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Frame>> {
        self.frames.iter()
    }

    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Frame>> {
        self.frames.iter_from(start)
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        self.frames.property(property)
    }

    fn has_native_timestamps(&self) -> bool {
        true
    }
}
