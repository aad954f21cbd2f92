//! Random access over one container file.
//!
//! [`VideoSource`] pairs a [`FrameIndex`] with a decoder cursor. Sequential
//! access keeps decoding forward from the cursor; anything else seeks to
//! the nearest preceding keyframe and decodes up to the requested frame.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, trace, warn};

use camsync_common::{Codec, Error, Frame, FrameMeta, PixelFormat, Result, SeekMatch};
use camsync_index::{DiskIndexCache, Fingerprint, FrameIndex, IndexCache};

use crate::decoder::{Backend, DecodeStatus, DecoderHandle, Demuxer, Packet, Picture};
use crate::sequence::{
    check_index, FrameSequence, IndexRange, Property, PropertyValue, SeqIter, Slice,
};
use crate::view::{LazyView, Overrides};

/// Options for opening a [`VideoSource`].
#[derive(Clone)]
pub struct OpenOptions {
    /// Pixel layout of decoded frames.
    pub pixel_format: PixelFormat,
    /// Ignore any cached index and rebuild it.
    pub reindex: bool,
    /// Where built indexes are kept.
    pub cache: Arc<dyn IndexCache>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode to single-channel luma instead of RGB.
    pub fn grey(mut self, grey: bool) -> Self {
        self.pixel_format = PixelFormat::from_grey(grey);
        self
    }

    pub fn reindex(mut self, reindex: bool) -> Self {
        self.reindex = reindex;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn IndexCache>) -> Self {
        self.cache = cache;
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb24,
            reindex: false,
            cache: Arc::new(DiskIndexCache::sidecar()),
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("pixel_format", &self.pixel_format)
            .field("reindex", &self.reindex)
            .field("cache", &self.cache.name())
            .finish()
    }
}

/// One container file with frame-accurate random access.
///
/// A `VideoSource` owns a single decoder cursor used by [`FrameSequence::get`];
/// it is not safe to share between threads without external locking. Each
/// call to [`FrameSequence::iter`] opens its own demuxer and decoder.
pub struct VideoSource {
    path: PathBuf,
    backend: Arc<dyn Backend>,
    index: Arc<FrameIndex>,
    pixel_format: PixelFormat,
    dimensions: (u32, u32),
    cursor: Option<FrameStream>,
}

impl VideoSource {
    /// Open `path`, loading its index from the cache or building it.
    pub fn open(
        path: impl AsRef<Path>,
        backend: Arc<dyn Backend>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| Error::from_open(path, e))?;
        if metadata.len() == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} is empty", path.display()),
            )));
        }

        let mut demuxer = backend.open(path)?;
        let codec = demuxer.codec();
        let dimensions = demuxer.dimensions();
        let fingerprint = Fingerprint::compute(path, codec)?;

        let cached = if options.reindex {
            None
        } else {
            match options.cache.load(path, &fingerprint) {
                Ok(index) => index,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read cached index");
                    None
                }
            }
        };

        let index = match cached {
            Some(index) => index,
            None => {
                let started = Instant::now();
                let index = build_index(demuxer.as_mut())?;
                info!(
                    path = %path.display(),
                    frames = index.len(),
                    keyframes = index.keyframes().len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Built frame index"
                );
                if let Err(e) = options.cache.store(path, &fingerprint, &index) {
                    warn!(
                        path = %path.display(),
                        cache = options.cache.name(),
                        error = %e,
                        "Failed to store frame index"
                    );
                }
                index
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            backend,
            index: Arc::new(index),
            pixel_format: options.pixel_format,
            dimensions,
            cursor: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    pub fn codec(&self) -> Codec {
        self.index.codec()
    }

    /// Wall-clock minus decode-clock, in microseconds.
    pub fn clock_offset(&self) -> i64 {
        self.index.clock_offset()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Serial number or MAC address of the recording camera.
    pub fn serial_number(&self) -> Result<Option<String>> {
        self.backend.open(&self.path)?.serial_number()
    }

    /// Wall-clock seconds of every frame, read from the index.
    pub fn systimes(&self) -> Result<Vec<f64>> {
        self.index.systimes()
    }

    /// An independent forward iterator over all frames.
    pub fn frames(&self) -> Result<FrameStream> {
        self.open_stream()
    }

    /// A lazy slice of this source.
    pub fn view(&mut self, slice: impl Into<Slice>) -> Result<LazyView<&mut VideoSource>> {
        let overrides =
            Overrides::<&mut VideoSource>::new().with(Property::Systimes, sliced_systimes);
        LazyView::with_overrides(self, slice, overrides)
    }

    fn open_stream(&self) -> Result<FrameStream> {
        FrameStream::open(
            self.backend.as_ref(),
            &self.path,
            Arc::clone(&self.index),
            self.pixel_format,
        )
    }

    fn fetch(&mut self, i: usize) -> Result<Frame> {
        let key = self.index.keyframe_at_or_before(i).ok_or_else(|| {
            Error::inconsistency(format!("no keyframe at or before frame {i}"))
        })?;

        // Taken out so that any error below leaves no cursor behind.
        let mut stream = match self.cursor.take() {
            Some(stream) => stream,
            None => self.open_stream()?,
        };

        if !stream.finished && stream.position <= i && key <= stream.position {
            trace!(frame = i, position = stream.position, "Resuming decode");
        } else {
            trace!(frame = i, keyframe = key, position = stream.position, "Seeking to keyframe");
            stream.seek_to_keyframe(key)?;
        }

        let frame = stream.decode_until(i)?;
        self.cursor = Some(stream);
        Ok(frame)
    }
}

fn sliced_systimes(source: &mut &mut VideoSource, range: &IndexRange) -> Result<PropertyValue> {
    Ok(PropertyValue::Times(source.index.systimes()?).select(range))
}

/// Scan every packet of `demuxer` and calibrate its clock once.
pub fn build_index(demuxer: &mut dyn Demuxer) -> Result<FrameIndex> {
    let mut builder = FrameIndex::builder(demuxer.codec());
    while let Some(packet) = demuxer.next_packet()? {
        builder.push(packet.pts, packet.offset, packet.is_keyframe);
    }
    let clock_offset = demuxer.estimate_clock_offset()?;
    Ok(builder.build(clock_offset))
}

impl fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoSource")
            .field("path", &self.path)
            .field("codec", &self.index.codec())
            .field("frames", &self.index.len())
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl FrameSequence for VideoSource {
    type Item = Frame;

    fn len(&self) -> usize {
        self.index.len()
    }

    fn get(&mut self, i: usize) -> Result<Frame> {
        check_index(i, self.index.len())?;
        self.fetch(i)
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Frame>> {
        Ok(Box::new(self.open_stream()?))
    }

    fn iter_from(&mut self, start: usize) -> Result<SeqIter<'_, Frame>> {
        let mut stream = self.open_stream()?;
        stream.advance_to(start)?;
        Ok(Box::new(stream))
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        match property {
            Property::Systimes => Ok(PropertyValue::Times(self.index.systimes()?)),
            Property::Indexes => Err(Error::capability("a single video has no stream indexes")),
        }
    }

    fn has_native_timestamps(&self) -> bool {
        self.index.has_wallclock()
    }
}

/// Forward decoder over one file.
///
/// Yields frames in presentation order. After the last packet the decoder is
/// drained so frames it buffered for reordering are not lost.
pub struct FrameStream {
    demuxer: Box<dyn Demuxer>,
    decoder: DecoderHandle,
    index: Arc<FrameIndex>,
    /// Index of the next frame this stream will produce.
    position: usize,
    packets_done: bool,
    finished: bool,
}

impl FrameStream {
    fn open(
        backend: &dyn Backend,
        path: &Path,
        index: Arc<FrameIndex>,
        format: PixelFormat,
    ) -> Result<Self> {
        let demuxer = backend.open(path)?;
        let decoder = DecoderHandle::open(backend, demuxer.as_ref(), format)?;
        Ok(Self {
            demuxer,
            decoder,
            index,
            position: 0,
            packets_done: false,
            finished: false,
        })
    }

    /// Index of the next frame.
    pub fn position(&self) -> usize {
        self.position
    }

    fn decode(&mut self, packet: Option<&Packet>) -> Result<DecodeStatus> {
        let position = self.position;
        self.decoder.decode(packet).map_err(|e| match e {
            Error::Decode {
                index: None,
                message,
            } => Error::Decode {
                index: Some(position),
                message,
            },
            other => other,
        })
    }

    /// Pull the next decoded picture, draining the decoder at end of input.
    fn next_picture(&mut self) -> Result<Option<Picture>> {
        loop {
            if self.packets_done {
                return match self.decode(None)? {
                    DecodeStatus::Produced(picture) => Ok(Some(picture)),
                    DecodeStatus::NeedsMore => Ok(None),
                };
            }
            match self.demuxer.next_packet()? {
                Some(packet) => {
                    if let DecodeStatus::Produced(picture) = self.decode(Some(&packet))? {
                        return Ok(Some(picture));
                    }
                }
                None => self.packets_done = true,
            }
        }
    }

    fn seek_to_keyframe(&mut self, key: usize) -> Result<()> {
        let entry = self
            .index
            .entry(key)
            .ok_or_else(|| Error::inconsistency(format!("keyframe {key} is not indexed")))?;
        let offset = entry.offset;
        self.demuxer.seek(offset).map_err(|e| {
            Error::inconsistency(format!("keyframe {key} at offset {offset} is unreadable: {e}"))
        })?;
        self.decoder.reset();
        self.position = key;
        self.packets_done = false;
        self.finished = false;
        Ok(())
    }

    /// Decode forward, discarding frames, until frame `i` is produced.
    fn decode_until(&mut self, i: usize) -> Result<Frame> {
        let target = self
            .index
            .entry(i)
            .map(|e| e.pts)
            .ok_or_else(|| Error::inconsistency(format!("frame {i} is not indexed")))?;
        let policy = self.index.codec().seek_match();

        loop {
            let picture = self.next_picture()?.ok_or_else(|| {
                Error::inconsistency(format!("stream ended before frame {i} (pts {target})"))
            })?;
            let position = self.position;
            self.position += 1;

            let matched = match policy {
                SeekMatch::Pts => {
                    if picture.pts > target {
                        return Err(Error::inconsistency(format!(
                            "decoder produced pts {} before frame {i} (pts {target})",
                            picture.pts
                        )));
                    }
                    picture.pts == target
                }
                SeekMatch::Ordinal => position == i,
            };

            if matched {
                self.position = i + 1;
                return Ok(self.frame(picture, i));
            }
        }
    }

    /// Position the stream so the next frame produced is `start`.
    fn advance_to(&mut self, start: usize) -> Result<()> {
        if start == 0 {
            return Ok(());
        }
        if let Some(key) = self.index.keyframe_at_or_before(start) {
            if key > self.position {
                self.seek_to_keyframe(key)?;
            }
        }
        while self.position < start {
            if self.next_picture()?.is_none() {
                self.finished = true;
                break;
            }
            self.position += 1;
        }
        Ok(())
    }

    fn frame(&self, picture: Picture, i: usize) -> Frame {
        let first = self.index.first_pts().unwrap_or(picture.pts);
        let meta = FrameMeta::from_pts(i, picture.pts, first, self.index.clock_offset());
        Frame::new(picture.image, meta)
    }
}

impl Iterator for FrameStream {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_picture() {
            Ok(Some(picture)) => {
                let i = self.position;
                self.position += 1;
                Some(Ok(self.frame(picture, i)))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
