//! Synthetic in-memory backend and frame lists.
//!
//! [`MemoryBackend`] serves registered [`MemoryVideo`] descriptions through
//! the regular [`Backend`] traits, so the index, seek, and drain logic of
//! [`VideoSource`](crate::VideoSource) runs unchanged against it. Pixel
//! values are derived from each frame's pts, which lets tests check that
//! the right frame was decoded.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use parking_lot::RwLock;

use camsync_common::time::secs_to_micros;
use camsync_common::{Codec, Error, Frame, FrameMeta, PixelFormat, Result};

use crate::decoder::{Backend, DecodeStatus, Decoder, Demuxer, Packet, Picture};
use crate::sequence::{check_index, FrameSequence, Property, PropertyValue, SeqIter};

/// Distance in bytes between consecutive synthetic packets.
pub const PACKET_STRIDE: u64 = 4096;

/// Description of a synthetic video.
#[derive(Debug, Clone)]
pub struct MemoryVideo {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    /// pts in container order.
    pub pts: Vec<i64>,
    /// Positions (container order) of keyframes.
    pub keyframes: BTreeSet<usize>,
    pub clock_offset: i64,
    /// Number of packets the decoder holds back before emitting a frame.
    pub reorder_depth: usize,
    pub serial_number: Option<String>,
    /// Container position whose packet fails to decode.
    pub fail_at: Option<usize>,
}

impl MemoryVideo {
    /// `frames` H.264 frames, `interval_us` apart, starting at pts 0, with
    /// only the first frame a keyframe.
    pub fn h264(frames: usize, interval_us: i64) -> Self {
        Self::new(Codec::H264, frames, interval_us)
    }

    /// Motion JPEG frames.
    pub fn mjpeg(frames: usize, interval_us: i64) -> Self {
        Self::new(Codec::Mjpeg, frames, interval_us)
    }

    fn new(codec: Codec, frames: usize, interval_us: i64) -> Self {
        Self {
            codec,
            width: 4,
            height: 2,
            pts: (0..frames as i64).map(|i| i * interval_us).collect(),
            keyframes: std::iter::once(0).collect(),
            clock_offset: 0,
            reorder_depth: 0,
            serial_number: None,
            fail_at: None,
        }
    }

    /// Replace the pts list.
    pub fn with_pts(mut self, pts: Vec<i64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn keyframes(mut self, keyframes: impl IntoIterator<Item = usize>) -> Self {
        self.keyframes = keyframes.into_iter().collect();
        self
    }

    /// Keyframe every `n` frames, starting at 0.
    pub fn keyframe_every(self, n: usize) -> Self {
        let len = self.pts.len();
        self.keyframes((0..len).step_by(n.max(1)))
    }

    pub fn clock_offset(mut self, micros: i64) -> Self {
        self.clock_offset = micros;
        self
    }

    /// Place the first frame at wall-clock `secs`.
    pub fn starting_at(self, secs: f64) -> Self {
        let first = self.pts.first().copied().unwrap_or(0);
        self.clock_offset(secs_to_micros(secs) - first)
    }

    pub fn reorder_depth(mut self, depth: usize) -> Self {
        self.reorder_depth = depth;
        self
    }

    pub fn serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn fail_at(mut self, position: usize) -> Self {
        self.fail_at = Some(position);
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Luma value the decoder paints a frame with.
    pub fn pixel_value(pts: i64) -> u8 {
        (pts / 1000).rem_euclid(256) as u8
    }
}

/// Call counters shared by every demuxer and decoder of one backend.
#[derive(Debug, Default)]
pub struct Counters {
    pub demuxer_opens: AtomicUsize,
    pub decoder_opens: AtomicUsize,
    pub seeks: AtomicUsize,
}

impl Counters {
    pub fn demuxer_opens(&self) -> usize {
        self.demuxer_opens.load(Ordering::SeqCst)
    }

    pub fn decoder_opens(&self) -> usize {
        self.decoder_opens.load(Ordering::SeqCst)
    }

    pub fn seeks(&self) -> usize {
        self.seeks.load(Ordering::SeqCst)
    }
}

/// Backend serving registered synthetic videos.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    videos: RwLock<HashMap<PathBuf, Arc<MemoryVideo>>>,
    counters: Arc<Counters>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `video` for `path`. The file itself must exist for
    /// fingerprinting.
    pub fn register(&self, path: impl Into<PathBuf>, video: MemoryVideo) {
        self.videos.write().insert(path.into(), Arc::new(video));
    }

    /// Write a placeholder file `name` in `dir` and register `video` for it.
    pub fn create(&self, dir: &Path, name: &str, video: MemoryVideo) -> Result<PathBuf> {
        let path = dir.join(name);
        let placeholder = format!("{} {} frames\n", video.codec, video.pts.len());
        std::fs::write(&path, placeholder)?;
        self.register(path.clone(), video);
        Ok(path)
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    fn video(&self, path: &Path) -> Option<Arc<MemoryVideo>> {
        self.videos.read().get(path).cloned()
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn supports(&self, path: &Path) -> bool {
        self.videos.read().contains_key(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Demuxer>> {
        let video = self.video(path).ok_or_else(|| Error::not_found(path))?;
        self.counters.demuxer_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryDemuxer {
            video,
            position: 0,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn open_decoder(&self, demuxer: &dyn Demuxer, format: PixelFormat) -> Result<Box<dyn Decoder>> {
        let params = DecoderParams::decode(&demuxer.codec_private())?;
        let (width, height) = demuxer.dimensions();
        self.counters.decoder_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryDecoder {
            width,
            height,
            format,
            params,
            pending: Vec::new(),
        }))
    }
}

/// Decoder settings carried in the synthetic codec private data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DecoderParams {
    reorder_depth: usize,
    fail_pts: Option<i64>,
}

impl DecoderParams {
    const LEN: usize = 17;

    fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&(self.reorder_depth as u64).to_le_bytes());
        out.push(self.fail_pts.is_some() as u8);
        out.extend_from_slice(&self.fail_pts.unwrap_or(0).to_le_bytes());
        Bytes::from(out)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != Self::LEN {
            return Err(Error::format("missing codec private data"));
        }
        let depth = u64::from_le_bytes(read8(&data[0..8]));
        let fail_pts = i64::from_le_bytes(read8(&data[9..17]));
        Ok(Self {
            reorder_depth: depth as usize,
            fail_pts: (data[8] != 0).then_some(fail_pts),
        })
    }
}

fn read8(data: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&data[..8]);
    out
}

struct MemoryDemuxer {
    video: Arc<MemoryVideo>,
    position: usize,
    counters: Arc<Counters>,
}

impl Demuxer for MemoryDemuxer {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn codec(&self) -> Codec {
        self.video.codec
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.video.width, self.video.height)
    }

    fn codec_private(&self) -> Bytes {
        DecoderParams {
            reorder_depth: self.video.reorder_depth,
            fail_pts: self.video.fail_at.and_then(|i| self.video.pts.get(i).copied()),
        }
        .encode()
    }

    fn next_packet(&mut self) -> Result<Option<Packet>> {
        let Some(&pts) = self.video.pts.get(self.position) else {
            return Ok(None);
        };
        let packet = Packet {
            pts,
            offset: self.position as u64 * PACKET_STRIDE,
            is_keyframe: self.video.keyframes.contains(&self.position),
            data: Bytes::copy_from_slice(&pts.to_le_bytes()),
        };
        self.position += 1;
        Ok(Some(packet))
    }

    fn seek(&mut self, byte_offset: u64) -> Result<()> {
        self.counters.seeks.fetch_add(1, Ordering::SeqCst);
        let position = (byte_offset / PACKET_STRIDE) as usize;
        if byte_offset % PACKET_STRIDE != 0 || position >= self.video.pts.len() {
            return Err(Error::format(format!("no packet at offset {byte_offset}")));
        }
        self.position = position;
        Ok(())
    }

    fn estimate_clock_offset(&mut self) -> Result<i64> {
        Ok(self.video.clock_offset)
    }

    fn serial_number(&mut self) -> Result<Option<String>> {
        Ok(self.video.serial_number.clone())
    }
}

/// Emits pictures in pts order after holding back `reorder_depth` packets.
struct MemoryDecoder {
    width: u32,
    height: u32,
    format: PixelFormat,
    params: DecoderParams,
    pending: Vec<i64>,
}

impl MemoryDecoder {
    fn emit_lowest(&mut self) -> DecodeStatus {
        let lowest = self
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, pts)| **pts)
            .map(|(i, _)| i);
        match lowest {
            Some(i) => {
                let pts = self.pending.remove(i);
                DecodeStatus::Produced(self.picture(pts))
            }
            None => DecodeStatus::NeedsMore,
        }
    }

    fn picture(&self, pts: i64) -> Picture {
        let value = MemoryVideo::pixel_value(pts);
        let image = match self.format {
            PixelFormat::Gray8 => DynamicImage::ImageLuma8(GrayImage::from_pixel(
                self.width,
                self.height,
                Luma([value]),
            )),
            PixelFormat::Rgb24 => DynamicImage::ImageRgb8(RgbImage::from_pixel(
                self.width,
                self.height,
                Rgb([value, value, value]),
            )),
        };
        Picture { pts, image }
    }
}

impl Decoder for MemoryDecoder {
    fn decode(&mut self, packet: Option<&Packet>) -> Result<DecodeStatus> {
        let Some(packet) = packet else {
            return Ok(self.emit_lowest());
        };
        if packet.data.len() != 8 {
            return Err(Error::decode(None, "truncated packet"));
        }
        let pts = i64::from_le_bytes(read8(&packet.data));
        if self.params.fail_pts == Some(pts) {
            return Err(Error::decode(None, format!("corrupt slice at pts {pts}")));
        }
        self.pending.push(pts);
        if self.pending.len() > self.params.reorder_depth {
            Ok(self.emit_lowest())
        } else {
            Ok(DecodeStatus::NeedsMore)
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// A fully decoded in-memory frame sequence.
#[derive(Debug, Clone)]
pub struct FrameList {
    frames: Vec<Frame>,
    native_timestamps: bool,
}

impl FrameList {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            native_timestamps: true,
        }
    }

    /// Frames at wall-clock times given in seconds. `timestamp` starts at 0.
    pub fn from_systimes(systimes: &[f64]) -> Self {
        let first = systimes.first().copied().unwrap_or(0.0);
        let frames = systimes
            .iter()
            .enumerate()
            .map(|(i, &systime)| {
                let timestamp = systime - first;
                let meta = FrameMeta {
                    index: i,
                    pts: secs_to_micros(timestamp),
                    timestamp,
                    systime,
                };
                Frame::new(tiny_image(i), meta)
            })
            .collect();
        Self::new(frames)
    }

    /// `len` frames `interval` seconds apart, the first at `start` seconds.
    pub fn uniform(len: usize, interval: f64, start: f64) -> Self {
        let systimes: Vec<f64> = (0..len).map(|i| start + i as f64 * interval).collect();
        Self::from_systimes(&systimes)
    }

    /// Mark the frames as lacking native timestamps.
    pub fn without_native_timestamps(mut self) -> Self {
        self.native_timestamps = false;
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

fn tiny_image(i: usize) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([(i % 256) as u8])))
}

impl FrameSequence for FrameList {
    type Item = Frame;

    fn len(&self) -> usize {
        self.frames.len()
    }

    fn get(&mut self, i: usize) -> Result<Frame> {
        check_index(i, self.frames.len())?;
        Ok(self.frames[i].clone())
    }

    fn iter(&mut self) -> Result<SeqIter<'_, Frame>> {
        Ok(Box::new(self.frames.iter().cloned().map(Ok)))
    }

    fn property(&mut self, property: Property) -> Result<PropertyValue> {
        match property {
            Property::Systimes if self.native_timestamps => Ok(PropertyValue::Times(
                self.frames.iter().map(|f| f.systime).collect(),
            )),
            _ => Err(Error::capability(format!("{property:?} is not available"))),
        }
    }

    fn has_native_timestamps(&self) -> bool {
        self.native_timestamps
    }
}
