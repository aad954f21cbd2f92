//! Demuxer and decoder collaborators.
//!
//! The container grammar and the codec live outside this crate. A
//! [`Backend`] opens a [`Demuxer`] for a file and a [`Decoder`] for the
//! demuxer's stream; everything above this module only talks to these
//! traits.

use std::path::Path;

use bytes::Bytes;
use image::DynamicImage;
use parking_lot::Mutex;

use camsync_common::{Codec, Error, PixelFormat, Result};

/// Serialises decoder construction and teardown across all handles.
///
/// The native decoder library is not safe for concurrent init or close.
/// Decoding on an open handle does not take this lock.
static LIFECYCLE: Mutex<()> = parking_lot::const_mutex(());

/// One compressed frame read from the container.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Decoder pts in microseconds.
    pub pts: i64,
    /// Byte offset of the packet in the container.
    pub offset: u64,
    pub is_keyframe: bool,
    pub data: Bytes,
}

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Picture {
    pub pts: i64,
    pub image: DynamicImage,
}

/// Result of feeding the decoder.
#[derive(Debug, Clone)]
pub enum DecodeStatus {
    /// A frame is ready.
    Produced(Picture),
    /// Nothing ready; feed another packet (or, when draining, the decoder
    /// is empty).
    NeedsMore,
}

/// Container reader for one file.
///
/// Dropping the demuxer closes the file.
pub trait Demuxer: Send {
    /// Name of the backend that opened this demuxer.
    fn backend_name(&self) -> &'static str;

    fn codec(&self) -> Codec;

    /// Frame width and height in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Codec initialisation data of the video track.
    fn codec_private(&self) -> Bytes;

    /// Read the next packet, or `None` at end of stream.
    fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Position the reader so the next packet starts at `byte_offset`.
    fn seek(&mut self, byte_offset: u64) -> Result<()>;

    /// Calibrate wall-clock minus decode-clock, in microseconds.
    fn estimate_clock_offset(&mut self) -> Result<i64>;

    /// Serial number or MAC address of the recording camera, if present.
    fn serial_number(&mut self) -> Result<Option<String>>;
}

/// Stateful frame decoder.
pub trait Decoder: Send {
    /// Feed one packet, or `None` to drain buffered frames after the last
    /// packet.
    ///
    /// While draining, `NeedsMore` means the decoder holds no more output.
    fn decode(&mut self, packet: Option<&Packet>) -> Result<DecodeStatus>;

    /// Drop buffered state, e.g. after a seek.
    fn reset(&mut self);
}

/// Factory for demuxers and decoders.
pub trait Backend: Send + Sync {
    /// Human-readable name identifying this backend.
    fn name(&self) -> &'static str;

    /// Check whether this backend can read the given file.
    fn supports(&self, path: &Path) -> bool;

    /// Open a container.
    fn open(&self, path: &Path) -> Result<Box<dyn Demuxer>>;

    /// Create a decoder for the stream of `demuxer`.
    fn open_decoder(&self, demuxer: &dyn Demuxer, format: PixelFormat) -> Result<Box<dyn Decoder>>;
}

/// Decoder whose construction and drop hold the global lifecycle lock.
pub struct DecoderHandle {
    inner: Option<Box<dyn Decoder>>,
}

impl DecoderHandle {
    /// Open a decoder for `demuxer` through `backend`.
    pub fn open(backend: &dyn Backend, demuxer: &dyn Demuxer, format: PixelFormat) -> Result<Self> {
        let _guard = LIFECYCLE.lock();
        let inner = backend.open_decoder(demuxer, format)?;
        Ok(Self { inner: Some(inner) })
    }

    pub fn decode(&mut self, packet: Option<&Packet>) -> Result<DecodeStatus> {
        match self.inner.as_mut() {
            Some(decoder) => decoder.decode(packet),
            None => Err(Error::decode(None, "decoder is closed")),
        }
    }

    pub fn reset(&mut self) {
        if let Some(decoder) = self.inner.as_mut() {
            decoder.reset();
        }
    }
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        let _guard = LIFECYCLE.lock();
        self.inner.take();
    }
}

/// A backend that delegates to an ordered list of backends.
///
/// The first backend whose [`Backend::supports`] returns `true` and whose
/// [`Backend::open`] succeeds wins. Decoders are created by the backend that
/// opened the demuxer.
pub struct CompositeBackend {
    backends: Vec<Box<dyn Backend>>,
}

impl CompositeBackend {
    pub fn new(backends: Vec<Box<dyn Backend>>) -> Self {
        Self { backends }
    }
}

impl Backend for CompositeBackend {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn supports(&self, path: &Path) -> bool {
        self.backends.iter().any(|b| b.supports(path))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Demuxer>> {
        let mut last_err = None;

        for backend in &self.backends {
            if !backend.supports(path) {
                continue;
            }

            match backend.open(path) {
                Ok(demuxer) => return Ok(demuxer),
                Err(e) => {
                    tracing::debug!(
                        backend = backend.name(),
                        error = %e,
                        "backend failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::format(format!("no backend supports file: {}", path.display()))
        }))
    }

    fn open_decoder(&self, demuxer: &dyn Demuxer, format: PixelFormat) -> Result<Box<dyn Decoder>> {
        let name = demuxer.backend_name();
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .ok_or_else(|| Error::format(format!("no backend named {name}")))?
            .open_decoder(demuxer, format)
    }
}
