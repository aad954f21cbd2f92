//! Decoded frames and their metadata.

use image::DynamicImage;

use crate::time::{micros_to_secs, systime_secs};

/// Metadata attached to every frame yielded by a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMeta {
    /// Zero-based position within the source that produced the frame.
    pub index: usize,
    /// Decoder pts in microseconds.
    pub pts: i64,
    /// Seconds since the first frame of the stream.
    pub timestamp: f64,
    /// Wall-clock seconds at capture.
    pub systime: f64,
}

impl FrameMeta {
    /// Metadata for a decoded pts.
    ///
    /// `first_pts` rebases `timestamp`; `clock_offset` maps pts to wall-clock
    /// microseconds.
    pub fn from_pts(index: usize, pts: i64, first_pts: i64, clock_offset: i64) -> Self {
        Self {
            index,
            pts,
            timestamp: micros_to_secs(pts - first_pts),
            systime: systime_secs(pts, clock_offset),
        }
    }
}

/// A decoded image together with its position and timing.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data.
    pub image: DynamicImage,
    /// Zero-based position within the producing source.
    pub index: usize,
    /// Decoder pts in microseconds.
    pub pts: i64,
    /// Seconds since the first frame of the stream.
    pub timestamp: f64,
    /// Wall-clock seconds at capture.
    pub systime: f64,
}

impl Frame {
    /// Attach metadata to an image.
    pub fn new(image: DynamicImage, meta: FrameMeta) -> Self {
        Self {
            image,
            index: meta.index,
            pts: meta.pts,
            timestamp: meta.timestamp,
            systime: meta.systime,
        }
    }

    /// Metadata of this frame.
    pub fn meta(&self) -> FrameMeta {
        FrameMeta {
            index: self.index,
            pts: self.pts,
            timestamp: self.timestamp,
            systime: self.systime,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Output of a per-frame transform.
///
/// Fields left as `None` are copied from the input frame when the result is
/// restored into a [`Frame`].
#[derive(Debug, Clone)]
pub struct Filtered {
    pub image: DynamicImage,
    pub index: Option<usize>,
    pub pts: Option<i64>,
    pub timestamp: Option<f64>,
    pub systime: Option<f64>,
}

impl Filtered {
    /// A bare image with no metadata.
    pub fn image(image: DynamicImage) -> Self {
        Self {
            image,
            index: None,
            pts: None,
            timestamp: None,
            systime: None,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_systime(mut self, systime: f64) -> Self {
        self.systime = Some(systime);
        self
    }

    /// Build a frame, filling missing metadata from `original`.
    pub fn restore(self, original: FrameMeta) -> Frame {
        Frame {
            image: self.image,
            index: self.index.unwrap_or(original.index),
            pts: self.pts.unwrap_or(original.pts),
            timestamp: self.timestamp.unwrap_or(original.timestamp),
            systime: self.systime.unwrap_or(original.systime),
        }
    }
}

impl From<Frame> for Filtered {
    fn from(frame: Frame) -> Self {
        Self {
            image: frame.image,
            index: Some(frame.index),
            pts: Some(frame.pts),
            timestamp: Some(frame.timestamp),
            systime: Some(frame.systime),
        }
    }
}

impl From<DynamicImage> for Filtered {
    fn from(image: DynamicImage) -> Self {
        Filtered::image(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn meta() -> FrameMeta {
        FrameMeta::from_pts(3, 1_120_000, 1_000_000, 5_000_000)
    }

    #[test]
    fn test_meta_from_pts() {
        let m = meta();
        assert_eq!(m.index, 3);
        assert_eq!(m.timestamp, 0.12);
        assert_eq!(m.systime, 6.12);
    }

    #[test]
    fn test_bare_image_takes_all_metadata_from_original() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([9])));
        let frame = Filtered::from(img).restore(meta());
        assert_eq!(frame.meta(), meta());
        assert_eq!(frame.width(), 2);
    }

    #[test]
    fn test_explicit_metadata_wins() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        let frame = Filtered::image(img).with_systime(42.0).restore(meta());
        assert_eq!(frame.systime, 42.0);
        assert_eq!(frame.index, 3);
        assert_eq!(frame.pts, 1_120_000);
    }
}
