//! Codec variants carried inside the recorded containers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Video codec of a recorded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 with per-frame pts in the container.
    H264,
    /// Motion JPEG wrapped in a VFW fourcc track.
    Mjpeg,
}

/// How a decoded frame is matched against an index entry after a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMatch {
    /// The decoded pts must equal the entry pts.
    Pts,
    /// The n:th frame decoded after the keyframe is entry `keyframe + n`.
    /// Lost packets shift every later match.
    Ordinal,
}

impl Codec {
    /// Map a Matroska `CodecID` string to a codec variant.
    pub fn from_codec_id(id: &str) -> Option<Self> {
        match id {
            "V_MPEG4/ISO/AVC" => Some(Codec::H264),
            "V_MS/VFW/FOURCC" => Some(Codec::Mjpeg),
            _ => None,
        }
    }

    /// The Matroska `CodecID` of this variant.
    pub fn codec_id(&self) -> &'static str {
        match self {
            Codec::H264 => "V_MPEG4/ISO/AVC",
            Codec::Mjpeg => "V_MS/VFW/FOURCC",
        }
    }

    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::Mjpeg => "mjpeg",
        }
    }

    /// Whether frames expose native pts that can be rebased and mapped to
    /// wall-clock time.
    pub fn has_native_timestamps(&self) -> bool {
        matches!(self, Codec::H264)
    }

    /// Seek match policy for this variant.
    ///
    /// MJPEG tracks do not carry a reliable pts per frame, so frames are
    /// matched by position. Whether that holds up under packet loss is
    /// unverified.
    pub fn seek_match(&self) -> SeekMatch {
        match self {
            Codec::H264 => SeekMatch::Pts,
            Codec::Mjpeg => SeekMatch::Ordinal,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel layout requested from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Interleaved 8-bit RGB.
    #[default]
    Rgb24,
    /// Single 8-bit luma channel.
    Gray8,
}

impl PixelFormat {
    /// Number of interleaved channels.
    pub fn channels(&self) -> u8 {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Pick the format from a "grey" flag.
    pub fn from_grey(grey: bool) -> Self {
        if grey {
            PixelFormat::Gray8
        } else {
            PixelFormat::Rgb24
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_id_round_trip() {
        for codec in [Codec::H264, Codec::Mjpeg] {
            assert_eq!(Codec::from_codec_id(codec.codec_id()), Some(codec));
        }
        assert_eq!(Codec::from_codec_id("A_AAC"), None);
    }

    #[test]
    fn test_mjpeg_matches_by_position() {
        assert_eq!(Codec::H264.seek_match(), SeekMatch::Pts);
        assert_eq!(Codec::Mjpeg.seek_match(), SeekMatch::Ordinal);
        assert!(!Codec::Mjpeg.has_native_timestamps());
    }

    #[test]
    fn test_pixel_format_channels() {
        assert_eq!(PixelFormat::from_grey(true).channels(), 1);
        assert_eq!(PixelFormat::from_grey(false).channels(), 3);
        assert_eq!(PixelFormat::default(), PixelFormat::Rgb24);
    }
}
