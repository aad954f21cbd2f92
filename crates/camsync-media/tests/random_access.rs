//! Random access, caching, and error behaviour of `VideoSource`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use assert_matches::assert_matches;
use tempfile::TempDir;

use camsync_common::{Codec, Error, Frame, PixelFormat};
use camsync_index::{DiskIndexCache, MemoryIndexCache};
use camsync_media::memory::{MemoryBackend, MemoryVideo};
use camsync_media::{
    CompositeBackend, FrameSequence, OpenOptions, Property, TimeSeries, VideoSource,
};

struct Setup {
    dir: TempDir,
    backend: Arc<MemoryBackend>,
}

impl Setup {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    fn create(&self, name: &str, video: MemoryVideo) -> PathBuf {
        self.backend.create(self.dir.path(), name, video).unwrap()
    }

    fn open(&self, path: &Path) -> VideoSource {
        VideoSource::open(path, self.backend.clone(), &memory_cache()).unwrap()
    }
}

fn memory_cache() -> OpenOptions {
    OpenOptions::new().cache(Arc::new(MemoryIndexCache::new()))
}

fn luma(frame: &Frame) -> u8 {
    frame.image.to_luma8().get_pixel(0, 0)[0]
}

#[test]
fn test_backward_access_reseeks_from_keyframe() {
    let setup = Setup::new();
    let path = setup.create(
        "clip.mkv",
        MemoryVideo::h264(16, 40_000).keyframes([0, 8]),
    );
    let mut video = setup.open(&path);
    let counters = setup.backend.counters();

    let frame = video.get(10).unwrap();
    assert_eq!(frame.index, 10);
    assert_eq!(frame.pts, 400_000);
    assert_eq!(luma(&frame), MemoryVideo::pixel_value(400_000));
    assert_eq!(counters.seeks(), 1);

    let frame = video.get(3).unwrap();
    assert_eq!(frame.index, 3);
    assert_eq!(frame.pts, 120_000);
    assert_eq!(luma(&frame), MemoryVideo::pixel_value(120_000));
    assert_eq!(counters.seeks(), 2);
}

#[test]
fn test_pts_past_target_is_inconsistent() {
    let setup = Setup::new();
    let path = setup.create(
        "clip.mkv",
        MemoryVideo::h264(4, 1).with_pts(vec![0, 80_000, 40_000, 120_000]),
    );
    let mut video = setup.open(&path);

    assert_eq!(video.index().entry(1).unwrap().pts, 40_000);
    assert_matches!(video.get(1), Err(Error::Inconsistency(msg)) if msg.contains("pts 80000"));
}

#[test]
fn test_unreadable_keyframe_is_inconsistent() {
    let setup = Setup::new();
    let path = setup.create(
        "clip.mkv",
        MemoryVideo::h264(16, 40_000).keyframes([0, 8]),
    );
    let mut video = setup.open(&path);

    // The container shrinks behind the index.
    setup.backend.register(path.clone(), MemoryVideo::h264(4, 40_000));
    assert_matches!(video.get(10), Err(Error::Inconsistency(msg)) if msg.contains("keyframe 8"));
}

#[test]
fn test_forward_access_reuses_decoder() {
    let setup = Setup::new();
    let path = setup.create("clip.mkv", MemoryVideo::h264(16, 40_000).keyframe_every(4));
    let mut video = setup.open(&path);
    let counters = setup.backend.counters();

    for i in 0..16 {
        assert_eq!(video.get(i).unwrap().index, i);
    }
    assert_eq!(counters.seeks(), 0);
    assert_eq!(counters.decoder_opens(), 1);

    // Skipping ahead within the same GOP decodes forward.
    video.get(1).unwrap();
    let seeks = counters.seeks();
    video.get(3).unwrap();
    assert_eq!(counters.seeks(), seeks);
}

#[test]
fn test_get_matches_iteration() {
    let setup = Setup::new();
    let path = setup.create(
        "clip.mkv",
        MemoryVideo::h264(24, 33_367)
            .keyframe_every(6)
            .reorder_depth(2)
            .clock_offset(1_448_984_844_000_000),
    );
    let mut video = setup.open(&path);

    let iterated: Vec<Frame> = video.iter().unwrap().map(|f| f.unwrap()).collect();
    assert_eq!(iterated.len(), 24);

    for i in [17, 3, 23, 0, 12, 11] {
        let frame = video.get(i).unwrap();
        assert_eq!(frame.meta(), iterated[i].meta());
        assert_eq!(luma(&frame), luma(&iterated[i]));
    }
    assert_eq!(video.at(-1).unwrap().meta(), iterated[23].meta());

    let systimes = video.systimes().unwrap();
    for (t, frame) in systimes.iter().zip(&iterated) {
        assert_eq!(*t, frame.systime);
    }
    assert_eq!(iterated[0].timestamp, 0.0);
    assert_eq!(iterated[0].systime, 1_448_984_844.0);
}

#[test]
fn test_iteration_drains_reordered_frames() {
    let setup = Setup::new();
    let path = setup.create("clip.mkv", MemoryVideo::h264(10, 40_000).reorder_depth(3));
    let mut video = setup.open(&path);

    let indexes: Vec<usize> = video.iter().unwrap().map(|f| f.unwrap().index).collect();
    assert_eq!(indexes, (0..10).collect::<Vec<_>>());
    assert_eq!(video.get(9).unwrap().pts, 360_000);
}

#[test]
fn test_iter_from_starts_at_position() {
    let setup = Setup::new();
    let path = setup.create("clip.mkv", MemoryVideo::h264(20, 40_000).keyframe_every(5));
    let mut video = setup.open(&path);

    let frames: Vec<Frame> = video.iter_from(12).unwrap().map(|f| f.unwrap()).collect();
    assert_eq!(frames.len(), 8);
    assert_eq!(frames[0].index, 12);
    assert_eq!(frames[0].pts, 480_000);
}

#[test]
fn test_out_of_range() {
    let setup = Setup::new();
    let path = setup.create("clip.mkv", MemoryVideo::h264(16, 40_000));
    let mut video = setup.open(&path);

    assert_matches!(video.get(16), Err(Error::IndexOutOfRange { index: 16, len: 16 }));
    assert_matches!(video.at(-17), Err(Error::IndexOutOfRange { index: -17, len: 16 }));
    assert_eq!(video.at(-16).unwrap().index, 0);
}

#[test]
fn test_decode_error_names_frame() {
    let setup = Setup::new();
    let path = setup.create("clip.mkv", MemoryVideo::h264(10, 40_000).fail_at(5));
    let mut video = setup.open(&path);

    let results: Vec<_> = video.iter().unwrap().collect();
    assert_eq!(results.len(), 6);
    assert!(results[..5].iter().all(|r| r.is_ok()));
    assert_matches!(results[5], Err(Error::Decode { index: Some(5), .. }));

    assert_matches!(video.get(7), Err(Error::Decode { index: Some(5), .. }));

    // The failed cursor is dropped, so the next access starts afresh.
    let opens = setup.backend.counters().decoder_opens();
    assert_eq!(video.get(2).unwrap().index, 2);
    assert_eq!(setup.backend.counters().decoder_opens(), opens + 1);
}

#[test]
fn test_missing_and_empty_files() {
    let setup = Setup::new();
    let missing = setup.dir.path().join("missing.mkv");
    assert_matches!(
        VideoSource::open(&missing, setup.backend.clone(), &memory_cache()),
        Err(Error::NotFound { .. })
    );

    let empty = setup.dir.path().join("empty.mkv");
    std::fs::write(&empty, b"").unwrap();
    setup.backend.register(&empty, MemoryVideo::h264(4, 40_000));
    assert_matches!(
        VideoSource::open(&empty, setup.backend.clone(), &memory_cache()),
        Err(Error::Io(_))
    );
}

#[test]
fn test_mjpeg_matches_by_position() {
    let setup = Setup::new();
    let path = setup.create(
        "clip.mkv",
        MemoryVideo::mjpeg(8, 40_000).keyframe_every(1),
    );
    let mut video = setup.open(&path);
    assert_eq!(video.codec(), Codec::Mjpeg);
    assert!(!video.has_native_timestamps());

    assert_eq!(video.get(6).unwrap().index, 6);
    assert_eq!(video.get(2).unwrap().pts, 80_000);
    assert_matches!(video.systimes(), Err(Error::Capability(_)));
    assert_matches!(
        video.property(Property::Systimes),
        Err(Error::Capability(_))
    );
    assert_matches!(
        TimeSeries::systimes(&mut video),
        Err(Error::Capability(_))
    );
}

#[test]
fn test_grey_frames() {
    let setup = Setup::new();
    let path = setup.create("clip.mkv", MemoryVideo::h264(4, 40_000).dimensions(8, 6));
    let options = memory_cache().grey(true);
    let mut video = VideoSource::open(&path, setup.backend.clone(), &options).unwrap();

    assert_eq!(video.pixel_format(), PixelFormat::Gray8);
    let frame = video.get(1).unwrap();
    assert!(frame.image.as_luma8().is_some());
    assert_eq!((frame.width(), frame.height()), (8, 6));
}

#[test]
fn test_serial_number() {
    let setup = Setup::new();
    let path = setup.create(
        "clip.mkv",
        MemoryVideo::h264(4, 40_000).serial_number("00408C18823A"),
    );
    let video = setup.open(&path);
    assert_eq!(video.serial_number().unwrap().as_deref(), Some("00408C18823A"));
}

#[test]
fn test_sidecar_index_is_reused_until_file_changes() {
    let setup = Setup::new();
    let path = setup.create("clip.mkv", MemoryVideo::h264(16, 40_000));
    let options = OpenOptions::new().cache(Arc::new(DiskIndexCache::sidecar()));

    let video = VideoSource::open(&path, setup.backend.clone(), &options).unwrap();
    assert_eq!(video.len(), 16);
    assert!(setup.dir.path().join("clip.mkv.idx").is_file());

    // Same file, different content behind it: the stored index wins.
    setup.backend.register(&path, MemoryVideo::h264(20, 40_000));
    let video = VideoSource::open(&path, setup.backend.clone(), &options).unwrap();
    assert_eq!(video.len(), 16);

    // Forcing a rebuild ignores the stored index.
    let video =
        VideoSource::open(&path, setup.backend.clone(), &options.clone().reindex(true)).unwrap();
    assert_eq!(video.len(), 20);

    // A new modification time invalidates the stored index.
    setup.backend.register(&path, MemoryVideo::h264(12, 40_000));
    let later = SystemTime::now() + Duration::from_secs(60);
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();
    let video = VideoSource::open(&path, setup.backend.clone(), &options).unwrap();
    assert_eq!(video.len(), 12);
}

#[test]
fn test_composite_backend_dispatch() {
    let dir = TempDir::new().unwrap();
    let serving = MemoryBackend::new();
    let path = serving
        .create(dir.path(), "clip.mkv", MemoryVideo::h264(6, 40_000))
        .unwrap();
    let composite = Arc::new(CompositeBackend::new(vec![
        Box::new(MemoryBackend::new()),
        Box::new(serving),
    ]));

    let mut video = VideoSource::open(&path, composite.clone(), &memory_cache()).unwrap();
    assert_eq!(video.get(4).unwrap().pts, 160_000);

    let other = dir.path().join("other.mkv");
    std::fs::write(&other, b"data").unwrap();
    assert_matches!(
        VideoSource::open(&other, composite, &memory_cache()),
        Err(Error::Format(_))
    );
}
