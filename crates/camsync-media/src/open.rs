//! Open any supported video path as a frame sequence.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use camsync_common::{Frame, Result};

use crate::decoder::Backend;
use crate::recording::{Recording, RECORDING_XML};
use crate::sequence::FrameSequence;
use crate::source::{OpenOptions, VideoSource};

/// Whether `path` names an Axis recording rather than a single video.
pub fn is_recording(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == RECORDING_XML)
}

/// Open `path` as a recording folder if it is a `recording.xml`, otherwise
/// as a single video file.
pub fn open_video(
    path: impl AsRef<Path>,
    backend: Arc<dyn Backend>,
    options: &OpenOptions,
) -> Result<Box<dyn FrameSequence<Item = Frame>>> {
    let path = path.as_ref();
    if is_recording(path) {
        debug!(path = %path.display(), "Opening recording");
        Ok(Box::new(Recording::open_path(path, backend, options)?))
    } else {
        debug!(path = %path.display(), backend = backend.name(), "Opening video");
        Ok(Box::new(VideoSource::open(path, backend, options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, MemoryVideo};
    use camsync_index::MemoryIndexCache;

    #[test]
    fn test_is_recording() {
        assert!(is_recording(Path::new("/nas/cam4/recording.xml")));
        assert!(!is_recording(Path::new("/nas/cam4/block.xml")));
        assert!(!is_recording(Path::new("/nas/cam4/recording.xml/clip.mkv")));
    }

    #[test]
    fn test_open_single_video() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let path = backend
            .create(dir.path(), "clip.mkv", MemoryVideo::h264(6, 40_000))
            .unwrap();
        let options = OpenOptions::new().cache(Arc::new(MemoryIndexCache::new()));

        let mut video = open_video(&path, backend, &options).unwrap();
        assert_eq!(video.len(), 6);
        assert!(video.has_native_timestamps());
        assert_eq!(video.at(-1).unwrap().index, 5);
    }
}
