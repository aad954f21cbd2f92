//! Path helpers for index sidecars.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension appended to a video path to form its index sidecar.
pub const INDEX_EXTENSION: &str = "idx";

/// Sidecar index path for `video`: the full file name with `.idx` appended.
///
/// `clip.mkv` becomes `clip.mkv.idx`.
pub fn sidecar_index_path(video: &Path) -> PathBuf {
    let mut name = OsString::from(video.as_os_str());
    name.push(".");
    name.push(INDEX_EXTENSION);
    PathBuf::from(name)
}

/// Whether `path` has the extension `ext`, compared case-insensitively.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
