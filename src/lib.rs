//! camsync - frame-accurate access to recorded camera video
//!
//! This library crate re-exports the workspace crates and holds the
//! configuration used by the `camsync` binary.

pub mod config;

pub use camsync_common as common;
pub use camsync_index as index;
pub use camsync_media as media;

pub use camsync_common::{Error, ErrorKind, Frame, Result};
