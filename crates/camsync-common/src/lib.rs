//! Shared types for the camsync crates.
//!
//! Holds the error taxonomy, frame and metadata types, codec variants, and
//! the time and path helpers used by the index and media layers.

pub mod codec;
pub mod error;
pub mod frame;
pub mod paths;
pub mod time;

pub use codec::{Codec, PixelFormat, SeekMatch};
pub use error::{Error, ErrorKind, Result};
pub use frame::{Filtered, Frame, FrameMeta};
