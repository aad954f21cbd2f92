//! Error taxonomy shared by every camsync crate.
//!
//! Failures surface at the operation that caused them (open, iteration step,
//! or indexed access). Only a stale index cache is handled locally; everything
//! else propagates unmodified since neither container corruption nor decoder
//! failure is transient.

use std::fmt;
use std::path::{Path, PathBuf};

/// Error type for camsync operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file is missing or cannot be opened.
    #[error("File not found: {}", .path.display())]
    NotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or unparsable container, index, or recording metadata.
    #[error("Format error: {0}")]
    Format(String),

    /// The native decoder failed on a specific frame.
    #[error("Decode error{}: {message}", .index.map(|i| format!(" at frame {i}")).unwrap_or_default())]
    Decode {
        /// Position of the frame being decoded, when known.
        index: Option<usize>,
        /// Human-readable error description.
        message: String,
    },

    /// Position outside `[0, len)`.
    #[error("Index {index} out of range for sequence of length {len}")]
    IndexOutOfRange {
        /// The requested (unresolved) position.
        index: isize,
        /// Length of the sequence.
        len: usize,
    },

    /// The operation is undefined for this source variant.
    #[error("Unsupported for this source: {0}")]
    Capability(String),

    /// The index claims a keyframe or pts the decoder cannot reproduce.
    #[error("Index inconsistency: {0}")]
    Inconsistency(String),

    /// Invalid argument supplied by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Coarse classification of an [`Error`], for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Io,
    Format,
    Decode,
    IndexOutOfRange,
    Capability,
    Inconsistency,
    InvalidInput,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Io(_) => ErrorKind::Io,
            Error::Format(_) => ErrorKind::Format,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Error::Capability(_) => ErrorKind::Capability,
            Error::Inconsistency(_) => ErrorKind::Inconsistency,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Create a not found error for a path.
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Error::NotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Create a decode error, optionally tied to a frame position.
    pub fn decode(index: Option<usize>, msg: impl Into<String>) -> Self {
        Error::Decode {
            index,
            message: msg.into(),
        }
    }

    /// Create a capability error.
    pub fn capability(msg: impl Into<String>) -> Self {
        Error::Capability(msg.into())
    }

    /// Create an inconsistency error.
    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Error::Inconsistency(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Map an I/O error from opening `path`, turning `NotFound` into [`Error::NotFound`].
    pub fn from_open(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(path)
        } else {
            Error::Io(err)
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
            ErrorKind::Decode => "decode",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::Capability => "capability",
            ErrorKind::Inconsistency => "inconsistency",
            ErrorKind::InvalidInput => "invalid input",
        };
        f.write_str(name)
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
