//! Error types for fetch and write operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching or publishing content.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be completed.
    #[error("failed to fetch {source_name}: {message}")]
    Request {
        /// Display form of the remote source
        source_name: String,
        /// Transport error message
        message: String,
    },

    /// The remote answered with a non-success status.
    #[error("failed to fetch {source_name}: HTTP status {status}")]
    Status {
        /// Display form of the remote source
        source_name: String,
        /// HTTP status code
        status: u16,
    },

    /// The object is larger than the caller allows.
    #[error("{source_name} is too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge {
        /// Display form of the remote source
        source_name: String,
        /// Announced or observed size
        size: u64,
        /// Maximum accepted size
        limit: u64,
    },

    /// Downloaded content does not match the expected checksum.
    #[error("checksum mismatch for {source_name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Display form of the remote source
        source_name: String,
        /// Expected sha256 (hex)
        expected: String,
        /// Computed sha256 (hex)
        actual: String,
    },

    /// No object is registered for a source (in-memory fetcher).
    #[error("object not found: {0}")]
    NotFound(String),

    /// Filesystem error on a specific path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stream error not tied to a path.
    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
