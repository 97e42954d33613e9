//! # fetch
//!
//! Remote content for the configuration agent: fetching objects over HTTP
//! or from an object store, hashing them while they stream, and publishing
//! files atomically so no reader ever observes a half-written file.
//!
//! ## Example
//!
//! ```no_run
//! use fetch::{HttpFetcher, RemoteSource, download_to};
//! use std::path::Path;
//!
//! let fetcher = HttpFetcher::new();
//! let source = RemoteSource::http("https://example.com/tool.deb");
//! let checksum = download_to(&fetcher, &source, Path::new("/tmp/tool.deb"), None).unwrap();
//! println!("sha256: {checksum}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod error;
pub mod http;
pub mod memory;
pub mod write;

pub use checksum::{checksum_file, checksum_reader, sha256_hex};
pub use error::{Error, Result};
pub use http::HttpFetcher;
pub use memory::MemoryFetcher;
pub use write::{atomic_write, download_to, fetch_limited};

use std::fmt;
use std::io::Read;

/// Where a remote object lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteSource {
    /// Plain HTTP(S) URI
    Http {
        /// Full URI of the object
        uri: String,
    },
    /// Object-store object addressed by bucket, name and optional generation
    Gcs {
        /// Bucket name
        bucket: String,
        /// Object name
        object: String,
        /// Object generation; `None` means the live version
        generation: Option<i64>,
    },
}

impl RemoteSource {
    /// An HTTP(S) source.
    pub fn http(uri: impl Into<String>) -> Self {
        Self::Http { uri: uri.into() }
    }

    /// An object-store source.
    pub fn gcs(bucket: impl Into<String>, object: impl Into<String>, generation: Option<i64>) -> Self {
        Self::Gcs {
            bucket: bucket.into(),
            object: object.into(),
            generation,
        }
    }

    /// Last path component of the object, useful as a local file name.
    pub fn file_name(&self) -> Option<&str> {
        let path = match self {
            Self::Http { uri } => uri.split(['?', '#']).next().unwrap_or(uri),
            Self::Gcs { object, .. } => object,
        };
        path.rsplit('/').next().filter(|n| !n.is_empty())
    }
}

impl fmt::Display for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { uri } => write!(f, "{uri}"),
            Self::Gcs {
                bucket,
                object,
                generation: Some(generation),
            } => write!(f, "gs://{bucket}/{object}#{generation}"),
            Self::Gcs {
                bucket,
                object,
                generation: None,
            } => write!(f, "gs://{bucket}/{object}"),
        }
    }
}

/// An open remote object.
pub struct Fetched {
    /// Byte stream of the object
    pub reader: Box<dyn Read + Send>,
    /// Size announced by the remote, if any
    pub size: Option<u64>,
}

impl fmt::Debug for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetched").field("size", &self.size).finish()
    }
}

/// Capability to open remote objects.
///
/// Implementations perform a single attempt; retry policy belongs to callers.
pub trait Fetcher: Send + Sync {
    /// Open `source` for reading.
    fn fetch(&self, source: &RemoteSource) -> Result<Fetched>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            RemoteSource::http("https://example.com/a.deb").to_string(),
            "https://example.com/a.deb"
        );
        assert_eq!(
            RemoteSource::gcs("bucket", "dir/a.rpm", Some(42)).to_string(),
            "gs://bucket/dir/a.rpm#42"
        );
        assert_eq!(
            RemoteSource::gcs("bucket", "a.rpm", None).to_string(),
            "gs://bucket/a.rpm"
        );
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            RemoteSource::http("https://example.com/pkgs/a.deb?x=1").file_name(),
            Some("a.deb")
        );
        assert_eq!(
            RemoteSource::gcs("bucket", "dir/setup.msi", None).file_name(),
            Some("setup.msi")
        );
        assert_eq!(RemoteSource::http("https://example.com/").file_name(), None);
    }
}
