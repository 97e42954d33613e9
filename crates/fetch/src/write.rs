//! Downloading and atomic publication.
//!
//! Content is always staged in a temp file next to its destination and
//! renamed into place, so the final path either holds the old file or the
//! complete new one.

use crate::checksum::copy_hashing;
use crate::error::{Error, Result};
use crate::{Fetcher, RemoteSource};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Download `source` to `dest`, returning the content checksum.
///
/// When `expected_sha256` is given and non-empty the download is rejected
/// on mismatch and nothing is left at `dest`.
pub fn download_to(
    fetcher: &dyn Fetcher,
    source: &RemoteSource,
    dest: &Path,
    expected_sha256: Option<&str>,
) -> Result<String> {
    let mut fetched = fetcher.fetch(source)?;
    let mut tmp = staging_file(dest)?;

    let checksum = copy_hashing(&mut fetched.reader, tmp.as_file_mut())?;

    if let Some(expected) = expected_sha256.filter(|e| !e.is_empty())
        && !checksum.eq_ignore_ascii_case(expected)
    {
        return Err(Error::ChecksumMismatch {
            source_name: source.to_string(),
            expected: expected.to_string(),
            actual: checksum,
        });
    }

    publish(tmp, dest)?;
    log::debug!("Downloaded {} to {} (sha256 {})", source, dest.display(), checksum);
    Ok(checksum)
}

/// Atomically replace `path` with `contents`.
///
/// Parent directories are created as needed. `mode` sets Unix permission
/// bits and is ignored elsewhere.
pub fn atomic_write(path: &Path, contents: &[u8], mode: Option<u32>) -> Result<()> {
    let mut tmp = staging_file(path)?;
    tmp.write_all(contents).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| Error::io(tmp.path(), e))?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| Error::io(tmp.path(), e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    publish(tmp, path)?;
    log::debug!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

/// Fetch `source` fully into memory, refusing anything above `limit` bytes.
///
/// An announced size above the limit is rejected before reading; a stream
/// that runs past the limit is rejected once it does.
pub fn fetch_limited(fetcher: &dyn Fetcher, source: &RemoteSource, limit: u64) -> Result<Vec<u8>> {
    let fetched = fetcher.fetch(source)?;
    if let Some(size) = fetched.size
        && size > limit
    {
        return Err(Error::TooLarge {
            source_name: source.to_string(),
            size,
            limit,
        });
    }

    let mut data = Vec::new();
    fetched
        .reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut data)?;

    if data.len() as u64 > limit {
        return Err(Error::TooLarge {
            source_name: source.to_string(),
            size: data.len() as u64,
            limit,
        });
    }
    Ok(data)
}

fn staging_file(dest: &Path) -> Result<NamedTempFile> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))
}

fn publish(tmp: NamedTempFile, dest: &Path) -> Result<()> {
    tmp.persist(dest)
        .map(|_| ())
        .map_err(|e| Error::io(dest, e.error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{checksum_file, sha256_hex};
    use crate::memory::MemoryFetcher;
    use tempfile::tempdir;

    #[test]
    fn test_download_with_correct_checksum() {
        let dir = tempdir().unwrap();
        let fetcher = MemoryFetcher::new();
        let source = RemoteSource::http("https://example.com/file");
        fetcher.insert(source.clone(), "payload");

        let dest = dir.path().join("nested").join("file");
        let expected = sha256_hex(b"payload");
        let checksum = download_to(&fetcher, &source, &dest, Some(&expected)).unwrap();

        assert_eq!(checksum, expected);
        assert_eq!(checksum_file(&dest).unwrap(), expected);
    }

    #[test]
    fn test_download_with_wrong_checksum_leaves_nothing() {
        let dir = tempdir().unwrap();
        let fetcher = MemoryFetcher::new();
        let source = RemoteSource::gcs("bucket", "object", Some(1));
        fetcher.insert(source.clone(), "payload");

        let dest = dir.path().join("file");
        let err = download_to(&fetcher, &source, &dest, Some(&sha256_hex(b"other"))).unwrap_err();

        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_download_without_expected_checksum() {
        let dir = tempdir().unwrap();
        let fetcher = MemoryFetcher::new();
        let source = RemoteSource::http("https://example.com/file");
        fetcher.insert(source.clone(), "payload");

        let dest = dir.path().join("file");
        let checksum = download_to(&fetcher, &source, &dest, Some("")).unwrap();
        assert_eq!(checksum, sha256_hex(b"payload"));
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b.list");
        atomic_write(&path, b"first", None).unwrap();
        atomic_write(&path, b"second", Some(0o644)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("script");
        atomic_write(&path, b"#!/bin/sh\n", Some(0o755)).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_fetch_limited() {
        let fetcher = MemoryFetcher::new();
        let source = RemoteSource::http("https://example.com/key");
        fetcher.insert(source.clone(), vec![1_u8; 16]);

        assert_eq!(fetch_limited(&fetcher, &source, 16).unwrap().len(), 16);
        let err = fetch_limited(&fetcher, &source, 15).unwrap_err();
        assert!(matches!(err, Error::TooLarge { size: 16, limit: 15, .. }));
    }
}
