//! Turning a [`FileSource`] into a file on local disk.

use crate::context::AgentContext;
use crate::descriptor::{FileSource, SourceLocation};
use crate::error::{Error, Result};
use fetch::RemoteSource;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A source available on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCopy {
    /// Where the content is
    pub path: PathBuf,
    /// sha256 of the content when it was downloaded
    pub checksum: Option<String>,
}

/// Private working directory, created on first use.
pub fn working_dir(slot: &mut Option<TempDir>) -> Result<&Path> {
    let dir = match slot.take() {
        Some(dir) => dir,
        None => tempfile::Builder::new()
            .prefix("osconfig_")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?,
    };
    Ok(slot.insert(dir).path())
}

/// Remove the working directory, if any.
pub fn remove_working_dir(slot: &mut Option<TempDir>) -> Result<()> {
    if let Some(dir) = slot.take() {
        let path = dir.path().to_path_buf();
        dir.close().map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}

/// Resolve `source`, downloading remote content to `dir/<file_name>`.
///
/// Remote content must be integrity-pinned (checksum or generation) unless
/// the source allows insecure downloads. Local paths are used in place,
/// made absolute so package tools never read them as package names.
pub fn localize(
    ctx: &AgentContext,
    source: &FileSource,
    dir: &Path,
    file_name: &str,
) -> Result<LocalCopy> {
    let (remote, expected) = match source.location()? {
        SourceLocation::Local(path) => {
            let path = std::path::absolute(path).map_err(|e| Error::io(path, e))?;
            if !path.exists() {
                return Err(Error::io(
                    &path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "local file does not exist"),
                ));
            }
            return Ok(LocalCopy {
                path,
                checksum: None,
            });
        }
        SourceLocation::Remote(remote) => {
            if remote.sha256_checksum.is_empty() && !source.allow_insecure {
                return Err(Error::invalid(format!(
                    "remote file {} has no sha256_checksum and allow_insecure is not set",
                    remote.uri
                )));
            }
            (
                RemoteSource::http(&remote.uri),
                Some(remote.sha256_checksum.as_str()),
            )
        }
        SourceLocation::Gcs(gcs) => {
            if gcs.generation.is_none() && !source.allow_insecure {
                return Err(Error::invalid(format!(
                    "gcs object gs://{}/{} has no generation and allow_insecure is not set",
                    gcs.bucket, gcs.object
                )));
            }
            (
                RemoteSource::gcs(&gcs.bucket, &gcs.object, gcs.generation),
                None,
            )
        }
    };

    let dest = dir.join(file_name);
    let checksum = fetch::download_to(ctx.fetcher.as_ref(), &remote, &dest, expected)?;
    Ok(LocalCopy {
        path: dest,
        checksum: Some(checksum),
    })
}
