//! File resources.

use super::source::{localize, remove_working_dir, working_dir};
use super::{ManagedResources, Reconcile};
use crate::context::AgentContext;
use crate::descriptor::{FileResource, FileState};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Mode applied when the descriptor gives none.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// A validated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedFile {
    /// Target path
    pub path: PathBuf,
    /// Desired state
    pub state: FileState,
    /// Permission bits
    pub permissions: u32,
    /// Local copy of the desired content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// sha256 of the desired content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<String>,
}

/// Parse octal permission bits; empty means [`DEFAULT_FILE_MODE`].
pub fn parse_permissions(permissions: &str) -> Result<u32> {
    if permissions.is_empty() {
        return Ok(DEFAULT_FILE_MODE);
    }
    u32::from_str_radix(permissions, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| Error::invalid(format!("can't parse permissions {permissions:?}")))
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// File resource handler.
#[derive(Debug)]
pub struct FileHandler {
    resource: FileResource,
    managed: Option<ManagedFile>,
    temp_dir: Option<TempDir>,
}

impl FileHandler {
    /// Handler for `resource`.
    pub fn new(resource: FileResource) -> Self {
        Self {
            resource,
            managed: None,
            temp_dir: None,
        }
    }

    /// Resolve the desired content to a local path and its checksum.
    fn resolve_content(&mut self, ctx: &AgentContext) -> Result<(PathBuf, String)> {
        match (&self.resource.content, &self.resource.file) {
            (Some(content), None) => {
                let dir = working_dir(&mut self.temp_dir)?;
                let path = dir.join("inline_content");
                fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
                Ok((path, fetch::sha256_hex(content.as_bytes())))
            }
            (None, Some(source)) => {
                let source = source.clone();
                let dir = working_dir(&mut self.temp_dir)?.to_path_buf();
                let copy = localize(ctx, &source, &dir, "file_content")?;
                let checksum = match copy.checksum {
                    Some(checksum) => checksum,
                    None => fetch::checksum_file(&copy.path)?,
                };
                Ok((copy.path, checksum))
            }
            (None, None) => Err(Error::invalid(format!(
                "file {} needs content or a file source",
                self.resource.path
            ))),
            (Some(_), Some(_)) => Err(Error::invalid(format!(
                "file {} has both content and a file source",
                self.resource.path
            ))),
        }
    }
}

impl Reconcile for FileHandler {
    fn validate(&mut self, ctx: &AgentContext) -> Result<ManagedResources> {
        if self.resource.path.is_empty() {
            return Err(Error::invalid("file path must be set"));
        }
        let path = PathBuf::from(&self.resource.path);
        let state = self.resource.state;
        let permissions = parse_permissions(&self.resource.permissions)?;

        let (source, source_checksum) = match state {
            FileState::DesiredStateUnspecified => {
                return Err(Error::invalid(format!("file {} has no state", path.display())));
            }
            FileState::Absent => (None, None),
            FileState::Present if exists(&path) => (None, None),
            FileState::Present | FileState::ContentsMatch => {
                let (source, checksum) = self.resolve_content(ctx)?;
                (Some(source), Some(checksum))
            }
        };

        let managed = ManagedFile {
            path,
            state,
            permissions,
            source,
            source_checksum,
        };
        self.managed = Some(managed.clone());
        Ok(ManagedResources {
            files: vec![managed],
            ..Default::default()
        })
    }

    fn check_state(&mut self, _ctx: &AgentContext) -> Result<bool> {
        let managed = self.managed.as_ref().ok_or(Error::NotValidated {
            operation: "check_state",
        })?;

        match managed.state {
            FileState::Absent => Ok(!exists(&managed.path)),
            FileState::Present => Ok(exists(&managed.path)),
            FileState::ContentsMatch => {
                if !managed.path.is_file() {
                    return Ok(false);
                }
                let actual = fetch::checksum_file(&managed.path)?;
                Ok(managed.source_checksum.as_deref() == Some(actual.as_str()))
            }
            FileState::DesiredStateUnspecified => Ok(false),
        }
    }

    fn enforce_state(&mut self, _ctx: &AgentContext) -> Result<bool> {
        let managed = self.managed.as_ref().ok_or(Error::NotValidated {
            operation: "enforce_state",
        })?;
        let path = &managed.path;

        if managed.state == FileState::Absent {
            log::info!("Removing {}", path.display());
            return match fs::remove_file(path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
                Err(e) => Err(Error::io(path, e)),
            };
        }

        let Some(source) = &managed.source else {
            // Present and already there when validated.
            if exists(path) {
                set_permissions(path, managed.permissions)?;
                return Ok(true);
            }
            return Err(Error::invalid(format!(
                "file {} disappeared after validation",
                path.display()
            )));
        };

        log::info!("Writing {}", path.display());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        copy_contents(source, path)?;
        set_permissions(path, managed.permissions)?;
        Ok(true)
    }

    fn cleanup(&mut self) -> Result<()> {
        remove_working_dir(&mut self.temp_dir)
    }
}

fn copy_contents(from: &Path, to: &Path) -> Result<()> {
    let mut reader = fs::File::open(from).map_err(|e| Error::io(from, e))?;
    let mut writer = fs::File::create(to).map_err(|e| Error::io(to, e))?;
    io::copy(&mut reader, &mut writer).map_err(|e| Error::io(to, e))?;
    writer.flush().map_err(|e| Error::io(to, e))?;
    writer.sync_all().map_err(|e| Error::io(to, e))
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
