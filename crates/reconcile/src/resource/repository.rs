//! Repository resources.
//!
//! A repository becomes one generated file whose name is derived from the
//! checksum of its contents, so changing any field yields a new file and
//! rendering the same descriptor twice yields the same path.

use super::{ManagedResources, Reconcile};
use crate::context::AgentContext;
use crate::descriptor::{
    AptRepository, ArchiveType, GooRepository, RepositoryFamily, RepositoryResource, RpmRepository,
};
use crate::error::{Error, Result};
use crate::gpg;
use crate::packages;
use fetch::RemoteSource;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// First line of every generated repository file.
pub const REPO_FILE_HEADER: &str = "# Repo file managed by Google OSConfig agent";

/// Largest GPG key accepted, in bytes.
pub const MAX_GPG_KEY_SIZE: u64 = 1024 * 1024;

const REPO_FILE_MODE: u32 = 0o644;

/// Repository family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// APT sources list
    Apt,
    /// GooGet repo file
    GooGet,
    /// Yum repo file
    Yum,
    /// Zypper repo file
    Zypper,
}

impl RepositoryKind {
    fn extension(self) -> &'static str {
        match self {
            Self::Apt => "list",
            Self::GooGet | Self::Yum | Self::Zypper => "repo",
        }
    }
}

/// A signing key written next to an APT repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedGpgKey {
    /// Binary key material
    #[serde(skip)]
    pub contents: Vec<u8>,
    /// sha256 of `contents`
    pub checksum: String,
    /// Keyring file path
    pub path: PathBuf,
}

/// A validated repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedRepository {
    /// Family
    pub kind: RepositoryKind,
    /// Rendered file body
    pub repo_file_contents: String,
    /// sha256 of the body
    pub repo_checksum: String,
    /// Generated file path
    pub repo_file_path: PathBuf,
    /// Signing key (APT only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpg_key: Option<ManagedGpgKey>,
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        Err(Error::invalid(format!("repository {what} must be set")))
    } else {
        Ok(())
    }
}

/// Body of an APT sources list.
pub fn render_apt(repo: &AptRepository) -> Result<String> {
    let archive = match repo.archive_type {
        ArchiveType::Deb => "deb",
        ArchiveType::DebSrc => "deb-src",
        ArchiveType::ArchiveTypeUnspecified => {
            return Err(Error::invalid("apt repository archive_type must be set"));
        }
    };
    require(&repo.uri, "uri")?;
    require(&repo.distribution, "distribution")?;

    let mut line = format!("{archive} {} {}", repo.uri, repo.distribution);
    for component in &repo.components {
        line.push(' ');
        line.push_str(component);
    }
    Ok(format!("{REPO_FILE_HEADER}\n{line}\n"))
}

/// Body of a GooGet repo file.
pub fn render_goo(repo: &GooRepository) -> Result<String> {
    require(&repo.name, "name")?;
    require(&repo.url, "url")?;
    Ok(format!(
        "{REPO_FILE_HEADER}\n- name: {}\n  url: {}\n",
        repo.name, repo.url
    ))
}

/// Body of a Yum (`gpgcheck` on) or Zypper repo file.
pub fn render_rpm(repo: &RpmRepository, gpgcheck: bool) -> Result<String> {
    require(&repo.id, "id")?;
    require(&repo.base_url, "base_url")?;

    let name = if repo.display_name.is_empty() {
        &repo.id
    } else {
        &repo.display_name
    };
    let mut body = format!(
        "{REPO_FILE_HEADER}\n[{}]\nname={}\nbaseurl={}\nenabled=1\n",
        repo.id, name, repo.base_url
    );
    if gpgcheck {
        body.push_str("gpgcheck=1\n");
    }
    for (i, key) in repo.gpg_keys.iter().enumerate() {
        if i == 0 {
            body.push_str("gpgkey=");
        } else {
            body.push_str("       ");
        }
        body.push_str(key);
        body.push('\n');
    }
    Ok(body)
}

/// `<dir>/osconfig_managed_<first 10 hex of checksum>.<ext>`
pub fn repo_file_path(dir: &Path, checksum: &str, kind: RepositoryKind) -> PathBuf {
    let prefix = checksum.get(..10).unwrap_or(checksum);
    dir.join(format!("osconfig_managed_{prefix}.{}", kind.extension()))
}

/// Whether `path` exists with content hashing to `checksum`.
fn file_matches(path: &Path, checksum: &str) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    Ok(fetch::checksum_file(path)? == checksum)
}

/// Repository resource handler.
#[derive(Debug)]
pub struct RepositoryHandler {
    resource: RepositoryResource,
    managed: Option<ManagedRepository>,
}

impl RepositoryHandler {
    /// Handler for `resource`.
    pub fn new(resource: RepositoryResource) -> Self {
        Self {
            resource,
            managed: None,
        }
    }

    fn fetch_gpg_key(ctx: &AgentContext, uri: &str) -> Result<ManagedGpgKey> {
        let data = fetch::fetch_limited(
            ctx.fetcher.as_ref(),
            &RemoteSource::http(uri),
            MAX_GPG_KEY_SIZE,
        )?;
        let contents = gpg::dearmor(uri, &data)?;
        let checksum = fetch::sha256_hex(&contents);
        let path = ctx
            .paths
            .apt_gpg_dir
            .join(format!("osconfig_added_{checksum}.gpg"));
        Ok(ManagedGpgKey {
            contents,
            checksum,
            path,
        })
    }
}

impl Reconcile for RepositoryHandler {
    fn validate(&mut self, ctx: &AgentContext) -> Result<ManagedResources> {
        let paths = &ctx.paths;
        let googet = paths.googet_exe().display().to_string();

        let (kind, contents, dir, tool) = match self.resource.family()? {
            RepositoryFamily::Apt(repo) => (
                RepositoryKind::Apt,
                render_apt(repo)?,
                &paths.apt_repo_dir,
                packages::APT_GET,
            ),
            RepositoryFamily::GooGet(repo) => (
                RepositoryKind::GooGet,
                render_goo(repo)?,
                &paths.googet_repo_dir,
                googet.as_str(),
            ),
            RepositoryFamily::Yum(repo) => (
                RepositoryKind::Yum,
                render_rpm(repo, true)?,
                &paths.yum_repo_dir,
                packages::YUM,
            ),
            RepositoryFamily::Zypper(repo) => (
                RepositoryKind::Zypper,
                render_rpm(repo, false)?,
                &paths.zypper_repo_dir,
                packages::ZYPPER,
            ),
        };

        if !ctx.runner.exists(tool) {
            return Err(Error::ManagerNotFound {
                resource: format!("{kind:?} repository").to_lowercase(),
                tool: tool.to_string(),
            });
        }

        let gpg_key = match &self.resource.apt {
            Some(apt) if !apt.gpg_key.is_empty() => Some(Self::fetch_gpg_key(ctx, &apt.gpg_key)?),
            _ => None,
        };

        let checksum = fetch::sha256_hex(contents.as_bytes());
        let managed = ManagedRepository {
            kind,
            repo_file_path: repo_file_path(dir, &checksum, kind),
            repo_file_contents: contents,
            repo_checksum: checksum,
            gpg_key,
        };
        log::debug!(
            "Repository file {} ({})",
            managed.repo_file_path.display(),
            managed.repo_checksum
        );

        self.managed = Some(managed.clone());
        Ok(ManagedResources {
            repositories: vec![managed],
            ..Default::default()
        })
    }

    fn check_state(&mut self, _ctx: &AgentContext) -> Result<bool> {
        let managed = self.managed.as_ref().ok_or(Error::NotValidated {
            operation: "check_state",
        })?;

        if let Some(key) = &managed.gpg_key
            && !file_matches(&key.path, &key.checksum)?
        {
            return Ok(false);
        }
        file_matches(&managed.repo_file_path, &managed.repo_checksum)
    }

    fn enforce_state(&mut self, _ctx: &AgentContext) -> Result<bool> {
        let managed = self.managed.as_ref().ok_or(Error::NotValidated {
            operation: "enforce_state",
        })?;

        if let Some(key) = &managed.gpg_key {
            log::info!("Writing GPG key {}", key.path.display());
            fetch::atomic_write(&key.path, &key.contents, Some(REPO_FILE_MODE))?;
        }
        log::info!("Writing repository file {}", managed.repo_file_path.display());
        fetch::atomic_write(
            &managed.repo_file_path,
            managed.repo_file_contents.as_bytes(),
            Some(REPO_FILE_MODE),
        )?;
        Ok(true)
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentPaths;
    use fetch::MemoryFetcher;
    use runner::MockRunner;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn apt_repo() -> AptRepository {
        AptRepository {
            archive_type: ArchiveType::Deb,
            uri: "uri".into(),
            distribution: "distribution".into(),
            components: vec!["c1".into(), "c2".into()],
            gpg_key: String::new(),
        }
    }

    #[test]
    fn test_render_apt() {
        assert_eq!(
            render_apt(&apt_repo()).unwrap(),
            "# Repo file managed by Google OSConfig agent\ndeb uri distribution c1 c2\n"
        );
        let mut src = apt_repo();
        src.archive_type = ArchiveType::DebSrc;
        src.components.clear();
        assert_eq!(
            render_apt(&src).unwrap(),
            "# Repo file managed by Google OSConfig agent\ndeb-src uri distribution\n"
        );
    }

    #[test]
    fn test_render_yum_and_zypper() {
        let repo = RpmRepository {
            id: "epel".into(),
            display_name: String::new(),
            base_url: "https://mirror/epel".into(),
            gpg_keys: vec!["https://k1".into(), "https://k2".into()],
        };
        assert_eq!(
            render_rpm(&repo, true).unwrap(),
            "# Repo file managed by Google OSConfig agent\n[epel]\nname=epel\nbaseurl=https://mirror/epel\nenabled=1\ngpgcheck=1\ngpgkey=https://k1\n       https://k2\n"
        );
        let repo = RpmRepository {
            display_name: "Extra".into(),
            gpg_keys: Vec::new(),
            ..repo
        };
        assert_eq!(
            render_rpm(&repo, false).unwrap(),
            "# Repo file managed by Google OSConfig agent\n[epel]\nname=Extra\nbaseurl=https://mirror/epel\nenabled=1\n"
        );
    }

    #[test]
    fn test_render_goo() {
        let repo = GooRepository {
            name: "google".into(),
            url: "https://packages.cloud.google.com/yuck/repos/google-compute-engine-stable".into(),
        };
        assert_eq!(
            render_goo(&repo).unwrap(),
            "# Repo file managed by Google OSConfig agent\n- name: google\n  url: https://packages.cloud.google.com/yuck/repos/google-compute-engine-stable\n"
        );
    }

    #[test]
    fn test_repo_path_is_stable_and_field_sensitive() {
        let dir = Path::new("/etc/apt/sources.list.d");
        let a = fetch::sha256_hex(render_apt(&apt_repo()).unwrap().as_bytes());
        let path = repo_file_path(dir, &a, RepositoryKind::Apt);
        assert_eq!(path, repo_file_path(dir, &a, RepositoryKind::Apt));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("osconfig_managed_{}.list", &a[..10])
        );

        let mut changed = apt_repo();
        changed.distribution = "other".into();
        let b = fetch::sha256_hex(render_apt(&changed).unwrap().as_bytes());
        assert_ne!(path, repo_file_path(dir, &b, RepositoryKind::Apt));
    }

    #[test]
    fn test_missing_fields() {
        let mut repo = apt_repo();
        repo.uri.clear();
        assert!(render_apt(&repo).is_err());
        repo = apt_repo();
        repo.archive_type = ArchiveType::ArchiveTypeUnspecified;
        assert!(render_apt(&repo).is_err());
    }

    fn apt_with_key(dir: &Path, key_body: &[u8]) -> (AgentContext, RepositoryHandler) {
        let fetcher = MemoryFetcher::new();
        fetcher.insert(RemoteSource::http("https://example.com/key"), key_body.to_vec());
        let ctx = AgentContext::new(
            Arc::new(MockRunner::new().with_program("apt-get")),
            Arc::new(fetcher),
            AgentPaths::with_root(dir),
        );
        let mut repo = apt_repo();
        repo.gpg_key = "https://example.com/key".into();
        let handler = RepositoryHandler::new(RepositoryResource {
            apt: Some(repo),
            ..Default::default()
        });
        (ctx, handler)
    }

    #[test]
    fn test_gpg_key_is_dearmored_and_written() {
        let dir = tempdir().unwrap();
        let armored = include_bytes!("../../tests/fixtures/repo_key.asc");
        let (ctx, mut handler) = apt_with_key(dir.path(), armored);

        let managed = handler.validate(&ctx).unwrap();
        let key = managed.repositories[0].gpg_key.clone().unwrap();
        let binary = gpg::dearmor("k", armored).unwrap();
        assert_eq!(key.checksum, fetch::sha256_hex(&binary));
        assert_eq!(
            key.path,
            ctx.paths
                .apt_gpg_dir
                .join(format!("osconfig_added_{}.gpg", key.checksum))
        );

        assert!(!handler.check_state(&ctx).unwrap());
        handler.enforce_state(&ctx).unwrap();
        assert!(handler.check_state(&ctx).unwrap());
        assert_eq!(std::fs::read(&key.path).unwrap(), binary);

        std::fs::remove_file(&key.path).unwrap();
        assert!(!handler.check_state(&ctx).unwrap());
    }

    #[test]
    fn test_non_key_response_fails_validation() {
        let dir = tempdir().unwrap();
        let (ctx, mut handler) = apt_with_key(dir.path(), b"<html>404 Not Found</html>");

        let err = handler.validate(&ctx).unwrap_err();
        assert!(matches!(err, Error::GpgKey { .. }));
        assert!(!ctx.paths.apt_gpg_dir.exists());
    }
}
