//! Host paths the engine reads and writes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the persisted package-info cache inside [`AgentPaths::cache_dir`].
pub const PACKAGE_INFO_CACHE_FILE: &str = "package_info_cache.json";

/// Locations of repository directories, keyrings and the agent cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPaths {
    /// APT sources directory
    pub apt_repo_dir: PathBuf,
    /// Yum repository directory
    pub yum_repo_dir: PathBuf,
    /// Zypper repository directory
    pub zypper_repo_dir: PathBuf,
    /// GooGet repository directory
    pub googet_repo_dir: PathBuf,
    /// APT trusted keyring directory
    pub apt_gpg_dir: PathBuf,
    /// GooGet installation root
    pub googet_root: PathBuf,
    /// Agent cache directory
    pub cache_dir: PathBuf,
}

impl Default for AgentPaths {
    fn default() -> Self {
        let googet_root = std::env::var_os("GooGetRoot")
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(r"C:\ProgramData\GooGet"), PathBuf::from);

        let cache_dir = if cfg!(windows) {
            PathBuf::from(r"C:\ProgramData\Google\osconfig")
        } else {
            PathBuf::from("/var/lib/google_osconfig_agent")
        };

        Self {
            apt_repo_dir: PathBuf::from("/etc/apt/sources.list.d"),
            yum_repo_dir: PathBuf::from("/etc/yum.repos.d"),
            zypper_repo_dir: PathBuf::from("/etc/zypp/repos.d"),
            googet_repo_dir: googet_root.join("repos"),
            apt_gpg_dir: PathBuf::from("/etc/apt/trusted.gpg.d"),
            googet_root,
            cache_dir,
        }
    }
}

impl AgentPaths {
    /// Same layout as the defaults, rooted under `root` (for tests and chroots).
    pub fn with_root(root: &Path) -> Self {
        Self {
            apt_repo_dir: root.join("etc/apt/sources.list.d"),
            yum_repo_dir: root.join("etc/yum.repos.d"),
            zypper_repo_dir: root.join("etc/zypp/repos.d"),
            googet_repo_dir: root.join("googet/repos"),
            apt_gpg_dir: root.join("etc/apt/trusted.gpg.d"),
            googet_root: root.join("googet"),
            cache_dir: root.join("var/lib/google_osconfig_agent"),
        }
    }

    /// `googet.exe` inside the GooGet root.
    pub fn googet_exe(&self) -> PathBuf {
        self.googet_root.join("googet.exe")
    }

    /// Location of the persisted package-info cache.
    pub fn package_info_cache_file(&self) -> PathBuf {
        self.cache_dir.join(PACKAGE_INFO_CACHE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root() {
        let paths = AgentPaths::with_root(Path::new("/tmp/root"));
        assert_eq!(paths.apt_repo_dir, PathBuf::from("/tmp/root/etc/apt/sources.list.d"));
        assert_eq!(
            paths.package_info_cache_file(),
            PathBuf::from("/tmp/root/var/lib/google_osconfig_agent/package_info_cache.json")
        );
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let paths: AgentPaths = serde_json::from_str(r#"{"cache_dir": "/srv/cache"}"#).unwrap();
        assert_eq!(paths.cache_dir, PathBuf::from("/srv/cache"));
        assert_eq!(paths.yum_repo_dir, AgentPaths::default().yum_repo_dir);
    }
}
