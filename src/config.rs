use anyhow::{Context, Result};
use reconcile::AgentPaths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Agent configuration file (`agent.toml`).
///
/// Every field is optional; missing paths take the host defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub paths: AgentPaths,
}

impl AgentConfig {
    /// Load from `explicit`, or from the default location when it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from(&paths::expand(&path.to_string_lossy()))?,
            None => {
                let path = paths::default_config_file()?;
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    log::debug!("No config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        if let Some(cache_dir) = paths::cache_dir_override() {
            log::debug!(
                "Using cache dir from {}: {}",
                paths::ENV_CACHE_DIR,
                cache_dir.display()
            );
            config.paths.cache_dir = cache_dir;
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.expand_paths();
        Ok(config)
    }

    fn expand_paths(&mut self) {
        let p = &mut self.paths;
        for path in [
            &mut p.apt_repo_dir,
            &mut p.yum_repo_dir,
            &mut p.zypper_repo_dir,
            &mut p.googet_repo_dir,
            &mut p.apt_gpg_dir,
            &mut p.googet_root,
            &mut p.cache_dir,
        ] {
            *path = expand_buf(path);
        }
    }
}

fn expand_buf(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => paths::expand(s),
        None => path.to_path_buf(),
    }
}
