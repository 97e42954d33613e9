//! Path resolution for the agent's own files.
//!
//! # Environment Variables
//!
//! - `OSCONFIG_AGENT_CONFIG` - Config file (also settable with `--config`)
//! - `OSCONFIG_AGENT_CACHE_DIR` - Override the cache directory
//!
//! For config_dir():
//! 1. `XDG_CONFIG_HOME/osconfig-agent` (if set)
//! 2. Platform default:
//!    - Windows: `%APPDATA%\osconfig-agent`
//!    - macOS/Linux: `~/.config/osconfig-agent`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for the cache directory override
pub const ENV_CACHE_DIR: &str = "OSCONFIG_AGENT_CACHE_DIR";

const APP_DIR: &str = "osconfig-agent";
const CONFIG_FILE: &str = "agent.toml";

/// Get the agent config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join(APP_DIR));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join(APP_DIR))
}

/// Default location of the agent config file
pub fn default_config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Cache directory override from the environment, if any
pub fn cache_dir_override() -> Option<PathBuf> {
    std::env::var(ENV_CACHE_DIR)
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(|dir| expand(&dir))
}

/// Expand a leading `~` in a path string.
pub fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let expanded = expand("~/policies");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("policies"));
        }
        assert_eq!(expand("/etc/agent.toml"), PathBuf::from("/etc/agent.toml"));
    }

    #[test]
    fn test_default_config_file_name() {
        if let Ok(path) = default_config_file() {
            assert!(path.ends_with("osconfig-agent/agent.toml"));
        }
    }
}
