//! Shared capabilities and caches for a reconciliation cycle.
//!
//! An [`AgentContext`] is built once and shared behind an `Arc` by every
//! resource in the cycle, so all of them see the same installed-state and
//! package-info caches.

use crate::cache::{InstalledCache, PackageInfoCache};
use crate::config::AgentPaths;
use fetch::{Fetcher, HttpFetcher};
use runner::{CommandRunner, SystemRunner};
use std::sync::Arc;

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux and other Unix systems
    Unix,
    /// Windows
    Windows,
}

impl Platform {
    /// Platform the agent was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// Whether this is Windows.
    pub fn is_windows(self) -> bool {
        self == Self::Windows
    }
}

/// Everything a resource needs from the outside world.
pub struct AgentContext {
    /// Runs external commands
    pub runner: Arc<dyn CommandRunner>,
    /// Opens remote objects
    pub fetcher: Arc<dyn Fetcher>,
    /// Host paths
    pub paths: AgentPaths,
    /// Host platform
    pub platform: Platform,
    /// Installed package names per manager
    pub installed: InstalledCache,
    /// Inspected package metadata
    pub package_info: PackageInfoCache,
}

impl AgentContext {
    /// Context with the given capabilities on the current platform.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn Fetcher>,
        paths: AgentPaths,
    ) -> Self {
        let package_info = PackageInfoCache::new(paths.package_info_cache_file());
        Self {
            runner,
            fetcher,
            paths,
            platform: Platform::current(),
            installed: InstalledCache::new(),
            package_info,
        }
    }

    /// Context backed by real processes and HTTP.
    pub fn system(paths: AgentPaths) -> Self {
        Self::new(
            Arc::new(SystemRunner::new()),
            Arc::new(HttpFetcher::new()),
            paths,
        )
    }

    /// Override the platform (for exercising Windows paths in tests).
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("paths", &self.paths)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}
