//! In-memory cache of installed package names, per package manager.
//!
//! Each manager has its own slot behind its own mutex. A refresh holds the
//! slot's lock while the listing command runs, so concurrent checks against
//! a stale slot list only once. Slots sharing a package database (dpkg for
//! apt and deb; rpm for yum, zypper and rpm) are invalidated together.

use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// How long a listing stays fresh.
pub const INSTALLED_TTL: Duration = Duration::from_secs(3 * 60);

/// Package manager families with a shared installed-state listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Manager {
    /// apt-get
    Apt,
    /// dpkg
    Deb,
    /// googet
    GooGet,
    /// yum
    Yum,
    /// zypper
    Zypper,
    /// rpm
    Rpm,
}

impl Manager {
    /// Every manager with a cache slot.
    pub const ALL: [Manager; 6] = [
        Manager::Apt,
        Manager::Deb,
        Manager::GooGet,
        Manager::Yum,
        Manager::Zypper,
        Manager::Rpm,
    ];

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Deb => "deb",
            Self::GooGet => "googet",
            Self::Yum => "yum",
            Self::Zypper => "zypper",
            Self::Rpm => "rpm",
        }
    }

    /// Managers reading the same package database as `self` (including itself).
    pub fn sharing_database(self) -> &'static [Manager] {
        match self {
            Self::Apt | Self::Deb => &[Manager::Apt, Manager::Deb],
            Self::Yum | Self::Zypper | Self::Rpm => &[Manager::Yum, Manager::Zypper, Manager::Rpm],
            Self::GooGet => &[Manager::GooGet],
        }
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
struct Listing {
    names: HashSet<String>,
    refreshed_at: Instant,
}

/// TTL cache of installed package names.
#[derive(Debug)]
pub struct InstalledCache {
    ttl: Duration,
    slots: HashMap<Manager, Mutex<Option<Listing>>>,
}

impl Default for InstalledCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InstalledCache {
    /// Create an empty cache with the standard TTL.
    pub fn new() -> Self {
        Self::with_ttl(INSTALLED_TTL)
    }

    /// Create an empty cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Manager::ALL.iter().map(|m| (*m, Mutex::new(None))).collect(),
        }
    }

    /// Whether `name` is installed according to `manager`'s listing.
    ///
    /// `list` runs only when the slot is empty or older than the TTL.
    pub fn is_installed<F>(&self, manager: Manager, name: &str, list: F) -> Result<bool>
    where
        F: FnOnce() -> Result<HashSet<String>>,
    {
        self.is_installed_at(manager, name, Instant::now(), list)
    }

    /// [`is_installed`](Self::is_installed) evaluated at `now`.
    pub fn is_installed_at<F>(
        &self,
        manager: Manager,
        name: &str,
        now: Instant,
        list: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Result<HashSet<String>>,
    {
        let mut slot = self.lock(manager);
        let fresh = slot
            .as_ref()
            .is_some_and(|l| now.saturating_duration_since(l.refreshed_at) < self.ttl);

        if !fresh {
            log::debug!("Refreshing installed {} packages", manager);
            let names = list()?;
            *slot = Some(Listing {
                names,
                refreshed_at: now,
            });
        } else {
            log::debug!("Using cached installed {} packages", manager);
        }

        Ok(slot.as_ref().is_some_and(|l| l.names.contains(name)))
    }

    /// Store a listing for `manager` taken at `now`.
    pub fn populate_at(&self, manager: Manager, names: HashSet<String>, now: Instant) {
        *self.lock(manager) = Some(Listing {
            names,
            refreshed_at: now,
        });
    }

    /// Whether `manager` holds a listing younger than the TTL at `now`.
    pub fn is_fresh_at(&self, manager: Manager, now: Instant) -> bool {
        self.lock(manager)
            .as_ref()
            .is_some_and(|l| now.saturating_duration_since(l.refreshed_at) < self.ttl)
    }

    /// Drop the listing of `manager` and of every manager sharing its database.
    pub fn invalidate(&self, manager: Manager) {
        for sibling in manager.sharing_database() {
            *self.lock(*sibling) = None;
        }
    }

    fn lock(&self, manager: Manager) -> MutexGuard<'_, Option<Listing>> {
        // Every manager gets a slot in the constructor.
        let slot = &self.slots[&manager];
        slot.lock().unwrap_or_else(|poisoned| {
            log::warn!("Installed {} cache lock was poisoned", manager);
            PoisonError::into_inner(poisoned)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_lists_once_within_ttl() {
        let cache = InstalledCache::new();
        let calls = Cell::new(0);
        let list = || {
            calls.set(calls.get() + 1);
            Ok(names(&["curl"]))
        };

        let start = Instant::now();
        assert!(cache.is_installed_at(Manager::Apt, "curl", start, list).unwrap());
        assert!(
            !cache
                .is_installed_at(Manager::Apt, "vim", start + Duration::from_secs(60), list)
                .unwrap()
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_refreshes_after_ttl() {
        let cache = InstalledCache::new();
        let start = Instant::now();
        cache.populate_at(Manager::Yum, names(&["vim"]), start);

        let calls = Cell::new(0);
        let installed = cache
            .is_installed_at(Manager::Yum, "vim", start + INSTALLED_TTL, || {
                calls.set(calls.get() + 1);
                Ok(HashSet::new())
            })
            .unwrap();

        assert!(!installed);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_freshness_boundary() {
        let cache = InstalledCache::new();
        let start = Instant::now();
        cache.populate_at(Manager::GooGet, HashSet::new(), start);
        assert!(cache.is_fresh_at(Manager::GooGet, start + INSTALLED_TTL - Duration::from_secs(1)));
        assert!(!cache.is_fresh_at(Manager::GooGet, start + INSTALLED_TTL));
    }

    #[test]
    fn test_invalidate_clears_shared_database() {
        let cache = InstalledCache::new();
        let now = Instant::now();
        for manager in Manager::ALL {
            cache.populate_at(manager, HashSet::new(), now);
        }

        cache.invalidate(Manager::Rpm);

        assert!(!cache.is_fresh_at(Manager::Rpm, now));
        assert!(!cache.is_fresh_at(Manager::Yum, now));
        assert!(!cache.is_fresh_at(Manager::Zypper, now));
        assert!(cache.is_fresh_at(Manager::Apt, now));
        assert!(cache.is_fresh_at(Manager::Deb, now));
        assert!(cache.is_fresh_at(Manager::GooGet, now));
    }

    #[test]
    fn test_listing_error_leaves_slot_empty() {
        let cache = InstalledCache::new();
        let now = Instant::now();
        let err = cache.is_installed_at(Manager::Deb, "curl", now, || {
            Err(crate::Error::invalid("boom"))
        });
        assert!(err.is_err());
        assert!(!cache.is_fresh_at(Manager::Deb, now));
    }
}
