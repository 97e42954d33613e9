//! Persistent cache of inspected package metadata.
//!
//! Inspecting a .deb, .rpm or .msi costs a download and a subprocess, so the
//! result is remembered on disk keyed by a fingerprint of the source
//! descriptor. Entries not looked up for [`PACKAGE_INFO_MAX_AGE_DAYS`] are
//! dropped when the cache is saved.
//!
//! The store is loaded lazily on first access. Saving writes the file
//! atomically and marks the store unloaded, so the next access rereads what
//! other agents may have written in between.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Days an entry survives without being looked up.
pub const PACKAGE_INFO_MAX_AGE_DAYS: i64 = 7;

/// Metadata recovered from a package artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name (MSI: product name)
    pub name: String,
    /// Architecture
    #[serde(default)]
    pub arch: String,
    /// Version
    #[serde(default)]
    pub version: String,
    /// MSI product code
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    info: PackageInfo,
    last_lookup: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    entries: BTreeMap<String, CacheEntry>,
    loaded: bool,
    dirty: bool,
}

/// Disk-backed package metadata cache.
#[derive(Debug)]
pub struct PackageInfoCache {
    path: PathBuf,
    max_age: TimeDelta,
    store: Mutex<Store>,
}

/// Cache key for a source descriptor: base64 of its JSON serialization.
pub fn key_for<T: Serialize + ?Sized>(descriptor: &T) -> Result<String> {
    Ok(STANDARD.encode(serde_json::to_vec(descriptor)?))
}

impl PackageInfoCache {
    /// Cache persisted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: TimeDelta::days(PACKAGE_INFO_MAX_AGE_DAYS),
            store: Mutex::new(Store::default()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up `key`, refreshing its timestamp on a hit.
    pub fn get(&self, key: &str) -> Result<Option<PackageInfo>> {
        self.get_at(key, Utc::now())
    }

    /// [`get`](Self::get) with an explicit clock.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<PackageInfo>> {
        let mut store = self.lock();
        self.ensure_loaded(&mut store)?;

        let Some(entry) = store.entries.get_mut(key) else {
            log::debug!("Package info cache miss");
            return Ok(None);
        };
        entry.last_lookup = now;
        let info = entry.info.clone();
        store.dirty = true;
        log::debug!("Package info cache hit for {}", info.name);
        Ok(Some(info))
    }

    /// Record `info` under `key`.
    pub fn insert(&self, key: String, info: PackageInfo) -> Result<()> {
        self.insert_at(key, info, Utc::now())
    }

    /// [`insert`](Self::insert) with an explicit clock.
    pub fn insert_at(&self, key: String, info: PackageInfo, now: DateTime<Utc>) -> Result<()> {
        let mut store = self.lock();
        self.ensure_loaded(&mut store)?;
        store.entries.insert(
            key,
            CacheEntry {
                info,
                last_lookup: now,
            },
        );
        store.dirty = true;
        Ok(())
    }

    /// Persist pending changes, dropping expired entries.
    pub fn save(&self) -> Result<()> {
        self.save_at(Utc::now())
    }

    /// [`save`](Self::save) with an explicit clock.
    pub fn save_at(&self, now: DateTime<Utc>) -> Result<()> {
        let mut store = self.lock();
        if !store.dirty {
            store.loaded = false;
            store.entries.clear();
            return Ok(());
        }

        let max_age = self.max_age;
        let before = store.entries.len();
        store
            .entries
            .retain(|_, entry| now.signed_duration_since(entry.last_lookup) < max_age);
        let purged = before - store.entries.len();
        if purged > 0 {
            log::debug!("Purged {} expired package info entries", purged);
        }

        let data = serde_json::to_vec(&store.entries)?;
        fetch::atomic_write(&self.path, &data, Some(0o644))?;

        store.entries.clear();
        store.loaded = false;
        store.dirty = false;
        Ok(())
    }

    /// Drop in-memory state so the next access rereads the file.
    ///
    /// Unsaved changes are discarded.
    pub fn reload(&self) {
        let mut store = self.lock();
        store.entries.clear();
        store.loaded = false;
        store.dirty = false;
    }

    fn ensure_loaded(&self, store: &mut Store) -> Result<()> {
        if store.loaded {
            return Ok(());
        }

        store.entries = match std::fs::read(&self.path) {
            Ok(data) => serde_json::from_slice(&data).unwrap_or_else(|e| {
                log::warn!(
                    "Ignoring unreadable package info cache {}: {}",
                    self.path.display(),
                    e
                );
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::io(&self.path, e)),
        };
        store.loaded = true;
        store.dirty = false;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| {
            log::warn!("Package info cache lock was poisoned");
            PoisonError::into_inner(poisoned)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn info(name: &str) -> PackageInfo {
        PackageInfo {
            name: name.into(),
            arch: "amd64".into(),
            version: "1.0".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_key_is_stable_and_distinct() {
        let a = key_for(&serde_json::json!({"local_path": "/tmp/a.deb"})).unwrap();
        let b = key_for(&serde_json::json!({"local_path": "/tmp/b.deb"})).unwrap();
        assert_eq!(a, key_for(&serde_json::json!({"local_path": "/tmp/a.deb"})).unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_insert_save_reload() {
        let dir = tempdir().unwrap();
        let cache = PackageInfoCache::new(dir.path().join("cache.json"));

        assert_eq!(cache.get("k").unwrap(), None);
        cache.insert("k".into(), info("foo")).unwrap();
        cache.save().unwrap();
        assert!(cache.path().exists());

        let other = PackageInfoCache::new(dir.path().join("cache.json"));
        assert_eq!(other.get("k").unwrap(), Some(info("foo")));
    }

    #[test]
    fn test_entries_expire_after_seven_days() {
        let dir = tempdir().unwrap();
        let cache = PackageInfoCache::new(dir.path().join("cache.json"));
        let now = Utc::now();

        cache
            .insert_at("old".into(), info("old"), now - TimeDelta::days(8))
            .unwrap();
        cache
            .insert_at("recent".into(), info("recent"), now - TimeDelta::days(6))
            .unwrap();
        cache.save_at(now).unwrap();
        cache.reload();

        assert_eq!(cache.get_at("old", now).unwrap(), None);
        assert_eq!(cache.get_at("recent", now).unwrap(), Some(info("recent")));
    }

    #[test]
    fn test_lookup_refreshes_timestamp() {
        let dir = tempdir().unwrap();
        let cache = PackageInfoCache::new(dir.path().join("cache.json"));
        let start = Utc::now() - TimeDelta::days(10);

        cache.insert_at("k".into(), info("foo"), start).unwrap();
        cache.save_at(start).unwrap();

        // Looked up 5 days later, so it survives a save 10 days after insertion.
        assert!(cache.get_at("k", start + TimeDelta::days(5)).unwrap().is_some());
        cache.save_at(start + TimeDelta::days(10)).unwrap();
        assert!(cache.get_at("k", start + TimeDelta::days(10)).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = PackageInfoCache::new(&path);
        assert_eq!(cache.get("k").unwrap(), None);
        cache.insert("k".into(), info("foo")).unwrap();
        cache.save().unwrap();

        cache.reload();
        assert_eq!(cache.get("k").unwrap(), Some(info("foo")));
    }

    #[test]
    fn test_reload_discards_unsaved_changes() {
        let dir = tempdir().unwrap();
        let cache = PackageInfoCache::new(dir.path().join("cache.json"));
        cache.insert("k".into(), info("foo")).unwrap();
        cache.reload();
        assert_eq!(cache.get("k").unwrap(), None);
    }
}
