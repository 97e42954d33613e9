//! In-memory fetcher for tests.

use crate::error::{Error, Result};
use crate::{Fetched, Fetcher, RemoteSource};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Objects {
    data: HashMap<RemoteSource, Vec<u8>>,
    fetches: Vec<RemoteSource>,
}

/// Fetcher serving registered objects from memory and counting requests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    objects: Arc<Mutex<Objects>>,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bytes served for `source`.
    pub fn insert(&self, source: RemoteSource, data: impl Into<Vec<u8>>) {
        self.lock().data.insert(source, data.into());
    }

    /// Number of fetches issued for `source`.
    pub fn fetch_count(&self, source: &RemoteSource) -> usize {
        self.lock().fetches.iter().filter(|s| *s == source).count()
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, source: &RemoteSource) -> Result<Fetched> {
        let mut objects = self.lock();
        objects.fetches.push(source.clone());
        let data = objects
            .data
            .get(source)
            .cloned()
            .ok_or_else(|| Error::NotFound(source.to_string()))?;
        let size = Some(data.len() as u64);
        Ok(Fetched {
            reader: Box::new(Cursor::new(data)),
            size,
        })
    }
}
