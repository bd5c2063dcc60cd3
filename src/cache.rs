use std::collections::HashMap;

use bytes::Bytes;
use sha1::{Digest, Sha1};
use tokio::sync::RwLock;

use crate::extent::ExtentList;
use crate::timeseries::TimeRangeQuery;

/// Cached state for one cache key: the compressed list of extents the
/// sample bytes cover, plus the serialized samples themselves.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub extents: ExtentList,
    pub body: Bytes,
    pub last_unix: i64,
}

impl CacheEntry {
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    bytes: u64,
}

/// In-memory cache store. Entries are replaced whole under the write
/// lock, so a reader sees either the previous or the fully merged state,
/// never a partially compressed extent list.
#[derive(Debug, Default)]
pub struct CacheStore {
    inner: RwLock<CacheInner>,
}

impl CacheStore {
    pub fn new() -> CacheStore {
        CacheStore::default()
    }

    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let inner = self.inner.read().await;
        inner.map.get(key).cloned()
    }

    pub async fn put(&self, key: String, entry: CacheEntry) {
        let mut inner = self.inner.write().await;
        let added = entry.size();
        if let Some(old) = inner.map.insert(key, entry) {
            inner.bytes = inner.bytes.saturating_sub(old.size());
        }
        inner.bytes = inner.bytes.saturating_add(added);
    }

    pub async fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write().await;
        if let Some(old) = inner.map.remove(key) {
            inner.bytes = inner.bytes.saturating_sub(old.size());
            return true;
        }
        false
    }

    pub async fn object_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.map.len()
    }

    pub async fn total_bytes(&self) -> u64 {
        let inner = self.inner.read().await;
        inner.bytes
    }
}

/// Cache keys partition cached data by origin identity, statement and
/// step, so the same statement at a different resolution never collides.
pub fn cache_key(origin: &str, trq: &TimeRangeQuery) -> String {
    let mut hasher = Sha1::new();
    hasher.update(origin.as_bytes());
    hasher.update(b".");
    hasher.update(trq.statement.as_bytes());
    hasher.update(b".");
    hasher.update(trq.step.as_secs().to_string().as_bytes());
    hex::encode(hasher.finalize())
}
