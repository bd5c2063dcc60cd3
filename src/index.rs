use std::sync::Mutex;
use std::time::Duration;

use indexmap::IndexMap;

use crate::config;
use crate::constants;

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub reap_interval: Duration,
    pub max_size_bytes: u64,
    pub max_size_backoff_bytes: u64,
    /// 0 means no object-count limit.
    pub max_size_objects: usize,
    pub max_size_backoff_objects: usize,
}

impl Default for IndexOptions {
    fn default() -> IndexOptions {
        IndexOptions {
            reap_interval: Duration::from_secs(constants::DEFAULT_REAP_INTERVAL_SECS),
            max_size_bytes: constants::DEFAULT_MAX_SIZE_BYTES,
            max_size_backoff_bytes: constants::DEFAULT_MAX_SIZE_BACKOFF_BYTES,
            max_size_objects: 0,
            max_size_backoff_objects: 0,
        }
    }
}

impl IndexOptions {
    pub fn from_config(cfg: &config::Index) -> IndexOptions {
        let defaults = IndexOptions::default();
        IndexOptions {
            reap_interval: if cfg.reap_interval.is_zero() {
                defaults.reap_interval
            } else {
                cfg.reap_interval
            },
            max_size_bytes: if cfg.max_size_bytes > 0 {
                cfg.max_size_bytes
            } else {
                defaults.max_size_bytes
            },
            max_size_backoff_bytes: if cfg.max_size_backoff_bytes > 0 {
                cfg.max_size_backoff_bytes
            } else {
                defaults.max_size_backoff_bytes
            },
            max_size_objects: cfg.max_size_objects,
            max_size_backoff_objects: cfg.max_size_backoff_objects,
        }
    }
}

#[derive(Default)]
struct IndexInner {
    order: IndexMap<String, u64>,
    bytes: u64,
}

/// Recency and size tracking for the cache store. Insertion order in the
/// map is the LRU order: a touch re-inserts the key at the back, and
/// eviction pops from the front until usage backs off below threshold.
pub struct CacheIndex {
    inner: Mutex<IndexInner>,
    opts: IndexOptions,
}

impl CacheIndex {
    pub fn new(opts: IndexOptions) -> CacheIndex {
        CacheIndex {
            inner: Mutex::new(IndexInner::default()),
            opts,
        }
    }

    pub fn reap_interval(&self) -> Duration {
        self.opts.reap_interval
    }

    /// Record an access to `key` at `size` bytes and return any keys
    /// evicted to stay under the configured thresholds.
    pub fn touch(&self, key: &str, size: u64) -> Vec<String> {
        let mut inner = self.inner.lock().expect("cache index");
        if let Some(old) = inner.order.shift_remove(key) {
            inner.bytes = inner.bytes.saturating_sub(old);
        }
        inner.order.insert(key.to_string(), size);
        inner.bytes = inner.bytes.saturating_add(size);
        self.evict_overflow(&mut inner)
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock().expect("cache index");
        if let Some(old) = inner.order.shift_remove(key) {
            inner.bytes = inner.bytes.saturating_sub(old);
        }
    }

    /// Periodic pass: enforce the thresholds without recording an access.
    pub fn reap(&self) -> Vec<String> {
        let mut inner = self.inner.lock().expect("cache index");
        self.evict_overflow(&mut inner)
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().expect("cache index").bytes
    }

    pub fn object_count(&self) -> usize {
        self.inner.lock().expect("cache index").order.len()
    }

    fn evict_overflow(&self, inner: &mut IndexInner) -> Vec<String> {
        let mut evicted = Vec::new();
        if self.opts.max_size_bytes > 0 && inner.bytes > self.opts.max_size_bytes {
            let target = self
                .opts
                .max_size_bytes
                .saturating_sub(self.opts.max_size_backoff_bytes);
            while inner.bytes > target && !inner.order.is_empty() {
                if let Some((key, size)) = inner.order.shift_remove_index(0) {
                    inner.bytes = inner.bytes.saturating_sub(size);
                    evicted.push(key);
                } else {
                    break;
                }
            }
        }
        if self.opts.max_size_objects > 0 && inner.order.len() > self.opts.max_size_objects {
            let target = self
                .opts
                .max_size_objects
                .saturating_sub(self.opts.max_size_backoff_objects)
                .max(1);
            while inner.order.len() > target {
                if let Some((key, size)) = inner.order.shift_remove_index(0) {
                    inner.bytes = inner.bytes.saturating_sub(size);
                    evicted.push(key);
                } else {
                    break;
                }
            }
        }
        evicted
    }
}
