use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;

use crate::cache::{cache_key, CacheEntry, CacheStore};
use crate::config;
use crate::constants;
use crate::extent::{Extent, ExtentList};
use crate::index::CacheIndex;
use crate::metrics;
use crate::origin::OriginClient;
use crate::timeseries::{self, Sample, TimeRangeQuery};

pub mod keylock;

use keylock::KeyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Miss,
    Hit,
    PartHit,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Miss => "MISS",
            CacheStatus::Hit => "HIT",
            CacheStatus::PartHit => "PART_HIT",
        }
    }
}

/// The assembled answer for one query. `complete` is false when at least
/// one missing extent could not be fetched; whatever was available is
/// still returned.
#[derive(Debug, Clone)]
pub struct SeriesResponse {
    pub samples: Vec<Sample>,
    pub status: CacheStatus,
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct OriginOptions {
    /// Origin identity; part of every cache key.
    pub name: String,
    pub timeout: Duration,
    pub fast_forward_disable: bool,
    pub fast_forward_ttl: Duration,
    pub backfill_tolerance: Duration,
    /// Maximum samples retained per cache entry; 0 means unlimited.
    pub timeseries_retention: usize,
}

impl Default for OriginOptions {
    fn default() -> OriginOptions {
        OriginOptions {
            name: "default".to_string(),
            timeout: Duration::from_secs(constants::DEFAULT_ORIGIN_TIMEOUT_SECS),
            fast_forward_disable: false,
            fast_forward_ttl: Duration::from_secs(constants::DEFAULT_FAST_FORWARD_TTL_SECS),
            backfill_tolerance: Duration::ZERO,
            timeseries_retention: constants::DEFAULT_TIMESERIES_RETENTION,
        }
    }
}

impl OriginOptions {
    pub fn from_config(cfg: &config::Origin) -> OriginOptions {
        let defaults = OriginOptions::default();
        OriginOptions {
            name: if cfg.name.trim().is_empty() {
                defaults.name
            } else {
                cfg.name.clone()
            },
            timeout: if cfg.timeout.is_zero() {
                defaults.timeout
            } else {
                cfg.timeout
            },
            fast_forward_disable: cfg.fast_forward_disable,
            fast_forward_ttl: if cfg.fast_forward_ttl.is_zero() {
                defaults.fast_forward_ttl
            } else {
                cfg.fast_forward_ttl
            },
            backfill_tolerance: cfg.backfill_tolerance,
            timeseries_retention: if cfg.timeseries_retention > 0 {
                cfg.timeseries_retention
            } else {
                defaults.timeseries_retention
            },
        }
    }
}

/// Delta-driven fetch orchestrator. Composes the extent algebra with the
/// origin client, cache store and cache index collaborators handed in at
/// construction.
pub struct DeltaProxy {
    origin: Arc<dyn OriginClient>,
    store: Arc<CacheStore>,
    index: Arc<CacheIndex>,
    locks: Arc<KeyLock>,
    opts: OriginOptions,
}

impl DeltaProxy {
    pub fn new(
        origin: Arc<dyn OriginClient>,
        store: Arc<CacheStore>,
        index: Arc<CacheIndex>,
        opts: OriginOptions,
    ) -> DeltaProxy {
        DeltaProxy {
            origin,
            store,
            index,
            locks: KeyLock::new(),
            opts,
        }
    }

    /// Periodic index enforcement, independent of the per-write pass.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let index = Arc::clone(&self.index);
        let store = Arc::clone(&self.store);
        let interval = index.reap_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = index.reap();
                for key in evicted {
                    store.remove(&key).await;
                    metrics::record_eviction();
                }
                metrics::set_cache_usage(index.total_bytes(), index.object_count());
            }
        })
    }

    pub async fn fetch(&self, mut trq: TimeRangeQuery) -> Result<SeriesResponse> {
        let requested = trq.extent;
        let now = unix_now();
        trq.normalize_extent(now)?;
        if trq.extent.is_none() {
            log::debug!("empty extent after normalization for {trq}");
            return Ok(SeriesResponse {
                samples: Vec::new(),
                status: CacheStatus::Hit,
                complete: true,
            });
        }
        let step = trq.step.as_secs() as i64;
        let key = cache_key(&self.opts.name, &trq);
        let _guard = self.locks.acquire(&key).await;

        let (known, cached_samples) = self.read_entry(&key).await;

        // Cached data newer than the durable cutoff is never trusted; the
        // delta pass below re-fetches it.
        let cutoff = self.durable_cutoff(now, step);
        let mut usable = known.clone();
        usable.crop(&Extent::new(i64::MIN, cutoff));

        let deltas = trq.calculate_deltas(&usable);
        let status = if deltas.is_empty() {
            CacheStatus::Hit
        } else if usable.iter().any(|e| e.intersects(&trq.extent)) {
            CacheStatus::PartHit
        } else {
            CacheStatus::Miss
        };
        log::debug!(
            "{} for {trq}, {} missing extents",
            status.as_str(),
            deltas.len()
        );

        let (fetched, fetched_extents, complete) = self.fetch_deltas(&trq, &deltas).await;
        let merged = timeseries::merge_samples(cached_samples, fetched);

        self.persist(&key, now, cutoff, step, known, fetched_extents, &merged)
            .await;
        metrics::record_request(status.as_str());

        Ok(SeriesResponse {
            samples: timeseries::crop_samples(&merged, &requested),
            status,
            complete,
        })
    }

    async fn read_entry(&self, key: &str) -> (ExtentList, Vec<Sample>) {
        let Some(entry) = self.store.get(key).await else {
            return (ExtentList::new(), Vec::new());
        };
        match timeseries::decode_samples(&entry.body) {
            Ok(samples) => (entry.extents, samples),
            Err(err) => {
                // Undecodable entry: treat the key as a full miss.
                log::warn!("discarding cache entry {key}: {err}");
                (ExtentList::new(), Vec::new())
            }
        }
    }

    /// Fan out one fetch per missing extent, each bounded by the origin
    /// timeout, and collect the results in extent order so the merge is
    /// deterministic regardless of completion order. A failed extent is
    /// logged and skipped; the rest of the response survives.
    async fn fetch_deltas(
        &self,
        trq: &TimeRangeQuery,
        deltas: &ExtentList,
    ) -> (Vec<Sample>, ExtentList, bool) {
        let mut tasks: Vec<(Extent, JoinHandle<Result<Vec<Sample>>>)> = Vec::new();
        for missing in deltas.iter().copied() {
            let request = match trq.origin_request(missing) {
                Ok(request) => request,
                Err(err) => {
                    log::warn!("origin request for {missing} of {trq} failed: {err}");
                    continue;
                }
            };
            let origin = Arc::clone(&self.origin);
            let timeout = self.opts.timeout;
            tasks.push((
                missing,
                tokio::spawn(async move {
                    match tokio::time::timeout(timeout, origin.fetch(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow!("origin fetch timed out after {timeout:?}")),
                    }
                }),
            ));
        }

        let mut complete = tasks.len() == deltas.len();
        let mut samples = Vec::new();
        let mut fetched_extents = ExtentList::new();
        for (missing, task) in tasks {
            match task.await {
                Ok(Ok(batch)) => {
                    metrics::record_origin_fetch(true);
                    samples.extend(batch);
                    fetched_extents.push(missing);
                }
                Ok(Err(err)) => {
                    metrics::record_origin_fetch(false);
                    log::warn!("origin fetch {missing} for {trq} failed: {err}");
                    complete = false;
                }
                Err(err) => {
                    metrics::record_origin_fetch(false);
                    log::warn!("origin fetch task for {missing} aborted: {err}");
                    complete = false;
                }
            }
        }
        (samples, fetched_extents, complete)
    }

    /// Record the durable portion of the merge: fetched extents cropped
    /// to the cutoff are folded into the entry's extent list, samples
    /// past the retention cap are dropped oldest-first, and a write
    /// failure degrades to a miss on the next request for the range.
    async fn persist(
        &self,
        key: &str,
        now: i64,
        cutoff: i64,
        step: i64,
        known: ExtentList,
        mut fetched_extents: ExtentList,
        merged: &[Sample],
    ) {
        let mut extents = known;
        fetched_extents.crop(&Extent::new(i64::MIN, cutoff));
        for extent in fetched_extents.iter() {
            extents.push(*extent);
        }
        extents.compress(step);

        let mut durable = timeseries::crop_samples(merged, &Extent::new(i64::MIN, cutoff));
        let retention = self.opts.timeseries_retention;
        if retention > 0 && durable.len() > retention {
            let excess = durable.len() - retention;
            durable.drain(..excess);
            if let Some(first) = durable.first() {
                extents.crop(&Extent::new(first.timestamp, cutoff));
            }
        }

        match timeseries::encode_samples(&durable) {
            Ok(body) => {
                let entry = CacheEntry {
                    extents,
                    body,
                    last_unix: now,
                };
                let size = entry.size();
                self.store.put(key.to_string(), entry).await;
                for evicted in self.index.touch(key, size) {
                    if evicted != key {
                        self.store.remove(&evicted).await;
                        metrics::record_eviction();
                    }
                }
                metrics::set_cache_usage(self.index.total_bytes(), self.index.object_count());
            }
            Err(err) => log::warn!("cache write for {key} skipped: {err}"),
        }
    }

    /// Newest timestamp the cache is allowed to trust or record. Data
    /// within the backfill tolerance of now may still be revised by the
    /// origin, and the fast-forward window is always served fresh.
    fn durable_cutoff(&self, now: i64, step: i64) -> i64 {
        let mut window = self.opts.backfill_tolerance.as_secs() as i64;
        if !self.opts.fast_forward_disable {
            window = window.max(self.opts.fast_forward_ttl.as_secs() as i64);
        }
        (now - window).div_euclid(step) * step
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}
