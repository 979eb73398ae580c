//! slurmrest response cache.
//!
//! Opaque byte payloads keyed by operation + parameters, with per-operation
//! TTLs, LRU eviction at capacity and an optional background sweep. Expiry is
//! always checked on read, so a hit is never stale whatever the sweep cadence.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::counter;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use slurmrest_core::{Clock, SystemClock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod config;
pub mod key;

pub use config::{CacheConfig, CacheProfile, Operation};
pub use key::generate_key;

/// Upper bound on any item lifetime; longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

struct Item {
    value: Bytes,
    op: Operation,
    created: Instant,
    expires: Instant,
    /// Nanoseconds since the cache epoch.
    last_access: AtomicU64,
    /// Global access sequence; breaks ties between equal access times.
    access_seq: AtomicU64,
    hits: AtomicU64,
}

impl Item {
    fn expired(&self, now: Instant) -> bool { now > self.expires }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletions: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    clears: AtomicU64,
    pattern_invalidations: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletions: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub clears: u64,
    pub pattern_invalidations: u64,
    pub current_items: usize,
    pub total_bytes: usize,
    pub max_size: usize,
    /// hits / (hits + misses); zero before the first lookup.
    pub hit_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    pub key: String,
    pub operation: Operation,
    pub size: usize,
    pub age_ms: u64,
    pub ttl_remaining_ms: u64,
    pub hits: u64,
}

struct Inner {
    cfg: CacheConfig,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    items: RwLock<FxHashMap<String, Item>>,
    seq: AtomicU64,
    counters: Counters,
    sweeper: Mutex<Option<CancellationToken>>,
}

/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache").field("items", &self.len()).field("max_size", &self.inner.cfg.max_size).finish()
    }
}

impl ResponseCache {
    pub fn new(cfg: CacheConfig) -> Self { Self::with_clock(cfg, Arc::new(SystemClock)) }

    pub fn with_clock(cfg: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            inner: Arc::new(Inner {
                cfg,
                clock,
                epoch,
                items: RwLock::new(FxHashMap::default()),
                seq: AtomicU64::new(0),
                counters: Counters::default(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig { &self.inner.cfg }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<String, Item>> {
        self.inner.items.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<String, Item>> {
        self.inner.items.write().unwrap_or_else(|p| p.into_inner())
    }

    fn since_epoch(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.inner.epoch).as_nanos()).unwrap_or(u64::MAX)
    }

    fn touch(&self, item: &Item, now: Instant) {
        item.last_access.store(self.since_epoch(now), Ordering::Relaxed);
        item.access_seq.store(self.inner.seq.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        item.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self, key: &str) -> Option<Bytes> {
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("cache_misses_total", 1u64);
        debug!(key = %key, "cache: miss");
        None
    }

    /// Lookup by derived key. `None` is a miss, including expired entries.
    pub fn get_key(&self, key: &str) -> Option<Bytes> {
        let now = self.inner.clock.now();
        {
            let items = self.read();
            match items.get(key) {
                None => return self.miss(key),
                Some(item) if !item.expired(now) => {
                    self.touch(item, now);
                    self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    counter!("cache_hits_total", 1u64);
                    return Some(item.value.clone());
                }
                Some(_) => {}
            }
        }
        // expired: drop it unless someone replaced it meanwhile
        let mut items = self.write();
        if items.get(key).map(|i| i.expired(now)).unwrap_or(false) {
            items.remove(key);
            self.inner.counters.expirations.fetch_add(1, Ordering::Relaxed);
        }
        drop(items);
        self.miss(key)
    }

    pub fn get<P: Serialize + ?Sized>(&self, op: Operation, params: &P) -> Option<Bytes> {
        match generate_key(op, params) {
            Ok(key) => self.get_key(&key),
            Err(e) => {
                warn!(op = %op, error = %e, "cache: key derivation failed");
                self.miss(op.as_str())
            }
        }
    }

    /// Typed lookup; a payload that no longer decodes counts as a miss.
    pub fn get_json<P: Serialize + ?Sized, T: DeserializeOwned>(&self, op: Operation, params: &P) -> Option<T> {
        let bytes = self.get(op, params)?;
        match serde_json::from_slice(&bytes) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(op = %op, error = %e, "cache: stored payload does not decode");
                None
            }
        }
    }

    pub fn set<P: Serialize + ?Sized>(&self, op: Operation, params: &P, value: Bytes) {
        let ttl = self.inner.cfg.ttl_for(op);
        self.set_with_ttl(op, params, value, ttl)
    }

    pub fn set_json<P: Serialize + ?Sized, T: Serialize + ?Sized>(&self, op: Operation, params: &P, value: &T) {
        match serde_json::to_vec(value) {
            Ok(buf) => self.set(op, params, Bytes::from(buf)),
            Err(e) => warn!(op = %op, error = %e, "cache: value does not serialize"),
        }
    }

    pub fn set_with_ttl<P: Serialize + ?Sized>(&self, op: Operation, params: &P, value: Bytes, ttl: Duration) {
        let key = match generate_key(op, params) {
            Ok(k) => k,
            Err(e) => {
                warn!(op = %op, error = %e, "cache: key derivation failed");
                return;
            }
        };
        self.set_key(key, op, value, ttl);
    }

    fn set_key(&self, key: String, op: Operation, value: Bytes, ttl: Duration) {
        if self.inner.cfg.max_size == 0 {
            return;
        }
        let now = self.inner.clock.now();
        let expires = now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now);
        let item = Item {
            value,
            op,
            created: now,
            expires,
            last_access: AtomicU64::new(self.since_epoch(now)),
            access_seq: AtomicU64::new(self.inner.seq.fetch_add(1, Ordering::Relaxed)),
            hits: AtomicU64::new(0),
        };
        let mut items = self.write();
        if !items.contains_key(&key) {
            while items.len() >= self.inner.cfg.max_size {
                if !self.evict_one(&mut items) {
                    break;
                }
            }
        }
        items.insert(key, item);
        drop(items);
        self.inner.counters.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove the least recently accessed item. Linear scan.
    fn evict_one(&self, items: &mut FxHashMap<String, Item>) -> bool {
        let victim = items
            .iter()
            .min_by_key(|(_, it)| (it.last_access.load(Ordering::Relaxed), it.access_seq.load(Ordering::Relaxed)))
            .map(|(k, _)| k.clone());
        match victim {
            Some(k) => {
                items.remove(&k);
                self.inner.counters.evictions.fetch_add(1, Ordering::Relaxed);
                counter!("cache_evictions_total", 1u64);
                debug!(key = %k, "cache: evicted");
                true
            }
            None => false,
        }
    }

    pub fn delete<P: Serialize + ?Sized>(&self, op: Operation, params: &P) -> bool {
        match generate_key(op, params) {
            Ok(key) => self.delete_key(&key),
            Err(_) => false,
        }
    }

    pub fn delete_key(&self, key: &str) -> bool {
        let removed = self.write().remove(key).is_some();
        if removed {
            self.inner.counters.deletions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// `*` matches everything, a trailing `*` is a prefix match, anything else
    /// is a literal key or, failing that, a key prefix. Returns removed count.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut items = self.write();
        let before = items.len();
        if pattern == "*" {
            items.clear();
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            items.retain(|k, _| !k.starts_with(prefix));
        } else if items.remove(pattern).is_none() {
            items.retain(|k, _| !k.starts_with(pattern));
        }
        let removed = before - items.len();
        drop(items);
        self.inner.counters.pattern_invalidations.fetch_add(1, Ordering::Relaxed);
        if removed > 0 {
            debug!(pattern = %pattern, removed, "cache: invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.write().clear();
        self.inner.counters.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every expired item now. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.inner.clock.now();
        let mut items = self.write();
        let before = items.len();
        items.retain(|_, it| !it.expired(now));
        let removed = before - items.len();
        drop(items);
        if removed > 0 {
            self.inner.counters.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            counter!("cache_expirations_total", removed as u64);
        }
        removed
    }

    pub fn len(&self) -> usize { self.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn stats(&self) -> CacheStats {
        let (current_items, total_bytes) = {
            let items = self.read();
            (items.len(), items.values().map(|i| i.value.len()).sum())
        };
        let c = &self.inner.counters;
        let hits = c.hits.load(Ordering::Relaxed);
        let misses = c.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            sets: c.sets.load(Ordering::Relaxed),
            deletions: c.deletions.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            expirations: c.expirations.load(Ordering::Relaxed),
            clears: c.clears.load(Ordering::Relaxed),
            pattern_invalidations: c.pattern_invalidations.load(Ordering::Relaxed),
            current_items,
            total_bytes,
            max_size: self.inner.cfg.max_size,
            hit_ratio: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
        }
    }

    /// Per-item view, sorted by key.
    pub fn detailed_stats(&self) -> Vec<ItemStats> {
        let now = self.inner.clock.now();
        let items = self.read();
        let mut out: Vec<ItemStats> = items
            .iter()
            .map(|(k, it)| ItemStats {
                key: k.clone(),
                operation: it.op,
                size: it.value.len(),
                age_ms: now.saturating_duration_since(it.created).as_millis() as u64,
                ttl_remaining_ms: it.expires.saturating_duration_since(now).as_millis() as u64,
                hits: it.hits.load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Spawn the periodic sweep on the current tokio runtime. Returns false
    /// when there is no runtime, the interval is zero, or it already runs.
    pub fn start_sweeper(&self) -> bool {
        let interval = self.inner.cfg.cleanup_interval;
        if interval.is_zero() {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("cache: no runtime, sweep not started");
            return false;
        };
        let mut slot = self.inner.sweeper.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return false;
        }
        let cancel = CancellationToken::new();
        *slot = Some(cancel.clone());
        drop(slot);
        let weak = Arc::downgrade(&self.inner);
        handle.spawn(run_sweeper(weak, interval, cancel));
        info!(interval_secs = interval.as_secs(), "cache: sweep started");
        true
    }

    /// Stop the background sweep. The cache stays usable.
    pub fn close(&self) {
        if let Some(cancel) = self.inner.sweeper.lock().unwrap_or_else(|p| p.into_inner()).take() {
            cancel.cancel();
        }
    }
}

async fn run_sweeper(inner: Weak<Inner>, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let removed = ResponseCache { inner }.sweep();
                if removed > 0 {
                    debug!(removed, "cache: sweep");
                }
            }
        }
    }
    debug!("cache: sweep stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use slurmrest_core::ManualClock;

    fn cache(max: usize) -> (Arc<ManualClock>, ResponseCache) {
        let clock = Arc::new(ManualClock::new());
        let cfg = CacheConfig { max_size: max, ..CacheConfig::default() };
        (clock.clone(), ResponseCache::with_clock(cfg, clock))
    }

    #[test]
    fn ttl_boundary() {
        let (clock, c) = cache(10);
        let ttl = c.config().ttl_for(Operation::JobsList);
        c.set(Operation::JobsList, &"all", Bytes::from_static(b"[1]"));
        clock.advance(ttl - Duration::from_millis(1));
        assert_eq!(c.get(Operation::JobsList, &"all"), Some(Bytes::from_static(b"[1]")));
        clock.advance(Duration::from_millis(2));
        assert_eq!(c.get(Operation::JobsList, &"all"), None);
        let s = c.stats();
        assert_eq!((s.hits, s.misses, s.expirations, s.current_items), (1, 1, 1, 0));
    }

    #[test]
    fn evicts_least_recently_accessed() {
        let (clock, c) = cache(3);
        for id in 1u32..=3 {
            c.set(Operation::JobsGet, &id, Bytes::from(id.to_string()));
            clock.advance(Duration::from_millis(10));
        }
        // 1 is oldest by insertion but was just read
        assert!(c.get(Operation::JobsGet, &1u32).is_some());
        clock.advance(Duration::from_millis(10));
        c.set(Operation::JobsGet, &4u32, Bytes::from_static(b"4"));
        assert_eq!(c.len(), 3);
        assert!(c.get(Operation::JobsGet, &2u32).is_none());
        for id in [1u32, 3, 4] {
            assert!(c.get(Operation::JobsGet, &id).is_some(), "{id} evicted");
        }
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn access_order_breaks_same_instant_ties() {
        let (_clock, c) = cache(2);
        c.set(Operation::NodesGet, &"a", Bytes::from_static(b"a"));
        c.set(Operation::NodesGet, &"b", Bytes::from_static(b"b"));
        assert!(c.get(Operation::NodesGet, &"a").is_some());
        c.set(Operation::NodesGet, &"c", Bytes::from_static(b"c"));
        assert!(c.get(Operation::NodesGet, &"b").is_none());
        assert!(c.get(Operation::NodesGet, &"a").is_some());
    }

    #[test]
    fn overwrite_at_capacity_does_not_evict() {
        let (_clock, c) = cache(2);
        c.set(Operation::NodesGet, &"a", Bytes::from_static(b"1"));
        c.set(Operation::NodesGet, &"b", Bytes::from_static(b"1"));
        c.set(Operation::NodesGet, &"a", Bytes::from_static(b"2"));
        assert_eq!(c.len(), 2);
        assert_eq!(c.stats().evictions, 0);
        assert_eq!(c.get(Operation::NodesGet, &"a"), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn pattern_invalidation() {
        let (_clock, c) = cache(100);
        c.set(Operation::JobsList, &"x", Bytes::from_static(b"1"));
        c.set(Operation::JobsGet, &1u32, Bytes::from_static(b"1"));
        c.set(Operation::NodesList, &"x", Bytes::from_static(b"1"));
        assert_eq!(c.invalidate_pattern("jobs.*"), 2);
        assert_eq!(c.len(), 1);
        let key = generate_key(Operation::NodesList, &"x").unwrap();
        assert_eq!(c.invalidate_pattern(&key), 1);
        c.set(Operation::PartitionsList, &"x", Bytes::from_static(b"1"));
        assert_eq!(c.invalidate_pattern("partitions."), 1);
        c.set(Operation::PartitionsList, &"y", Bytes::from_static(b"1"));
        assert_eq!(c.invalidate_pattern("*"), 1);
        assert_eq!(c.stats().pattern_invalidations, 4);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let (clock, c) = cache(100);
        c.set(Operation::JobsList, &"short", Bytes::from_static(b"1"));
        c.set(Operation::PartitionsList, &"long", Bytes::from_static(b"1"));
        clock.advance(Duration::from_secs(31));
        assert_eq!(c.sweep(), 1);
        assert!(c.get(Operation::PartitionsList, &"long").is_some());
    }

    #[test]
    fn detailed_stats_report_ttl_and_hits() {
        let (clock, c) = cache(100);
        c.set(Operation::JobsGet, &7u32, Bytes::from_static(b"abcd"));
        clock.advance(Duration::from_secs(10));
        c.get(Operation::JobsGet, &7u32);
        let d = c.detailed_stats();
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].size, 4);
        assert_eq!(d[0].hits, 1);
        assert_eq!(d[0].age_ms, 10_000);
        assert_eq!(d[0].ttl_remaining_ms, 50_000);
        assert_eq!(c.stats().total_bytes, 4);
    }

    #[test]
    fn huge_ttl_is_clamped() {
        let (clock, c) = cache(10);
        c.set_with_ttl(Operation::AccountsList, &"x", Bytes::from_static(b"1"), Duration::MAX);
        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert!(c.get(Operation::AccountsList, &"x").is_some());

        let cfg = CacheConfig { default_ttl: Duration::from_secs(u64::MAX), ..CacheConfig::default() };
        let c = ResponseCache::with_clock(cfg, clock.clone());
        c.set(Operation::AccountsList, &"y", Bytes::from_static(b"2"));
        let d = c.detailed_stats();
        assert!(d[0].ttl_remaining_ms <= MAX_TTL.as_millis() as u64);
        assert!(c.get(Operation::AccountsList, &"y").is_some());
    }

    #[test]
    fn no_runtime_no_sweeper() {
        let (_clock, c) = cache(10);
        assert!(!c.start_sweeper());
    }
}
