//! Cache store abstraction and the in-memory reference store
//!
//! The interceptor talks to storage only through [`CacheStore`]: item
//! get/set with TTL, plus optional tag attachment and tag-based bulk
//! invalidation. Stores without tag support keep the default `tag` /
//! `invalidate_tag` implementations, which fail with
//! [`Error::TaggingUnsupported`]; the interceptor treats that failure as
//! non-fatal and writes the entry untagged.
//!
//! [`MemoryStore`] is a thread-safe reference implementation with passive
//! TTL expiry, keyed by whatever the cacheable procedure derived.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::{Error, Result};

/// Storage interface consumed by the cache interceptor.
///
/// The store is assumed to provide its own atomicity for individual
/// operations; the caching layer adds no locking of its own. Concurrent
/// misses for the same key may each execute and overwrite (last-write-wins).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a cached value. `Ok(None)` is a miss, not an error.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, expiring after `ttl`. Overwrites any
    /// existing entry.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Attach invalidation tags to the entry stored under `key`.
    async fn tag(&self, _key: &str, _tags: &BTreeSet<String>) -> Result<()> {
        Err(Error::TaggingUnsupported)
    }

    /// Remove every entry carrying `tag`; returns the number removed.
    async fn invalidate_tag(&self, _tag: &str) -> Result<u64> {
        Err(Error::TaggingUnsupported)
    }
}

/// A cached value with TTL metadata
struct StoredEntry {
    value: Value,
    cached_at: Instant,
    ttl: Duration,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now().duration_since(self.cached_at) > self.ttl
    }
}

/// Store statistics tracked atomically
#[derive(Debug, Default)]
struct StoreCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of store statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions (expired or tag-invalidated entries removed)
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
}

/// Thread-safe in-memory cache store with TTL expiry and tag invalidation.
///
/// Entries expire passively: an expired entry is evicted when `get` touches
/// it, or when [`MemoryStore::evict_expired`] sweeps the map (see
/// [`spawn_cleanup_task`]). There is no capacity bound and no eviction
/// policy beyond TTL.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    /// tag -> keys carrying it
    tag_index: DashMap<String, HashSet<String>>,
    /// key -> tags attached to it, so overwrites and invalidations can
    /// prune the tag index exactly. Expired-but-unswept keys may linger
    /// until the next `set` of the same key; invalidation tolerates them
    /// (removing a missing key is a no-op).
    key_tags: DashMap<String, BTreeSet<String>>,
    counters: StoreCounters,
}

impl MemoryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the hit/miss/eviction counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }

    /// Current number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries and tag associations
    pub fn clear(&self) {
        self.entries.clear();
        self.tag_index.clear();
        self.key_tags.clear();
    }

    /// Drop every tag association recorded for `key`
    fn untag_key(&self, key: &str) {
        let Some((_, tags)) = self.key_tags.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(mut keys) = self.tag_index.get_mut(&tag) {
                keys.remove(key);
            }
        }
    }

    /// Evict expired entries (background maintenance)
    pub fn evict_expired(&self) {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| e.value().is_expired().then(|| e.key().clone()))
            .collect();

        let count = stale.len();
        for key in stale {
            self.entries.remove(&key);
        }
        if count > 0 {
            self.counters
                .evictions
                .fetch_add(count as u64, Ordering::Relaxed);
            debug!(count, "Evicted expired cache entries");
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                // Drop the read guard before mutating
                drop(entry);
                self.entries.remove(key);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            } else {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        // An overwrite replaces the entry's tag set as well: the old
        // associations belong to the old value
        self.untag_key(key);
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                cached_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn tag(&self, key: &str, tags: &BTreeSet<String>) -> Result<()> {
        for tag in tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.key_tags
            .entry(key.to_string())
            .or_default()
            .extend(tags.iter().cloned());
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<u64> {
        let Some((_, keys)) = self.tag_index.remove(tag) else {
            return Ok(0);
        };

        let mut removed = 0u64;
        for key in keys {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
            // A key removed through one tag must vanish from its others too
            self.untag_key(&key);
        }
        if removed > 0 {
            self.counters
                .evictions
                .fetch_add(removed, Ordering::Relaxed);
            debug!(tag, removed, "Invalidated cache entries by tag");
        }
        Ok(removed)
    }
}

/// Spawn a background tokio task that periodically evicts expired entries
/// from `store`.
///
/// The task runs every `interval` and stops when the `Arc` reference count
/// drops to 1 (i.e., all other owners have dropped their handles).
pub fn spawn_cleanup_task(store: Arc<MemoryStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if Arc::strong_count(&store) <= 1 {
                break;
            }
            store.evict_expired();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn get_returns_stored_value_within_ttl() {
        let store = MemoryStore::new();
        let value = json!({"result": "success"});

        store
            .set("k1", value.clone(), Duration::from_secs(60))
            .await
            .expect("set");
        let got = store.get("k1").await.expect("get");

        assert_eq!(got, Some(value));
        assert_eq!(store.stats().hits, 1);
        assert_eq!(store.stats().misses, 0);
    }

    #[tokio::test]
    async fn get_misses_for_unknown_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.expect("get"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_on_read() {
        let store = MemoryStore::new();
        store
            .set("k1", json!(1), Duration::from_millis(1))
            .await
            .expect("set");

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(store.get("k1").await.expect("get"), None);
        assert_eq!(store.stats().evictions, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_overwrites_existing_entry() {
        let store = MemoryStore::new();
        store
            .set("k1", json!(1), Duration::from_secs(60))
            .await
            .expect("set");
        store
            .set("k1", json!(2), Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(store.get("k1").await.expect("get"), Some(json!(2)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_tag_removes_only_tagged_entries() {
        let store = MemoryStore::new();
        store
            .set("users", json!([1, 2]), Duration::from_secs(60))
            .await
            .expect("set");
        store
            .set("orders", json!([3]), Duration::from_secs(60))
            .await
            .expect("set");
        store.tag("users", &tags(&["user"])).await.expect("tag");

        let removed = store.invalidate_tag("user").await.expect("invalidate");

        assert_eq!(removed, 1);
        assert_eq!(store.get("users").await.expect("get"), None);
        assert_eq!(store.get("orders").await.expect("get"), Some(json!([3])));
    }

    #[tokio::test]
    async fn invalidate_unknown_tag_removes_nothing() {
        let store = MemoryStore::new();
        store
            .set("k1", json!(1), Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(store.invalidate_tag("ghost").await.expect("invalidate"), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn one_key_may_carry_several_tags() {
        let store = MemoryStore::new();
        store
            .set("k1", json!(1), Duration::from_secs(60))
            .await
            .expect("set");
        store.tag("k1", &tags(&["a", "b"])).await.expect("tag");

        assert_eq!(store.invalidate_tag("b").await.expect("invalidate"), 1);
        assert_eq!(store.get("k1").await.expect("get"), None);
        // Removal through one tag pruned the key from the other as well
        assert_eq!(store.invalidate_tag("a").await.expect("invalidate"), 0);
    }

    #[tokio::test]
    async fn overwriting_a_key_drops_its_old_tag_associations() {
        let store = MemoryStore::new();
        store
            .set("k1", json!(1), Duration::from_secs(60))
            .await
            .expect("set");
        store.tag("k1", &tags(&["old"])).await.expect("tag");

        store
            .set("k1", json!(2), Duration::from_secs(60))
            .await
            .expect("overwrite");
        store.tag("k1", &tags(&["new"])).await.expect("tag");

        // The stale tag no longer reaches the rewritten entry
        assert_eq!(store.invalidate_tag("old").await.expect("invalidate"), 0);
        assert_eq!(store.get("k1").await.expect("get"), Some(json!(2)));

        assert_eq!(store.invalidate_tag("new").await.expect("invalidate"), 1);
        assert_eq!(store.get("k1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn clear_drops_entries_and_tags() {
        let store = MemoryStore::new();
        store
            .set("k1", json!(1), Duration::from_secs(60))
            .await
            .expect("set");
        store.tag("k1", &tags(&["t"])).await.expect("tag");

        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.invalidate_tag("t").await.expect("invalidate"), 0);
    }

    #[tokio::test]
    async fn evict_expired_removes_only_stale_entries() {
        let store = MemoryStore::new();
        store
            .set("short", json!(1), Duration::from_millis(1))
            .await
            .expect("set");
        store
            .set("long", json!(2), Duration::from_secs(60))
            .await
            .expect("set");

        tokio::time::sleep(Duration::from_millis(5)).await;
        store.evict_expired();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long").await.expect("get"), Some(json!(2)));
        assert_eq!(store.stats().evictions, 1);
    }

    #[tokio::test]
    async fn default_tag_implementation_reports_unsupported() {
        struct PlainStore;

        #[async_trait]
        impl CacheStore for PlainStore {
            async fn get(&self, _key: &str) -> Result<Option<Value>> {
                Ok(None)
            }
            async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<()> {
                Ok(())
            }
        }

        let err = PlainStore
            .tag("k", &tags(&["t"]))
            .await
            .expect_err("must be unsupported");
        assert!(matches!(err, Error::TaggingUnsupported));
        let err = PlainStore
            .invalidate_tag("t")
            .await
            .expect_err("must be unsupported");
        assert!(matches!(err, Error::TaggingUnsupported));
    }

    #[tokio::test]
    async fn spawn_cleanup_task_evicts_expired_entries() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("stale", json!(1), Duration::from_millis(1))
            .await
            .expect("set");

        spawn_cleanup_task(Arc::clone(&store), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.is_empty(), "stale entry should have been evicted");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_are_safe() {
        // GIVEN: store shared across tasks
        // WHEN: 10 tasks each write a different key
        // THEN: all entries are present without data races
        let store = Arc::new(MemoryStore::new());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .set(&format!("key-{i}"), json!(i), Duration::from_secs(60))
                        .await
                        .expect("set");
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task panicked");
        }

        assert_eq!(store.len(), 10);
    }
}
