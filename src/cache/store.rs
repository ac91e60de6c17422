//! Backing stores for cached records.
//!
//! The registry only talks to [`FinderStore`]; eviction, expiry and any
//! cross-request atomicity are the store's business. [`MemoryStore`] is the
//! process-local default.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use super::config::FinderCacheConfig;
use super::keys::CacheKey;
use super::lock::{read_guard, write_guard};

const SOURCE: &str = "cache::store";
const METRIC_EVICT_TOTAL: &str = "finder_cache_evict_total";

/// Serialized form of a cached record.
pub type CachedValue = serde_json::Value;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache backend failure: {message}")]
    Backend { message: String },
    #[error("cached value could not be converted: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Key-value store consulted for cached lookups.
///
/// Implementations may perform network I/O; errors are propagated to callers
/// untouched.
#[async_trait]
pub trait FinderStore: Send + Sync {
    async fn read(&self, key: &CacheKey) -> Result<Option<CachedValue>, StoreError>;

    async fn write(&self, key: &CacheKey, value: CachedValue) -> Result<(), StoreError>;

    /// Remove `key`. Returns whether an entry was present; a missing key is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

struct Entry {
    value: CachedValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-process LRU store with optional time-to-live.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryStore {
    pub fn new(config: &FinderCacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
            ttl: config.memory_ttl(),
        }
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn len(&self) -> usize {
        read_guard(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        read_guard(&self.entries, SOURCE, "contains")
            .peek(key.as_str())
            .is_some_and(|entry| !entry.is_expired(now))
    }

    fn get_live(&self, key: &CacheKey) -> Option<CachedValue> {
        let now = Instant::now();
        let mut entries = write_guard(&self.entries, SOURCE, "read");
        if entries.peek(key.as_str())?.is_expired(now) {
            entries.pop(key.as_str());
            counter!(METRIC_EVICT_TOTAL, "reason" => "expired").increment(1);
            return None;
        }
        entries.get(key.as_str()).map(|entry| entry.value.clone())
    }

    fn put(&self, key: &CacheKey, value: CachedValue) {
        let entry = Entry {
            value,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };
        let displaced = write_guard(&self.entries, SOURCE, "write").push(key.to_string(), entry);
        if let Some((displaced_key, _)) = displaced
            && displaced_key != key.as_str()
        {
            counter!(METRIC_EVICT_TOTAL, "reason" => "capacity").increment(1);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&FinderCacheConfig::default())
    }
}

#[async_trait]
impl FinderStore for MemoryStore {
    async fn read(&self, key: &CacheKey) -> Result<Option<CachedValue>, StoreError> {
        Ok(self.get_live(key))
    }

    async fn write(&self, key: &CacheKey, value: CachedValue) -> Result<(), StoreError> {
        self.put(key, value);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(write_guard(&self.entries, SOURCE, "delete")
            .pop(key.as_str())
            .is_some())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        write_guard(&self.entries, SOURCE, "clear").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use serde_json::json;

    use super::*;
    use crate::cache::descriptor::ScalarValue;
    use crate::cache::keys::cache_key_for;

    fn key(email: &str) -> CacheKey {
        cache_key_for("users", &[("email", ScalarValue::from(email))])
    }

    #[tokio::test]
    async fn write_read_delete_roundtrip() {
        let store = MemoryStore::default();
        let key = key("a@example.com");

        assert!(store.read(&key).await.expect("read").is_none());
        store
            .write(&key, json!({"id": 1}))
            .await
            .expect("write");
        assert_eq!(store.read(&key).await.expect("read"), Some(json!({"id": 1})));

        assert!(store.delete(&key).await.expect("delete"));
        assert!(store.read(&key).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn deleting_missing_key_is_not_an_error() {
        let store = MemoryStore::default();
        assert!(!store.delete(&key("nobody@example.com")).await.expect("delete"));
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let store = MemoryStore::with_capacity(NonZeroUsize::new(2).expect("non-zero"));
        let (first, second, third) = (key("1"), key("2"), key("3"));

        store.write(&first, json!(1)).await.expect("write");
        store.write(&second, json!(2)).await.expect("write");
        assert!(store.read(&first).await.expect("read").is_some());
        store.write(&third, json!(3)).await.expect("write");

        assert!(store.contains(&first));
        assert!(!store.contains(&second));
        assert!(store.contains(&third));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_read() {
        let store = MemoryStore::default().with_ttl(Duration::from_millis(20));
        let key = key("a@example.com");
        store.write(&key, json!("cached")).await.expect("write");
        assert!(store.contains(&key));

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!store.contains(&key));
        assert!(store.read(&key).await.expect("read").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let store = MemoryStore::default();
        store.write(&key("a"), json!(1)).await.expect("write");
        store.clear().await.expect("clear");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_recovers_from_poisoned_lock() {
        let store = MemoryStore::default();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        let key = key("a@example.com");
        store.write(&key, json!(true)).await.expect("write");
        assert!(store.contains(&key));
    }
}
