//! The finder cache facade.
//!
//! Hosts call [`FinderCache::fetch_one_with_cache`] in place of their plain
//! "fetch one record" execution. Ineligible lookups run `exec` directly;
//! eligible ones go through the entity type's store.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::analyzer::{self, Ineligible, ResolvedPairs};
use super::config::FinderCacheConfig;
use super::descriptor::LookupDescriptor;
use super::entity::{EntityInstance, EntityType};
use super::invalidator::{Invalidator, LifecycleHooks};
use super::keys::{CacheKey, cache_key_for};
use super::registry::{AttributeSet, FinderRegistry};
use super::store::{FinderStore, MemoryStore};
use crate::error::FinderCacheError;

const METRIC_BYPASS_TOTAL: &str = "finder_cache_bypass_total";

/// Entry point tying analyzer, key encoder, registry and invalidator together.
pub struct FinderCache {
    config: FinderCacheConfig,
    registry: Arc<FinderRegistry>,
    invalidator: Invalidator,
}

impl FinderCache {
    /// Create a finder cache whose default store is an in-memory LRU sized by `config`.
    pub fn new(config: FinderCacheConfig) -> Self {
        let default_store = Arc::new(MemoryStore::new(&config));
        Self::with_default_store(config, default_store)
    }

    pub fn with_default_store(
        config: FinderCacheConfig,
        default_store: Arc<dyn FinderStore>,
    ) -> Self {
        let registry = Arc::new(FinderRegistry::new(default_store));
        let invalidator = Invalidator::new(Arc::clone(&registry));
        Self {
            config,
            registry,
            invalidator,
        }
    }

    pub fn config(&self) -> &FinderCacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FinderRegistry> {
        &self.registry
    }

    pub fn invalidator(&self) -> &Invalidator {
        &self.invalidator
    }

    pub fn define_type(&self, entity_type: EntityType) -> Result<(), FinderCacheError> {
        self.registry.define_type(entity_type)
    }

    /// Declare lookups by exactly `fields` cacheable for `entity_type`.
    pub fn cache_find_by<I, S>(
        &self,
        entity_type: &str,
        fields: I,
    ) -> Result<AttributeSet, FinderCacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry.declare(entity_type, fields)
    }

    pub fn store(&self, entity_type: &str) -> Result<Arc<dyn FinderStore>, FinderCacheError> {
        self.registry.store(entity_type)
    }

    pub fn set_store(
        &self,
        entity_type: &str,
        store: Arc<dyn FinderStore>,
    ) -> Result<(), FinderCacheError> {
        self.registry.set_store(entity_type, store)
    }

    pub fn is_cacheable(&self, entity_type: &str, descriptor: &LookupDescriptor) -> bool {
        self.eligible_pairs(entity_type, descriptor).is_ok()
    }

    /// Key an eligible lookup would be cached under.
    pub fn cache_key(&self, entity_type: &str, descriptor: &LookupDescriptor) -> Option<CacheKey> {
        let pairs = self.eligible_pairs(entity_type, descriptor).ok()?;
        let storage_id = self.registry.storage_id(entity_type).ok()?;
        Some(cache_key_for(&storage_id, &pairs))
    }

    /// Run `exec` through the cache when the lookup is eligible.
    pub async fn fetch_one_with_cache<T, F, Fut, E>(
        &self,
        entity_type: &str,
        descriptor: &LookupDescriptor,
        exec: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: From<FinderCacheError>,
    {
        self.one_record_with_caching(entity_type, descriptor, true, exec)
            .await
    }

    /// Like [`FinderCache::fetch_one_with_cache`], with an explicit opt-out.
    ///
    /// Hosts pass `can_cache = false` when the caller asked for something other
    /// than the single default row, such as `first(n)` with an explicit count.
    #[instrument(skip_all, fields(entity_type = entity_type))]
    pub async fn one_record_with_caching<T, F, Fut, E>(
        &self,
        entity_type: &str,
        descriptor: &LookupDescriptor,
        can_cache: bool,
        exec: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: From<FinderCacheError>,
    {
        if !can_cache || !self.config.enabled {
            counter!(METRIC_BYPASS_TOTAL).increment(1);
            return exec().await;
        }
        let Ok(pairs) = self.eligible_pairs(entity_type, descriptor) else {
            counter!(METRIC_BYPASS_TOTAL).increment(1);
            return exec().await;
        };

        let storage_id = self.registry.storage_id(entity_type)?;
        let key = cache_key_for(&storage_id, &pairs);
        debug!(cache_key = %key, "Serving lookup through finder cache");

        let cached = self
            .registry
            .lookup_or_compute(entity_type, &key, || async move {
                let record = exec().await?;
                serde_json::to_value(&record).map_err(|err| E::from(FinderCacheError::from(err)))
            })
            .await?;

        serde_json::from_value(cached).map_err(|err| E::from(FinderCacheError::from(err)))
    }

    /// Explicitly evict the cached lookups a record may be stored under.
    pub async fn flush_find_cache(
        &self,
        entity: &dyn EntityInstance,
    ) -> Result<(), FinderCacheError> {
        self.invalidator.invalidate(entity).await
    }

    fn eligible_pairs(
        &self,
        entity_type: &str,
        descriptor: &LookupDescriptor,
    ) -> Result<ResolvedPairs, Ineligible> {
        let sets = self.registry.cacheable_sets(entity_type);
        analyzer::analyze(descriptor, &sets)
    }
}

#[async_trait]
impl LifecycleHooks for FinderCache {
    async fn on_after_update(&self, entity: &dyn EntityInstance) -> Result<(), FinderCacheError> {
        self.invalidator.on_after_update(entity).await
    }

    async fn on_before_delete(&self, entity: &dyn EntityInstance) -> Result<(), FinderCacheError> {
        self.invalidator.on_before_delete(entity).await
    }
}
