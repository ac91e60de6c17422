//! Lifecycle-driven invalidation.
//!
//! The host persistence layer calls [`LifecycleHooks::on_after_update`] once
//! an update is written (while the instance still reports its pre-update
//! values) and [`LifecycleHooks::on_before_delete`] before a record is
//! removed. Keys are rebuilt from the values the record held before
//! the mutation, since those are the keys it may currently be cached under.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, instrument};

use super::descriptor::ScalarValue;
use super::entity::EntityInstance;
use super::keys::cache_key_for;
use super::registry::{AttributeSet, FinderRegistry};
use crate::error::FinderCacheError;

const METRIC_INVALIDATE_TOTAL: &str = "finder_cache_invalidate_total";

/// Callbacks a host persistence layer invokes around mutations.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn on_after_update(&self, entity: &dyn EntityInstance) -> Result<(), FinderCacheError>;

    async fn on_before_delete(&self, entity: &dyn EntityInstance) -> Result<(), FinderCacheError>;
}

/// Deletes cached lookups that may hold a mutating record.
#[derive(Clone)]
pub struct Invalidator {
    registry: Arc<FinderRegistry>,
}

impl Invalidator {
    pub fn new(registry: Arc<FinderRegistry>) -> Self {
        Self { registry }
    }

    /// Evict every key the entity may be cached under.
    ///
    /// Deleting an absent key is a no-op; store errors propagate.
    #[instrument(skip_all, fields(entity_type = entity.entity_type()))]
    pub async fn invalidate(&self, entity: &dyn EntityInstance) -> Result<(), FinderCacheError> {
        let type_name = entity.entity_type();
        let sets = self.registry.cacheable_sets(type_name);
        if sets.is_empty() {
            return Ok(());
        }

        let storage_id = self.registry.storage_id(type_name)?;
        let store = self.registry.store(type_name)?;
        for set in sets.iter() {
            let Some(pairs) = previous_pairs(entity, set) else {
                debug!(fields = ?set.fields(), "Skipping set with non-scalar previous values");
                continue;
            };
            let key = cache_key_for(&storage_id, &pairs);
            let removed = store.delete(&key).await?;
            if removed {
                counter!(METRIC_INVALIDATE_TOTAL).increment(1);
            }
            debug!(cache_key = %key, removed, "Invalidated finder cache key");
        }
        Ok(())
    }
}

/// Pre-mutation `(field, value)` pairs for `set`, or `None` when any value
/// could not have appeared in a cacheable lookup.
fn previous_pairs<'a>(
    entity: &dyn EntityInstance,
    set: &'a AttributeSet,
) -> Option<Vec<(&'a str, ScalarValue)>> {
    set.fields()
        .iter()
        .map(|field| {
            let value = entity.attribute_was(field)?.as_scalar()?;
            Some((field.as_str(), value))
        })
        .collect()
}

#[async_trait]
impl LifecycleHooks for Invalidator {
    async fn on_after_update(&self, entity: &dyn EntityInstance) -> Result<(), FinderCacheError> {
        if !self.registry.hooks_installed(entity.entity_type()) {
            return Ok(());
        }
        self.invalidate(entity).await
    }

    async fn on_before_delete(&self, entity: &dyn EntityInstance) -> Result<(), FinderCacheError> {
        if !self.registry.hooks_installed(entity.entity_type()) {
            return Ok(());
        }
        self.invalidate(entity).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::entity::{EntityType, Record};
    use crate::cache::store::{FinderStore, MemoryStore};

    fn setup() -> (Arc<FinderRegistry>, Arc<MemoryStore>, Invalidator) {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(FinderRegistry::new(store.clone()));
        registry
            .define_type(EntityType::new("User", "users"))
            .expect("define");
        registry.declare("User", ["email"]).expect("declare email");
        registry
            .declare("User", ["account_id", "name"])
            .expect("declare compound");
        let invalidator = Invalidator::new(Arc::clone(&registry));
        (registry, store, invalidator)
    }

    fn email_key(email: &str) -> crate::cache::keys::CacheKey {
        cache_key_for("users", &[("email", ScalarValue::from(email))])
    }

    #[tokio::test]
    async fn update_evicts_key_for_previous_value() {
        let (_, store, invalidator) = setup();
        store
            .write(&email_key("old@example.com"), json!({"id": 1}))
            .await
            .expect("seed");

        let mut user = Record::new("User")
            .with("email", "old@example.com")
            .with("account_id", 4)
            .with("name", "ann");
        user.set("email", "new@example.com");

        invalidator.on_after_update(&user).await.expect("hook");

        assert!(!store.contains(&email_key("old@example.com")));
        assert!(!store.contains(&email_key("new@example.com")));
    }

    #[tokio::test]
    async fn delete_evicts_every_declared_set() {
        let (_, store, invalidator) = setup();
        let compound = cache_key_for(
            "users",
            &[
                ("name", ScalarValue::from("ann")),
                ("account_id", ScalarValue::Int(4)),
            ],
        );
        store
            .write(&email_key("a@example.com"), json!(1))
            .await
            .expect("seed");
        store.write(&compound, json!(1)).await.expect("seed");

        let user = Record::new("User")
            .with("email", "a@example.com")
            .with("account_id", 4)
            .with("name", "ann");
        invalidator.on_before_delete(&user).await.expect("hook");

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sets_with_null_previous_values_are_skipped() {
        let (_, store, invalidator) = setup();
        store
            .write(&email_key("a@example.com"), json!(1))
            .await
            .expect("seed");

        let mut user = Record::new("User").with("email", "a@example.com");
        user.set("name", "bob");

        invalidator.invalidate(&user).await.expect("invalidate");
        assert!(!store.contains(&email_key("a@example.com")));
    }

    #[tokio::test]
    async fn types_without_hooks_are_ignored() {
        let (registry, store, invalidator) = setup();
        registry
            .define_type(EntityType::new("Post", "posts"))
            .expect("define");
        let key = cache_key_for("posts", &[("slug", ScalarValue::from("hello"))]);
        store.write(&key, json!(1)).await.expect("seed");

        let post = Record::new("Post").with("slug", "hello");
        invalidator.on_after_update(&post).await.expect("hook");
        invalidator.on_before_delete(&post).await.expect("hook");

        assert!(store.contains(&key));
    }
}
