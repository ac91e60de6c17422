//! End-to-end behavior of the finder cache as a host data-access layer sees it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use finder_cache::FinderCacheError;
use finder_cache::cache::{
    CacheKey, CachedValue, EntityType, FinderCache, FinderCacheConfig, FinderStore,
    LifecycleHooks, LookupDescriptor, MemoryStore, Record, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    email: String,
    status: String,
}

fn user(id: i64, email: &str) -> User {
    User {
        id,
        email: email.to_string(),
        status: "active".to_string(),
    }
}

fn users_finder() -> FinderCache {
    let finder = FinderCache::new(FinderCacheConfig::default());
    finder
        .define_type(EntityType::new("User", "users"))
        .expect("define User");
    finder
        .cache_find_by("User", ["email"])
        .expect("declare email");
    finder
}

fn by_email(email: &str) -> LookupDescriptor {
    LookupDescriptor::new().where_eq("email", email)
}

#[test]
fn email_lookup_is_cacheable_with_canonical_key() {
    let finder = users_finder();
    let lookup = by_email("a@example.com");

    assert!(finder.is_cacheable("User", &lookup));
    let key = finder.cache_key("User", &lookup).expect("eligible");
    insta::assert_snapshot!(key.as_str(), @"cache_find_by/users/email/a%40example.com");
}

#[test]
fn ordered_lookup_is_not_cacheable() {
    let finder = users_finder();
    assert!(!finder.is_cacheable(
        "User",
        &by_email("a@example.com").order("id")
    ));
}

#[test]
fn extra_constraint_is_not_cacheable() {
    let finder = users_finder();
    let lookup = by_email("a@example.com").where_eq("status", "active");
    assert!(!finder.is_cacheable("User", &lookup));
}

#[test]
fn undeclared_type_is_not_cacheable() {
    let finder = users_finder();
    finder
        .define_type(EntityType::new("Post", "posts"))
        .expect("define Post");
    let lookup = LookupDescriptor::new().where_eq("slug", "hello");
    assert!(!finder.is_cacheable("Post", &lookup));
    assert!(!finder.is_cacheable("Ghost", &lookup));
}

#[test]
fn compound_keys_sort_fields() {
    let finder = users_finder();
    finder
        .define_type(EntityType::new("Membership", "memberships"))
        .expect("define");
    finder
        .cache_find_by("Membership", ["user_id", "account_id"])
        .expect("declare");

    let lookup = LookupDescriptor::new()
        .where_bind("user_id")
        .where_eq("account_id", 12)
        .bind("user_id", 7);
    let key = finder.cache_key("Membership", &lookup).expect("eligible");
    insta::assert_snapshot!(key.as_str(), @"cache_find_by/memberships/account_id/12/user_id/7");
}

#[tokio::test]
async fn cached_value_is_returned_without_recomputing() {
    let finder = users_finder();
    let lookup = by_email("a@example.com");

    let first: Option<User> = finder
        .fetch_one_with_cache("User", &lookup, || async {
            Ok::<_, FinderCacheError>(Some(user(1, "a@example.com")))
        })
        .await
        .expect("first fetch");

    let second: Option<User> = finder
        .fetch_one_with_cache("User", &lookup, || async {
            Err::<Option<User>, _>(FinderCacheError::unknown_entity_type(
                "cached lookup must not execute",
            ))
        })
        .await
        .expect("second fetch");

    assert_eq!(first, second);
}

#[tokio::test]
async fn update_evicts_original_key_only_once_cached() {
    let finder = users_finder();
    let original = by_email("a@example.com");
    let _: Option<User> = finder
        .fetch_one_with_cache("User", &original, || async {
            Ok::<_, FinderCacheError>(Some(user(1, "a@example.com")))
        })
        .await
        .expect("prime cache");

    let store = finder.store("User").expect("store");
    let old_key = finder.cache_key("User", &original).expect("eligible");
    let new_key = finder
        .cache_key("User", &by_email("b@example.com"))
        .expect("eligible");
    assert!(store.read(&old_key).await.expect("read").is_some());

    let mut record = Record::new("User")
        .with("id", 1)
        .with("email", "a@example.com");
    record.set("email", "b@example.com");
    finder.on_after_update(&record).await.expect("after update");
    record.changes_applied();

    assert!(store.read(&old_key).await.expect("read").is_none());
    assert!(store.read(&new_key).await.expect("read").is_none());
}

#[tokio::test]
async fn delete_evicts_current_key() {
    let finder = users_finder();
    let lookup = by_email("a@example.com");
    let _: Option<User> = finder
        .fetch_one_with_cache("User", &lookup, || async {
            Ok::<_, FinderCacheError>(Some(user(1, "a@example.com")))
        })
        .await
        .expect("prime cache");

    let record = Record::new("User").with("email", "a@example.com");
    finder.on_before_delete(&record).await.expect("before delete");

    let calls = &AtomicUsize::new(0);
    let refetched: Option<User> = finder
        .fetch_one_with_cache("User", &lookup, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FinderCacheError>(None)
        })
        .await
        .expect("refetch");
    assert_eq!(refetched, None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn subtypes_share_inherited_store_and_sets() {
    let finder = users_finder();
    let shared: Arc<MemoryStore> = Arc::new(MemoryStore::default());
    finder
        .set_store("User", shared.clone())
        .expect("assign store");
    finder
        .define_type(EntityType::new("Admin", "users").with_parent("User"))
        .expect("define Admin");

    let lookup = by_email("root@example.com");
    assert!(finder.is_cacheable("Admin", &lookup));
    let _: Option<User> = finder
        .fetch_one_with_cache("Admin", &lookup, || async {
            Ok::<_, FinderCacheError>(Some(user(9, "root@example.com")))
        })
        .await
        .expect("fetch");

    let key = finder.cache_key("Admin", &lookup).expect("eligible");
    assert!(shared.contains(&key));

    let record = Record::new("Admin").with("email", "root@example.com");
    finder.on_before_delete(&record).await.expect("delete hook");
    assert!(!shared.contains(&key));
}

struct FailingStore;

#[async_trait]
impl FinderStore for FailingStore {
    async fn read(&self, _key: &CacheKey) -> Result<Option<CachedValue>, StoreError> {
        Err(StoreError::backend("connection refused"))
    }

    async fn write(&self, _key: &CacheKey, _value: CachedValue) -> Result<(), StoreError> {
        Err(StoreError::backend("connection refused"))
    }

    async fn delete(&self, _key: &CacheKey) -> Result<bool, StoreError> {
        Err(StoreError::backend("connection refused"))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::backend("connection refused"))
    }
}

#[tokio::test]
async fn store_failures_propagate() {
    let finder = users_finder();
    finder
        .set_store("User", Arc::new(FailingStore))
        .expect("assign store");

    let lookup = by_email("a@example.com");
    let result: Result<Option<User>, FinderCacheError> = finder
        .fetch_one_with_cache("User", &lookup, || async {
            Ok(Some(user(1, "a@example.com")))
        })
        .await;
    assert!(matches!(
        result,
        Err(FinderCacheError::Store(StoreError::Backend { .. }))
    ));

    let record = Record::new("User").with("email", "a@example.com");
    let error = finder
        .on_after_update(&record)
        .await
        .expect_err("delete failure propagates");
    assert!(matches!(error, FinderCacheError::Store(_)));
}

#[tokio::test]
async fn ineligible_lookups_never_touch_the_store() {
    let finder = users_finder();
    finder
        .set_store("User", Arc::new(FailingStore))
        .expect("assign store");

    let lookup = by_email("a@example.com").lock(finder_cache::cache::LockMode::ForUpdate);
    let fetched: Option<User> = finder
        .fetch_one_with_cache("User", &lookup, || async {
            Ok::<_, FinderCacheError>(Some(user(1, "a@example.com")))
        })
        .await
        .expect("direct execution");
    assert_eq!(fetched, Some(user(1, "a@example.com")));
}

#[tokio::test]
async fn cached_values_are_plain_json() {
    let finder = users_finder();
    let lookup = by_email("a@example.com");
    let _: Option<User> = finder
        .fetch_one_with_cache("User", &lookup, || async {
            Ok::<_, FinderCacheError>(Some(user(1, "a@example.com")))
        })
        .await
        .expect("prime cache");

    let key = finder.cache_key("User", &lookup).expect("eligible");
    let stored = finder
        .store("User")
        .expect("store")
        .read(&key)
        .await
        .expect("read");
    assert_eq!(
        stored,
        Some(json!({"id": 1, "email": "a@example.com", "status": "active"}))
    );
}
