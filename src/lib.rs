//! Read-through caching for single-record lookups.
//!
//! A host data-access layer hands each "fetch one record" operation to
//! [`cache::FinderCache::fetch_one_with_cache`] together with the closure that
//! would execute it. Lookups whose equality constraints match a declared
//! cacheable attribute set are served from the entity type's store; everything
//! else runs uncached. The host reports updates and deletes through
//! [`cache::LifecycleHooks`] so stale keys are evicted.

pub mod cache;
pub mod config;
pub mod error;
pub mod telemetry;

pub use error::FinderCacheError;
