//! Finder cache.
//!
//! Read-through caching for single-record lookups:
//!
//! - **Analyzer** decides whether a lookup may be cached
//! - **Keys** turn its equality constraints into a canonical key
//! - **Registry** tracks cacheable attribute sets and stores per entity type
//! - **Invalidator** evicts keys built from pre-mutation values on update/delete
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! memory_capacity = 10000
//! # memory_ttl_secs = 300
//! ```

mod analyzer;
mod config;
pub mod context;
mod descriptor;
mod entity;
mod finder;
mod invalidator;
mod keys;
mod lock;
mod registry;
mod store;

pub use analyzer::{Ineligible, ResolvedPairs, analyze, is_cacheable};
pub use config::FinderCacheConfig;
pub use descriptor::{
    Constraint, LockMode, LookupDescriptor, Operand, Operator, QueryModifiers, ScalarValue, Value,
};
pub use entity::{EntityInstance, EntityType, Record};
pub use finder::FinderCache;
pub use invalidator::{Invalidator, LifecycleHooks};
pub use keys::{CacheKey, KEY_NAMESPACE, cache_key_for};
pub use registry::{AttributeSet, DeclarationError, FinderRegistry};
pub use store::{CachedValue, FinderStore, MemoryStore, StoreError};
