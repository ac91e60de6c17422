//! Finder cache tuning.
//!
//! Loaded from the `[cache]` table of `finder_cache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! memory_capacity = 10000
//! memory_ttl_secs = 300
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FinderCacheConfig {
    /// When false every lookup takes the uncached path.
    pub enabled: bool,
    /// Maximum entries held by the bundled in-memory store.
    pub memory_capacity: usize,
    /// Optional time-to-live for in-memory entries; `None` keeps entries until evicted.
    pub memory_ttl_secs: Option<u64>,
}

impl Default for FinderCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            memory_ttl_secs: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for FinderCacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            memory_capacity: settings.memory_capacity.get(),
            memory_ttl_secs: settings.memory_ttl.map(|ttl| ttl.as_secs()),
        }
    }
}

impl FinderCacheConfig {
    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn memory_ttl(&self) -> Option<Duration> {
        self.memory_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
