//! Process-wide finder cache.
//!
//! Install once during startup, after entity types and cacheable sets are
//! declared and before lookups are served. Hosts that prefer explicit wiring
//! can skip this and pass an `Arc<FinderCache>` around instead.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;

use super::config::FinderCacheConfig;
use super::finder::FinderCache;
use crate::error::FinderCacheError;

static FINDER_CACHE: OnceCell<Arc<FinderCache>> = OnceCell::new();

/// Install `cache` as the process-wide finder cache.
pub fn install(cache: Arc<FinderCache>) -> Result<Arc<FinderCache>, FinderCacheError> {
    FINDER_CACHE
        .set(Arc::clone(&cache))
        .map_err(|_| FinderCacheError::AlreadyInstalled)?;
    info!(
        enabled = cache.config().enabled,
        "Installed process-wide finder cache"
    );
    Ok(cache)
}

/// Install a finder cache built from `config`.
pub fn install_with_config(
    config: FinderCacheConfig,
) -> Result<Arc<FinderCache>, FinderCacheError> {
    install(Arc::new(FinderCache::new(config)))
}

/// The installed finder cache, if any.
pub fn global() -> Option<Arc<FinderCache>> {
    FINDER_CACHE.get().cloned()
}
