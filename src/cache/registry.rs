//! Per-entity-type cache registry.
//!
//! Holds, for every registered entity type, the attribute sets declared
//! cacheable and the store its cached records live in. Both are inherited
//! along the explicit parent chain recorded in [`EntityType`].
//!
//! Declarations and type registration are expected to happen during startup,
//! before lookups start flowing.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, RwLock};

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info};

use super::entity::EntityType;
use super::keys::CacheKey;
use super::lock::{read_guard, write_guard};
use super::store::{CachedValue, FinderStore};
use crate::error::FinderCacheError;

const SOURCE: &str = "cache::registry";
const METRIC_HIT_TOTAL: &str = "finder_cache_hit_total";
const METRIC_MISS_TOTAL: &str = "finder_cache_miss_total";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("at least one field name is required")]
    Empty,
    #[error("`{0}` is not a simple identifier")]
    NotIdentifier(String),
}

/// Sorted, deduplicated and immutable list of field names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeSet(Arc<[String]>);

impl AttributeSet {
    pub fn new<I, S>(fields: I) -> Result<Self, DeclarationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = BTreeSet::new();
        for field in fields {
            let field = field.as_ref();
            if !is_identifier(field) {
                return Err(DeclarationError::NotIdentifier(field.to_string()));
            }
            normalized.insert(field.to_string());
        }
        if normalized.is_empty() {
            return Err(DeclarationError::Empty);
        }
        Ok(Self(normalized.into_iter().collect()))
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// True when `sorted_fields` names exactly this set.
    pub fn matches(&self, sorted_fields: &[String]) -> bool {
        *self.0 == *sorted_fields
    }
}

fn is_identifier(field: &str) -> bool {
    let mut chars = field.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct TypeEntry {
    entity_type: EntityType,
    declared: Option<Arc<BTreeSet<AttributeSet>>>,
    hooks_installed: bool,
    store: Option<Arc<dyn FinderStore>>,
}

/// Registry of entity types, their cacheable attribute sets and stores.
pub struct FinderRegistry {
    types: RwLock<HashMap<String, TypeEntry>>,
    default_store: Arc<dyn FinderStore>,
}

impl FinderRegistry {
    /// Create a registry whose types fall back to `default_store`.
    pub fn new(default_store: Arc<dyn FinderStore>) -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            default_store,
        }
    }

    /// Register an entity type. Its parent, if any, must already be registered.
    pub fn define_type(&self, entity_type: EntityType) -> Result<(), FinderCacheError> {
        let mut types = write_guard(&self.types, SOURCE, "define_type");
        if types.contains_key(entity_type.name()) {
            return Err(FinderCacheError::DuplicateEntityType {
                name: entity_type.name().to_string(),
            });
        }
        if let Some(parent) = entity_type.parent()
            && !types.contains_key(parent)
        {
            return Err(FinderCacheError::unknown_entity_type(parent));
        }

        debug!(
            entity_type = entity_type.name(),
            storage_id = entity_type.storage_id(),
            parent = entity_type.parent(),
            "Registered entity type"
        );
        types.insert(
            entity_type.name().to_string(),
            TypeEntry {
                entity_type,
                declared: None,
                hooks_installed: false,
                store: None,
            },
        );
        Ok(())
    }

    pub fn entity_type(&self, name: &str) -> Result<EntityType, FinderCacheError> {
        read_guard(&self.types, SOURCE, "entity_type")
            .get(name)
            .map(|entry| entry.entity_type.clone())
            .ok_or_else(|| FinderCacheError::unknown_entity_type(name))
    }

    pub fn storage_id(&self, name: &str) -> Result<String, FinderCacheError> {
        self.entity_type(name)
            .map(|entity_type| entity_type.storage_id().to_string())
    }

    /// Mark lookups by exactly `fields` as cacheable for `name`.
    ///
    /// Only safe when the fields' values identify at most one record. The
    /// first declaration reaching a type installs its lifecycle hooks; a
    /// subtype's first own declaration starts from the sets it inherited.
    pub fn declare<I, S>(&self, name: &str, fields: I) -> Result<AttributeSet, FinderCacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = AttributeSet::new(fields).map_err(|source| {
            FinderCacheError::InvalidDeclaration {
                entity_type: name.to_string(),
                source,
            }
        })?;

        let mut types = write_guard(&self.types, SOURCE, "declare");
        let (inherited, hooks_present) = {
            let lineage = lineage(&types, name)?;
            let inherited = lineage
                .iter()
                .find_map(|entry| entry.declared.clone())
                .unwrap_or_default();
            let hooks_present = lineage.iter().any(|entry| entry.hooks_installed);
            (inherited, hooks_present)
        };

        let entry = types
            .get_mut(name)
            .ok_or_else(|| FinderCacheError::unknown_entity_type(name))?;
        let mut declared = (*inherited).clone();
        declared.insert(set.clone());
        entry.declared = Some(Arc::new(declared));

        if !hooks_present {
            entry.hooks_installed = true;
            info!(entity_type = name, "Installed finder cache lifecycle hooks");
        }
        debug!(
            entity_type = name,
            fields = ?set.fields(),
            "Declared cacheable attribute set"
        );
        Ok(set)
    }

    /// Effective cacheable sets for `name`; empty for unknown or undeclared types.
    pub fn cacheable_sets(&self, name: &str) -> Arc<BTreeSet<AttributeSet>> {
        let types = read_guard(&self.types, SOURCE, "cacheable_sets");
        lineage(&types, name)
            .ok()
            .and_then(|lineage| lineage.iter().find_map(|entry| entry.declared.clone()))
            .unwrap_or_default()
    }

    /// Whether update/delete hooks are active for `name`, directly or inherited.
    pub fn hooks_installed(&self, name: &str) -> bool {
        let types = read_guard(&self.types, SOURCE, "hooks_installed");
        lineage(&types, name).is_ok_and(|lineage| lineage.iter().any(|entry| entry.hooks_installed))
    }

    /// Store for `name`.
    ///
    /// Resolution order: the type's own store, then the nearest ancestor's.
    /// Failing both, the default store is fixed on this type, so a later
    /// assignment on an ancestor no longer reaches it.
    pub fn store(&self, name: &str) -> Result<Arc<dyn FinderStore>, FinderCacheError> {
        {
            let types = read_guard(&self.types, SOURCE, "store");
            if let Some(store) = inherited_store(&types, name)? {
                return Ok(store);
            }
        }

        let mut types = write_guard(&self.types, SOURCE, "store.resolve");
        if let Some(store) = inherited_store(&types, name)? {
            return Ok(store);
        }
        let entry = types
            .get_mut(name)
            .ok_or_else(|| FinderCacheError::unknown_entity_type(name))?;
        let store = Arc::clone(&self.default_store);
        entry.store = Some(Arc::clone(&store));
        debug!(entity_type = name, "Resolved default finder store");
        Ok(store)
    }

    /// Assign the store for `name` and every subtype that has not resolved its own.
    pub fn set_store(
        &self,
        name: &str,
        store: Arc<dyn FinderStore>,
    ) -> Result<(), FinderCacheError> {
        let mut types = write_guard(&self.types, SOURCE, "set_store");
        let entry = types
            .get_mut(name)
            .ok_or_else(|| FinderCacheError::unknown_entity_type(name))?;
        entry.store = Some(store);
        info!(entity_type = name, "Assigned finder store");
        Ok(())
    }

    /// Read-through: return the value cached under `key`, or run `compute`,
    /// store its result and return it.
    ///
    /// `compute` runs at most once per call. Unlike plain read-through, a
    /// `null` result is returned but not stored: creates fire no lifecycle
    /// hook, so a cached "not found" could never be evicted. Lookups that
    /// found nothing run again next time.
    pub async fn lookup_or_compute<F, Fut, E>(
        &self,
        name: &str,
        key: &CacheKey,
        compute: F,
    ) -> Result<CachedValue, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue, E>>,
        E: From<FinderCacheError>,
    {
        let store = self.store(name)?;
        if let Some(value) = store.read(key).await.map_err(FinderCacheError::from)? {
            counter!(METRIC_HIT_TOTAL).increment(1);
            debug!(entity_type = name, cache_key = %key, "Finder cache hit");
            return Ok(value);
        }

        counter!(METRIC_MISS_TOTAL).increment(1);
        debug!(entity_type = name, cache_key = %key, "Finder cache miss");
        let value = compute().await?;
        if !value.is_null() {
            store
                .write(key, value.clone())
                .await
                .map_err(FinderCacheError::from)?;
        }
        Ok(value)
    }
}

/// `name`'s entry followed by its ancestors, nearest first.
fn lineage<'a>(
    types: &'a HashMap<String, TypeEntry>,
    name: &str,
) -> Result<Vec<&'a TypeEntry>, FinderCacheError> {
    let mut chain = Vec::new();
    let mut current = Some(name);
    while let Some(type_name) = current {
        let entry = types
            .get(type_name)
            .ok_or_else(|| FinderCacheError::unknown_entity_type(type_name))?;
        chain.push(entry);
        current = entry.entity_type.parent();
    }
    Ok(chain)
}

fn inherited_store(
    types: &HashMap<String, TypeEntry>,
    name: &str,
) -> Result<Option<Arc<dyn FinderStore>>, FinderCacheError> {
    Ok(lineage(types, name)?
        .into_iter()
        .find_map(|entry| entry.store.clone()))
}
