//! Host entity abstractions.
//!
//! The host data-access layer describes its entity types with [`EntityType`]
//! and exposes mutating instances through [`EntityInstance`], which must be
//! able to report each field's value from before the pending update or delete.

use std::collections::HashMap;

use super::descriptor::Value;

/// A host entity type, optionally derived from a registered parent type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
    storage_id: String,
    parent: Option<String>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, storage_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_id: storage_id.into(),
            parent: None,
        }
    }

    /// A subtype sharing its parent's storage.
    pub fn subtype_of(name: impl Into<String>, parent: &EntityType) -> Self {
        Self {
            name: name.into(),
            storage_id: parent.storage_id.clone(),
            parent: Some(parent.name.clone()),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table or collection name; the second segment of every cache key.
    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

/// A persisted record undergoing an update or delete.
pub trait EntityInstance: Send + Sync {
    /// Name of the instance's registered [`EntityType`].
    fn entity_type(&self) -> &str;

    /// Current (possibly modified) value of `field`.
    fn attribute(&self, field: &str) -> Option<Value>;

    /// Value `field` held before the pending mutation.
    fn attribute_was(&self, field: &str) -> Option<Value>;
}

/// Map-backed [`EntityInstance`] with change tracking.
///
/// `set` remembers the first value it overwrites until `changes_applied`
/// commits the pending changes.
#[derive(Debug, Clone)]
pub struct Record {
    entity_type: String,
    attributes: HashMap<String, Value>,
    original: HashMap<String, Value>,
}

impl Record {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            attributes: HashMap::new(),
            original: HashMap::new(),
        }
    }

    /// Set a persisted attribute without recording a change.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let previous = self
            .attributes
            .insert(field.clone(), value.into())
            .unwrap_or(Value::Null);
        self.original.entry(field).or_insert(previous);
    }

    pub fn is_changed(&self, field: &str) -> bool {
        self.original
            .get(field)
            .is_some_and(|was| self.attributes.get(field) != Some(was))
    }

    pub fn changes_applied(&mut self) {
        self.original.clear();
    }
}

impl EntityInstance for Record {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn attribute(&self, field: &str) -> Option<Value> {
        self.attributes.get(field).cloned()
    }

    fn attribute_was(&self, field: &str) -> Option<Value> {
        self.original
            .get(field)
            .or_else(|| self.attributes.get(field))
            .cloned()
    }
}
