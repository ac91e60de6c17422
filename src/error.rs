use thiserror::Error;

use crate::cache::{DeclarationError, StoreError};

#[derive(Debug, Error)]
pub enum FinderCacheError {
    #[error("invalid cacheable attribute declaration for `{entity_type}`: {source}")]
    InvalidDeclaration {
        entity_type: String,
        source: DeclarationError,
    },
    #[error("entity type `{name}` is not registered")]
    UnknownEntityType { name: String },
    #[error("entity type `{name}` is already registered")]
    DuplicateEntityType { name: String },
    #[error("a finder cache is already installed for this process")]
    AlreadyInstalled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FinderCacheError {
    pub fn unknown_entity_type(name: impl Into<String>) -> Self {
        Self::UnknownEntityType { name: name.into() }
    }
}

impl From<serde_json::Error> for FinderCacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::Store(StoreError::Serialization(error))
    }
}
