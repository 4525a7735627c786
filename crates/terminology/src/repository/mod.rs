//! Resource envelope repository.
//!
//! The index never owns resources. Canonical resource content lives in a
//! [`ResourceRepository`], a transactional-per-call CRUD store keyed by the
//! integer [`ResourceId`] that also serves as every index key's
//! disambiguator. [`SqliteResourceRepository`] is the shipped implementation.

mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RepositoryError;
use crate::model::{ResourceId, ResourceType};

pub use sqlite::SqliteResourceRepository;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// A persisted resource with its repository metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEnvelope {
    /// Repository-assigned id.
    pub id: ResourceId,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Version, starting at 1 and incremented on every save.
    pub version_id: u32,
    /// Time of the last save.
    pub last_updated: DateTime<Utc>,
    /// Resource content.
    pub content: Value,
}

/// Content to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeDraft {
    /// Existing id to overwrite, or `None` to allocate a new one.
    pub id: Option<ResourceId>,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Resource content.
    pub content: Value,
}

impl EnvelopeDraft {
    /// A draft for a new resource.
    pub fn new(resource_type: ResourceType, content: Value) -> Self {
        Self {
            id: None,
            resource_type,
            content,
        }
    }

    /// A draft overwriting the resource stored under `id`.
    pub fn existing(id: ResourceId, resource_type: ResourceType, content: Value) -> Self {
        Self {
            id: Some(id),
            resource_type,
            content,
        }
    }
}

/// CRUD store for resource envelopes.
///
/// Each call is its own transaction. Ids are never reused after a delete, so
/// an index entry left behind by a failed delete can never resolve to a
/// different resource.
pub trait ResourceRepository: Send + Sync {
    /// Persists a draft, assigning an id to new resources and bumping the
    /// version of existing ones.
    fn save(&self, draft: EnvelopeDraft) -> RepositoryResult<ResourceEnvelope>;

    /// Loads an envelope. A missing id is `Ok(None)`.
    fn find_by_id(&self, id: ResourceId) -> RepositoryResult<Option<ResourceEnvelope>>;

    /// Removes an envelope. Returns whether it existed.
    fn delete_by_id(&self, id: ResourceId) -> RepositoryResult<bool>;

    /// Ids of every stored resource of a type, ascending.
    fn find_ids_by_type(&self, resource_type: ResourceType) -> RepositoryResult<Vec<ResourceId>>;
}
