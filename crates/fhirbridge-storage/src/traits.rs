//! Storage traits for the storage abstraction layer.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fhirbridge_core::{Entity, EntityType};

use crate::error::StorageError;
use crate::types::{ConstraintSet, PageRequest, SortKey, StoredPage};

/// The capability every clinical store backend must provide.
///
/// Implementations must be thread-safe (`Send + Sync`) and support concurrent
/// reads. Voided entities are invisible to every read operation.
///
/// # Example
///
/// ```ignore
/// use fhirbridge_storage::{EntityStore, StorageError};
///
/// async fn get_obs(store: &dyn EntityStore, id: &str) -> Result<Entity, StorageError> {
///     store
///         .get(EntityType::Obs, id)
///         .await?
///         .ok_or_else(|| StorageError::not_found(EntityType::Obs, id))
/// }
/// ```
#[async_trait]
pub trait EntityStore: Send + Sync {
    // ==================== Query ====================

    /// Runs a filtered query over one entity type.
    ///
    /// Ordering is applied before `page`; `total` counts every entity matching
    /// `constraints` regardless of pagination.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidEntity` when a constraint references an
    /// unknown join. Returns an error for infrastructure issues.
    async fn query(
        &self,
        entity_type: EntityType,
        constraints: &ConstraintSet,
        sort: &[SortKey],
        page: PageRequest,
    ) -> Result<StoredPage, StorageError>;

    /// Fetches every entity of `entity_type` whose id is in `ids`.
    ///
    /// Missing ids are skipped. The result is ordered by id.
    async fn batch_fetch_by_ids(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> Result<Vec<Entity>, StorageError>;

    /// Fetches entities of `entity_type` whose reference `field` points at any
    /// id in `ids`, grouped by the referenced id.
    ///
    /// An entity referencing several of the ids appears under each of them.
    /// Entities within a group are ordered by id.
    async fn batch_fetch_by_reference_field(
        &self,
        entity_type: EntityType,
        field: &str,
        ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Entity>>, StorageError>;

    // ==================== Single entity ====================

    /// Reads an entity by type and ID.
    ///
    /// Returns `None` if the entity does not exist or is voided.
    async fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<Entity>, StorageError>;

    /// Stores a new entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if an entity with the same type and ID exists.
    async fn create(&self, entity: Entity) -> Result<Entity, StorageError>;

    /// Voids an entity so it no longer appears in reads.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the entity does not exist.
    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), StorageError>;

    // ==================== Metadata ====================

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
