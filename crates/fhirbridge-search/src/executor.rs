//! Runs query descriptors against the store.

use std::future::Future;

use fhirbridge_core::{Entity, EntityKey};
use fhirbridge_storage::{DynStore, StorageError};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::builder::QueryDescriptor;
use crate::error::SearchError;

/// One page of matches plus the side table of included entities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub entities: Vec<Entity>,
    /// Matches across all pages, computed with the same filters.
    pub total: usize,
    pub included: IndexMap<EntityKey, Entity>,
}

impl ResultPage {
    pub fn ids(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.id.clone()).collect()
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.find(key).is_some()
    }

    pub fn find(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.entity_type == key.entity_type && e.id == key.id)
    }

    /// Add an included entity unless it is already on the page or included.
    pub fn include(&mut self, entity: Entity) -> bool {
        let key = entity.key();
        if self.contains(&key) || self.included.contains_key(&key) {
            return false;
        }
        self.included.insert(key, entity);
        true
    }
}

/// Race a storage call against cancellation.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, SearchError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!("storage call cancelled");
            Err(SearchError::Cancelled)
        }
        result = call => result.map_err(SearchError::from),
    }
}

#[derive(Clone)]
pub struct QueryExecutor {
    store: DynStore,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl QueryExecutor {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub async fn execute(
        &self,
        descriptor: &QueryDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResultPage, SearchError> {
        let stored = cancellable(
            cancel,
            self.store.query(
                descriptor.entity_type,
                &descriptor.constraints,
                &descriptor.sort,
                descriptor.page,
            ),
        )
        .await?;

        tracing::debug!(
            resource_type = %descriptor.resource_type,
            backend = self.store.backend_name(),
            total = stored.total,
            returned = stored.entities.len(),
            "executed query"
        );

        Ok(ResultPage {
            entities: stored.entities,
            total: stored.total,
            included: IndexMap::new(),
        })
    }

    /// Every match in descriptor order, ignoring its page.
    pub async fn execute_unpaged(
        &self,
        descriptor: &QueryDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entity>, SearchError> {
        let page = self.execute(&descriptor.unpaged(), cancel).await?;
        Ok(page.entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirbridge_core::EntityType;

    #[test]
    fn test_include_skips_page_members_and_duplicates() {
        let mut page = ResultPage {
            entities: vec![Entity::new(EntityType::Obs, "o1")],
            total: 1,
            included: IndexMap::new(),
        };
        assert!(!page.include(Entity::new(EntityType::Obs, "o1")));
        assert!(page.include(Entity::new(EntityType::Person, "p1")));
        assert!(!page.include(Entity::new(EntityType::Person, "p1")));
        assert!(page.include(Entity::new(EntityType::Person, "o1")));
        assert_eq!(page.included.len(), 2);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), SearchError> =
            tokio_test::block_on(cancellable(&cancel, std::future::pending()));
        assert!(matches!(result, Err(SearchError::Cancelled)));
    }

    #[test]
    fn test_storage_error_propagates() {
        let cancel = CancellationToken::new();
        let result: Result<(), SearchError> = tokio_test::block_on(cancellable(&cancel, async {
            Err(StorageError::timeout("slow"))
        }));
        assert!(matches!(result, Err(SearchError::Storage(StorageError::Timeout { .. }))));
    }
}
