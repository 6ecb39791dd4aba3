//! Implementation of the EntityStore trait for InMemoryStore.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use fhirbridge_core::{Entity, EntityType};
use fhirbridge_storage::{
    ConstraintSet, EntityStore, PageRequest, SortKey, StorageError, StoredPage,
};

use crate::storage::{InMemoryStore, make_key};

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn query(
        &self,
        entity_type: EntityType,
        constraints: &ConstraintSet,
        sort: &[SortKey],
        page: PageRequest,
    ) -> Result<StoredPage, StorageError> {
        let result = self.run_query(entity_type, constraints, sort, page)?;
        tracing::debug!(
            entity_type = %entity_type,
            constraints = constraints.len(),
            total = result.total,
            returned = result.len(),
            "memory query"
        );
        Ok(result)
    }

    async fn batch_fetch_by_ids(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> Result<Vec<Entity>, StorageError> {
        let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let guard = self.data.pin();
        let found: Vec<Entity> = wanted
            .into_iter()
            .filter_map(|id| guard.get(&make_key(entity_type, id)))
            .filter(|entity| !entity.voided)
            .cloned()
            .collect();
        Ok(found)
    }

    async fn batch_fetch_by_reference_field(
        &self,
        entity_type: EntityType,
        field: &str,
        ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Entity>>, StorageError> {
        let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let mut grouped: BTreeMap<String, Vec<Entity>> = BTreeMap::new();

        let guard = self.data.pin();
        for (key, entity) in guard.iter() {
            if key.entity_type != entity_type || entity.voided {
                continue;
            }
            let targets: BTreeSet<&str> = entity
                .references(field)
                .map(|r| r.id.as_str())
                .filter(|id| wanted.contains(id))
                .collect();
            for target in targets {
                grouped
                    .entry(target.to_string())
                    .or_default()
                    .push(entity.clone());
            }
        }

        for group in grouped.values_mut() {
            group.sort_by(|a, b| a.id.cmp(&b.id));
        }
        Ok(grouped)
    }

    async fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<Entity>, StorageError> {
        Ok(self.get_live(entity_type, id))
    }

    async fn create(&self, entity: Entity) -> Result<Entity, StorageError> {
        let key = entity.key();
        let guard = self.data.pin();
        if guard.get(&key).is_some() {
            return Err(StorageError::already_exists(entity.entity_type, &entity.id));
        }
        guard.insert(key, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), StorageError> {
        let key = make_key(entity_type, id);
        let guard = self.data.pin();
        let mut entity = match guard.get(&key) {
            Some(existing) if !existing.voided => existing.clone(),
            _ => return Err(StorageError::not_found(entity_type, id)),
        };
        entity.voided = true;
        entity.date_changed = fhirbridge_core::now_utc();
        guard.insert(key, entity);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
