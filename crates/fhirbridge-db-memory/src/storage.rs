use crate::query::{Matcher, compare_entities};
use fhirbridge_core::{Entity, EntityKey, EntityRef, EntityType};
use fhirbridge_storage::{ConstraintSet, PageRequest, SortKey, StorageError, StoredPage};
use papaya::HashMap as PapayaHashMap;
use std::sync::Arc;

pub(crate) fn make_key(entity_type: EntityType, id: &str) -> EntityKey {
    EntityKey {
        entity_type,
        id: id.to_string(),
    }
}

/// In-memory clinical store backed by a papaya lock-free HashMap.
///
/// Deletes void the entity rather than removing it, so voided rows stay in the
/// map but never appear in reads.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    pub(crate) data: Arc<PapayaHashMap<EntityKey, Entity>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-populated with `entities`, replacing duplicates.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        {
            let guard = store.data.pin();
            for entity in entities {
                guard.insert(entity.key(), entity);
            }
        }
        store
    }

    /// Inserts or replaces an entity without conflict checks.
    pub fn put(&self, entity: Entity) {
        let guard = self.data.pin();
        guard.insert(entity.key(), entity);
    }

    /// Number of live (non-voided) entities of `entity_type`.
    pub fn count(&self, entity_type: EntityType) -> usize {
        let guard = self.data.pin();
        guard
            .iter()
            .filter(|(key, entity)| key.entity_type == entity_type && !entity.voided)
            .count()
    }

    pub(crate) fn get_live(&self, entity_type: EntityType, id: &str) -> Option<Entity> {
        let guard = self.data.pin();
        guard
            .get(&make_key(entity_type, id))
            .filter(|entity| !entity.voided)
            .cloned()
    }

    pub(crate) fn run_query(
        &self,
        entity_type: EntityType,
        constraints: &ConstraintSet,
        sort: &[SortKey],
        page: PageRequest,
    ) -> Result<StoredPage, StorageError> {
        let guard = self.data.pin();
        let lookup = |r: &EntityRef| {
            guard
                .get(&make_key(r.entity_type, &r.id))
                .filter(|entity| !entity.voided)
        };
        let matcher = Matcher::new(constraints, lookup);

        let mut matching = Vec::new();
        for (key, entity) in guard.iter() {
            if key.entity_type != entity_type || entity.voided {
                continue;
            }
            if matcher.matches(entity)? {
                matching.push(entity.clone());
            }
        }

        matching.sort_by(|a, b| compare_entities(a, b, sort));

        let total = matching.len();
        let entities = if page.offset < total {
            let rest = matching.into_iter().skip(page.offset);
            match page.limit {
                Some(limit) => rest.take(limit).collect(),
                None => rest.collect(),
            }
        } else {
            Vec::new()
        };

        Ok(StoredPage { entities, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirbridge_core::{FieldValue, fields};
    use fhirbridge_storage::{Constraint, SortField};

    fn obs(id: &str, patient: &str) -> Entity {
        Entity::new(EntityType::Obs, id)
            .with_field(fields::obs::PERSON, FieldValue::reference(EntityType::Person, patient))
    }

    #[test]
    fn test_query_filters_paginates_and_counts() {
        let store = InMemoryStore::with_entities([
            obs("o1", "p1"),
            obs("o2", "p1"),
            obs("o3", "p2"),
            obs("o4", "p1"),
        ]);

        let mut set = ConstraintSet::new();
        set.push(Constraint::References {
            field: fields::obs::PERSON.to_string(),
            target_type: Some(EntityType::Person),
            ids: vec!["p1".to_string()],
        });

        let page = store
            .run_query(
                EntityType::Obs,
                &set,
                &[SortKey::descending(SortField::Id)],
                PageRequest::new(1, 1),
            )
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.entities.len(), 1);
        assert_eq!(page.entities[0].id, "o2");
    }

    #[test]
    fn test_voided_entities_are_invisible() {
        let mut voided = obs("o2", "p1");
        voided.voided = true;
        let store = InMemoryStore::with_entities([obs("o1", "p1"), voided]);

        let page = store
            .run_query(
                EntityType::Obs,
                &ConstraintSet::new(),
                &[SortKey::id_ascending()],
                PageRequest::unbounded(),
            )
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(store.get_live(EntityType::Obs, "o2").is_none());
        assert_eq!(store.count(EntityType::Obs), 1);
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let store = InMemoryStore::with_entities([obs("o1", "p1")]);
        let page = store
            .run_query(
                EntityType::Obs,
                &ConstraintSet::new(),
                &[],
                PageRequest::new(5, 10),
            )
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total, 1);
    }
}
