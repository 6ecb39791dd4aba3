//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fhirbridge_core::{Entity, EntityType, FhirDateTime, FieldValue, fields};
use fhirbridge_db_memory::InMemoryStore;
use fhirbridge_search::{PlatformProfile, SearchConfig, SearchService};
use fhirbridge_storage::{
    ConstraintSet, EntityStore, PageRequest, SortKey, StorageError, StoredPage,
};

/// Midnight UTC on the given day of January 2024.
pub fn day(n: u8) -> FhirDateTime {
    format!("2024-01-{n:02}T00:00:00Z")
        .parse()
        .expect("valid fixture date")
}

pub fn patient(id: &str, family: &str, given: &str) -> Entity {
    Entity::new(EntityType::Person, id)
        .with_date_changed(day(1))
        .with_field(fields::person::FAMILY_NAME, FieldValue::text(family))
        .with_field(fields::person::GIVEN_NAME, FieldValue::text(given))
        .with_field(
            fields::person::IDENTIFIER,
            FieldValue::coded(Some("urn:mrn"), format!("MRN-{id}")),
        )
}

pub fn encounter(id: &str, patient: &str, on: u8) -> Entity {
    Entity::new(EntityType::Encounter, id)
        .with_date_changed(day(on))
        .with_field(
            fields::encounter::PATIENT,
            FieldValue::reference(EntityType::Person, patient),
        )
        .with_field(fields::encounter::ENCOUNTER_DATETIME, FieldValue::DateTime(day(on)))
        .with_field(
            fields::encounter::ENCOUNTER_TYPE,
            FieldValue::coded(None, "outpatient"),
        )
}

/// An observation taken on `on`, last changed on `on` as well.
pub fn observation(id: &str, patient: &str, encounter: Option<&str>, code: &str, on: u8) -> Entity {
    let mut entity = Entity::new(EntityType::Obs, id)
        .with_date_changed(day(on))
        .with_field(
            fields::obs::PERSON,
            FieldValue::reference(EntityType::Person, patient),
        )
        .with_field(fields::obs::CONCEPT, FieldValue::coded(Some("http://loinc.org"), code))
        .with_field(fields::obs::CATEGORY, FieldValue::coded(None, "vital-signs"))
        .with_field(fields::obs::OBS_DATETIME, FieldValue::DateTime(day(on)));
    if let Some(encounter) = encounter {
        entity.set_field(
            fields::obs::ENCOUNTER,
            FieldValue::reference(EntityType::Encounter, encounter),
        );
    }
    entity
}

/// Three patients, three encounters and twelve observations, one per day.
///
/// - p1 Jane Smith: e1 (o01-o04), e2 (o05-o06)
/// - p2 Bob Jones: e3 (o07-o10)
/// - p3 Adam Smith: o11, o12 without encounter
pub fn clinic() -> Vec<Entity> {
    let mut entities = vec![
        patient("p1", "Smith", "Jane"),
        patient("p2", "Jones", "Bob"),
        patient("p3", "Smith", "Adam"),
        encounter("e1", "p1", 1),
        encounter("e2", "p1", 5),
        encounter("e3", "p2", 7),
    ];
    for n in 1..=12u8 {
        let (patient, encounter) = match n {
            1..=4 => ("p1", Some("e1")),
            5..=6 => ("p1", Some("e2")),
            7..=10 => ("p2", Some("e3")),
            _ => ("p3", None),
        };
        let code = if n % 2 == 0 { "8480-6" } else { "8462-4" };
        entities.push(observation(&format!("o{n:02}"), patient, encounter, code, n));
    }
    entities
}

pub fn service_over(store: Arc<dyn EntityStore>, profile: PlatformProfile) -> SearchService {
    let config = SearchConfig {
        profile,
        ..SearchConfig::default()
    };
    SearchService::new(store, config).expect("valid config")
}

pub fn clinic_service() -> SearchService {
    service_over(
        Arc::new(InMemoryStore::with_entities(clinic())),
        PlatformProfile::Core,
    )
}

/// Ids of exchange resources in order.
pub fn ids(resources: &[serde_json::Value]) -> Vec<String> {
    resources
        .iter()
        .map(|r| r["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Delegates to an in-memory store but fails the lookups it is told to.
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    pub inner: InMemoryStore,
    pub fail_by_ids: bool,
    pub fail_by_reference: bool,
}

#[async_trait]
impl EntityStore for FailingStore {
    async fn query(
        &self,
        entity_type: EntityType,
        constraints: &ConstraintSet,
        sort: &[SortKey],
        page: PageRequest,
    ) -> Result<StoredPage, StorageError> {
        self.inner.query(entity_type, constraints, sort, page).await
    }

    async fn batch_fetch_by_ids(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> Result<Vec<Entity>, StorageError> {
        if self.fail_by_ids {
            return Err(StorageError::connection_error("id lookup unavailable"));
        }
        self.inner.batch_fetch_by_ids(entity_type, ids).await
    }

    async fn batch_fetch_by_reference_field(
        &self,
        entity_type: EntityType,
        field: &str,
        ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Entity>>, StorageError> {
        if self.fail_by_reference {
            return Err(StorageError::timeout("reverse lookup timed out"));
        }
        self.inner
            .batch_fetch_by_reference_field(entity_type, field, ids)
            .await
    }

    async fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<Entity>, StorageError> {
        self.inner.get(entity_type, id).await
    }

    async fn create(&self, entity: Entity) -> Result<Entity, StorageError> {
        self.inner.create(entity).await
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), StorageError> {
        self.inner.delete(entity_type, id).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
