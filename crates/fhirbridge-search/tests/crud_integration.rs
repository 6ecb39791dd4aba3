mod common;

use std::sync::Arc;

use common::{clinic, clinic_service, ids, service_over};
use fhirbridge_core::ResourceType;
use fhirbridge_db_memory::InMemoryStore;
use fhirbridge_search::{
    ObservationSearchParams, ParamValue, ParameterMap, PlatformProfile, SearchError,
};
use fhirbridge_storage::{PageRequest, StorageError};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn heart_rate(id: Option<&str>) -> serde_json::Value {
    let mut resource = json!({
        "resourceType": "Observation",
        "status": "final",
        "code": {"coding": [{"system": "http://loinc.org", "code": "8867-4"}]},
        "subject": {"reference": "Patient/p1"},
        "encounter": {"reference": "Encounter/e2"},
        "effectiveDateTime": "2024-01-15T08:30:00Z",
        "valueQuantity": {"value": 72.0, "unit": "/min"}
    });
    if let Some(id) = id {
        resource["id"] = json!(id);
    }
    resource
}

#[tokio::test]
async fn test_created_resource_reads_back() {
    let service = clinic_service();
    let cancel = CancellationToken::new();

    let created = service
        .create(ResourceType::Observation, &heart_rate(Some("hr1")), &cancel)
        .await
        .expect("create");
    assert_eq!(created["id"], "hr1");
    assert!(created["meta"]["lastUpdated"].is_string());

    let read = service
        .read(ResourceType::Observation, "hr1", &cancel)
        .await
        .expect("read");
    assert_eq!(read, created);
    assert_eq!(read["code"]["coding"][0]["code"], "8867-4");
    assert_eq!(read["subject"]["reference"], "Patient/p1");
    assert_eq!(read["valueQuantity"]["value"], 72.0);
}

#[tokio::test]
async fn test_created_resource_is_searchable() {
    let service = clinic_service();
    let cancel = CancellationToken::new();

    let created = service
        .create(ResourceType::Observation, &heart_rate(None), &cancel)
        .await
        .expect("create");
    let id = created["id"].as_str().expect("assigned id").to_string();
    assert!(!id.is_empty());

    let params = ObservationSearchParams {
        code: Some(ParamValue::token("8867-4").into()),
        ..Default::default()
    };
    let bundle = service
        .search_observations(&params, PageRequest::default(), &cancel)
        .await
        .expect("search");
    assert_eq!(ids(&bundle.matches), vec![id]);
}

#[tokio::test]
async fn test_duplicate_create_is_a_storage_conflict() {
    let service = clinic_service();
    let cancel = CancellationToken::new();
    service
        .create(ResourceType::Observation, &heart_rate(Some("hr1")), &cancel)
        .await
        .expect("first create");

    let err = service
        .create(ResourceType::Observation, &heart_rate(Some("hr1")), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::Storage(StorageError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_invalid_resource_is_a_translation_error() {
    let service = clinic_service();
    let mut resource = heart_rate(None);
    resource.as_object_mut().expect("object").remove("code");

    let err = service
        .create(ResourceType::Observation, &resource, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Translation(_)));
}

#[tokio::test]
async fn test_missing_entity_is_not_found() {
    let service = clinic_service();
    let err = service
        .read(ResourceType::Patient, "nobody", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::NotFound {
            resource_type: ResourceType::Patient,
            ..
        }
    ));
}

#[tokio::test]
async fn test_deleted_entity_leaves_search_and_read() {
    let service = clinic_service();
    let cancel = CancellationToken::new();

    service
        .delete(ResourceType::Observation, "o12", &cancel)
        .await
        .expect("delete");

    let bundle = service
        .search(
            ResourceType::Observation,
            &ParameterMap::new(),
            None,
            PageRequest::first(100),
            &cancel,
        )
        .await
        .expect("search");
    assert_eq!(bundle.total, 11);
    assert!(!ids(&bundle.matches).contains(&"o12".to_string()));

    let err = service
        .read(ResourceType::Observation, "o12", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::NotFound { .. }));

    let err = service
        .delete(ResourceType::Observation, "o12", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::NotFound { .. }));
}

#[tokio::test]
async fn test_unsupported_profile_rejects_dispense_writes() {
    let service = service_over(
        Arc::new(InMemoryStore::with_entities(clinic())),
        PlatformProfile::Core,
    );
    let dispense = json!({
        "resourceType": "MedicationDispense",
        "status": "completed",
        "medicationCodeableConcept": {"coding": [{"code": "amox"}]},
    });

    let err = service
        .create(ResourceType::MedicationDispense, &dispense, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::UnsupportedResource(_)));
}
