mod common;

use std::sync::Arc;

use common::{clinic_service, encounter, ids, observation, patient, service_over};
use fhirbridge_db_memory::InMemoryStore;
use fhirbridge_search::{
    LastNSearchParams, ParamValue, PlatformProfile, ReferenceParam, SearchConfig, SearchError,
    SearchService,
};
use tokio_util::sync::CancellationToken;

fn for_patient(id: &str, max: Option<usize>) -> LastNSearchParams {
    LastNSearchParams {
        max,
        patient: Some(ReferenceParam::id(id).into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_default_max_returns_latest_observation() {
    let service = clinic_service();
    let latest = service
        .last_n(&for_patient("p1", None), &CancellationToken::new())
        .await
        .expect("last-n");
    assert_eq!(ids(&latest), vec!["o06"]);
}

#[tokio::test]
async fn test_last_n_applies_code_filter_across_patients() {
    let service = clinic_service();
    let params = LastNSearchParams {
        max: Some(3),
        code: Some(ParamValue::token("8480-6").into()),
        ..Default::default()
    };
    let latest = service
        .last_n(&params, &CancellationToken::new())
        .await
        .expect("last-n");
    assert_eq!(ids(&latest), vec!["o12", "o10", "o08"]);
}

#[tokio::test]
async fn test_by_encounter_keeps_every_observation_of_recent_encounters() {
    // E1 closes on day 3, E2 on day 6 and E3 on day 5, each with its own spread.
    let store = InMemoryStore::with_entities([
        patient("p1", "Smith", "Jane"),
        encounter("E1", "p1", 1),
        encounter("E2", "p1", 4),
        encounter("E3", "p1", 5),
        observation("e1-a", "p1", Some("E1"), "8480-6", 1),
        observation("e1-b", "p1", Some("E1"), "8480-6", 3),
        observation("e2-a", "p1", Some("E2"), "8480-6", 4),
        observation("e2-b", "p1", Some("E2"), "8480-6", 6),
        observation("e3-a", "p1", Some("E3"), "8480-6", 5),
        observation("loose", "p1", None, "8480-6", 9),
    ]);
    let service = service_over(Arc::new(store), PlatformProfile::Core);

    let ranked = service
        .last_n_by_encounter(&for_patient("p1", Some(2)), &CancellationToken::new())
        .await
        .expect("last-n by encounter");

    assert_eq!(ids(&ranked), vec!["e2-b", "e3-a", "e2-a"]);
}

#[tokio::test]
async fn test_by_encounter_ranks_across_patients_without_subject() {
    let service = clinic_service();
    let params = LastNSearchParams {
        max: Some(2),
        ..Default::default()
    };

    let ranked = service
        .last_n_by_encounter(&params, &CancellationToken::new())
        .await
        .expect("last-n by encounter");

    // e3 (p2) and e2 (p1); p3's observations have no encounter.
    assert_eq!(
        ids(&ranked),
        vec!["o10", "o09", "o08", "o07", "o06", "o05"]
    );
}

#[tokio::test]
async fn test_configured_default_max_applies() {
    let config = SearchConfig::from_toml_str("last_n_default_max = 2").expect("config");
    let store = Arc::new(InMemoryStore::with_entities(common::clinic()));
    let service = SearchService::new(store, config).expect("service");

    let ranked = service
        .last_n_by_encounter(&for_patient("p1", None), &CancellationToken::new())
        .await
        .expect("last-n by encounter");
    assert_eq!(ids(&ranked), vec!["o06", "o05", "o04", "o03", "o02", "o01"]);
}

#[tokio::test]
async fn test_zero_max_is_rejected() {
    let service = clinic_service();
    let cancel = CancellationToken::new();

    let err = service
        .last_n(&for_patient("p1", Some(0)), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidValue(_)));

    let err = service
        .last_n_by_encounter(&for_patient("p1", Some(0)), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidValue(_)));
}
