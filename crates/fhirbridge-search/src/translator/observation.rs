use fhirbridge_core::{Entity, EntityType, FieldValue, ResourceType, fields::obs};
use serde_json::{Value, json};

use super::codec::{
    ResourceReader, ResourceWriter, concept_array, concept_value, datetime_value, expect_entity,
    reference_array, reference_value, set, text_value,
};
use super::{TranslationError, Translator};

#[derive(Debug, Clone, Copy, Default)]
pub struct ObservationTranslator;

fn quantity_value(entity: &Entity) -> Option<Value> {
    match entity.field(obs::VALUE_NUMERIC)? {
        FieldValue::Quantity(q) => Some(match &q.unit {
            Some(unit) => json!({"value": q.value, "unit": unit}),
            None => json!({"value": q.value}),
        }),
        FieldValue::Number(n) => Some(json!({"value": n})),
        _ => None,
    }
}

impl Translator for ObservationTranslator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Observation
    }

    fn to_exchange(&self, entity: &Entity) -> Result<Value, TranslationError> {
        expect_entity(entity, EntityType::Obs)?;
        let mut resource = ResourceWriter::new(ResourceType::Observation, entity);
        resource
            .put("status", Some(json!("final")))
            .put("category", concept_array(entity, obs::CATEGORY))
            .put("code", concept_value(entity, obs::CONCEPT))
            .put("subject", reference_value(entity, obs::PERSON))
            .put("encounter", reference_value(entity, obs::ENCOUNTER))
            .put("effectiveDateTime", datetime_value(entity, obs::OBS_DATETIME))
            .put("valueQuantity", quantity_value(entity))
            .put("valueCodeableConcept", concept_value(entity, obs::VALUE_CODED))
            .put("valueDateTime", datetime_value(entity, obs::VALUE_DATETIME))
            .put("valueString", text_value(entity, obs::VALUE_TEXT))
            .put("hasMember", reference_array(entity, obs::GROUP_MEMBERS));
        Ok(resource.finish())
    }

    fn to_domain(&self, resource: &Value) -> Result<Entity, TranslationError> {
        let reader = ResourceReader::new(ResourceType::Observation, resource)?;
        let mut entity = reader.entity()?;

        let concept = reader.concept("code")?.ok_or_else(|| reader.missing("code"))?;
        entity.set_field(obs::CONCEPT, concept);
        set(&mut entity, obs::CATEGORY, reader.concepts("category")?);
        set(
            &mut entity,
            obs::PERSON,
            reader.reference("subject", &[ResourceType::Patient])?,
        );
        set(
            &mut entity,
            obs::ENCOUNTER,
            reader.reference("encounter", &[ResourceType::Encounter])?,
        );
        set(&mut entity, obs::OBS_DATETIME, reader.datetime("effectiveDateTime")?);
        set(&mut entity, obs::VALUE_NUMERIC, reader.quantity("valueQuantity")?);
        set(&mut entity, obs::VALUE_CODED, reader.concept("valueCodeableConcept")?);
        set(&mut entity, obs::VALUE_DATETIME, reader.datetime("valueDateTime")?);
        set(
            &mut entity,
            obs::VALUE_TEXT,
            reader.string("valueString")?.map(FieldValue::Text),
        );
        set(
            &mut entity,
            obs::GROUP_MEMBERS,
            reader.references("hasMember", &[ResourceType::Observation])?,
        );
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blood_pressure() -> Value {
        json!({
            "resourceType": "Observation",
            "id": "o1",
            "status": "final",
            "category": [{"coding": [{"system": "urn:cat", "code": "vital-signs"}]}],
            "code": {"coding": [{"system": "http://loinc.org", "code": "8480-6", "display": "Systolic"}]},
            "subject": {"reference": "Patient/p1"},
            "encounter": {"reference": "Encounter/e1"},
            "effectiveDateTime": "2024-03-01T08:00:00Z",
            "valueQuantity": {"value": 120.0, "unit": "mm[Hg]"},
            "hasMember": [{"reference": "Observation/o2"}, {"reference": "Observation/o3"}]
        })
    }

    #[test]
    fn test_observation_to_domain() {
        let entity = ObservationTranslator.to_domain(&blood_pressure()).unwrap();
        assert_eq!(entity.entity_type, EntityType::Obs);
        assert_eq!(
            entity.field(obs::PERSON),
            Some(&FieldValue::reference(EntityType::Person, "p1"))
        );
        assert_eq!(
            entity.field(obs::VALUE_NUMERIC),
            Some(&FieldValue::quantity(120.0, Some("mm[Hg]")))
        );
        let members: Vec<&str> = entity
            .references(obs::GROUP_MEMBERS)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(members, vec!["o2", "o3"]);
        assert!(entity.datetime(obs::OBS_DATETIME).is_some());
    }

    #[test]
    fn test_observation_to_exchange() {
        let entity = ObservationTranslator.to_domain(&blood_pressure()).unwrap();
        let resource = ObservationTranslator.to_exchange(&entity).unwrap();
        assert_eq!(resource["code"]["coding"][0]["code"], "8480-6");
        assert_eq!(resource["code"]["coding"][0]["display"], "Systolic");
        assert_eq!(resource["category"][0]["coding"][0]["code"], "vital-signs");
        assert_eq!(resource["encounter"]["reference"], "Encounter/e1");
        assert_eq!(resource["valueQuantity"], json!({"value": 120.0, "unit": "mm[Hg]"}));
        assert_eq!(resource["hasMember"][1]["reference"], "Observation/o3");
        assert_eq!(resource["effectiveDateTime"], "2024-03-01T08:00:00Z");
        assert!(resource.get("valueString").is_none());
    }

    #[test]
    fn test_code_is_required() {
        let err = ObservationTranslator
            .to_domain(&json!({"resourceType": "Observation", "id": "o9"}))
            .unwrap_err();
        assert!(matches!(err, TranslationError::MissingField { field: "code", .. }));
    }

    #[test]
    fn test_unresolvable_reference() {
        let mut resource = blood_pressure();
        resource["subject"] = json!({"reference": "urn:uuid:1234"});
        let err = ObservationTranslator.to_domain(&resource).unwrap_err();
        assert!(matches!(err, TranslationError::Core(_)));
    }
}
