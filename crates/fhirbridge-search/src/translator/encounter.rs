use fhirbridge_core::{Entity, EntityType, ResourceType, fields::encounter};
use serde_json::{Value, json};

use super::codec::{
    ResourceReader, ResourceWriter, concept_array, datetime_value, expect_entity, reference_value,
    set,
};
use super::{TranslationError, Translator};

#[derive(Debug, Clone, Copy, Default)]
pub struct EncounterTranslator;

impl Translator for EncounterTranslator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Encounter
    }

    fn to_exchange(&self, entity: &Entity) -> Result<Value, TranslationError> {
        expect_entity(entity, EntityType::Encounter)?;
        let period = datetime_value(entity, encounter::ENCOUNTER_DATETIME)
            .map(|start| json!({ "start": start }));
        let mut resource = ResourceWriter::new(ResourceType::Encounter, entity);
        resource
            .put("status", Some(json!("finished")))
            .put("type", concept_array(entity, encounter::ENCOUNTER_TYPE))
            .put("subject", reference_value(entity, encounter::PATIENT))
            .put("period", period);
        Ok(resource.finish())
    }

    fn to_domain(&self, resource: &Value) -> Result<Entity, TranslationError> {
        let reader = ResourceReader::new(ResourceType::Encounter, resource)?;
        let mut entity = reader.entity()?;
        set(&mut entity, encounter::ENCOUNTER_TYPE, reader.concepts("type")?);
        set(
            &mut entity,
            encounter::PATIENT,
            reader.reference("subject", &[ResourceType::Patient])?,
        );
        set(
            &mut entity,
            encounter::ENCOUNTER_DATETIME,
            reader.nested_datetime("period", "start")?,
        );
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirbridge_core::FieldValue;

    #[test]
    fn test_encounter_roundtrip_shape() {
        let resource = json!({
            "resourceType": "Encounter",
            "id": "e1",
            "type": [{"coding": [{"code": "outpatient"}]}],
            "subject": {"reference": "Patient/p1"},
            "period": {"start": "2024-01-02T09:30:00Z"}
        });
        let entity = EncounterTranslator.to_domain(&resource).unwrap();
        assert_eq!(
            entity.field(encounter::PATIENT),
            Some(&FieldValue::reference(EntityType::Person, "p1"))
        );
        assert_eq!(
            entity.field(encounter::ENCOUNTER_TYPE),
            Some(&FieldValue::coded(None, "outpatient"))
        );

        let exchanged = EncounterTranslator.to_exchange(&entity).unwrap();
        assert_eq!(exchanged["subject"]["reference"], "Patient/p1");
        assert_eq!(exchanged["type"][0]["coding"][0]["code"], "outpatient");
        assert_eq!(exchanged["period"]["start"], "2024-01-02T09:30:00Z");
    }

    #[test]
    fn test_subject_must_be_patient() {
        let err = EncounterTranslator
            .to_domain(&json!({
                "resourceType": "Encounter",
                "subject": {"reference": "Observation/o1"}
            }))
            .unwrap_err();
        assert!(matches!(err, TranslationError::InvalidField { .. }));
    }
}
