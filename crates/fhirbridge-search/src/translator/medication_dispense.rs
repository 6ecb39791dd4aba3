use fhirbridge_core::{Entity, EntityType, ResourceType, fields::medication_dispense as dispense};
use serde_json::Value;

use super::codec::{
    ResourceReader, ResourceWriter, code_value, concept_value, datetime_value, expect_entity,
    reference_value, set,
};
use super::{TranslationError, Translator};

#[derive(Debug, Clone, Copy, Default)]
pub struct MedicationDispenseTranslator;

impl Translator for MedicationDispenseTranslator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::MedicationDispense
    }

    fn to_exchange(&self, entity: &Entity) -> Result<Value, TranslationError> {
        expect_entity(entity, EntityType::MedicationDispense)?;
        let mut resource = ResourceWriter::new(ResourceType::MedicationDispense, entity);
        resource
            .put("status", code_value(entity, dispense::STATUS))
            .put(
                "medicationCodeableConcept",
                concept_value(entity, dispense::MEDICATION),
            )
            .put("subject", reference_value(entity, dispense::PATIENT))
            .put("whenHandedOver", datetime_value(entity, dispense::WHEN_HANDED_OVER));
        Ok(resource.finish())
    }

    fn to_domain(&self, resource: &Value) -> Result<Entity, TranslationError> {
        let reader = ResourceReader::new(ResourceType::MedicationDispense, resource)?;
        let mut entity = reader.entity()?;
        let status = reader.code("status")?.ok_or_else(|| reader.missing("status"))?;
        entity.set_field(dispense::STATUS, status);
        let medication = reader
            .concept("medicationCodeableConcept")?
            .ok_or_else(|| reader.missing("medicationCodeableConcept"))?;
        entity.set_field(dispense::MEDICATION, medication);
        set(
            &mut entity,
            dispense::PATIENT,
            reader.reference("subject", &[ResourceType::Patient])?,
        );
        set(
            &mut entity,
            dispense::WHEN_HANDED_OVER,
            reader.datetime("whenHandedOver")?,
        );
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirbridge_core::FieldValue;
    use serde_json::json;

    #[test]
    fn test_dispense_roundtrip() {
        let resource = json!({
            "resourceType": "MedicationDispense",
            "id": "md1",
            "status": "completed",
            "medicationCodeableConcept": {"coding": [{"system": "urn:rx", "code": "amox"}]},
            "subject": {"reference": "Patient/p1"},
            "whenHandedOver": "2024-04-04T15:00:00Z"
        });
        let entity = MedicationDispenseTranslator.to_domain(&resource).unwrap();
        assert_eq!(
            entity.field(dispense::STATUS),
            Some(&FieldValue::coded(None, "completed"))
        );

        let exchanged = MedicationDispenseTranslator.to_exchange(&entity).unwrap();
        assert_eq!(exchanged["status"], "completed");
        assert_eq!(exchanged["medicationCodeableConcept"]["coding"][0]["code"], "amox");
        assert_eq!(exchanged["whenHandedOver"], "2024-04-04T15:00:00Z");
    }

    #[test]
    fn test_status_is_required() {
        let err = MedicationDispenseTranslator
            .to_domain(&json!({
                "resourceType": "MedicationDispense",
                "medicationCodeableConcept": {"coding": [{"code": "amox"}]}
            }))
            .unwrap_err();
        assert!(matches!(err, TranslationError::MissingField { field: "status", .. }));
    }
}
