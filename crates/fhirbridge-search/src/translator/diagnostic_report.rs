use fhirbridge_core::{Entity, EntityType, ResourceType, fields::diagnostic_report as report};
use serde_json::{Value, json};

use super::codec::{
    ResourceReader, ResourceWriter, concept_value, datetime_value, expect_entity, reference_array,
    reference_value, set,
};
use super::{TranslationError, Translator};

#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticReportTranslator;

impl Translator for DiagnosticReportTranslator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::DiagnosticReport
    }

    fn to_exchange(&self, entity: &Entity) -> Result<Value, TranslationError> {
        expect_entity(entity, EntityType::DiagnosticReport)?;
        let mut resource = ResourceWriter::new(ResourceType::DiagnosticReport, entity);
        resource
            .put("status", Some(json!("final")))
            .put("code", concept_value(entity, report::CODE))
            .put("subject", reference_value(entity, report::SUBJECT))
            .put("issued", datetime_value(entity, report::ISSUED))
            .put("result", reference_array(entity, report::RESULTS));
        Ok(resource.finish())
    }

    fn to_domain(&self, resource: &Value) -> Result<Entity, TranslationError> {
        let reader = ResourceReader::new(ResourceType::DiagnosticReport, resource)?;
        let mut entity = reader.entity()?;
        let code = reader.concept("code")?.ok_or_else(|| reader.missing("code"))?;
        entity.set_field(report::CODE, code);
        set(
            &mut entity,
            report::SUBJECT,
            reader.reference("subject", &[ResourceType::Patient])?,
        );
        set(&mut entity, report::ISSUED, reader.datetime("issued")?);
        set(
            &mut entity,
            report::RESULTS,
            reader.references("result", &[ResourceType::Observation])?,
        );
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_roundtrip() {
        let resource = json!({
            "resourceType": "DiagnosticReport",
            "id": "r1",
            "code": {"coding": [{"code": "panel"}]},
            "subject": {"reference": "Patient/p1"},
            "issued": "2024-02-02T12:00:00Z",
            "result": [{"reference": "Observation/o1"}]
        });
        let entity = DiagnosticReportTranslator.to_domain(&resource).unwrap();
        let results: Vec<&str> = entity
            .references(report::RESULTS)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(results, vec!["o1"]);

        let exchanged = DiagnosticReportTranslator.to_exchange(&entity).unwrap();
        assert_eq!(exchanged["result"], json!([{"reference": "Observation/o1"}]));
        assert_eq!(exchanged["subject"]["reference"], "Patient/p1");
    }

    #[test]
    fn test_result_must_reference_observations() {
        let err = DiagnosticReportTranslator
            .to_domain(&json!({
                "resourceType": "DiagnosticReport",
                "code": {"coding": [{"code": "panel"}]},
                "result": [{"reference": "Patient/p1"}]
            }))
            .unwrap_err();
        assert!(matches!(err, TranslationError::InvalidField { .. }));
    }
}
