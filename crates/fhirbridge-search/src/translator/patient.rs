use fhirbridge_core::{Coding, Entity, EntityType, FieldValue, ResourceType, fields::person};
use serde_json::{Value, json};

use super::codec::{ResourceReader, ResourceWriter, code_value, date_value, expect_entity, set};
use super::{TranslationError, Translator};

#[derive(Debug, Clone, Copy, Default)]
pub struct PatientTranslator;

fn identifiers(entity: &Entity) -> Option<Value> {
    let identifiers: Vec<Value> = entity
        .field(person::IDENTIFIER)?
        .leaves()
        .filter_map(|leaf| match leaf {
            FieldValue::Coded(c) => Some(match &c.system {
                Some(system) => json!({"system": system, "value": c.code}),
                None => json!({"value": c.code}),
            }),
            FieldValue::Text(value) => Some(json!({"value": value})),
            _ => None,
        })
        .collect();
    (!identifiers.is_empty()).then(|| Value::Array(identifiers))
}

fn names(entity: &Entity) -> Option<Value> {
    let family = entity.field(person::FAMILY_NAME).and_then(FieldValue::as_text);
    let given = entity.field(person::GIVEN_NAME).and_then(FieldValue::as_text);
    if family.is_none() && given.is_none() {
        return None;
    }
    let mut name = serde_json::Map::new();
    if let Some(family) = family {
        name.insert("family".into(), json!(family));
    }
    if let Some(given) = given {
        name.insert("given".into(), json!([given]));
    }
    Some(json!([name]))
}

impl Translator for PatientTranslator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Patient
    }

    fn to_exchange(&self, entity: &Entity) -> Result<Value, TranslationError> {
        expect_entity(entity, EntityType::Person)?;
        let mut resource = ResourceWriter::new(ResourceType::Patient, entity);
        resource
            .put("identifier", identifiers(entity))
            .put("name", names(entity))
            .put("gender", code_value(entity, person::GENDER))
            .put("birthDate", date_value(entity, person::BIRTHDATE));
        Ok(resource.finish())
    }

    fn to_domain(&self, resource: &Value) -> Result<Entity, TranslationError> {
        let reader = ResourceReader::new(ResourceType::Patient, resource)?;
        let mut entity = reader.entity()?;

        if let Some(identifiers) = reader.get("identifier").and_then(Value::as_array) {
            let codes: Vec<FieldValue> = identifiers
                .iter()
                .filter_map(|identifier| {
                    let value = identifier.get("value").and_then(Value::as_str)?;
                    let system = identifier.get("system").and_then(Value::as_str);
                    Some(FieldValue::Coded(Coding::new(system, value)))
                })
                .collect();
            if !codes.is_empty() {
                entity.set_field(person::IDENTIFIER, FieldValue::List(codes));
            }
        }

        // Only the first name is kept; the store has one name per person.
        if let Some(name) = reader
            .get("name")
            .and_then(Value::as_array)
            .and_then(|names| names.first())
        {
            if let Some(family) = name.get("family").and_then(Value::as_str) {
                entity.set_field(person::FAMILY_NAME, FieldValue::text(family));
            }
            let given = name
                .get("given")
                .and_then(Value::as_array)
                .and_then(|given| given.first())
                .and_then(Value::as_str);
            if let Some(given) = given {
                entity.set_field(person::GIVEN_NAME, FieldValue::text(given));
            }
        }

        set(&mut entity, person::GENDER, reader.code("gender")?);
        set(&mut entity, person::BIRTHDATE, reader.datetime("birthDate")?);
        Ok(entity)
    }
}
