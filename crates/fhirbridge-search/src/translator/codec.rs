//! JSON helpers shared by the per-resource translators.

use fhirbridge_core::{
    Coding, Entity, EntityRef, EntityType, FhirDateTime, FieldValue, ResourceType, generate_id,
    now_utc, parse_reference,
};
use serde_json::{Map, Value, json};

use super::TranslationError;

pub(super) fn expect_entity(entity: &Entity, expected: EntityType) -> Result<(), TranslationError> {
    if entity.entity_type != expected {
        return Err(TranslationError::WrongEntityType {
            expected,
            actual: entity.entity_type,
        });
    }
    Ok(())
}

/// Builds an exchange resource object field by field.
pub(super) struct ResourceWriter {
    object: Map<String, Value>,
}

impl ResourceWriter {
    pub(super) fn new(resource_type: ResourceType, entity: &Entity) -> Self {
        let mut object = Map::new();
        object.insert("resourceType".into(), json!(resource_type.as_str()));
        object.insert("id".into(), json!(entity.id));
        object.insert(
            "meta".into(),
            json!({ "lastUpdated": entity.date_changed.to_string() }),
        );
        Self { object }
    }

    pub(super) fn put(&mut self, key: &str, value: Option<Value>) -> &mut Self {
        if let Some(value) = value {
            self.object.insert(key.to_string(), value);
        }
        self
    }

    pub(super) fn finish(self) -> Value {
        Value::Object(self.object)
    }
}

pub(super) fn reference_json(reference: &EntityRef) -> Value {
    let resource_type = ResourceType::from(reference.entity_type);
    json!({ "reference": format!("{resource_type}/{}", reference.id) })
}

/// First reference held in `field`.
pub(super) fn reference_value(entity: &Entity, field: &str) -> Option<Value> {
    entity.references(field).next().map(reference_json)
}

/// Every reference held in `field`, as an array.
pub(super) fn reference_array(entity: &Entity, field: &str) -> Option<Value> {
    let refs: Vec<Value> = entity.references(field).map(reference_json).collect();
    (!refs.is_empty()).then(|| Value::Array(refs))
}

fn coding_json(coding: &Coding) -> Value {
    let mut object = Map::new();
    if let Some(system) = &coding.system {
        object.insert("system".into(), json!(system));
    }
    object.insert("code".into(), json!(coding.code));
    if let Some(display) = &coding.display {
        object.insert("display".into(), json!(display));
    }
    Value::Object(object)
}

fn codings(value: &FieldValue) -> Vec<&Coding> {
    value.leaves().filter_map(FieldValue::as_coding).collect()
}

/// All codings of `field` as one CodeableConcept.
pub(super) fn concept_value(entity: &Entity, field: &str) -> Option<Value> {
    let codings = codings(entity.field(field)?);
    if codings.is_empty() {
        return None;
    }
    let coding: Vec<Value> = codings.into_iter().map(coding_json).collect();
    Some(json!({ "coding": coding }))
}

/// Each coding of `field` as its own CodeableConcept.
pub(super) fn concept_array(entity: &Entity, field: &str) -> Option<Value> {
    let concepts: Vec<Value> = codings(entity.field(field)?)
        .into_iter()
        .map(|c| json!({ "coding": [coding_json(c)] }))
        .collect();
    (!concepts.is_empty()).then(|| Value::Array(concepts))
}

/// The first coding's code, for plain `code` typed elements.
pub(super) fn code_value(entity: &Entity, field: &str) -> Option<Value> {
    let value = entity.field(field)?;
    value
        .leaves()
        .find_map(|leaf| match leaf {
            FieldValue::Coded(c) => Some(c.code.as_str()),
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        })
        .map(|code| json!(code))
}

pub(super) fn datetime_value(entity: &Entity, field: &str) -> Option<Value> {
    entity.datetime(field).map(|dt| json!(dt.to_string()))
}

pub(super) fn date_value(entity: &Entity, field: &str) -> Option<Value> {
    entity
        .datetime(field)
        .map(|dt| json!(dt.inner().date().to_string()))
}

pub(super) fn text_value(entity: &Entity, field: &str) -> Option<Value> {
    entity.field(field).and_then(FieldValue::as_text).map(|s| json!(s))
}

/// Reads an exchange resource object field by field.
pub(super) struct ResourceReader<'a> {
    resource_type: ResourceType,
    object: &'a Map<String, Value>,
}

impl<'a> ResourceReader<'a> {
    pub(super) fn new(
        resource_type: ResourceType,
        resource: &'a Value,
    ) -> Result<Self, TranslationError> {
        let object = resource
            .as_object()
            .ok_or_else(|| TranslationError::WrongResourceType {
                expected: resource_type,
                actual: "non-object".to_string(),
            })?;
        let actual = object
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if actual != resource_type.as_str() {
            return Err(TranslationError::WrongResourceType {
                expected: resource_type,
                actual: actual.to_string(),
            });
        }
        Ok(Self {
            resource_type,
            object,
        })
    }

    fn invalid(&self, field: &str, message: impl Into<String>) -> TranslationError {
        TranslationError::InvalidField {
            resource_type: self.resource_type,
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(super) fn missing(&self, field: &'static str) -> TranslationError {
        TranslationError::MissingField {
            resource_type: self.resource_type,
            field,
        }
    }

    pub(super) fn get(&self, key: &str) -> Option<&'a Value> {
        self.object.get(key).filter(|v| !v.is_null())
    }

    /// A new entity carrying the resource id (generated when absent) and
    /// `meta.lastUpdated` (now when absent).
    pub(super) fn entity(&self) -> Result<Entity, TranslationError> {
        let id = match self.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(_) => return Err(self.invalid("id", "expected a non-empty string")),
            None => generate_id(),
        };
        let last_updated = match self.get("meta").and_then(|m| m.get("lastUpdated")) {
            Some(value) => self.parse_datetime("meta.lastUpdated", value)?,
            None => now_utc(),
        };
        Ok(Entity::new(self.resource_type.entity_type(), id).with_date_changed(last_updated))
    }

    pub(super) fn string(&self, key: &str) -> Result<Option<String>, TranslationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    fn parse_datetime(&self, key: &str, value: &Value) -> Result<FhirDateTime, TranslationError> {
        let raw = value
            .as_str()
            .ok_or_else(|| self.invalid(key, "expected a date or dateTime string"))?;
        raw.parse().map_err(|_| self.invalid(key, format!("unparseable date {raw:?}")))
    }

    pub(super) fn datetime(&self, key: &str) -> Result<Option<FieldValue>, TranslationError> {
        self.get(key)
            .map(|value| self.parse_datetime(key, value).map(FieldValue::DateTime))
            .transpose()
    }

    /// `parent.key`, for dates nested in a period.
    pub(super) fn nested_datetime(
        &self,
        parent: &str,
        key: &str,
    ) -> Result<Option<FieldValue>, TranslationError> {
        let Some(value) = self.get(parent).and_then(|p| p.get(key)) else {
            return Ok(None);
        };
        let at = self.parse_datetime(&format!("{parent}.{key}"), value)?;
        Ok(Some(FieldValue::DateTime(at)))
    }

    fn parse_reference(
        &self,
        key: &str,
        value: &Value,
        allowed: &[ResourceType],
    ) -> Result<FieldValue, TranslationError> {
        let raw = value
            .get("reference")
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(key, "expected an object with a reference string"))?;
        let parsed = parse_reference(raw)?;
        if !allowed.contains(&parsed.resource_type) {
            return Err(self.invalid(
                key,
                format!("{} is not an allowed target", parsed.resource_type),
            ));
        }
        Ok(FieldValue::Reference(parsed.to_entity_ref()))
    }

    pub(super) fn reference(
        &self,
        key: &str,
        allowed: &[ResourceType],
    ) -> Result<Option<FieldValue>, TranslationError> {
        self.get(key)
            .map(|value| self.parse_reference(key, value, allowed))
            .transpose()
    }

    pub(super) fn references(
        &self,
        key: &str,
        allowed: &[ResourceType],
    ) -> Result<Option<FieldValue>, TranslationError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid(key, "expected an array of references"))?;
        let refs = items
            .iter()
            .map(|item| self.parse_reference(key, item, allowed))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((!refs.is_empty()).then_some(FieldValue::List(refs)))
    }

    fn parse_codings(
        &self,
        key: &str,
        concept: &Value,
    ) -> Result<Vec<FieldValue>, TranslationError> {
        let codings = concept
            .get("coding")
            .and_then(Value::as_array)
            .ok_or_else(|| self.invalid(key, "expected a CodeableConcept with codings"))?;
        codings
            .iter()
            .map(|coding| {
                let code = coding
                    .get("code")
                    .and_then(Value::as_str)
                    .ok_or_else(|| self.invalid(key, "coding without code"))?;
                let mut parsed = Coding::new(coding.get("system").and_then(Value::as_str), code);
                if let Some(display) = coding.get("display").and_then(Value::as_str) {
                    parsed = parsed.with_display(display);
                }
                Ok(FieldValue::Coded(parsed))
            })
            .collect()
    }

    /// One CodeableConcept; several codings become a list value.
    pub(super) fn concept(&self, key: &str) -> Result<Option<FieldValue>, TranslationError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        Ok(collapse(self.parse_codings(key, value)?))
    }

    /// An array of CodeableConcepts, flattened into one value.
    pub(super) fn concepts(&self, key: &str) -> Result<Option<FieldValue>, TranslationError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid(key, "expected an array of CodeableConcepts"))?;
        let mut codings = Vec::new();
        for item in items {
            codings.extend(self.parse_codings(key, item)?);
        }
        Ok(collapse(codings))
    }

    /// A plain `code` element stored as an unsystemed coding.
    pub(super) fn code(&self, key: &str) -> Result<Option<FieldValue>, TranslationError> {
        Ok(self.string(key)?.map(|code| FieldValue::coded(None, code)))
    }

    pub(super) fn quantity(&self, key: &str) -> Result<Option<FieldValue>, TranslationError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let amount = value
            .get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| self.invalid(key, "expected a Quantity with a numeric value"))?;
        let unit = value.get("unit").and_then(Value::as_str);
        Ok(Some(FieldValue::quantity(amount, unit)))
    }
}

fn collapse(mut values: Vec<FieldValue>) -> Option<FieldValue> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(FieldValue::List(values)),
    }
}

pub(super) fn set(entity: &mut Entity, field: &str, value: Option<FieldValue>) {
    if let Some(value) = value {
        entity.set_field(field, value);
    }
}
