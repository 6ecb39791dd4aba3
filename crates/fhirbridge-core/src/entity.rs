//! Storage-model entities.
//!
//! An [`Entity`] is a flat record of named [`FieldValue`]s. Field names follow
//! the internal clinical schema (see [`fields`]) and deliberately do not match
//! exchange search parameter names; the search layer owns that mapping.

use crate::error::CoreError;
use crate::time::{FhirDateTime, now_utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Internal entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Person,
    Encounter,
    Obs,
    DiagnosticReport,
    MedicationDispense,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Encounter => "encounter",
            EntityType::Obs => "obs",
            EntityType::DiagnosticReport => "diagnostic_report",
            EntityType::MedicationDispense => "medication_dispense",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(EntityType::Person),
            "encounter" => Ok(EntityType::Encounter),
            "obs" => Ok(EntityType::Obs),
            "diagnostic_report" => Ok(EntityType::DiagnosticReport),
            "medication_dispense" => Ok(EntityType::MedicationDispense),
            _ => Err(CoreError::invalid_entity_type(s)),
        }
    }
}

/// Internal field names per entity type.
pub mod fields {
    pub mod person {
        pub const FAMILY_NAME: &str = "familyName";
        pub const GIVEN_NAME: &str = "givenName";
        pub const IDENTIFIER: &str = "identifier";
        pub const GENDER: &str = "gender";
        pub const BIRTHDATE: &str = "birthdate";
    }

    pub mod encounter {
        pub const PATIENT: &str = "patient";
        pub const ENCOUNTER_TYPE: &str = "encounterType";
        pub const ENCOUNTER_DATETIME: &str = "encounterDatetime";
    }

    pub mod obs {
        pub const PERSON: &str = "person";
        pub const ENCOUNTER: &str = "encounter";
        pub const CONCEPT: &str = "concept";
        pub const CATEGORY: &str = "category";
        pub const OBS_DATETIME: &str = "obsDatetime";
        pub const VALUE_CODED: &str = "valueCoded";
        pub const VALUE_DATETIME: &str = "valueDatetime";
        pub const VALUE_NUMERIC: &str = "valueNumeric";
        pub const VALUE_TEXT: &str = "valueText";
        pub const GROUP_MEMBERS: &str = "groupMembers";
    }

    pub mod diagnostic_report {
        pub const SUBJECT: &str = "subject";
        pub const CODE: &str = "code";
        pub const ISSUED: &str = "issued";
        pub const RESULTS: &str = "results";
    }

    pub mod medication_dispense {
        pub const PATIENT: &str = "patient";
        pub const MEDICATION: &str = "medication";
        pub const STATUS: &str = "status";
        pub const WHEN_HANDED_OVER: &str = "whenHandedOver";
    }
}

/// A coded value (concept, identifier, status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: Option<&str>, code: impl Into<String>) -> Self {
        Self {
            system: system.map(String::from),
            code: code.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// A measured amount with an optional unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A typed pointer to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }
}

/// A single stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    DateTime(FhirDateTime),
    Coded(Coding),
    Quantity(Quantity),
    Reference(EntityRef),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn coded(system: Option<&str>, code: impl Into<String>) -> Self {
        FieldValue::Coded(Coding::new(system, code))
    }

    pub fn quantity(value: f64, unit: Option<&str>) -> Self {
        FieldValue::Quantity(Quantity {
            value,
            unit: unit.map(String::from),
        })
    }

    pub fn reference(entity_type: EntityType, id: impl Into<String>) -> Self {
        FieldValue::Reference(EntityRef::new(entity_type, id))
    }

    /// Iterate over the scalar values, descending into lists.
    pub fn leaves(&self) -> Box<dyn Iterator<Item = &FieldValue> + '_> {
        match self {
            FieldValue::List(items) => Box::new(items.iter().flat_map(FieldValue::leaves)),
            other => Box::new(std::iter::once(other)),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<FhirDateTime> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&EntityRef> {
        match self {
            FieldValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_coding(&self) -> Option<&Coding> {
        match self {
            FieldValue::Coded(c) => Some(c),
            _ => None,
        }
    }
}

/// Key of the `(type, id)` identity of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub id: String,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// A record in the internal clinical store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub id: String,
    #[serde(rename = "dateChanged")]
    pub date_changed: FhirDateTime,
    #[serde(default)]
    pub voided: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Entity {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
            date_changed: now_utc(),
            voided: false,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_date_changed(mut self, date_changed: FhirDateTime) -> Self {
        self.date_changed = date_changed;
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type,
            id: self.id.clone(),
        }
    }

    /// All references held in `field`, flattening list values.
    pub fn references<'a>(&'a self, field: &str) -> impl Iterator<Item = &'a EntityRef> + 'a {
        self.fields
            .get(field)
            .into_iter()
            .flat_map(FieldValue::leaves)
            .filter_map(FieldValue::as_reference)
    }

    pub fn datetime(&self, field: &str) -> Option<FhirDateTime> {
        self.field(field).and_then(FieldValue::as_datetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_roundtrip() {
        for et in [
            EntityType::Person,
            EntityType::Encounter,
            EntityType::Obs,
            EntityType::DiagnosticReport,
            EntityType::MedicationDispense,
        ] {
            assert_eq!(EntityType::from_str(et.as_str()).unwrap(), et);
        }
        assert!(EntityType::from_str("Patient").is_err());
    }

    #[test]
    fn test_references_flatten_lists() {
        let report = Entity::new(EntityType::DiagnosticReport, "r1").with_field(
            fields::diagnostic_report::RESULTS,
            FieldValue::List(vec![
                FieldValue::reference(EntityType::Obs, "o1"),
                FieldValue::reference(EntityType::Obs, "o2"),
                FieldValue::text("not a reference"),
            ]),
        );

        let ids: Vec<&str> = report
            .references(fields::diagnostic_report::RESULTS)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["o1", "o2"]);
        assert_eq!(report.references("missing").count(), 0);
    }

    #[test]
    fn test_field_value_serialization() {
        let value = FieldValue::coded(Some("http://loinc.org"), "8480-6");
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            json!({"kind": "coded", "value": {"system": "http://loinc.org", "code": "8480-6"}})
        );
    }

    #[test]
    fn test_entity_key_display() {
        let obs = Entity::new(EntityType::Obs, "abc");
        assert_eq!(obs.key().to_string(), "obs/abc");
    }
}
