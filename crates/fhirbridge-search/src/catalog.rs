//! Static mapping between exchange search parameters and internal fields.
//!
//! Handlers never name storage fields themselves. A handler receives a
//! parameter name, looks up its binding on the [`ResourceDefinition`] of the
//! resource being searched, and builds constraints against the bound fields.

use fhirbridge_core::{EntityType, ResourceType, fields};
use fhirbridge_storage::SortField;
use indexmap::IndexMap;

use crate::config::PlatformProfile;
use crate::error::SearchError;

/// Storage representation of a non-reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Token,
    Text,
    Date,
    Number,
    /// Numeric value with an optional unit. Plain numbers also match.
    Quantity,
}

/// A non-reference search parameter bound to one or more storage fields.
/// Several fields are OR-ed (`name` matches family or given).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub param: &'static str,
    pub fields: &'static [&'static str],
    pub kind: FieldKind,
}

/// A reference search parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceBinding {
    pub param: &'static str,
    pub field: &'static str,
    pub targets: &'static [ResourceType],
    /// Parameters of the target resource that may be chained from here.
    pub chains: &'static [&'static str],
}

impl ReferenceBinding {
    /// The single target type, if the binding allows exactly one.
    pub fn single_target(&self) -> Option<ResourceType> {
        match self.targets {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn allows_target(&self, target: ResourceType) -> bool {
        self.targets.contains(&target)
    }

    pub fn allows_chain(&self, param: &str) -> bool {
        self.chains.contains(&param)
    }
}

#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    pub resource_type: ResourceType,
    pub entity_type: EntityType,
    pub fields: Vec<FieldBinding>,
    pub references: Vec<ReferenceBinding>,
    /// Sort parameter name to storage sort field. `_id` and `_lastUpdated`
    /// are always available.
    pub sorts: Vec<(&'static str, SortField)>,
    /// Reference parameters usable in `_include=<this>:<param>`.
    pub includes: Vec<&'static str>,
    /// `(source, param)` pairs usable in `_revinclude` on this type.
    pub revincludes: Vec<(ResourceType, &'static str)>,
}

impl ResourceDefinition {
    fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            entity_type: resource_type.entity_type(),
            fields: Vec::new(),
            references: Vec::new(),
            sorts: Vec::new(),
            includes: Vec::new(),
            revincludes: Vec::new(),
        }
    }

    fn field(mut self, param: &'static str, fields: &'static [&'static str], kind: FieldKind) -> Self {
        self.fields.push(FieldBinding {
            param,
            fields,
            kind,
        });
        self
    }

    fn reference(
        mut self,
        param: &'static str,
        field: &'static str,
        targets: &'static [ResourceType],
        chains: &'static [&'static str],
    ) -> Self {
        self.references.push(ReferenceBinding {
            param,
            field,
            targets,
            chains,
        });
        self
    }

    fn sort(mut self, param: &'static str, field: &'static str) -> Self {
        self.sorts.push((param, SortField::Field(field.to_string())));
        self
    }

    fn include(mut self, param: &'static str) -> Self {
        self.includes.push(param);
        self
    }

    fn revinclude(mut self, source: ResourceType, param: &'static str) -> Self {
        self.revincludes.push((source, param));
        self
    }

    pub fn field_binding(&self, param: &str) -> Option<&FieldBinding> {
        self.fields.iter().find(|b| b.param == param)
    }

    pub fn reference_binding(&self, param: &str) -> Option<&ReferenceBinding> {
        self.references.iter().find(|b| b.param == param)
    }

    pub fn sort_field(&self, param: &str) -> Option<SortField> {
        match param {
            "_id" => Some(SortField::Id),
            "_lastUpdated" => Some(SortField::LastUpdated),
            _ => self
                .sorts
                .iter()
                .find(|(name, _)| *name == param)
                .map(|(_, field)| field.clone()),
        }
    }

    pub fn allows_include(&self, param: &str) -> bool {
        self.includes.contains(&param)
    }

    pub fn allows_revinclude(&self, source: ResourceType, param: &str) -> bool {
        self.revincludes
            .iter()
            .any(|(s, p)| *s == source && *p == param)
    }
}

const TO_PATIENT: &[ResourceType] = &[ResourceType::Patient];
const TO_ENCOUNTER: &[ResourceType] = &[ResourceType::Encounter];
const TO_OBSERVATION: &[ResourceType] = &[ResourceType::Observation];
const PATIENT_CHAINS: &[&str] = &["identifier", "given", "family", "name"];

fn patient() -> ResourceDefinition {
    use fields::person::*;
    ResourceDefinition::new(ResourceType::Patient)
        .field("identifier", &[IDENTIFIER], FieldKind::Token)
        .field("family", &[FAMILY_NAME], FieldKind::Text)
        .field("given", &[GIVEN_NAME], FieldKind::Text)
        .field("name", &[FAMILY_NAME, GIVEN_NAME], FieldKind::Text)
        .field("gender", &[GENDER], FieldKind::Token)
        .field("birthdate", &[BIRTHDATE], FieldKind::Date)
        .sort("family", FAMILY_NAME)
        .sort("given", GIVEN_NAME)
        .sort("birthdate", BIRTHDATE)
        .revinclude(ResourceType::Observation, "patient")
        .revinclude(ResourceType::Encounter, "patient")
}

fn encounter() -> ResourceDefinition {
    use fields::encounter::*;
    ResourceDefinition::new(ResourceType::Encounter)
        .field("type", &[ENCOUNTER_TYPE], FieldKind::Token)
        .field("date", &[ENCOUNTER_DATETIME], FieldKind::Date)
        .reference("patient", PATIENT, TO_PATIENT, PATIENT_CHAINS)
        .reference("subject", PATIENT, TO_PATIENT, PATIENT_CHAINS)
        .sort("date", ENCOUNTER_DATETIME)
        .include("patient")
        .include("subject")
        .revinclude(ResourceType::Observation, "encounter")
}

fn observation() -> ResourceDefinition {
    use fields::obs::*;
    ResourceDefinition::new(ResourceType::Observation)
        .field("code", &[CONCEPT], FieldKind::Token)
        .field("category", &[CATEGORY], FieldKind::Token)
        .field("date", &[OBS_DATETIME], FieldKind::Date)
        .field("value-concept", &[VALUE_CODED], FieldKind::Token)
        .field("value-date", &[VALUE_DATETIME], FieldKind::Date)
        .field("value-quantity", &[VALUE_NUMERIC], FieldKind::Quantity)
        .field("value-string", &[VALUE_TEXT], FieldKind::Text)
        .reference("patient", PERSON, TO_PATIENT, PATIENT_CHAINS)
        .reference("subject", PERSON, TO_PATIENT, PATIENT_CHAINS)
        .reference("encounter", ENCOUNTER, TO_ENCOUNTER, &["type", "date", "patient"])
        .reference("related-type", GROUP_MEMBERS, TO_OBSERVATION, &["code"])
        .sort("date", OBS_DATETIME)
        .sort("code", CONCEPT)
        .sort("value-quantity", VALUE_NUMERIC)
        .include("encounter")
        .include("patient")
        .include("subject")
        .include("related-type")
        .revinclude(ResourceType::Observation, "related-type")
        .revinclude(ResourceType::DiagnosticReport, "result")
}

fn diagnostic_report() -> ResourceDefinition {
    use fields::diagnostic_report::*;
    ResourceDefinition::new(ResourceType::DiagnosticReport)
        .field("code", &[CODE], FieldKind::Token)
        .field("issued", &[ISSUED], FieldKind::Date)
        .reference("patient", SUBJECT, TO_PATIENT, PATIENT_CHAINS)
        .reference("subject", SUBJECT, TO_PATIENT, PATIENT_CHAINS)
        .reference("result", RESULTS, TO_OBSERVATION, &["code"])
        .sort("issued", ISSUED)
        .include("patient")
        .include("subject")
        .include("result")
}

fn medication_dispense() -> ResourceDefinition {
    use fields::medication_dispense::*;
    ResourceDefinition::new(ResourceType::MedicationDispense)
        .field("code", &[MEDICATION], FieldKind::Token)
        .field("status", &[STATUS], FieldKind::Token)
        .field("whenhandedover", &[WHEN_HANDED_OVER], FieldKind::Date)
        .reference("patient", PATIENT, TO_PATIENT, PATIENT_CHAINS)
        .reference("subject", PATIENT, TO_PATIENT, PATIENT_CHAINS)
        .sort("whenhandedover", WHEN_HANDED_OVER)
        .include("patient")
}

/// Resource definitions exposed under one [`PlatformProfile`].
#[derive(Debug, Clone)]
pub struct ResourceCatalog {
    profile: PlatformProfile,
    definitions: IndexMap<ResourceType, ResourceDefinition>,
}

impl ResourceCatalog {
    pub fn for_profile(profile: PlatformProfile) -> Self {
        let mut definitions = IndexMap::new();
        for definition in [patient(), encounter(), observation(), diagnostic_report()] {
            definitions.insert(definition.resource_type, definition);
        }
        if profile == PlatformProfile::Dispensing {
            let definition = medication_dispense();
            definitions.insert(definition.resource_type, definition);
        }
        Self {
            profile,
            definitions,
        }
    }

    pub fn profile(&self) -> PlatformProfile {
        self.profile
    }

    pub fn get(&self, resource_type: ResourceType) -> Option<&ResourceDefinition> {
        self.definitions.get(&resource_type)
    }

    pub fn resolve(&self, resource_type: ResourceType) -> Result<&ResourceDefinition, SearchError> {
        self.get(resource_type)
            .ok_or_else(|| SearchError::unsupported_resource(resource_type))
    }

    pub fn resource_types(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.definitions.keys().copied()
    }
}
