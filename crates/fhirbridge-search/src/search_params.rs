//! Typed per-resource search parameters.
//!
//! These structs are what a binding layer fills in from a request. Each one
//! converts into a [`ParameterMap`] addressed to the registry's handler names,
//! and this is where synonyms collapse: `patient` wins over `subject`, and
//! both land on the `subject` reference binding.

use crate::handlers::{ID_PROPERTY, LAST_UPDATED_PROPERTY};
use crate::params::{AndList, IncludeSpec, ParameterMap, SortSpec};
use crate::registry::names;

/// Parameters every resource type accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonParams {
    pub id: Option<AndList>,
    pub last_updated: Option<AndList>,
    pub includes: Vec<IncludeSpec>,
    pub revincludes: Vec<IncludeSpec>,
    pub sort: Option<SortSpec>,
}

impl CommonParams {
    fn apply(&self, map: ParameterMap) -> ParameterMap {
        let mut map = map
            .add_optional(names::COMMON, Some(ID_PROPERTY), self.id.clone())
            .add_optional(names::COMMON, Some(LAST_UPDATED_PROPERTY), self.last_updated.clone())
            .add_includes(names::INCLUDE, self.includes.iter().cloned())
            .add_includes(names::REVERSE_INCLUDE, self.revincludes.iter().cloned());
        if let Some(sort) = &self.sort {
            map = map.with_sort_spec(sort.clone());
        }
        map
    }
}

fn patient_or_subject(patient: &Option<AndList>, subject: &Option<AndList>) -> Option<AndList> {
    patient.clone().or_else(|| subject.clone())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationSearchParams {
    pub patient: Option<AndList>,
    pub subject: Option<AndList>,
    pub encounter: Option<AndList>,
    pub has_member: Option<AndList>,
    pub code: Option<AndList>,
    pub category: Option<AndList>,
    pub value_concept: Option<AndList>,
    pub value_date: Option<AndList>,
    pub value_quantity: Option<AndList>,
    pub value_number: Option<AndList>,
    pub value_string: Option<AndList>,
    pub date: Option<AndList>,
    pub common: CommonParams,
}

impl ObservationSearchParams {
    pub fn to_parameter_map(&self) -> ParameterMap {
        let map = ParameterMap::new()
            .add_optional(
                names::PATIENT_REFERENCE,
                Some("subject"),
                patient_or_subject(&self.patient, &self.subject),
            )
            .add_optional(names::ENCOUNTER_REFERENCE, Some("encounter"), self.encounter.clone())
            .add_optional(names::HAS_MEMBER_REFERENCE, Some("related-type"), self.has_member.clone())
            .add_optional(names::CODED, None, self.code.clone())
            .add_optional(names::CATEGORY, None, self.category.clone())
            .add_optional(names::VALUE_CODED, None, self.value_concept.clone())
            .add_optional(names::VALUE_DATE, None, self.value_date.clone())
            .add_optional(names::VALUE_QUANTITY, None, self.value_quantity.clone())
            .add_optional(names::VALUE_NUMBER, None, self.value_number.clone())
            .add_optional(names::VALUE_STRING, None, self.value_string.clone())
            .add_optional(names::DATE_RANGE, None, self.date.clone());
        self.common.apply(map)
    }
}

/// Filters for the last-N operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastNSearchParams {
    pub max: Option<usize>,
    pub patient: Option<AndList>,
    pub subject: Option<AndList>,
    pub category: Option<AndList>,
    pub code: Option<AndList>,
}

impl LastNSearchParams {
    pub fn to_parameter_map(&self) -> ParameterMap {
        ParameterMap::new()
            .add_optional(
                names::PATIENT_REFERENCE,
                Some("subject"),
                patient_or_subject(&self.patient, &self.subject),
            )
            .add_optional(names::CATEGORY, None, self.category.clone())
            .add_optional(names::CODED, None, self.code.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientSearchParams {
    pub identifier: Option<AndList>,
    pub name: Option<AndList>,
    pub family: Option<AndList>,
    pub given: Option<AndList>,
    pub gender: Option<AndList>,
    pub birthdate: Option<AndList>,
    pub common: CommonParams,
}

impl PatientSearchParams {
    pub fn to_parameter_map(&self) -> ParameterMap {
        let map = ParameterMap::new()
            .add_optional(names::PATIENT_IDENTIFIER, None, self.identifier.clone())
            .add_optional(names::PATIENT_NAME, Some("name"), self.name.clone())
            .add_optional(names::PATIENT_NAME, Some("family"), self.family.clone())
            .add_optional(names::PATIENT_NAME, Some("given"), self.given.clone())
            .add_optional(names::PATIENT_GENDER, None, self.gender.clone())
            .add_optional(names::DATE_RANGE, Some("birthdate"), self.birthdate.clone());
        self.common.apply(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncounterSearchParams {
    pub patient: Option<AndList>,
    pub subject: Option<AndList>,
    pub encounter_type: Option<AndList>,
    pub date: Option<AndList>,
    pub common: CommonParams,
}

impl EncounterSearchParams {
    pub fn to_parameter_map(&self) -> ParameterMap {
        let map = ParameterMap::new()
            .add_optional(
                names::PATIENT_REFERENCE,
                Some("subject"),
                patient_or_subject(&self.patient, &self.subject),
            )
            .add_optional(names::ENCOUNTER_TYPE, None, self.encounter_type.clone())
            .add_optional(names::DATE_RANGE, None, self.date.clone());
        self.common.apply(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticReportSearchParams {
    pub patient: Option<AndList>,
    pub subject: Option<AndList>,
    pub code: Option<AndList>,
    pub issued: Option<AndList>,
    pub result: Option<AndList>,
    pub common: CommonParams,
}

impl DiagnosticReportSearchParams {
    pub fn to_parameter_map(&self) -> ParameterMap {
        let map = ParameterMap::new()
            .add_optional(
                names::PATIENT_REFERENCE,
                Some("subject"),
                patient_or_subject(&self.patient, &self.subject),
            )
            .add_optional(names::CODED, None, self.code.clone())
            .add_optional(names::DATE_RANGE, Some("issued"), self.issued.clone())
            .add_optional(names::HAS_MEMBER_REFERENCE, Some("result"), self.result.clone());
        self.common.apply(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MedicationDispenseSearchParams {
    pub patient: Option<AndList>,
    pub subject: Option<AndList>,
    pub code: Option<AndList>,
    pub status: Option<AndList>,
    pub when_handed_over: Option<AndList>,
    pub common: CommonParams,
}

impl MedicationDispenseSearchParams {
    pub fn to_parameter_map(&self) -> ParameterMap {
        let map = ParameterMap::new()
            .add_optional(
                names::PATIENT_REFERENCE,
                Some("subject"),
                patient_or_subject(&self.patient, &self.subject),
            )
            .add_optional(names::CODED, None, self.code.clone())
            .add_optional(names::DISPENSE_STATUS, None, self.status.clone())
            .add_optional(
                names::DATE_RANGE,
                Some("whenhandedover"),
                self.when_handed_over.clone(),
            );
        self.common.apply(map)
    }
}
