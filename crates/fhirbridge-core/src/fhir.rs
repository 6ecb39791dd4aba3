use crate::entity::EntityType;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange-side resource types exposed by the search layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Encounter,
    Observation,
    DiagnosticReport,
    MedicationDispense,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Patient,
        ResourceType::Encounter,
        ResourceType::Observation,
        ResourceType::DiagnosticReport,
        ResourceType::MedicationDispense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Encounter => "Encounter",
            ResourceType::Observation => "Observation",
            ResourceType::DiagnosticReport => "DiagnosticReport",
            ResourceType::MedicationDispense => "MedicationDispense",
        }
    }

    /// The internal entity type backing this resource type.
    pub fn entity_type(&self) -> EntityType {
        match self {
            ResourceType::Patient => EntityType::Person,
            ResourceType::Encounter => EntityType::Encounter,
            ResourceType::Observation => EntityType::Obs,
            ResourceType::DiagnosticReport => EntityType::DiagnosticReport,
            ResourceType::MedicationDispense => EntityType::MedicationDispense,
        }
    }
}

impl From<EntityType> for ResourceType {
    fn from(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Person => ResourceType::Patient,
            EntityType::Encounter => ResourceType::Encounter,
            EntityType::Obs => ResourceType::Observation,
            EntityType::DiagnosticReport => ResourceType::DiagnosticReport,
            EntityType::MedicationDispense => ResourceType::MedicationDispense,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|rt| rt.as_str() == s)
            .ok_or_else(|| CoreError::invalid_resource_type(s))
    }
}
