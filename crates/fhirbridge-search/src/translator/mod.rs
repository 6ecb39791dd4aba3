//! Conversion between storage entities and exchange resources.
//!
//! Exchange resources are plain `serde_json::Value` objects. Each exposed
//! resource type has one [`Translator`]; the [`TranslatorRegistry`] holds the
//! set for a [`PlatformProfile`].

mod codec;
mod diagnostic_report;
mod encounter;
mod medication_dispense;
mod observation;
mod patient;

use fhirbridge_core::{CoreError, Entity, EntityType, ResourceType};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

use crate::config::PlatformProfile;
use crate::error::SearchError;

pub use diagnostic_report::DiagnosticReportTranslator;
pub use encounter::EncounterTranslator;
pub use medication_dispense::MedicationDispenseTranslator;
pub use observation::ObservationTranslator;
pub use patient::PatientTranslator;

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("expected a {expected} entity, got {actual}")]
    WrongEntityType {
        expected: EntityType,
        actual: EntityType,
    },

    #[error("expected a {expected} resource, got {actual:?}")]
    WrongResourceType {
        expected: ResourceType,
        actual: String,
    },

    #[error("{resource_type} is missing required element {field}")]
    MissingField {
        resource_type: ResourceType,
        field: &'static str,
    },

    #[error("{resource_type}.{field}: {message}")]
    InvalidField {
        resource_type: ResourceType,
        field: String,
        message: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Two-way mapping for one resource type. Implementations are pure.
pub trait Translator: Send + Sync + std::fmt::Debug {
    fn resource_type(&self) -> ResourceType;

    fn to_exchange(&self, entity: &Entity) -> Result<Value, TranslationError>;

    fn to_domain(&self, resource: &Value) -> Result<Entity, TranslationError>;
}

#[derive(Debug, Clone)]
pub struct TranslatorRegistry {
    translators: IndexMap<ResourceType, Arc<dyn Translator>>,
}

impl TranslatorRegistry {
    pub fn for_profile(profile: PlatformProfile) -> Self {
        let mut translators: IndexMap<ResourceType, Arc<dyn Translator>> = IndexMap::new();
        let stock: [Arc<dyn Translator>; 4] = [
            Arc::new(PatientTranslator),
            Arc::new(EncounterTranslator),
            Arc::new(ObservationTranslator),
            Arc::new(DiagnosticReportTranslator),
        ];
        for translator in stock {
            translators.insert(translator.resource_type(), translator);
        }
        if profile == PlatformProfile::Dispensing {
            translators.insert(
                ResourceType::MedicationDispense,
                Arc::new(MedicationDispenseTranslator),
            );
        }
        Self { translators }
    }

    pub fn get(&self, resource_type: ResourceType) -> Option<&dyn Translator> {
        self.translators.get(&resource_type).map(|t| t.as_ref())
    }

    pub fn resolve(&self, resource_type: ResourceType) -> Result<&dyn Translator, SearchError> {
        self.get(resource_type)
            .ok_or_else(|| SearchError::unsupported_resource(resource_type))
    }

    /// Translate an entity with the translator for its own type.
    pub fn to_exchange(&self, entity: &Entity) -> Result<Value, SearchError> {
        let translator = self.resolve(ResourceType::from(entity.entity_type))?;
        Ok(translator.to_exchange(entity)?)
    }
}
