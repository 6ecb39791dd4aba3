//! Registry of named search handlers.
//!
//! The handler set is fixed at construction from a [`PlatformProfile`] and is
//! read-only afterwards, so it can be shared across requests behind an `Arc`.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::config::PlatformProfile;
use crate::error::SearchError;
use crate::handlers::{CommonHandler, FieldHandler, ReferenceHandler, SearchHandler};

/// Handler names understood by the registry.
pub mod names {
    pub const PATIENT_REFERENCE: &str = "patient.reference";
    pub const ENCOUNTER_REFERENCE: &str = "encounter.reference";
    pub const HAS_MEMBER_REFERENCE: &str = "has.member.reference";
    pub const CODED: &str = "coding";
    pub const CATEGORY: &str = "category";
    pub const VALUE_CODED: &str = "value.coded";
    pub const VALUE_DATE: &str = "value.date";
    pub const VALUE_QUANTITY: &str = "value.quantity";
    pub const VALUE_STRING: &str = "value.string";
    pub const VALUE_NUMBER: &str = "value.number";
    pub const DATE_RANGE: &str = "date.range";
    pub const COMMON: &str = "common";
    pub const INCLUDE: &str = "include";
    pub const REVERSE_INCLUDE: &str = "revinclude";
    pub const PATIENT_NAME: &str = "patient.name";
    pub const PATIENT_IDENTIFIER: &str = "patient.identifier";
    pub const PATIENT_GENDER: &str = "patient.gender";
    pub const ENCOUNTER_TYPE: &str = "encounter.type";
    pub const DISPENSE_STATUS: &str = "dispense.status";
}

#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    profile: PlatformProfile,
    handlers: IndexMap<&'static str, Arc<dyn SearchHandler>>,
}

impl HandlerRegistry {
    /// An empty registry; see [`for_profile`](Self::for_profile) for the stock set.
    pub fn new(profile: PlatformProfile) -> Self {
        Self {
            profile,
            handlers: IndexMap::new(),
        }
    }

    pub fn for_profile(profile: PlatformProfile) -> Self {
        use names::*;

        let mut registry = Self::new(profile)
            .with(ReferenceHandler::new(PATIENT_REFERENCE, "patient"))
            .with(ReferenceHandler::new(ENCOUNTER_REFERENCE, "encounter"))
            .with(ReferenceHandler::new(HAS_MEMBER_REFERENCE, "related-type"))
            .with(FieldHandler::token(CODED, "code"))
            .with(FieldHandler::token(CATEGORY, "category"))
            .with(FieldHandler::token(VALUE_CODED, "value-concept"))
            .with(FieldHandler::date(VALUE_DATE, "value-date"))
            .with(FieldHandler::quantity(VALUE_QUANTITY, "value-quantity"))
            .with(FieldHandler::string(VALUE_STRING, "value-string"))
            .with(FieldHandler::number(VALUE_NUMBER, "value-quantity"))
            .with(FieldHandler::date(DATE_RANGE, "date"))
            .with(CommonHandler::new(COMMON))
            .with(FieldHandler::string(PATIENT_NAME, "name"))
            .with(FieldHandler::token(PATIENT_IDENTIFIER, "identifier"))
            .with(FieldHandler::token(PATIENT_GENDER, "gender"))
            .with(FieldHandler::token(ENCOUNTER_TYPE, "type"));

        if profile == PlatformProfile::Dispensing {
            registry.register(FieldHandler::token(DISPENSE_STATUS, "status"));
        }
        registry
    }

    /// Register a handler, replacing any handler with the same name.
    pub fn register(&mut self, handler: impl SearchHandler + 'static) {
        self.handlers.insert(handler.name(), Arc::new(handler));
    }

    #[must_use]
    pub fn with(mut self, handler: impl SearchHandler + 'static) -> Self {
        self.register(handler);
        self
    }

    pub fn profile(&self) -> PlatformProfile {
        self.profile
    }

    pub fn get(&self, name: &str) -> Option<&dyn SearchHandler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn SearchHandler, SearchError> {
        self.get(name)
            .ok_or_else(|| SearchError::unsupported_parameter(format!("no search handler named {name}")))
    }

    /// Whether `name` addresses forward (`Some(false)`) or reverse
    /// (`Some(true)`) includes.
    pub fn include_direction(&self, name: &str) -> Option<bool> {
        match name {
            names::INCLUDE => Some(false),
            names::REVERSE_INCLUDE => Some(true),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_profile_handlers() {
        let registry = HandlerRegistry::for_profile(PlatformProfile::Core);
        assert!(registry.get(names::PATIENT_REFERENCE).is_some());
        assert!(registry.get(names::COMMON).is_some());
        assert!(registry.get(names::DISPENSE_STATUS).is_none());
        assert!(matches!(
            registry.resolve("no.such.handler"),
            Err(SearchError::UnsupportedParameter(_))
        ));
    }

    #[test]
    fn test_dispensing_profile_adds_status() {
        let core = HandlerRegistry::for_profile(PlatformProfile::Core);
        let dispensing = HandlerRegistry::for_profile(PlatformProfile::Dispensing);
        assert!(dispensing.get(names::DISPENSE_STATUS).is_some());
        assert_eq!(dispensing.len(), core.len() + 1);
        assert_eq!(dispensing.profile(), PlatformProfile::Dispensing);
    }

    #[test]
    fn test_include_direction() {
        let registry = HandlerRegistry::for_profile(PlatformProfile::Core);
        assert_eq!(registry.include_direction(names::INCLUDE), Some(false));
        assert_eq!(registry.include_direction(names::REVERSE_INCLUDE), Some(true));
        assert_eq!(registry.include_direction(names::COMMON), None);
    }

    #[test]
    fn test_names_keep_registration_order() {
        let registry = HandlerRegistry::for_profile(PlatformProfile::Core);
        let first: Vec<&str> = registry.names().take(2).collect();
        assert_eq!(first, vec![names::PATIENT_REFERENCE, names::ENCOUNTER_REFERENCE]);
    }
}
