//! Exchange reference parsing.
//!
//! Exchange resources point at each other with strings such as `Patient/123`
//! or `Patient/123/_history/2`. Contained (`#id`), URN and absolute references
//! cannot be resolved against the internal store and are rejected.

use crate::entity::EntityRef;
use crate::error::CoreError;
use crate::fhir::ResourceType;
use std::fmt;
use std::str::FromStr;

/// A successfully parsed local reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExchangeReference {
    pub resource_type: ResourceType,
    pub id: String,
    /// Optional version ID from `_history` suffix
    pub version: Option<String>,
}

impl ExchangeReference {
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
            version: None,
        }
    }

    /// Returns the reference as a relative string (Type/id).
    pub fn to_relative(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    pub fn to_entity_ref(&self) -> EntityRef {
        EntityRef::new(self.resource_type.entity_type(), self.id.clone())
    }
}

impl fmt::Display for ExchangeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_relative())
    }
}

/// Parse a relative exchange reference string.
pub fn parse_reference(reference: &str) -> Result<ExchangeReference, CoreError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(CoreError::invalid_reference("empty reference"));
    }
    if reference.starts_with('#') {
        return Err(CoreError::invalid_reference(format!(
            "contained reference cannot be resolved: {reference}"
        )));
    }
    if reference.starts_with("urn:") || reference.contains("://") {
        return Err(CoreError::invalid_reference(format!(
            "non-local reference cannot be resolved: {reference}"
        )));
    }

    let parts: Vec<&str> = reference.split('/').collect();
    if parts.len() < 2 {
        return Err(CoreError::invalid_reference(format!(
            "reference must contain at least Type/id: {reference}"
        )));
    }

    let resource_type = ResourceType::from_str(parts[0])?;
    let id = parts[1];
    if id.is_empty() {
        return Err(CoreError::invalid_reference("resource id cannot be empty"));
    }

    let version = if parts.len() >= 4 && parts[2] == "_history" {
        Some(parts[3].to_string())
    } else {
        None
    };

    Ok(ExchangeReference {
        resource_type,
        id: id.to_string(),
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    #[test]
    fn test_simple_relative_reference() {
        let r = parse_reference("Patient/123").unwrap();
        assert_eq!(r.resource_type, ResourceType::Patient);
        assert_eq!(r.id, "123");
        assert_eq!(r.version, None);
        assert_eq!(r.to_entity_ref(), EntityRef::new(EntityType::Person, "123"));
    }

    #[test]
    fn test_versioned_reference() {
        let r = parse_reference("Observation/o1/_history/2").unwrap();
        assert_eq!(r.resource_type, ResourceType::Observation);
        assert_eq!(r.version, Some("2".to_string()));
    }

    #[test]
    fn test_unresolvable_references() {
        assert!(parse_reference("#contained-id").is_err());
        assert!(parse_reference("urn:uuid:550e8400-e29b-41d4-a716-446655440000").is_err());
        assert!(parse_reference("http://other-server.com/fhir/Patient/123").is_err());
        assert!(parse_reference("Patient/").is_err());
        assert!(parse_reference("Patient123").is_err());
        assert!(parse_reference("  ").is_err());
        assert!(parse_reference("Practitioner/1").is_err());
    }

    #[test]
    fn test_display() {
        let r = ExchangeReference::new(ResourceType::Encounter, "e1");
        assert_eq!(format!("{r}"), "Encounter/e1");
    }
}
