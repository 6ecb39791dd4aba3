//! Error types for search translation and execution.

use fhirbridge_core::ResourceType;
use fhirbridge_storage::StorageError;
use std::fmt;

use crate::translator::TranslationError;

/// Errors returned by the search core.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A handler name, parameter name or sort parameter is not known.
    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// The resource type is not exposed under the active profile.
    #[error("Unsupported resource type: {0}")]
    UnsupportedResource(String),

    /// A typed value cannot be applied to the field it addresses.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("{resource_type}/{id} not found")]
    NotFound {
        resource_type: ResourceType,
        id: String,
    },

    /// The caller cancelled the request before it completed.
    #[error("Search cancelled")]
    Cancelled,
}

impl SearchError {
    #[must_use]
    pub fn unsupported_parameter(message: impl fmt::Display) -> Self {
        Self::UnsupportedParameter(message.to_string())
    }

    #[must_use]
    pub fn unsupported_resource(resource_type: impl fmt::Display) -> Self {
        Self::UnsupportedResource(resource_type.to_string())
    }

    #[must_use]
    pub fn invalid_value(message: impl fmt::Display) -> Self {
        Self::InvalidValue(message.to_string())
    }

    #[must_use]
    pub fn not_found(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Whether the failure was caused by the request rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedParameter(_)
                | Self::UnsupportedResource(_)
                | Self::InvalidValue(_)
                | Self::NotFound { .. }
        )
    }

    /// Whether a caller may retry once. The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_transient(),
            _ => false,
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(SearchError::unsupported_parameter("foo").is_client_error());
        assert!(SearchError::invalid_value("bad date").is_client_error());
        assert!(SearchError::not_found(ResourceType::Patient, "p1").is_client_error());
        assert!(!SearchError::Cancelled.is_client_error());
        assert!(!SearchError::from(StorageError::internal("boom")).is_client_error());
    }

    #[test]
    fn test_retryable_follows_storage() {
        assert!(SearchError::from(StorageError::timeout("slow")).is_retryable());
        assert!(!SearchError::from(StorageError::internal("boom")).is_retryable());
        assert!(!SearchError::invalid_value("x").is_retryable());
    }

    #[test]
    fn test_not_found_display() {
        let err = SearchError::not_found(ResourceType::Observation, "o1");
        assert_eq!(err.to_string(), "Observation/o1 not found");
    }
}
