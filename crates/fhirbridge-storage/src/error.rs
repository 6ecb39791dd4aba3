//! Errors reported by [`EntityStore`](crate::EntityStore) backends.

use std::fmt;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Entity not found: {entity_type}/{id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// `create` with a key that is already taken.
    #[error("Entity already exists: {entity_type}/{id}")]
    AlreadyExists {
        entity_type: String,
        id: String,
    },

    /// The entity or query is not acceptable to the backend.
    #[error("Invalid entity: {message}")]
    InvalidEntity { message: String },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    /// The backend did not answer in time.
    #[error("Storage timeout: {message}")]
    Timeout { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StorageError {
    #[must_use]
    pub fn not_found(entity_type: impl fmt::Display, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn already_exists(entity_type: impl fmt::Display, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn invalid_entity(message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if a caller may retry the operation once.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionError { .. } | Self::Timeout { .. })
    }

    /// Coarse bucket for log fields.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::InvalidEntity { .. } => ErrorCategory::Validation,
            Self::ConnectionError { .. } | Self::Timeout { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Validation,
    /// Backend unreachable or slow. Worth one retry.
    Infrastructure,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("obs", "123");
        assert_eq!(err.to_string(), "Entity not found: obs/123");

        let err = StorageError::already_exists("person", "456");
        assert_eq!(err.to_string(), "Entity already exists: person/456");
    }

    #[test]
    fn test_transient_errors() {
        assert!(StorageError::connection_error("reset").is_transient());
        assert!(StorageError::timeout("query").is_transient());
        assert!(!StorageError::internal("boom").is_transient());
        assert!(!StorageError::not_found("obs", "1").is_transient());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("obs", "123").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::already_exists("obs", "456").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::timeout("slow").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
