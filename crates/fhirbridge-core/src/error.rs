use thiserror::Error;

/// Errors from parsing and validating domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("Invalid DateTime: {0}")]
    InvalidDateTime(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),
}

impl CoreError {
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    pub fn invalid_entity_type(entity_type: impl Into<String>) -> Self {
        Self::InvalidEntityType(entity_type.into())
    }

    pub fn invalid_date_time(datetime: impl Into<String>) -> Self {
        Self::InvalidDateTime(datetime.into())
    }

    pub fn invalid_reference(message: impl Into<String>) -> Self {
        Self::InvalidReference(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
