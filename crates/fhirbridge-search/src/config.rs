//! Search configuration.
//!
//! Library code never discovers or loads configuration files. Callers build a
//! [`SearchConfig`] (usually from a TOML fragment) and inject it into the
//! service.

use serde::{Deserialize, Serialize};

/// Which handler and resource set the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformProfile {
    #[default]
    Core,
    /// Core plus MedicationDispense.
    Dispensing,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse search config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid search config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SearchConfig {
    pub profile: PlatformProfile,
    /// Page size when the request does not name one.
    pub default_page_size: usize,
    /// Upper bound for requested page sizes.
    pub max_page_size: usize,
    /// Maximum number of joins a chained reference may add.
    pub max_chain_depth: usize,
    /// `max` used by last-N operations when the request omits it.
    pub last_n_default_max: usize,
    /// Ids per batched include lookup before the resolver splits the batch.
    pub include_batch_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            profile: PlatformProfile::Core,
            default_page_size: 10,
            max_page_size: 100,
            max_chain_depth: 3,
            last_n_default_max: 1,
            include_batch_limit: 1000,
        }
    }
}

impl SearchConfig {
    /// Parse a TOML fragment; missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: SearchConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::Invalid("default_page_size must be > 0".into()));
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigError::Invalid(format!(
                "max_page_size ({}) must be >= default_page_size ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        if self.max_chain_depth == 0 {
            return Err(ConfigError::Invalid("max_chain_depth must be > 0".into()));
        }
        if self.last_n_default_max == 0 {
            return Err(ConfigError::Invalid("last_n_default_max must be > 0".into()));
        }
        if self.include_batch_limit == 0 {
            return Err(ConfigError::Invalid("include_batch_limit must be > 0".into()));
        }
        Ok(())
    }

    /// Resolve a requested page size against the defaults and the cap.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}
