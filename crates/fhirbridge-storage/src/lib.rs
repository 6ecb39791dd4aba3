//! # fhirbridge-storage
//!
//! Storage abstraction layer for FhirBridge.
//!
//! This crate defines the capability the search core consumes from a clinical
//! store. It does not contain any implementations - those are provided by
//! separate crates such as `fhirbridge-db-memory`.
//!
//! ## Overview
//!
//! The main trait is [`EntityStore`], which defines the contract for:
//! - Filtered, sorted, paginated queries over one entity type
//! - Batched lookups by id (forward includes)
//! - Batched lookups by reference field (reverse includes)
//! - Single-entity read, create and delete
//!
//! ## Example
//!
//! ```ignore
//! use fhirbridge_core::{EntityType, fields};
//! use fhirbridge_storage::{Constraint, ConstraintSet, EntityStore, PageRequest, SortKey};
//!
//! async fn obs_for_patient(
//!     store: &dyn EntityStore,
//!     patient_id: &str,
//! ) -> Result<Vec<Entity>, StorageError> {
//!     let mut constraints = ConstraintSet::new();
//!     constraints.push(Constraint::References {
//!         field: fields::obs::PERSON.to_string(),
//!         target_type: Some(EntityType::Person),
//!         ids: vec![patient_id.to_string()],
//!     });
//!
//!     let page = store
//!         .query(EntityType::Obs, &constraints, &[SortKey::id_ascending()], PageRequest::first(10))
//!         .await?;
//!     Ok(page.entities)
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::EntityStore;
pub use types::{
    Comparator, Constraint, ConstraintSet, DateBound, Join, JoinId, NumberBound, PageRequest,
    SortDirection, SortField, SortKey, StoredPage, TextMatch,
};

/// Type alias for a shared storage trait object.
pub type DynStore = std::sync::Arc<dyn EntityStore>;
