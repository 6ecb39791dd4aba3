//! In-memory clinical store backend for FhirBridge.
//!
//! This crate provides an in-memory implementation of the `EntityStore` trait
//! from `fhirbridge-storage`, using papaya lock-free HashMap for concurrent access.
//!
//! # Example
//!
//! ```ignore
//! use fhirbridge_core::{Entity, EntityType};
//! use fhirbridge_db_memory::InMemoryStore;
//! use fhirbridge_storage::EntityStore;
//!
//! let store = InMemoryStore::new();
//! store.create(Entity::new(EntityType::Person, "p1")).await?;
//! ```

pub(crate) mod query;
pub mod storage;
mod store_impl;

pub use fhirbridge_storage::{EntityStore, StorageError};
pub use storage::InMemoryStore;

/// Creates a new shareable in-memory store.
pub fn create_store() -> fhirbridge_storage::DynStore {
    std::sync::Arc::new(InMemoryStore::new())
}
