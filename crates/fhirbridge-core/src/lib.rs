//! # fhirbridge-core
//!
//! Internal clinical domain model shared by the storage and search crates.
//!
//! Storage never sees exchange resources. It works on [`Entity`] records whose
//! field names follow the internal schema in [`fields`], while the exchange
//! side talks in terms of [`ResourceType`] and search parameter names.

pub mod entity;
pub mod error;
pub mod fhir;
pub mod id;
pub mod reference;
pub mod time;

pub use entity::{Coding, Entity, EntityKey, EntityRef, EntityType, FieldValue, Quantity, fields};
pub use error::{CoreError, Result};
pub use fhir::ResourceType;
pub use id::generate_id;
pub use reference::{ExchangeReference, parse_reference};
pub use time::{FhirDateTime, now_utc};
