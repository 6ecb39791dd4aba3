//! # fhirbridge-search
//!
//! Search-parameter translation and query execution over an internal clinical
//! store.
//!
//! A request flows through [`ParameterMap`] → [`QueryBuilder`] →
//! [`QueryExecutor`] → [`IncludeResolver`] → [`Translator`]; the
//! [`SearchService`] façade runs the whole pipeline in one call and also
//! exposes the last-N operations.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod include;
pub mod lastn;
pub mod params;
pub mod registry;
pub mod search_params;
pub mod service;
pub mod translator;

pub use builder::{QueryBuilder, QueryDescriptor};
pub use catalog::{ResourceCatalog, ResourceDefinition};
pub use config::{ConfigError, PlatformProfile, SearchConfig};
pub use error::{SearchError, SearchResult};
pub use executor::{QueryExecutor, ResultPage};
pub use handlers::{ConstraintBuilder, SearchHandler};
pub use include::{EnrichedResultPage, IncludeFailure, IncludeResolver, ReverseGroups};
pub use lastn::LastNRanker;
pub use params::{
    AndList, DateRangeParam, IncludeSpec, OrList, ParamValue, ParameterMap, ReferenceParam,
    SortSpec,
};
pub use registry::{HandlerRegistry, names};
pub use search_params::{
    CommonParams, DiagnosticReportSearchParams, EncounterSearchParams, LastNSearchParams,
    MedicationDispenseSearchParams, ObservationSearchParams, PatientSearchParams,
};
pub use service::{SearchBundle, SearchService};
pub use translator::{TranslationError, Translator, TranslatorRegistry};
