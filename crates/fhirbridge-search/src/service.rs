//! Search façade.
//!
//! [`SearchService`] wires the registry, catalog, builder, executor, include
//! resolver, last-N ranker and translators together for one store and one
//! [`SearchConfig`]. All components are immutable after construction, so one
//! service can serve concurrent requests.

use fhirbridge_core::{Entity, ResourceType, now_utc};
use fhirbridge_storage::{DynStore, PageRequest, StorageError};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::builder::QueryBuilder;
use crate::catalog::ResourceCatalog;
use crate::config::{ConfigError, SearchConfig};
use crate::error::SearchError;
use crate::executor::{QueryExecutor, cancellable};
use crate::include::{EnrichedResultPage, IncludeFailure, IncludeResolver, ReverseGroups};
use crate::lastn::LastNRanker;
use crate::params::{ParameterMap, SortSpec};
use crate::registry::HandlerRegistry;
use crate::search_params::{
    DiagnosticReportSearchParams, EncounterSearchParams, LastNSearchParams,
    MedicationDispenseSearchParams, ObservationSearchParams, PatientSearchParams,
};
use crate::translator::TranslatorRegistry;

/// A translated search result.
#[derive(Debug, Clone, Default)]
pub struct SearchBundle {
    /// Matches across all pages.
    pub total: usize,
    pub matches: Vec<Value>,
    pub included: Vec<Value>,
    /// Which page row each reverse-included entity references.
    pub reverse_groups: ReverseGroups,
    /// Include specs that could not be resolved.
    pub failures: Vec<IncludeFailure>,
}

impl SearchBundle {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct SearchService {
    config: Arc<SearchConfig>,
    store: DynStore,
    builder: QueryBuilder,
    executor: QueryExecutor,
    resolver: IncludeResolver,
    ranker: LastNRanker,
    translators: TranslatorRegistry,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("profile", &self.config.profile)
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl SearchService {
    pub fn new(store: DynStore, config: SearchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let profile = config.profile;
        let config = Arc::new(config);
        let registry = Arc::new(HandlerRegistry::for_profile(profile));
        let catalog = Arc::new(ResourceCatalog::for_profile(profile));

        let builder = QueryBuilder::new(registry, catalog.clone(), config.clone());
        let executor = QueryExecutor::new(store.clone());
        let resolver = IncludeResolver::new(store.clone(), catalog, config.include_batch_limit);
        let ranker = LastNRanker::new(builder.clone(), executor.clone());

        tracing::debug!(
            profile = ?profile,
            backend = store.backend_name(),
            "search service ready"
        );

        Ok(Self {
            translators: TranslatorRegistry::for_profile(profile),
            config,
            store,
            builder,
            executor,
            resolver,
            ranker,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn translators(&self) -> &TranslatorRegistry {
        &self.translators
    }

    /// Search returning storage entities.
    ///
    /// `sort` overrides the map's sort spec.
    #[instrument(skip(self, params, sort, cancel), fields(resource_type = %resource_type))]
    pub async fn search_entities(
        &self,
        resource_type: ResourceType,
        params: &ParameterMap,
        sort: Option<&SortSpec>,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<EnrichedResultPage, SearchError> {
        let descriptor = self.builder.build(resource_type, params, sort, page)?;
        let results = self.executor.execute(&descriptor, cancel).await?;
        self.resolver
            .resolve(results, &descriptor.includes, &descriptor.revincludes, cancel)
            .await
    }

    /// Search and translate matches and includes into exchange resources.
    pub async fn search(
        &self,
        resource_type: ResourceType,
        params: &ParameterMap,
        sort: Option<&SortSpec>,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchBundle, SearchError> {
        let enriched = self
            .search_entities(resource_type, params, sort, page, cancel)
            .await?;
        Ok(SearchBundle {
            total: enriched.page.total,
            matches: self.translate_all(enriched.entities())?,
            included: self.translate_all(enriched.included())?,
            reverse_groups: enriched.reverse_groups,
            failures: enriched.failures,
        })
    }

    pub async fn search_observations(
        &self,
        params: &ObservationSearchParams,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchBundle, SearchError> {
        let map = params.to_parameter_map();
        self.search(ResourceType::Observation, &map, None, page, cancel)
            .await
    }

    pub async fn search_patients(
        &self,
        params: &PatientSearchParams,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchBundle, SearchError> {
        let map = params.to_parameter_map();
        self.search(ResourceType::Patient, &map, None, page, cancel)
            .await
    }

    pub async fn search_encounters(
        &self,
        params: &EncounterSearchParams,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchBundle, SearchError> {
        let map = params.to_parameter_map();
        self.search(ResourceType::Encounter, &map, None, page, cancel)
            .await
    }

    pub async fn search_diagnostic_reports(
        &self,
        params: &DiagnosticReportSearchParams,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchBundle, SearchError> {
        let map = params.to_parameter_map();
        self.search(ResourceType::DiagnosticReport, &map, None, page, cancel)
            .await
    }

    /// Only available under the dispensing profile.
    pub async fn search_medication_dispenses(
        &self,
        params: &MedicationDispenseSearchParams,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchBundle, SearchError> {
        let map = params.to_parameter_map();
        self.search(ResourceType::MedicationDispense, &map, None, page, cancel)
            .await
    }

    #[instrument(skip(self, params, cancel), fields(max = ?params.max))]
    pub async fn last_n(
        &self,
        params: &LastNSearchParams,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, SearchError> {
        let map = params.to_parameter_map();
        let ranked = self.ranker.last_n(params.max, &map, cancel).await?;
        self.translate_all(&ranked)
    }

    #[instrument(skip(self, params, cancel), fields(max = ?params.max))]
    pub async fn last_n_by_encounter(
        &self,
        params: &LastNSearchParams,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, SearchError> {
        let map = params.to_parameter_map();
        let ranked = self
            .ranker
            .last_n_by_encounter(params.max, &map, cancel)
            .await?;
        self.translate_all(&ranked)
    }

    #[instrument(skip(self, cancel), fields(resource_type = %resource_type))]
    pub async fn read(
        &self,
        resource_type: ResourceType,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, SearchError> {
        let translator = self.translators.resolve(resource_type)?;
        let entity = cancellable(cancel, self.store.get(resource_type.entity_type(), id))
            .await?
            .ok_or_else(|| SearchError::not_found(resource_type, id))?;
        Ok(translator.to_exchange(&entity)?)
    }

    /// Translate `resource` into an entity and store it. Returns the stored
    /// resource with its assigned id and `meta.lastUpdated`.
    #[instrument(skip(self, resource, cancel), fields(resource_type = %resource_type))]
    pub async fn create(
        &self,
        resource_type: ResourceType,
        resource: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, SearchError> {
        let translator = self.translators.resolve(resource_type)?;
        let mut entity = translator.to_domain(resource)?;
        entity.date_changed = now_utc();
        entity.voided = false;

        let stored = cancellable(cancel, self.store.create(entity)).await?;
        tracing::info!(id = %stored.id, "created resource");
        Ok(translator.to_exchange(&stored)?)
    }

    #[instrument(skip(self, cancel), fields(resource_type = %resource_type))]
    pub async fn delete(
        &self,
        resource_type: ResourceType,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SearchError> {
        self.translators.resolve(resource_type)?;
        match cancellable(cancel, self.store.delete(resource_type.entity_type(), id)).await {
            Ok(()) => {
                tracing::info!(id, "deleted resource");
                Ok(())
            }
            Err(SearchError::Storage(StorageError::NotFound { .. })) => {
                Err(SearchError::not_found(resource_type, id))
            }
            Err(other) => Err(other),
        }
    }

    fn translate_all<'e>(
        &self,
        entities: impl IntoIterator<Item = &'e Entity>,
    ) -> Result<Vec<Value>, SearchError> {
        entities
            .into_iter()
            .map(|entity| self.translators.to_exchange(entity))
            .collect()
    }
}
