//! `_include` and `_revinclude` resolution.
//!
//! - forward: entities referenced by the page, one batched id lookup per spec
//! - reverse: entities referencing the page, one batched reference-field lookup
//!   per spec
//!
//! Reverse includes also keep which page row each entity references, in
//! [`EnrichedResultPage::reverse_groups`].
//!
//! Specs resolve one after another. A storage failure in one spec is recorded
//! as an [`IncludeFailure`] and the remaining specs still run. Cancellation
//! aborts the whole resolution.

use fhirbridge_core::{Entity, EntityKey, EntityType};
use fhirbridge_storage::{DynStore, StorageError};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::catalog::ResourceCatalog;
use crate::error::SearchError;
use crate::executor::{ResultPage, cancellable};
use crate::params::IncludeSpec;

/// An include spec whose lookup failed.
#[derive(Debug, Clone)]
pub struct IncludeFailure {
    pub spec: IncludeSpec,
    pub error: StorageError,
}

/// Reverse-included entity keys per `(spec, referenced page id)`, in spec
/// order then page order. An entity referencing several page rows is listed
/// under each of them but stored once in the side table.
pub type ReverseGroups = IndexMap<(IncludeSpec, String), Vec<EntityKey>>;

/// A result page with includes attached.
#[derive(Debug, Clone, Default)]
pub struct EnrichedResultPage {
    pub page: ResultPage,
    pub reverse_groups: ReverseGroups,
    pub failures: Vec<IncludeFailure>,
}

impl EnrichedResultPage {
    pub fn entities(&self) -> &[Entity] {
        &self.page.entities
    }

    pub fn included(&self) -> impl Iterator<Item = &Entity> {
        self.page.included.values()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Entities of `spec` that reference the page row `id`.
    pub fn reverse_group(&self, spec: &IncludeSpec, id: &str) -> Vec<&Entity> {
        self.reverse_groups
            .get(&(spec.clone(), id.to_string()))
            .into_iter()
            .flatten()
            .filter_map(|key| self.page.included.get(key).or_else(|| self.page.find(key)))
            .collect()
    }
}

#[derive(Clone)]
pub struct IncludeResolver {
    store: DynStore,
    catalog: Arc<ResourceCatalog>,
    batch_limit: usize,
}

impl std::fmt::Debug for IncludeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeResolver")
            .field("backend", &self.store.backend_name())
            .field("batch_limit", &self.batch_limit)
            .finish()
    }
}

/// Storage coordinates of a validated spec.
struct Lookup {
    entity_type: EntityType,
    field: &'static str,
}

impl IncludeResolver {
    pub fn new(store: DynStore, catalog: Arc<ResourceCatalog>, batch_limit: usize) -> Self {
        Self {
            store,
            catalog,
            batch_limit: batch_limit.max(1),
        }
    }

    pub async fn resolve(
        &self,
        mut page: ResultPage,
        includes: &[IncludeSpec],
        revincludes: &[IncludeSpec],
        cancel: &CancellationToken,
    ) -> Result<EnrichedResultPage, SearchError> {
        let mut failures = Vec::new();
        let mut reverse_groups = ReverseGroups::new();
        if page.entities.is_empty() {
            return Ok(EnrichedResultPage {
                page,
                reverse_groups,
                failures,
            });
        }

        for spec in includes {
            let lookup = self.forward_lookup(spec)?;
            match self.fetch_forward(&page, &lookup, cancel).await {
                Ok(found) => attach(&mut page, spec, found),
                Err(SearchError::Storage(error)) => record(&mut failures, spec, error),
                Err(other) => return Err(other),
            }
        }

        for spec in revincludes {
            let lookup = self.reverse_lookup(spec)?;
            match self.fetch_reverse(&page, &lookup, cancel).await {
                Ok(groups) => {
                    let mut found = Vec::new();
                    for (id, members) in groups {
                        let keys = members.iter().map(Entity::key).collect();
                        reverse_groups.insert((spec.clone(), id), keys);
                        found.extend(members);
                    }
                    attach(&mut page, spec, found);
                }
                Err(SearchError::Storage(error)) => record(&mut failures, spec, error),
                Err(other) => return Err(other),
            }
        }

        Ok(EnrichedResultPage {
            page,
            reverse_groups,
            failures,
        })
    }

    fn forward_lookup(&self, spec: &IncludeSpec) -> Result<Lookup, SearchError> {
        let source = self.catalog.resolve(spec.source)?;
        let binding = source
            .reference_binding(&spec.param)
            .ok_or_else(|| SearchError::unsupported_parameter(spec))?;
        if !binding.allows_target(spec.target) {
            return Err(SearchError::invalid_value(format!(
                "{} cannot reference {}",
                spec.param, spec.target
            )));
        }
        Ok(Lookup {
            entity_type: spec.target.entity_type(),
            field: binding.field,
        })
    }

    fn reverse_lookup(&self, spec: &IncludeSpec) -> Result<Lookup, SearchError> {
        let source = self.catalog.resolve(spec.source)?;
        let binding = source
            .reference_binding(&spec.param)
            .ok_or_else(|| SearchError::unsupported_parameter(spec))?;
        if !binding.allows_target(spec.target) {
            return Err(SearchError::invalid_value(format!(
                "{} cannot reference {}",
                spec.param, spec.target
            )));
        }
        Ok(Lookup {
            entity_type: source.entity_type,
            field: binding.field,
        })
    }

    async fn fetch_forward(
        &self,
        page: &ResultPage,
        lookup: &Lookup,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entity>, SearchError> {
        // Distinct referenced ids in page order.
        let ids: IndexSet<String> = page
            .entities
            .iter()
            .flat_map(|e| e.references(lookup.field))
            .filter(|r| r.entity_type == lookup.entity_type)
            .map(|r| r.id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.into_iter().collect();

        let mut found = Vec::with_capacity(ids.len());
        for batch in ids.chunks(self.batch_limit) {
            tracing::trace!(
                entity_type = %lookup.entity_type,
                ids = batch.len(),
                "forward include batch"
            );
            let mut fetched = cancellable(
                cancel,
                self.store.batch_fetch_by_ids(lookup.entity_type, batch),
            )
            .await?;
            found.append(&mut fetched);
        }
        Ok(found)
    }

    async fn fetch_reverse(
        &self,
        page: &ResultPage,
        lookup: &Lookup,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, Vec<Entity>)>, SearchError> {
        let ids = page.ids();
        let mut found = Vec::new();
        for batch in ids.chunks(self.batch_limit) {
            tracing::trace!(
                entity_type = %lookup.entity_type,
                field = lookup.field,
                ids = batch.len(),
                "reverse include batch"
            );
            let mut grouped = cancellable(
                cancel,
                self.store
                    .batch_fetch_by_reference_field(lookup.entity_type, lookup.field, batch),
            )
            .await?;
            // Group order follows the page.
            for id in batch {
                if let Some(group) = grouped.remove(id) {
                    found.push((id.clone(), group));
                }
            }
        }
        Ok(found)
    }
}

fn attach(page: &mut ResultPage, spec: &IncludeSpec, found: Vec<Entity>) {
    let fetched = found.len();
    let mut added = 0;
    for entity in found {
        if page.include(entity) {
            added += 1;
        }
    }
    tracing::trace!(spec = %spec, fetched, added, "attached includes");
}

fn record(failures: &mut Vec<IncludeFailure>, spec: &IncludeSpec, error: StorageError) {
    tracing::warn!(spec = %spec, error = %error, "include lookup failed");
    failures.push(IncludeFailure {
        spec: spec.clone(),
        error,
    });
}
