//! Composes handler output, sort and paging into a [`QueryDescriptor`].

use fhirbridge_core::{EntityType, ResourceType};
use fhirbridge_storage::{ConstraintSet, PageRequest, SortField, SortKey};
use std::sync::Arc;

use crate::catalog::{ResourceCatalog, ResourceDefinition};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::handlers::ConstraintBuilder;
use crate::params::{IncludeSpec, ParameterMap, SortSpec};
use crate::registry::HandlerRegistry;

/// A fully resolved query, immutable once handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub resource_type: ResourceType,
    pub entity_type: EntityType,
    pub constraints: ConstraintSet,
    /// Always ends with an id ascending tie-break.
    pub sort: Vec<SortKey>,
    pub page: PageRequest,
    pub includes: Vec<IncludeSpec>,
    pub revincludes: Vec<IncludeSpec>,
}

impl QueryDescriptor {
    /// Same query without paging.
    pub fn unpaged(&self) -> Self {
        Self {
            page: PageRequest::unbounded(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    registry: Arc<HandlerRegistry>,
    catalog: Arc<ResourceCatalog>,
    config: Arc<SearchConfig>,
}

impl QueryBuilder {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        catalog: Arc<ResourceCatalog>,
        config: Arc<SearchConfig>,
    ) -> Self {
        Self {
            registry,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Build a descriptor for `resource_type`.
    ///
    /// `sort` overrides the map's own sort spec. `page.limit` of `None` uses
    /// the configured default page size; larger limits are capped.
    pub fn build(
        &self,
        resource_type: ResourceType,
        params: &ParameterMap,
        sort: Option<&SortSpec>,
        page: PageRequest,
    ) -> Result<QueryDescriptor, SearchError> {
        let definition = self.catalog.resolve(resource_type)?;

        let mut builder =
            ConstraintBuilder::new(&self.catalog, definition, self.config.max_chain_depth);
        for (handler_name, entries) in params.handlers() {
            let handler = self.registry.resolve(handler_name)?;
            handler.apply(&mut builder, entries)?;
        }
        let constraints = builder.finish();

        let (includes, revincludes) = self.resolve_includes(definition, params)?;
        let sort = resolve_sort(definition, sort.or(params.sort_spec()))?;
        let page = PageRequest {
            offset: page.offset,
            limit: Some(self.config.page_size(page.limit)),
        };

        tracing::debug!(
            resource_type = %resource_type,
            constraints = constraints.len(),
            joins = constraints.joins.len(),
            sort = ?sort,
            offset = page.offset,
            limit = ?page.limit,
            "built query descriptor"
        );

        Ok(QueryDescriptor {
            resource_type,
            entity_type: definition.entity_type,
            constraints,
            sort,
            page,
            includes,
            revincludes,
        })
    }

    fn resolve_includes(
        &self,
        definition: &ResourceDefinition,
        params: &ParameterMap,
    ) -> Result<(Vec<IncludeSpec>, Vec<IncludeSpec>), SearchError> {
        let mut includes = Vec::new();
        let mut revincludes = Vec::new();

        for (handler, specs) in params.include_handlers() {
            let reverse = self.registry.include_direction(handler).ok_or_else(|| {
                SearchError::unsupported_parameter(format!("no include handler named {handler}"))
            })?;
            for spec in specs {
                if spec.reverse != reverse {
                    return Err(SearchError::invalid_value(format!(
                        "{spec} registered under {handler}"
                    )));
                }
                if reverse {
                    self.validate_revinclude(definition, spec)?;
                    if !revincludes.contains(spec) {
                        revincludes.push(spec.clone());
                    }
                } else {
                    validate_include(definition, spec)?;
                    if !includes.contains(spec) {
                        includes.push(spec.clone());
                    }
                }
            }
        }
        Ok((includes, revincludes))
    }

    fn validate_revinclude(
        &self,
        definition: &ResourceDefinition,
        spec: &IncludeSpec,
    ) -> Result<(), SearchError> {
        if spec.target != definition.resource_type {
            return Err(SearchError::invalid_value(format!(
                "{spec} does not target {}",
                definition.resource_type
            )));
        }
        if !definition.allows_revinclude(spec.source, &spec.param) {
            return Err(SearchError::unsupported_parameter(spec));
        }
        let source = self.catalog.resolve(spec.source)?;
        let binding = source
            .reference_binding(&spec.param)
            .ok_or_else(|| SearchError::unsupported_parameter(spec))?;
        if !binding.allows_target(definition.resource_type) {
            return Err(SearchError::invalid_value(format!(
                "{} cannot reference {}",
                spec.param, definition.resource_type
            )));
        }
        Ok(())
    }
}

fn validate_include(definition: &ResourceDefinition, spec: &IncludeSpec) -> Result<(), SearchError> {
    if spec.source != definition.resource_type {
        return Err(SearchError::invalid_value(format!(
            "{spec} does not apply to {}",
            definition.resource_type
        )));
    }
    if !definition.allows_include(&spec.param) {
        return Err(SearchError::unsupported_parameter(spec));
    }
    let binding = definition
        .reference_binding(&spec.param)
        .ok_or_else(|| SearchError::unsupported_parameter(spec))?;
    if !binding.allows_target(spec.target) {
        return Err(SearchError::invalid_value(format!(
            "{} cannot reference {}",
            spec.param, spec.target
        )));
    }
    Ok(())
}

/// Map sort parameters to storage keys. An empty spec sorts by last update,
/// newest first. An id ascending tie-break is appended unless the id is
/// already a key.
fn resolve_sort(
    definition: &ResourceDefinition,
    spec: Option<&SortSpec>,
) -> Result<Vec<SortKey>, SearchError> {
    let mut keys = Vec::new();
    match spec.filter(|s| !s.is_empty()) {
        None => keys.push(SortKey::descending(SortField::LastUpdated)),
        Some(spec) => {
            for param in spec.params() {
                let field = definition.sort_field(&param.param).ok_or_else(|| {
                    SearchError::unsupported_parameter(format!(
                        "cannot sort {} by {}",
                        definition.resource_type, param.param
                    ))
                })?;
                if keys.iter().any(|k: &SortKey| k.field == field) {
                    continue;
                }
                keys.push(SortKey {
                    field,
                    direction: param.direction,
                });
            }
        }
    }
    if !keys.iter().any(|k| k.field == SortField::Id) {
        keys.push(SortKey::id_ascending());
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformProfile;
    use crate::params::{ParamValue, ReferenceParam};
    use crate::registry::names;
    use fhirbridge_core::fields;
    use fhirbridge_storage::SortDirection;

    fn query_builder() -> QueryBuilder {
        let profile = PlatformProfile::Core;
        QueryBuilder::new(
            Arc::new(HandlerRegistry::for_profile(profile)),
            Arc::new(ResourceCatalog::for_profile(profile)),
            Arc::new(SearchConfig::default()),
        )
    }

    #[test]
    fn test_empty_map_defaults() {
        let descriptor = query_builder()
            .build(
                ResourceType::Observation,
                &ParameterMap::new(),
                None,
                PageRequest::default(),
            )
            .unwrap();
        assert!(descriptor.constraints.is_empty());
        assert_eq!(
            descriptor.sort,
            vec![
                SortKey::descending(SortField::LastUpdated),
                SortKey::id_ascending()
            ]
        );
        assert_eq!(descriptor.page, PageRequest::new(0, 10));
        assert_eq!(descriptor.entity_type, EntityType::Obs);
    }

    #[test]
    fn test_explicit_sort_is_stabilized() {
        let sort = SortSpec::new().descending("date");
        let descriptor = query_builder()
            .build(
                ResourceType::Observation,
                &ParameterMap::new(),
                Some(&sort),
                PageRequest::first(500),
            )
            .unwrap();
        assert_eq!(
            descriptor.sort,
            vec![
                SortKey {
                    field: SortField::Field(fields::obs::OBS_DATETIME.to_string()),
                    direction: SortDirection::Descending,
                },
                SortKey::id_ascending()
            ]
        );
        assert_eq!(descriptor.page.limit, Some(100));

        let by_id = SortSpec::new().descending("_id");
        let descriptor = query_builder()
            .build(ResourceType::Observation, &ParameterMap::new(), Some(&by_id), PageRequest::default())
            .unwrap();
        assert_eq!(descriptor.sort, vec![SortKey::descending(SortField::Id)]);
    }

    #[test]
    fn test_unknown_sort_and_handler() {
        let sort = SortSpec::new().ascending("status");
        let err = query_builder()
            .build(ResourceType::Observation, &ParameterMap::new(), Some(&sort), PageRequest::default())
            .unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedParameter(_)));

        let params = ParameterMap::new().add_parameter("bogus", None, ParamValue::token("x"));
        let err = query_builder()
            .build(ResourceType::Observation, &params, None, PageRequest::default())
            .unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedParameter(_)));
    }

    #[test]
    fn test_unsupported_resource_under_core() {
        let err = query_builder()
            .build(
                ResourceType::MedicationDispense,
                &ParameterMap::new(),
                None,
                PageRequest::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedResource(_)));
    }

    #[test]
    fn test_build_is_deterministic() {
        let params = ParameterMap::new()
            .add_parameter(names::PATIENT_REFERENCE, Some("subject"), ReferenceParam::id("p1"))
            .add_parameter(names::CODED, None, ParamValue::token("1234"));
        let qb = query_builder();
        let a = qb
            .build(ResourceType::Observation, &params, None, PageRequest::default())
            .unwrap();
        let b = qb
            .build(ResourceType::Observation, &params, None, PageRequest::default())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.constraints.len(), 2);
    }

    #[test]
    fn test_include_validation() {
        let qb = query_builder();

        let ok = ParameterMap::new()
            .add_includes(
                names::INCLUDE,
                [IncludeSpec::forward(ResourceType::Observation, "patient", ResourceType::Patient)],
            )
            .add_includes(
                names::REVERSE_INCLUDE,
                [IncludeSpec::reverse(
                    ResourceType::DiagnosticReport,
                    "result",
                    ResourceType::Observation,
                )],
            );
        let descriptor = qb
            .build(ResourceType::Observation, &ok, None, PageRequest::default())
            .unwrap();
        assert_eq!(descriptor.includes.len(), 1);
        assert_eq!(descriptor.revincludes.len(), 1);

        let not_allowed = ParameterMap::new().add_includes(
            names::INCLUDE,
            [IncludeSpec::forward(ResourceType::Observation, "code", ResourceType::Patient)],
        );
        assert!(matches!(
            qb.build(ResourceType::Observation, &not_allowed, None, PageRequest::default()),
            Err(SearchError::UnsupportedParameter(_))
        ));

        let wrong_target = ParameterMap::new().add_includes(
            names::INCLUDE,
            [IncludeSpec::forward(ResourceType::Observation, "patient", ResourceType::Encounter)],
        );
        assert!(matches!(
            qb.build(ResourceType::Observation, &wrong_target, None, PageRequest::default()),
            Err(SearchError::InvalidValue(_))
        ));
    }
}
