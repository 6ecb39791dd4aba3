//! Reference parameters, including chained references.
//!
//! `subject:Patient.family=Smith` arrives as a [`ReferenceParam`] with target
//! `Patient`, chain `family` and value `Smith`. Every chain segment except the
//! last must name a reference parameter on the current target and adds a join;
//! the last segment is matched against the reached entity.

use std::str::FromStr;

use fhirbridge_core::{FhirDateTime, ResourceType, parse_reference};
use fhirbridge_storage::{Constraint, DateBound, NumberBound, TextMatch};

use super::{ConstraintBuilder, SearchHandler, any_of, param_name, push_clauses};
use crate::catalog::{FieldBinding, FieldKind, ReferenceBinding};
use crate::error::SearchError;
use crate::params::{ParamEntry, ParamValue, ReferenceParam};

#[derive(Debug, Clone)]
pub struct ReferenceHandler {
    name: &'static str,
    default_param: Option<&'static str>,
}

impl ReferenceHandler {
    pub fn new(name: &'static str, default_param: &'static str) -> Self {
        Self {
            name,
            default_param: Some(default_param),
        }
    }
}

impl SearchHandler for ReferenceHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(
        &self,
        builder: &mut ConstraintBuilder<'_>,
        entries: &[ParamEntry],
    ) -> Result<(), SearchError> {
        let definition = builder.definition();
        for entry in entries {
            let param = param_name(entry, self.default_param)?;
            let binding = definition.reference_binding(param).ok_or_else(|| {
                SearchError::unsupported_parameter(format!(
                    "{param} is not a reference parameter of {}",
                    definition.resource_type
                ))
            })?;
            push_clauses(builder, entry, |builder, value| match value {
                ParamValue::Reference(reference) => reference_constraint(builder, binding, reference),
                other => Err(SearchError::invalid_value(format!(
                    "handler {} expects reference values, got {}",
                    self.name,
                    other.kind()
                ))),
            })?;
        }
        Ok(())
    }
}

fn reference_constraint(
    builder: &mut ConstraintBuilder<'_>,
    binding: &ReferenceBinding,
    reference: &ReferenceParam,
) -> Result<Constraint, SearchError> {
    if let Some(target) = reference.target_type {
        check_target(binding, target)?;
    }
    match reference.chain.as_deref() {
        None => direct_reference(binding, reference),
        Some(chain) => chained_reference(builder, binding, reference.target_type, chain, &reference.value),
    }
}

fn check_target(binding: &ReferenceBinding, target: ResourceType) -> Result<(), SearchError> {
    if binding.allows_target(target) {
        Ok(())
    } else {
        Err(SearchError::invalid_value(format!(
            "{target} is not a valid target of {}",
            binding.param
        )))
    }
}

/// Match on the referenced identifier, scoped to a type when one is known.
fn direct_reference(
    binding: &ReferenceBinding,
    reference: &ReferenceParam,
) -> Result<Constraint, SearchError> {
    let value = reference.value.trim();
    if value.is_empty() {
        return Err(SearchError::invalid_value(format!(
            "parameter {} requires a reference",
            binding.param
        )));
    }

    let (scope, id) = if value.contains('/') {
        let parsed = parse_reference(value).map_err(SearchError::invalid_value)?;
        check_target(binding, parsed.resource_type)?;
        if reference
            .target_type
            .is_some_and(|t| t != parsed.resource_type)
        {
            return Err(SearchError::invalid_value(format!(
                "reference {value} does not match the {} modifier",
                binding.param
            )));
        }
        (Some(parsed.resource_type), parsed.id)
    } else {
        (
            reference.target_type.or(binding.single_target()),
            value.to_string(),
        )
    };

    Ok(Constraint::References {
        field: binding.field.to_string(),
        target_type: scope.map(|t| t.entity_type()),
        ids: vec![id],
    })
}

/// Splits `name:Type` into its parts.
fn split_segment(segment: &str) -> Result<(&str, Option<ResourceType>), SearchError> {
    match segment.split_once(':') {
        Some((name, type_name)) => {
            let target = ResourceType::from_str(type_name).map_err(SearchError::invalid_value)?;
            Ok((name, Some(target)))
        }
        None => Ok((segment, None)),
    }
}

fn resolve_target(
    binding: &ReferenceBinding,
    explicit: Option<ResourceType>,
) -> Result<ResourceType, SearchError> {
    match explicit {
        Some(target) => {
            check_target(binding, target)?;
            Ok(target)
        }
        None => binding.single_target().ok_or_else(|| {
            SearchError::invalid_value(format!(
                "chain through {} needs an explicit target type",
                binding.param
            ))
        }),
    }
}

fn chained_reference(
    builder: &mut ConstraintBuilder<'_>,
    binding: &ReferenceBinding,
    explicit: Option<ResourceType>,
    chain: &str,
    value: &str,
) -> Result<Constraint, SearchError> {
    let segments: Vec<&str> = chain.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(SearchError::invalid_value(format!(
            "chain {}.{chain} has an empty segment",
            binding.param
        )));
    }
    let Some((last, intermediate)) = segments.split_last() else {
        return direct_reference(binding, &ReferenceParam::id(value));
    };

    let catalog = builder.catalog();
    let mut target = resolve_target(binding, explicit)?;
    let mut join = builder.join(None, binding.field, target.entity_type());
    let mut depth = 1;
    let mut allowed = binding.chains;
    let mut via = binding.param;

    for segment in intermediate {
        let (name, segment_type) = split_segment(segment)?;
        check_chain(via, allowed, name)?;

        let definition = catalog.resolve(target)?;
        let next = match definition.reference_binding(name) {
            Some(next) => next,
            None if definition.field_binding(name).is_some() => {
                return Err(SearchError::invalid_value(format!(
                    "cannot chain through {target}.{name}: not a reference"
                )));
            }
            None => {
                return Err(SearchError::unsupported_parameter(format!(
                    "{name} is not a search parameter of {target}"
                )));
            }
        };

        depth += 1;
        if depth > builder.max_chain_depth() {
            return Err(SearchError::invalid_value(format!(
                "chain {}.{chain} exceeds the maximum depth of {}",
                binding.param,
                builder.max_chain_depth()
            )));
        }

        target = resolve_target(next, segment_type)?;
        join = builder.join(Some(join), next.field, target.entity_type());
        allowed = next.chains;
        via = next.param;
    }

    let (name, modifier) = match last.split_once(':') {
        Some((name, modifier)) => (name, Some(modifier)),
        None => (*last, None),
    };
    check_chain(via, allowed, name)?;

    let definition = catalog.resolve(target)?;
    let constraint = if let Some(field) = definition.field_binding(name) {
        chained_field(field, modifier, value)?
    } else if let Some(reference) = definition.reference_binding(name) {
        direct_reference(reference, &ReferenceParam::id(value))?
    } else {
        return Err(SearchError::unsupported_parameter(format!(
            "{name} is not a search parameter of {target}"
        )));
    };

    Ok(Constraint::Joined {
        join,
        constraint: Box::new(constraint),
    })
}

fn check_chain(via: &str, allowed: &[&str], name: &str) -> Result<(), SearchError> {
    if allowed.contains(&name) {
        Ok(())
    } else {
        Err(SearchError::unsupported_parameter(format!(
            "{via}.{name} is not a supported chain"
        )))
    }
}

/// Terminal constraint of a chain, parsed from the raw chained value.
fn chained_field(
    binding: &FieldBinding,
    modifier: Option<&str>,
    raw: &str,
) -> Result<Constraint, SearchError> {
    let mut constraints = Vec::with_capacity(binding.fields.len());
    for field in binding.fields {
        let field = field.to_string();
        let constraint = match binding.kind {
            FieldKind::Token => {
                let (system, code) = match raw.split_once('|') {
                    Some((system, code)) => (Some(system.to_string()).filter(|s| !s.is_empty()), code),
                    None => (None, raw),
                };
                Constraint::Token {
                    field,
                    system,
                    code: code.to_string(),
                }
            }
            FieldKind::Text => {
                let mode = match modifier {
                    None | Some("exact") => TextMatch::Exact,
                    Some("contains") => TextMatch::Contains,
                    Some(other) => {
                        return Err(SearchError::unsupported_parameter(format!(
                            "modifier :{other} on {}",
                            binding.param
                        )));
                    }
                };
                Constraint::Text {
                    field,
                    value: raw.to_string(),
                    mode,
                }
            }
            FieldKind::Date => {
                let at: FhirDateTime = raw.parse().map_err(SearchError::invalid_value)?;
                Constraint::DateRange {
                    field,
                    lower: Some(DateBound::inclusive(at)),
                    upper: Some(DateBound::inclusive(at)),
                }
            }
            FieldKind::Number | FieldKind::Quantity => {
                let value: f64 = raw.parse().map_err(|_| {
                    SearchError::invalid_value(format!("{raw} is not a number"))
                })?;
                let bound = NumberBound {
                    value,
                    inclusive: true,
                };
                Constraint::NumberRange {
                    field,
                    lower: Some(bound),
                    upper: Some(bound),
                }
            }
        };
        constraints.push(constraint);
    }
    any_of(constraints).ok_or_else(|| {
        SearchError::invalid_value(format!("parameter {} has no storage field", binding.param))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceCatalog;
    use crate::config::PlatformProfile;
    use fhirbridge_core::{EntityType, fields};
    use fhirbridge_storage::ConstraintSet;

    fn apply(param: &str, value: ReferenceParam, depth: usize) -> Result<ConstraintSet, SearchError> {
        let catalog = ResourceCatalog::for_profile(PlatformProfile::Core);
        let definition = catalog.resolve(ResourceType::Observation).unwrap();
        let mut builder = ConstraintBuilder::new(&catalog, definition, depth);
        let handler = ReferenceHandler::new("patient.reference", "patient");
        handler.apply(
            &mut builder,
            &[ParamEntry {
                name: Some(param.to_string()),
                value: value.into(),
            }],
        )?;
        Ok(builder.finish())
    }

    #[test]
    fn test_plain_id_is_scoped_to_single_target() {
        let set = apply("subject", ReferenceParam::id("p1"), 3).unwrap();
        assert_eq!(
            set.constraints,
            vec![Constraint::References {
                field: fields::obs::PERSON.to_string(),
                target_type: Some(EntityType::Person),
                ids: vec!["p1".to_string()],
            }]
        );
        assert!(set.joins.is_empty());
    }

    #[test]
    fn test_relative_reference_value() {
        let set = apply("subject", ReferenceParam::id("Patient/p1"), 3).unwrap();
        let Constraint::References { ids, .. } = &set.constraints[0] else {
            panic!("expected References");
        };
        assert_eq!(ids, &vec!["p1".to_string()]);

        let err = apply("subject", ReferenceParam::id("Encounter/e1"), 3).unwrap_err();
        assert!(matches!(err, SearchError::InvalidValue(_)));
    }

    #[test]
    fn test_chain_adds_join() {
        let value = ReferenceParam::chained(Some(ResourceType::Patient), "family", "Smith");
        let set = apply("subject", value, 3).unwrap();
        assert_eq!(set.joins.len(), 1);
        assert_eq!(set.joins[0].field, fields::obs::PERSON);
        assert_eq!(set.joins[0].target, EntityType::Person);
        let Constraint::Joined { constraint, .. } = &set.constraints[0] else {
            panic!("expected Joined");
        };
        assert_eq!(
            **constraint,
            Constraint::Text {
                field: fields::person::FAMILY_NAME.to_string(),
                value: "Smith".to_string(),
                mode: TextMatch::Exact,
            }
        );
    }

    #[test]
    fn test_two_level_chain_and_depth_limit() {
        let value = ReferenceParam::chained(None, "patient.family", "Smith");
        let set = apply("encounter", value.clone(), 3).unwrap();
        assert_eq!(set.joins.len(), 2);
        assert_eq!(set.joins[1].parent, Some(fhirbridge_storage::JoinId(0)));

        let err = apply("encounter", value, 1).unwrap_err();
        assert!(matches!(err, SearchError::InvalidValue(_)));
    }

    #[test]
    fn test_chain_whitelist() {
        let value = ReferenceParam::chained(None, "gender", "female");
        let err = apply("subject", value, 3).unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedParameter(_)));
    }

    #[test]
    fn test_chain_through_non_reference_is_invalid() {
        let value = ReferenceParam::chained(None, "type.code", "x");
        let err = apply("encounter", value, 3).unwrap_err();
        assert!(matches!(err, SearchError::InvalidValue(_)));
    }

    #[test]
    fn test_wrong_target_type_is_invalid() {
        let value = ReferenceParam::typed(ResourceType::Encounter, "e1");
        let err = apply("subject", value, 3).unwrap_err();
        assert!(matches!(err, SearchError::InvalidValue(_)));
    }
}
