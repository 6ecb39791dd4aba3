//! Parameters shared by every resource type: `_id` and `_lastUpdated`.

use fhirbridge_storage::Constraint;

use super::field::validate_date_range;
use super::{ConstraintBuilder, SearchHandler, param_name, push_clauses};
use crate::error::SearchError;
use crate::params::{ParamEntry, ParamValue};

pub const ID_PROPERTY: &str = "_id";
pub const LAST_UPDATED_PROPERTY: &str = "_lastUpdated";

#[derive(Debug, Clone)]
pub struct CommonHandler {
    name: &'static str,
}

impl CommonHandler {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl SearchHandler for CommonHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(
        &self,
        builder: &mut ConstraintBuilder<'_>,
        entries: &[ParamEntry],
    ) -> Result<(), SearchError> {
        for entry in entries {
            match param_name(entry, None)? {
                ID_PROPERTY => {
                    for clause in entry.value.clauses() {
                        let mut ids = Vec::with_capacity(clause.values().len());
                        for value in clause.values() {
                            match value {
                                ParamValue::Token { code, .. } if !code.is_empty() => {
                                    ids.push(code.clone())
                                }
                                other => {
                                    return Err(SearchError::invalid_value(format!(
                                        "{ID_PROPERTY} expects non-empty token values, got {}",
                                        other.kind()
                                    )));
                                }
                            }
                        }
                        ids.sort();
                        ids.dedup();
                        builder.push(Constraint::IdIn { ids });
                    }
                }
                LAST_UPDATED_PROPERTY => {
                    push_clauses(builder, entry, |_, value| match value {
                        ParamValue::DateRange(range) => {
                            validate_date_range(LAST_UPDATED_PROPERTY, range)?;
                            Ok(Constraint::LastUpdated {
                                lower: range.lower,
                                upper: range.upper,
                            })
                        }
                        other => Err(SearchError::invalid_value(format!(
                            "{LAST_UPDATED_PROPERTY} expects date values, got {}",
                            other.kind()
                        ))),
                    })?;
                }
                other => {
                    return Err(SearchError::unsupported_parameter(format!(
                        "{other} is not handled by {}",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceCatalog;
    use crate::config::PlatformProfile;
    use crate::params::{DateRangeParam, OrList};
    use fhirbridge_core::ResourceType;

    fn apply(entries: &[ParamEntry]) -> Result<Vec<Constraint>, SearchError> {
        let catalog = ResourceCatalog::for_profile(PlatformProfile::Core);
        let definition = catalog.resolve(ResourceType::Patient).unwrap();
        let mut builder = ConstraintBuilder::new(&catalog, definition, 3);
        CommonHandler::new("common").apply(&mut builder, entries)?;
        Ok(builder.finish().constraints)
    }

    #[test]
    fn test_id_or_list_merges() {
        let value = OrList::new()
            .or(ParamValue::token("b"))
            .or(ParamValue::token("a"));
        let constraints = apply(&[ParamEntry {
            name: Some(ID_PROPERTY.into()),
            value: value.into(),
        }])
        .unwrap();
        assert_eq!(
            constraints,
            vec![Constraint::IdIn {
                ids: vec!["a".to_string(), "b".to_string()]
            }]
        );
    }

    #[test]
    fn test_last_updated() {
        let at = "2024-03-01T00:00:00Z".parse().unwrap();
        let constraints = apply(&[ParamEntry {
            name: Some(LAST_UPDATED_PROPERTY.into()),
            value: DateRangeParam::from(at).into(),
        }])
        .unwrap();
        assert!(matches!(constraints[0], Constraint::LastUpdated { .. }));
    }

    #[test]
    fn test_requires_known_name() {
        let err = apply(&[ParamEntry {
            name: None,
            value: ParamValue::token("x").into(),
        }])
        .unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedParameter(_)));

        let err = apply(&[ParamEntry {
            name: Some("_text".into()),
            value: ParamValue::token("x").into(),
        }])
        .unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedParameter(_)));
    }
}
