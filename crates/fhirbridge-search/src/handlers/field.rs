//! Handlers for non-reference fields: token, date, quantity, string and number.

use fhirbridge_storage::{Constraint, DateBound, NumberBound};

use super::{ConstraintBuilder, SearchHandler, any_of, param_name, push_clauses};
use crate::catalog::{FieldBinding, FieldKind};
use crate::error::SearchError;
use crate::params::{DateRangeParam, ParamEntry, ParamValue, ValueKind};

/// Matches one value kind against catalog field bindings.
#[derive(Debug, Clone)]
pub struct FieldHandler {
    name: &'static str,
    default_param: Option<&'static str>,
    accepts: ValueKind,
}

impl FieldHandler {
    pub fn new(name: &'static str, default_param: Option<&'static str>, accepts: ValueKind) -> Self {
        Self {
            name,
            default_param,
            accepts,
        }
    }

    pub fn token(name: &'static str, default_param: &'static str) -> Self {
        Self::new(name, Some(default_param), ValueKind::Token)
    }

    pub fn date(name: &'static str, default_param: &'static str) -> Self {
        Self::new(name, Some(default_param), ValueKind::Date)
    }

    pub fn quantity(name: &'static str, default_param: &'static str) -> Self {
        Self::new(name, Some(default_param), ValueKind::Quantity)
    }

    pub fn string(name: &'static str, default_param: &'static str) -> Self {
        Self::new(name, Some(default_param), ValueKind::String)
    }

    pub fn number(name: &'static str, default_param: &'static str) -> Self {
        Self::new(name, Some(default_param), ValueKind::Number)
    }
}

impl SearchHandler for FieldHandler {
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
            let binding = definition.field_binding(param).ok_or_else(|| {
                SearchError::unsupported_parameter(format!(
                    "{param} is not a {} parameter of {}",
                    self.accepts, definition.resource_type
                ))
            })?;
            push_clauses(builder, entry, |_, value| {
                if value.kind() != self.accepts {
                    return Err(SearchError::invalid_value(format!(
                        "handler {} expects {} values, got {}",
                        self.name,
                        self.accepts,
                        value.kind()
                    )));
                }
                field_constraint(binding, value)
            })?;
        }
        Ok(())
    }
}

fn expected_kind(kind: FieldKind) -> ValueKind {
    match kind {
        FieldKind::Token => ValueKind::Token,
        FieldKind::Text => ValueKind::String,
        FieldKind::Date => ValueKind::Date,
        FieldKind::Number => ValueKind::Number,
        FieldKind::Quantity => ValueKind::Quantity,
    }
}

/// Constraint for `value` over every field of `binding`, OR-ed.
pub(crate) fn field_constraint(
    binding: &FieldBinding,
    value: &ParamValue,
) -> Result<Constraint, SearchError> {
    let mut constraints = Vec::with_capacity(binding.fields.len());
    for field in binding.fields {
        constraints.push(single_field(binding, field, value)?);
    }
    any_of(constraints).ok_or_else(|| {
        SearchError::invalid_value(format!("parameter {} has no storage field", binding.param))
    })
}

fn single_field(
    binding: &FieldBinding,
    field: &str,
    value: &ParamValue,
) -> Result<Constraint, SearchError> {
    let field = field.to_string();
    match (binding.kind, value) {
        (FieldKind::Token, ParamValue::Token { system, code }) => {
            if code.is_empty() {
                return Err(SearchError::invalid_value(format!(
                    "parameter {} requires a code",
                    binding.param
                )));
            }
            Ok(Constraint::Token {
                field,
                system: system.clone().filter(|s| !s.is_empty()),
                code: code.clone(),
            })
        }
        (FieldKind::Text, ParamValue::String { value, mode }) => Ok(Constraint::Text {
            field,
            value: value.clone(),
            mode: *mode,
        }),
        (FieldKind::Date, ParamValue::DateRange(range)) => {
            validate_date_range(binding.param, range)?;
            Ok(Constraint::DateRange {
                field,
                lower: range.lower,
                upper: range.upper,
            })
        }
        (
            FieldKind::Quantity | FieldKind::Number,
            ParamValue::Quantity {
                value,
                comparator,
                unit,
            },
        ) => {
            if !value.is_finite() {
                return Err(SearchError::invalid_value(format!(
                    "parameter {} requires a finite quantity",
                    binding.param
                )));
            }
            Ok(Constraint::Quantity {
                field,
                comparator: *comparator,
                value: *value,
                unit: unit.clone().filter(|u| !u.is_empty()),
            })
        }
        (FieldKind::Quantity | FieldKind::Number, ParamValue::NumberRange { lower, upper }) => {
            validate_number_range(binding.param, lower.as_ref(), upper.as_ref())?;
            Ok(Constraint::NumberRange {
                field,
                lower: *lower,
                upper: *upper,
            })
        }
        (kind, value) => Err(SearchError::invalid_value(format!(
            "parameter {} expects a {} value, got {}",
            binding.param,
            expected_kind(kind),
            value.kind()
        ))),
    }
}

/// Reject empty and inverted ranges.
pub(crate) fn validate_date_range(param: &str, range: &DateRangeParam) -> Result<(), SearchError> {
    match (&range.lower, &range.upper) {
        (None, None) => Err(SearchError::invalid_value(format!(
            "date range for {param} has no bounds"
        ))),
        (Some(lower), Some(upper)) if date_range_is_empty(lower, upper) => {
            Err(SearchError::invalid_value(format!(
                "date range for {param} is empty: {} to {}",
                lower.value, upper.value
            )))
        }
        _ => Ok(()),
    }
}

fn date_range_is_empty(lower: &DateBound, upper: &DateBound) -> bool {
    lower.value > upper.value
        || (lower.value == upper.value && !(lower.inclusive && upper.inclusive))
}

fn validate_number_range(
    param: &str,
    lower: Option<&NumberBound>,
    upper: Option<&NumberBound>,
) -> Result<(), SearchError> {
    if lower.is_none() && upper.is_none() {
        return Err(SearchError::invalid_value(format!(
            "number range for {param} has no bounds"
        )));
    }
    if lower.into_iter().chain(upper).any(|b| !b.value.is_finite()) {
        return Err(SearchError::invalid_value(format!(
            "number range for {param} has a non-finite bound"
        )));
    }
    if let (Some(lower), Some(upper)) = (lower, upper) {
        let inverted = lower.value > upper.value
            || (lower.value == upper.value && !(lower.inclusive && upper.inclusive));
        if inverted {
            return Err(SearchError::invalid_value(format!(
                "number range for {param} is empty"
            )));
        }
    }
    Ok(())
}
