//! Constraint evaluation and ordering for the in-memory backend.

use std::cmp::Ordering;

use fhirbridge_core::{Entity, EntityRef, FieldValue, FhirDateTime};
use fhirbridge_storage::{
    Constraint, ConstraintSet, DateBound, JoinId, NumberBound, SortDirection, SortField, SortKey,
    StorageError, TextMatch,
};

/// Evaluates a [`ConstraintSet`] against entities, resolving joins through `lookup`.
pub(crate) struct Matcher<'s, L> {
    set: &'s ConstraintSet,
    lookup: L,
}

impl<'s, 'g, L> Matcher<'s, L>
where
    L: Fn(&EntityRef) -> Option<&'g Entity>,
{
    pub(crate) fn new(set: &'s ConstraintSet, lookup: L) -> Self {
        Self { set, lookup }
    }

    /// Check whether `entity` satisfies every constraint in the set.
    pub(crate) fn matches(&self, entity: &'g Entity) -> Result<bool, StorageError> {
        for constraint in &self.set.constraints {
            if !self.eval(entity, entity, constraint)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn eval(
        &self,
        root: &'g Entity,
        entity: &Entity,
        constraint: &Constraint,
    ) -> Result<bool, StorageError> {
        let matched = match constraint {
            Constraint::IdIn { ids } => ids.iter().any(|id| *id == entity.id),
            Constraint::LastUpdated { lower, upper } => {
                within_dates(entity.date_changed, lower.as_ref(), upper.as_ref())
            }
            Constraint::Token {
                field,
                system,
                code,
            } => leaves(entity, field).any(|v| match_token(v, system.as_deref(), code)),
            Constraint::Text { field, value, mode } => {
                leaves(entity, field).any(|v| match_text(v, value, *mode))
            }
            Constraint::DateRange {
                field,
                lower,
                upper,
            } => leaves(entity, field).any(|v| {
                v.as_datetime()
                    .is_some_and(|dt| within_dates(dt, lower.as_ref(), upper.as_ref()))
            }),
            Constraint::NumberRange {
                field,
                lower,
                upper,
            } => leaves(entity, field).any(|v| {
                numeric(v).is_some_and(|n| within_numbers(n, lower.as_ref(), upper.as_ref()))
            }),
            Constraint::Quantity {
                field,
                comparator,
                value,
                unit,
            } => leaves(entity, field).any(|v| match v {
                FieldValue::Quantity(q) => {
                    comparator.compare(q.value, *value)
                        && unit.as_ref().is_none_or(|u| q.unit.as_ref() == Some(u))
                }
                FieldValue::Number(n) => unit.is_none() && comparator.compare(*n, *value),
                _ => false,
            }),
            Constraint::References {
                field,
                target_type,
                ids,
            } => entity.references(field).any(|r| {
                target_type.is_none_or(|t| r.entity_type == t) && ids.iter().any(|id| *id == r.id)
            }),
            Constraint::Joined { join, constraint } => {
                for target in self.reach(root, *join)? {
                    if self.eval(root, target, constraint)? {
                        return Ok(true);
                    }
                }
                false
            }
            Constraint::AnyOf { constraints } => {
                for member in constraints {
                    if self.eval(root, entity, member)? {
                        return Ok(true);
                    }
                }
                false
            }
        };
        Ok(matched)
    }

    /// Entities reached from `root` by walking the join path down to `join`.
    fn reach(&self, root: &'g Entity, join: JoinId) -> Result<Vec<&'g Entity>, StorageError> {
        if self.set.get_join(join).is_none() {
            return Err(StorageError::invalid_entity(format!(
                "constraint refers to unknown join {}",
                join.0
            )));
        }

        let mut current = vec![root];
        for step in self.set.join_path(join) {
            current = current
                .into_iter()
                .flat_map(|e| e.references(&step.field))
                .filter(|r| r.entity_type == step.target)
                .filter_map(|r| (self.lookup)(r))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        Ok(current)
    }
}

fn leaves<'e>(entity: &'e Entity, field: &str) -> impl Iterator<Item = &'e FieldValue> + 'e {
    entity.field(field).into_iter().flat_map(FieldValue::leaves)
}

fn match_token(value: &FieldValue, system: Option<&str>, code: &str) -> bool {
    match value {
        FieldValue::Coded(coding) => {
            coding.code == code && system.is_none_or(|s| coding.system.as_deref() == Some(s))
        }
        FieldValue::Text(text) => system.is_none() && text == code,
        _ => false,
    }
}

fn match_text(value: &FieldValue, needle: &str, mode: TextMatch) -> bool {
    let Some(text) = value.as_text() else {
        return false;
    };
    match mode {
        TextMatch::Exact => text == needle,
        TextMatch::Contains => text.to_lowercase().contains(&needle.to_lowercase()),
        TextMatch::StartsWith => text.to_lowercase().starts_with(&needle.to_lowercase()),
    }
}

fn numeric(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(n) => Some(*n),
        FieldValue::Quantity(q) => Some(q.value),
        _ => None,
    }
}

fn within_dates(value: FhirDateTime, lower: Option<&DateBound>, upper: Option<&DateBound>) -> bool {
    lower.is_none_or(|b| b.admits_from_below(value)) && upper.is_none_or(|b| b.admits_from_above(value))
}

fn within_numbers(value: f64, lower: Option<&NumberBound>, upper: Option<&NumberBound>) -> bool {
    lower.is_none_or(|b| b.admits_from_below(value)) && upper.is_none_or(|b| b.admits_from_above(value))
}

/// A comparable projection of the first scalar in a sort field.
#[derive(Debug, PartialEq)]
enum SortValue<'e> {
    Time(FhirDateTime),
    Number(f64),
    Text(&'e str),
}

impl SortValue<'_> {
    fn cmp_same_kind(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Time(a), SortValue::Time(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortValue::Time(_) => 0,
            SortValue::Number(_) => 1,
            SortValue::Text(_) => 2,
        }
    }
}

fn sort_value<'e>(entity: &'e Entity, field: &SortField) -> Option<SortValue<'e>> {
    match field {
        SortField::Id => Some(SortValue::Text(&entity.id)),
        SortField::LastUpdated => Some(SortValue::Time(entity.date_changed)),
        SortField::Field(name) => leaves(entity, name).find_map(|v| match v {
            FieldValue::DateTime(dt) => Some(SortValue::Time(*dt)),
            FieldValue::Number(n) => Some(SortValue::Number(*n)),
            FieldValue::Quantity(q) => Some(SortValue::Number(q.value)),
            FieldValue::Text(s) => Some(SortValue::Text(s)),
            FieldValue::Coded(c) => Some(SortValue::Text(&c.code)),
            FieldValue::Reference(r) => Some(SortValue::Text(&r.id)),
            FieldValue::List(_) => None,
        }),
    }
}

/// Compare two entities by `keys`. Entities missing a sort value go last in
/// either direction.
pub(crate) fn compare_entities(a: &Entity, b: &Entity, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ordering = match (sort_value(a, &key.field), sort_value(b, &key.field)) {
            (Some(x), Some(y)) => {
                let natural = x.cmp_same_kind(&y);
                match key.direction {
                    SortDirection::Ascending => natural,
                    SortDirection::Descending => natural.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
