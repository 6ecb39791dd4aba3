//! Storage query types.
//!
//! A query is an entity type, a [`ConstraintSet`] (joins plus a conjunctive list
//! of constraints), an ordered list of [`SortKey`]s and a [`PageRequest`].

use fhirbridge_core::{Entity, EntityType, FhirDateTime};
use serde::{Deserialize, Serialize};

/// How a text constraint compares against stored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextMatch {
    /// Case-sensitive full equality.
    Exact,
    /// Case-insensitive substring.
    Contains,
    /// Case-insensitive prefix.
    StartsWith,
}

/// Comparison operators for quantity constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Approximately: within 10% of the requested value.
    Ap,
}

impl Comparator {
    pub fn compare(&self, stored: f64, requested: f64) -> bool {
        match self {
            Comparator::Eq => stored == requested,
            Comparator::Ne => stored != requested,
            Comparator::Gt => stored > requested,
            Comparator::Ge => stored >= requested,
            Comparator::Lt => stored < requested,
            Comparator::Le => stored <= requested,
            Comparator::Ap => (stored - requested).abs() <= (requested * 0.1).abs(),
        }
    }
}

/// One end of a date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBound {
    pub value: FhirDateTime,
    pub inclusive: bool,
}

impl DateBound {
    pub fn inclusive(value: FhirDateTime) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: FhirDateTime) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }

    /// Whether `candidate` lies on the permitted side of this lower bound.
    pub fn admits_from_below(&self, candidate: FhirDateTime) -> bool {
        if self.inclusive {
            candidate >= self.value
        } else {
            candidate > self.value
        }
    }

    /// Whether `candidate` lies on the permitted side of this upper bound.
    pub fn admits_from_above(&self, candidate: FhirDateTime) -> bool {
        if self.inclusive {
            candidate <= self.value
        } else {
            candidate < self.value
        }
    }
}

/// One end of a numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberBound {
    pub value: f64,
    pub inclusive: bool,
}

impl NumberBound {
    pub fn admits_from_below(&self, candidate: f64) -> bool {
        if self.inclusive {
            candidate >= self.value
        } else {
            candidate > self.value
        }
    }

    pub fn admits_from_above(&self, candidate: f64) -> bool {
        if self.inclusive {
            candidate <= self.value
        } else {
            candidate < self.value
        }
    }
}

/// Index of a [`Join`] inside its [`ConstraintSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JoinId(pub usize);

/// Traversal from the root entity (or a previous join) through a reference field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Join {
    /// `None` starts from the queried entity.
    pub parent: Option<JoinId>,
    /// Reference field on the parent.
    pub field: String,
    /// Entity type the traversal lands on.
    pub target: EntityType,
}

/// A single filter over stored fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Constraint {
    /// Entity id is one of `ids`.
    IdIn { ids: Vec<String> },
    /// Filter on the entity's last-change timestamp.
    LastUpdated {
        lower: Option<DateBound>,
        upper: Option<DateBound>,
    },
    /// Any coded value in `field` matches code (and system when given).
    Token {
        field: String,
        system: Option<String>,
        code: String,
    },
    /// Any text in `field` matches `value` under `mode`.
    Text {
        field: String,
        value: String,
        mode: TextMatch,
    },
    /// Any datetime in `field` lies within the bounds.
    DateRange {
        field: String,
        lower: Option<DateBound>,
        upper: Option<DateBound>,
    },
    /// Any number or quantity value in `field` lies within the bounds.
    NumberRange {
        field: String,
        lower: Option<NumberBound>,
        upper: Option<NumberBound>,
    },
    /// Any quantity in `field` satisfies the comparator (and unit when given).
    Quantity {
        field: String,
        comparator: Comparator,
        value: f64,
        unit: Option<String>,
    },
    /// Any reference in `field` points at one of `ids`, scoped to
    /// `target_type` when given.
    References {
        field: String,
        target_type: Option<EntityType>,
        ids: Vec<String>,
    },
    /// Some entity reached through `join` satisfies `constraint`.
    Joined {
        join: JoinId,
        constraint: Box<Constraint>,
    },
    /// At least one member matches.
    AnyOf { constraints: Vec<Constraint> },
}

/// Joins plus a conjunctive list of constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub joins: Vec<Join>,
    pub constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a join, reusing an identical existing one.
    pub fn join(&mut self, parent: Option<JoinId>, field: impl Into<String>, target: EntityType) -> JoinId {
        let join = Join {
            parent,
            field: field.into(),
            target,
        };
        if let Some(pos) = self.joins.iter().position(|j| *j == join) {
            return JoinId(pos);
        }
        self.joins.push(join);
        JoinId(self.joins.len() - 1)
    }

    /// Adds a constraint unless an equal one is already present.
    pub fn push(&mut self, constraint: Constraint) {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }

    pub fn get_join(&self, id: JoinId) -> Option<&Join> {
        self.joins.get(id.0)
    }

    /// The joins from the root down to `id`, root first.
    pub fn join_path(&self, id: JoinId) -> Vec<&Join> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(join_id) = current {
            match self.joins.get(join_id.0) {
                Some(join) => {
                    path.push(join);
                    current = join.parent;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// What a sort key orders by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortField {
    Id,
    LastUpdated,
    Field(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    pub fn id_ascending() -> Self {
        Self::ascending(SortField::Id)
    }
}

/// Offset and optional limit, applied after ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: usize,
    /// `None` returns every row from `offset` on.
    pub limit: Option<usize>,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    pub fn first(limit: usize) -> Self {
        Self::new(0, limit)
    }

    pub fn unbounded() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }
}

/// One page of stored entities plus the filter-consistent total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredPage {
    pub entities: Vec<Entity>,
    pub total: usize,
}

impl StoredPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
