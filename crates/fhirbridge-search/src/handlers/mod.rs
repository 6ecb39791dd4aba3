//! Search handlers.
//!
//! A handler turns the parameters addressed to it into storage constraints on
//! a shared [`ConstraintBuilder`]. Handlers resolve parameter names through the
//! resource catalog and never know about aliases.

mod common;
mod field;
mod reference;

pub use common::{CommonHandler, ID_PROPERTY, LAST_UPDATED_PROPERTY};
pub use field::FieldHandler;
pub use reference::ReferenceHandler;

use fhirbridge_core::{EntityType, ResourceType};
use fhirbridge_storage::{Constraint, ConstraintSet, JoinId};
use std::fmt;

use crate::catalog::{ResourceCatalog, ResourceDefinition};
use crate::error::SearchError;
use crate::params::{ParamEntry, ParamValue};

/// Strategy contributing constraints for one handler name.
///
/// `apply` must be idempotent: applying the same entries twice leaves the
/// builder as if they were applied once.
pub trait SearchHandler: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        builder: &mut ConstraintBuilder<'_>,
        entries: &[ParamEntry],
    ) -> Result<(), SearchError>;
}

/// Accumulates joins and constraints for one query.
#[derive(Debug)]
pub struct ConstraintBuilder<'a> {
    catalog: &'a ResourceCatalog,
    definition: &'a ResourceDefinition,
    max_chain_depth: usize,
    set: ConstraintSet,
}

impl<'a> ConstraintBuilder<'a> {
    pub fn new(
        catalog: &'a ResourceCatalog,
        definition: &'a ResourceDefinition,
        max_chain_depth: usize,
    ) -> Self {
        Self {
            catalog,
            definition,
            max_chain_depth,
            set: ConstraintSet::new(),
        }
    }

    pub fn catalog(&self) -> &'a ResourceCatalog {
        self.catalog
    }

    pub fn definition(&self) -> &'a ResourceDefinition {
        self.definition
    }

    pub fn resource_type(&self) -> ResourceType {
        self.definition.resource_type
    }

    pub fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    pub fn join(&mut self, parent: Option<JoinId>, field: &str, target: EntityType) -> JoinId {
        self.set.join(parent, field, target)
    }

    /// Add a constraint; duplicates collapse.
    pub fn push(&mut self, constraint: Constraint) {
        self.set.push(constraint);
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.set
    }

    pub fn finish(self) -> ConstraintSet {
        self.set
    }
}

/// Parameter name of an entry, falling back to the handler's implied name.
pub(crate) fn param_name<'e>(entry: &'e ParamEntry, default: Option<&'e str>) -> Result<&'e str, SearchError> {
    entry
        .name
        .as_deref()
        .or(default)
        .ok_or_else(|| SearchError::unsupported_parameter("parameter name is required"))
}

/// Fold the constraints of one OR clause into a single constraint.
pub(crate) fn any_of(mut constraints: Vec<Constraint>) -> Option<Constraint> {
    constraints.dedup();
    match constraints.len() {
        0 => None,
        1 => constraints.pop(),
        _ => Some(Constraint::AnyOf { constraints }),
    }
}

/// Apply `convert` to every value of every clause of `entry` and push one
/// constraint per clause.
pub(crate) fn push_clauses<'a, F>(
    builder: &mut ConstraintBuilder<'a>,
    entry: &ParamEntry,
    mut convert: F,
) -> Result<(), SearchError>
where
    F: FnMut(&mut ConstraintBuilder<'a>, &ParamValue) -> Result<Constraint, SearchError>,
{
    for clause in entry.value.clauses() {
        let mut constraints = Vec::with_capacity(clause.values().len());
        for value in clause.values() {
            constraints.push(convert(builder, value)?);
        }
        if let Some(constraint) = any_of(constraints) {
            builder.push(constraint);
        }
    }
    Ok(())
}
