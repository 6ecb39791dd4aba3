//! Typed search parameter values and the per-request parameter map.
//!
//! Repeated parameters are AND-ed and comma separated values within one
//! parameter are OR-ed, so every map entry carries an [`AndList`] of
//! [`OrList`]s.

use fhirbridge_core::{FhirDateTime, ResourceType};
use fhirbridge_storage::{Comparator, DateBound, NumberBound, SortDirection, TextMatch};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference parameter value.
///
/// `chain` is a dotted path evaluated against the referenced resource, where
/// intermediate segments may carry a `:Type` modifier
/// (`encounter.patient:Patient.family`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceParam {
    pub target_type: Option<ResourceType>,
    pub chain: Option<String>,
    pub value: String,
}

impl ReferenceParam {
    /// Match referenced ids directly.
    pub fn id(value: impl Into<String>) -> Self {
        Self {
            target_type: None,
            chain: None,
            value: value.into(),
        }
    }

    pub fn typed(target_type: ResourceType, value: impl Into<String>) -> Self {
        Self {
            target_type: Some(target_type),
            chain: None,
            value: value.into(),
        }
    }

    pub fn chained(
        target_type: Option<ResourceType>,
        chain: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            target_type,
            chain: Some(chain.into()).filter(|c: &String| !c.is_empty()),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRangeParam {
    pub lower: Option<DateBound>,
    pub upper: Option<DateBound>,
}

impl DateRangeParam {
    /// `value >= lower`
    pub fn from(lower: FhirDateTime) -> Self {
        Self {
            lower: Some(DateBound::inclusive(lower)),
            upper: None,
        }
    }

    /// `value <= upper`
    pub fn until(upper: FhirDateTime) -> Self {
        Self {
            lower: None,
            upper: Some(DateBound::inclusive(upper)),
        }
    }

    pub fn between(lower: FhirDateTime, upper: FhirDateTime) -> Self {
        Self {
            lower: Some(DateBound::inclusive(lower)),
            upper: Some(DateBound::inclusive(upper)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ParamValue {
    Token {
        system: Option<String>,
        code: String,
    },
    Reference(ReferenceParam),
    DateRange(DateRangeParam),
    Quantity {
        value: f64,
        comparator: Comparator,
        unit: Option<String>,
    },
    String {
        value: String,
        mode: TextMatch,
    },
    NumberRange {
        lower: Option<NumberBound>,
        upper: Option<NumberBound>,
    },
}

impl ParamValue {
    pub fn token(code: impl Into<String>) -> Self {
        ParamValue::Token {
            system: None,
            code: code.into(),
        }
    }

    pub fn token_with_system(system: impl Into<String>, code: impl Into<String>) -> Self {
        ParamValue::Token {
            system: Some(system.into()),
            code: code.into(),
        }
    }

    pub fn string(value: impl Into<String>, mode: TextMatch) -> Self {
        ParamValue::String {
            value: value.into(),
            mode,
        }
    }

    pub fn quantity(comparator: Comparator, value: f64, unit: Option<&str>) -> Self {
        ParamValue::Quantity {
            value,
            comparator,
            unit: unit.map(String::from),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ParamValue::Token { .. } => ValueKind::Token,
            ParamValue::Reference(_) => ValueKind::Reference,
            ParamValue::DateRange(_) => ValueKind::Date,
            ParamValue::Quantity { .. } => ValueKind::Quantity,
            ParamValue::String { .. } => ValueKind::String,
            ParamValue::NumberRange { .. } => ValueKind::Number,
        }
    }
}

impl From<ReferenceParam> for ParamValue {
    fn from(value: ReferenceParam) -> Self {
        ParamValue::Reference(value)
    }
}

impl From<DateRangeParam> for ParamValue {
    fn from(value: DateRangeParam) -> Self {
        ParamValue::DateRange(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Token,
    Reference,
    Date,
    Quantity,
    String,
    Number,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Token => "token",
            ValueKind::Reference => "reference",
            ValueKind::Date => "date",
            ValueKind::Quantity => "quantity",
            ValueKind::String => "string",
            ValueKind::Number => "number",
        };
        f.write_str(name)
    }
}

/// Disjunction: at least one value must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrList(pub Vec<ParamValue>);

impl OrList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn or(mut self, value: impl Into<ParamValue>) -> Self {
        self.0.push(value.into());
        self
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ParamValue> for OrList {
    fn from(value: ParamValue) -> Self {
        OrList(vec![value])
    }
}

impl FromIterator<ParamValue> for OrList {
    fn from_iter<I: IntoIterator<Item = ParamValue>>(iter: I) -> Self {
        OrList(iter.into_iter().collect())
    }
}

/// Conjunction of OR clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AndList(pub Vec<OrList>);

impl AndList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, clause: impl Into<OrList>) -> Self {
        self.0.push(clause.into());
        self
    }

    /// Clauses that carry at least one value.
    pub fn clauses(&self) -> impl Iterator<Item = &OrList> {
        self.0.iter().filter(|c| !c.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.clauses().next().is_none()
    }
}

impl From<ParamValue> for AndList {
    fn from(value: ParamValue) -> Self {
        AndList(vec![OrList::from(value)])
    }
}

impl From<OrList> for AndList {
    fn from(value: OrList) -> Self {
        AndList(vec![value])
    }
}

impl From<ReferenceParam> for AndList {
    fn from(value: ReferenceParam) -> Self {
        AndList::from(ParamValue::Reference(value))
    }
}

impl From<DateRangeParam> for AndList {
    fn from(value: DateRangeParam) -> Self {
        AndList::from(ParamValue::DateRange(value))
    }
}

/// A resource relationship to pull in alongside the search results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeSpec {
    /// Resource type declaring the reference parameter.
    pub source: ResourceType,
    /// Reference search parameter on `source`.
    pub param: String,
    pub target: ResourceType,
    /// `false`: entities referenced by the results. `true`: entities
    /// referencing the results.
    pub reverse: bool,
}

impl IncludeSpec {
    pub fn forward(source: ResourceType, param: impl Into<String>, target: ResourceType) -> Self {
        Self {
            source,
            param: param.into(),
            target,
            reverse: false,
        }
    }

    pub fn reverse(source: ResourceType, param: impl Into<String>, target: ResourceType) -> Self {
        Self {
            source,
            param: param.into(),
            target,
            reverse: true,
        }
    }
}

impl fmt::Display for IncludeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.reverse { "_revinclude" } else { "_include" };
        write!(f, "{prefix}={}:{}:{}", self.source, self.param, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortParam {
    pub param: String,
    pub direction: SortDirection,
}

/// Ordered sort request, most significant first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec(pub Vec<SortParam>);

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, param: impl Into<String>) -> Self {
        self.0.push(SortParam {
            param: param.into(),
            direction: SortDirection::Ascending,
        });
        self
    }

    pub fn descending(mut self, param: impl Into<String>) -> Self {
        self.0.push(SortParam {
            param: param.into(),
            direction: SortDirection::Descending,
        });
        self
    }

    pub fn params(&self) -> &[SortParam] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One parameter addressed to a handler. `name` is `None` when the handler has
/// a single implied parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub name: Option<String>,
    pub value: AndList,
}

/// Ordered multi-valued mapping from handler name to parameters.
///
/// Entries are grouped per handler: handlers keep the order in which they were
/// first addressed and entries keep their insertion order within a handler.
/// Interleaved additions are not kept in global order, so `a, b, a` reads back
/// as `a: [1, 3], b: [2]`. Each handler only ever sees its own entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    params: IndexMap<String, Vec<ParamEntry>>,
    includes: IndexMap<String, Vec<IncludeSpec>>,
    sort: Option<SortSpec>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter for `handler`. Empty values are dropped.
    #[must_use]
    pub fn add_parameter(
        mut self,
        handler: &str,
        name: Option<&str>,
        value: impl Into<AndList>,
    ) -> Self {
        let value = value.into();
        if value.is_empty() {
            return self;
        }
        self.params
            .entry(handler.to_string())
            .or_default()
            .push(ParamEntry {
                name: name.map(String::from),
                value,
            });
        self
    }

    /// [`add_parameter`](Self::add_parameter) for optional values.
    #[must_use]
    pub fn add_optional(
        self,
        handler: &str,
        name: Option<&str>,
        value: Option<impl Into<AndList>>,
    ) -> Self {
        match value {
            Some(value) => self.add_parameter(handler, name, value),
            None => self,
        }
    }

    /// Register include specs under `handler`. An empty set registers nothing.
    #[must_use]
    pub fn add_includes(
        mut self,
        handler: &str,
        specs: impl IntoIterator<Item = IncludeSpec>,
    ) -> Self {
        let specs: Vec<IncludeSpec> = specs.into_iter().collect();
        if specs.is_empty() {
            return self;
        }
        let slot = self.includes.entry(handler.to_string()).or_default();
        for spec in specs {
            if !slot.contains(&spec) {
                slot.push(spec);
            }
        }
        self
    }

    #[must_use]
    pub fn with_sort_spec(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort).filter(|s| !s.is_empty());
        self
    }

    pub fn get_parameters(&self, handler: &str) -> &[ParamEntry] {
        self.params.get(handler).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Handlers with parameters, in first-use order.
    pub fn handlers(&self) -> impl Iterator<Item = (&str, &[ParamEntry])> {
        self.params
            .iter()
            .map(|(handler, entries)| (handler.as_str(), entries.as_slice()))
    }

    pub fn get_includes(&self, handler: &str) -> &[IncludeSpec] {
        self.includes.get(handler).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn include_handlers(&self) -> impl Iterator<Item = (&str, &[IncludeSpec])> {
        self.includes
            .iter()
            .map(|(handler, specs)| (handler.as_str(), specs.as_slice()))
    }

    pub fn sort_spec(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.includes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_group_per_handler_in_first_use_order() {
        let map = ParameterMap::new()
            .add_parameter("coding", None, ParamValue::token("1"))
            .add_parameter("patient.reference", Some("subject"), ReferenceParam::id("p1"))
            .add_parameter("coding", None, ParamValue::token("2"));

        let handlers: Vec<&str> = map.handlers().map(|(h, _)| h).collect();
        assert_eq!(handlers, vec!["coding", "patient.reference"]);

        let codes = map.get_parameters("coding");
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].value, AndList::from(ParamValue::token("1")));
        assert_eq!(codes[1].value, AndList::from(ParamValue::token("2")));
    }

    #[test]
    fn test_empty_values_are_dropped() {
        let map = ParameterMap::new()
            .add_parameter("coding", None, AndList::new())
            .add_parameter("coding", None, AndList::new().and(OrList::new()))
            .add_optional("category", None, None::<ParamValue>)
            .add_includes("include", Vec::new());
        assert!(map.is_empty());
        assert!(map.get_parameters("coding").is_empty());
        assert!(map.get_includes("include").is_empty());
    }

    #[test]
    fn test_includes_are_deduplicated() {
        let spec = IncludeSpec::forward(ResourceType::Observation, "patient", ResourceType::Patient);
        let map = ParameterMap::new()
            .add_includes("include", [spec.clone()])
            .add_includes("include", [spec.clone()]);
        assert_eq!(map.get_includes("include"), &[spec]);
    }

    #[test]
    fn test_and_of_or() {
        let value = AndList::new()
            .and(OrList::new().or(ParamValue::token("a")).or(ParamValue::token("b")))
            .and(ParamValue::token("c"));
        let clauses: Vec<usize> = value.clauses().map(|c| c.values().len()).collect();
        assert_eq!(clauses, vec![2, 1]);
    }

    #[test]
    fn test_empty_chain_is_none() {
        let param = ReferenceParam::chained(Some(ResourceType::Patient), "", "p1");
        assert!(param.chain.is_none());
    }

    #[test]
    fn test_include_display() {
        let spec = IncludeSpec::reverse(
            ResourceType::DiagnosticReport,
            "result",
            ResourceType::Observation,
        );
        assert_eq!(spec.to_string(), "_revinclude=DiagnosticReport:result:Observation");
    }
}
