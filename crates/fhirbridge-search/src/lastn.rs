//! Last-N observation ranking.
//!
//! Plain last-N keeps the `max` most recent observations. Last-N by encounter
//! bounds the number of *encounters*: it keeps every observation of the `max`
//! encounters with the most recent activity.

use fhirbridge_core::{Entity, EntityType, FhirDateTime, ResourceType, fields};
use fhirbridge_storage::PageRequest;
use indexmap::IndexMap;
use std::cmp::Ordering;
use tokio_util::sync::CancellationToken;

use crate::builder::QueryBuilder;
use crate::error::SearchError;
use crate::executor::QueryExecutor;
use crate::params::{ParameterMap, SortSpec};

/// `obsDatetime`, or the last change time when the observation has none.
pub fn effective_date(observation: &Entity) -> FhirDateTime {
    observation
        .datetime(fields::obs::OBS_DATETIME)
        .unwrap_or(observation.date_changed)
}

/// Newest first, id ascending on ties.
fn by_recency(a: &Entity, b: &Entity) -> Ordering {
    effective_date(b)
        .cmp(&effective_date(a))
        .then_with(|| a.id.cmp(&b.id))
}

fn owning_encounter(observation: &Entity) -> Option<&str> {
    observation
        .references(fields::obs::ENCOUNTER)
        .find(|r| r.entity_type == EntityType::Encounter)
        .map(|r| r.id.as_str())
}

pub fn rank_last_n(mut observations: Vec<Entity>, max: usize) -> Vec<Entity> {
    observations.sort_by(by_recency);
    observations.truncate(max);
    observations
}

/// Keep all observations of the `max` most recently active encounters.
///
/// Encounters rank by their latest observation, newest first, with the
/// encounter id ascending on ties. Observations without an encounter are
/// dropped.
pub fn rank_by_encounter(observations: Vec<Entity>, max: usize) -> Vec<Entity> {
    let mut groups: IndexMap<String, (FhirDateTime, Vec<Entity>)> = IndexMap::new();
    for observation in observations {
        let Some(encounter) = owning_encounter(&observation).map(String::from) else {
            continue;
        };
        let at = effective_date(&observation);
        let group = groups.entry(encounter).or_insert_with(|| (at, Vec::new()));
        group.0 = group.0.max(at);
        group.1.push(observation);
    }

    let mut ranked: Vec<(String, FhirDateTime, Vec<Entity>)> = groups
        .into_iter()
        .map(|(encounter, (latest, members))| (encounter, latest, members))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut selected: Vec<Entity> = ranked
        .into_iter()
        .take(max)
        .flat_map(|(_, _, members)| members)
        .collect();
    selected.sort_by(by_recency);
    selected
}

#[derive(Debug, Clone)]
pub struct LastNRanker {
    builder: QueryBuilder,
    executor: QueryExecutor,
    default_max: usize,
}

impl LastNRanker {
    pub fn new(builder: QueryBuilder, executor: QueryExecutor) -> Self {
        let default_max = builder.config().last_n_default_max;
        Self {
            builder,
            executor,
            default_max,
        }
    }

    pub fn default_max(&self) -> usize {
        self.default_max
    }

    /// The `max` most recent observations matching `params`.
    pub async fn last_n(
        &self,
        max: Option<usize>,
        params: &ParameterMap,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entity>, SearchError> {
        let max = self.resolve_max(max)?;
        let candidates = self.candidates(params, cancel).await?;
        let ranked = rank_last_n(candidates, max);
        tracing::debug!(max, returned = ranked.len(), "ranked last-n");
        Ok(ranked)
    }

    /// Every matching observation of the `max` most recently active encounters.
    pub async fn last_n_by_encounter(
        &self,
        max: Option<usize>,
        params: &ParameterMap,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entity>, SearchError> {
        let max = self.resolve_max(max)?;
        let candidates = self.candidates(params, cancel).await?;
        let considered = candidates.len();
        let ranked = rank_by_encounter(candidates, max);
        tracing::debug!(max, considered, returned = ranked.len(), "ranked last-n by encounter");
        Ok(ranked)
    }

    fn resolve_max(&self, max: Option<usize>) -> Result<usize, SearchError> {
        match max {
            Some(0) => Err(SearchError::invalid_value("max must be at least 1")),
            Some(max) => Ok(max),
            None => Ok(self.default_max),
        }
    }

    async fn candidates(
        &self,
        params: &ParameterMap,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entity>, SearchError> {
        let sort = SortSpec::new().descending("date");
        let descriptor = self.builder.build(
            ResourceType::Observation,
            params,
            Some(&sort),
            PageRequest::default(),
        )?;
        self.executor.execute_unpaged(&descriptor, cancel).await
    }
}
