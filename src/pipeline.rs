use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::complexity::{compute_complexity, ComplexityScores};
use crate::config::EngineConfig;
use crate::filters::Filters;
use crate::friction::{compute_hm_friction, hm_weights, HmFriction, HmWeights};
use crate::hygiene::{compute_hygiene, HygieneSummary};
use crate::models::{Candidate, Dataset, Event, Requisition};
use crate::overview::{compute_overview, OverviewMetrics};
use crate::stages::{normalize_stages, NormalizedEvents};
use crate::velocity::{compute_velocity, VelocityMetrics};

/// Everything the aggregate stages read, produced by the earlier stages of the same run.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInputs<'a> {
    pub dataset: &'a Dataset,
    pub normalized: &'a NormalizedEvents,
    pub hygiene: &'a HygieneSummary,
    pub hm_weights: &'a HmWeights,
    pub complexity: &'a ComplexityScores,
    pub filters: &'a Filters,
    pub config: &'a EngineConfig,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub as_of: DateTime<Utc>,
    pub filters: Filters,
    pub unmapped_event_count: usize,
    pub hygiene: HygieneSummary,
    pub hm_friction: Vec<HmFriction>,
    pub complexity: ComplexityScores,
    pub overview: OverviewMetrics,
    pub velocity: VelocityMetrics,
}

struct ScopedRecords {
    requisitions: Vec<Requisition>,
    candidates: Vec<Candidate>,
    events: Vec<Event>,
}

/// Requisitions in scope plus their candidates and events. Events that point
/// at no known requisition are kept so hygiene can count them.
fn scope_records(dataset: &Dataset, filters: &Filters) -> ScopedRecords {
    let known: HashSet<&str> = dataset
        .requisitions
        .iter()
        .map(|req| req.req_id.as_str())
        .collect();
    let requisitions: Vec<Requisition> = dataset
        .requisitions
        .iter()
        .filter(|req| filters.includes_requisition(req))
        .cloned()
        .collect();
    let in_scope: HashSet<&str> = requisitions.iter().map(|req| req.req_id.as_str()).collect();
    let candidates = dataset
        .candidates
        .iter()
        .filter(|c| in_scope.contains(c.req_id.as_str()))
        .cloned()
        .collect();
    let events = dataset
        .events
        .iter()
        .filter(|e| in_scope.contains(e.req_id.as_str()) || !known.contains(e.req_id.as_str()))
        .cloned()
        .collect();
    ScopedRecords {
        requisitions,
        candidates,
        events,
    }
}

pub fn run_pipeline(
    dataset: &Dataset,
    filters: &Filters,
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> MetricsReport {
    let config = config.sanitized();

    let normalized = normalize_stages(&dataset.events, &config.stage_mapping);

    let scoped = scope_records(dataset, filters);
    let hygiene = compute_hygiene(
        &scoped.requisitions,
        &scoped.candidates,
        &scoped.events,
        &config,
        as_of,
    );
    debug!(score = hygiene.hygiene_score, zombies = hygiene.counts.zombie, "hygiene computed");

    let hm_friction = compute_hm_friction(
        &dataset.requisitions,
        &dataset.candidates,
        &normalized.events,
        &dataset.users,
        filters,
        &config,
    );
    let weights = hm_weights(&hm_friction);

    let complexity = compute_complexity(&dataset.requisitions, &weights, &config);

    let inputs = AnalysisInputs {
        dataset,
        normalized: &normalized,
        hygiene: &hygiene,
        hm_weights: &weights,
        complexity: &complexity,
        filters,
        config: &config,
        as_of,
    };
    let overview = compute_overview(&inputs);
    let velocity = compute_velocity(&inputs);

    info!(
        requisitions = scoped.requisitions.len(),
        events = normalized.events.len(),
        hires = overview.current.hires,
        "metrics refreshed"
    );

    MetricsReport {
        as_of,
        filters: filters.clone(),
        unmapped_event_count: normalized.unmapped_count,
        hygiene,
        hm_friction,
        complexity,
        overview,
        velocity,
    }
}
