use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::complexity::weighted_hires;
use crate::fill::{fill_dates, time_to_fill};
use crate::filters::{DateRange, Filters};
use crate::models::{CanonicalStage, Disposition, EventType, ReqStatus, Requisition};
use crate::pipeline::AnalysisInputs;
use crate::stages::{MappingCompleteness, NormalizedEvent};
use crate::stats::{mean, median, rate};

/// Fixed funnel order used for pass-through rates.
pub const FUNNEL_STAGES: [CanonicalStage; 5] = [
    CanonicalStage::Screen,
    CanonicalStage::HmScreen,
    CanonicalStage::Onsite,
    CanonicalStage::Offer,
    CanonicalStage::Hired,
];

/// Position in [`FUNNEL_STAGES`]; FINAL counts as having reached ONSITE.
pub fn funnel_rank(stage: CanonicalStage) -> Option<usize> {
    match stage {
        CanonicalStage::Screen => Some(0),
        CanonicalStage::HmScreen => Some(1),
        CanonicalStage::Onsite | CanonicalStage::Final => Some(2),
        CanonicalStage::Offer => Some(3),
        CanonicalStage::Hired => Some(4),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelStep {
    pub from: CanonicalStage,
    pub to: CanonicalStage,
    pub entered: usize,
    pub converted: usize,
    /// `None` when nobody entered, which is different from 0% conversion.
    pub pass_through_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FunnelResult {
    Computed { steps: Vec<FunnelStep> },
    InsufficientMapping { missing_stages: Vec<String> },
}

impl FunnelResult {
    pub fn steps(&self) -> &[FunnelStep] {
        match self {
            FunnelResult::Computed { steps } => steps,
            FunnelResult::InsufficientMapping { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodMetrics {
    pub range: Option<DateRange>,
    pub requisitions_in_scope: usize,
    pub open_reqs: usize,
    pub hires: usize,
    pub weighted_hires: f64,
    pub median_ttf_days: Option<f64>,
    /// Median TTF without hygiene exclusions (zombies and manual exclusions).
    pub adjusted_median_ttf_days: Option<f64>,
    pub ttf_sample_size: usize,
    pub offers_extended: usize,
    pub offers_accepted: usize,
    pub offer_acceptance_rate: Option<f64>,
    pub funnel: FunnelResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodDelta {
    pub hires: i64,
    pub weighted_hires: f64,
    pub median_ttf_days: Option<f64>,
    pub offer_acceptance_rate: Option<f64>,
}

impl PeriodDelta {
    pub fn between(current: &PeriodMetrics, prior: &PeriodMetrics) -> Self {
        let diff = |a: Option<f64>, b: Option<f64>| a.zip(b).map(|(a, b)| a - b);
        Self {
            hires: current.hires as i64 - prior.hires as i64,
            weighted_hires: current.weighted_hires - prior.weighted_hires,
            median_ttf_days: diff(current.median_ttf_days, prior.median_ttf_days),
            offer_acceptance_rate: diff(current.offer_acceptance_rate, prior.offer_acceptance_rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecruiterSummary {
    pub recruiter_id: String,
    pub name: Option<String>,
    pub avg_hm_weight: Option<f64>,
    pub current: PeriodMetrics,
    pub prior: Option<PeriodMetrics>,
    pub delta: Option<PeriodDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewMetrics {
    pub current: PeriodMetrics,
    pub prior: Option<PeriodMetrics>,
    pub delta: Option<PeriodDelta>,
    pub recruiters: Vec<RecruiterSummary>,
    pub mapping: MappingCompleteness,
    pub unmapped_event_count: usize,
}

pub fn compute_funnel(events: &[&NormalizedEvent]) -> Vec<FunnelStep> {
    let mut furthest: HashMap<(&str, &str), usize> = HashMap::new();
    for event in events.iter().filter(|e| e.is_transition()) {
        if let Some(rank) = event.to_canonical().and_then(funnel_rank) {
            let entry = furthest
                .entry((event.req_id.as_str(), event.candidate_id.as_str()))
                .or_insert(rank);
            *entry = (*entry).max(rank);
        }
    }

    FUNNEL_STAGES
        .windows(2)
        .enumerate()
        .map(|(rank, pair)| {
            let entered = furthest.values().filter(|r| **r >= rank).count();
            let converted = furthest.values().filter(|r| **r > rank).count();
            FunnelStep {
                from: pair[0],
                to: pair[1],
                entered,
                converted,
                pass_through_rate: rate(converted, entered),
            }
        })
        .collect()
}

fn open_during(req: &Requisition, range: Option<DateRange>) -> bool {
    match range {
        None => req.status == ReqStatus::Open,
        Some(range) => {
            req.opened_at.date_naive() <= range.end
                && req.closed_at.is_none_or(|closed| closed.date_naive() >= range.start)
                && req.status != ReqStatus::Canceled
        }
    }
}

/// The one aggregation behind every period and rollup.
pub fn aggregate_period(inputs: &AnalysisInputs<'_>, filters: &Filters) -> PeriodMetrics {
    let dataset = inputs.dataset;
    let scoped: BTreeMap<&str, &Requisition> = dataset
        .requisitions
        .iter()
        .filter(|req| filters.includes_requisition(req))
        .map(|req| (req.req_id.as_str(), req))
        .collect();

    let hired: Vec<&str> = dataset
        .candidates
        .iter()
        .filter(|c| c.disposition == Disposition::Hired)
        .filter(|c| scoped.contains_key(c.req_id.as_str()))
        .filter(|c| filters.includes_time(c.current_stage_entered_at))
        .map(|c| c.req_id.as_str())
        .collect();

    let fills = fill_dates(&dataset.candidates);
    let samples: Vec<_> = scoped
        .values()
        .filter_map(|req| time_to_fill(req, &fills))
        .filter(|sample| filters.includes_time(sample.filled_at))
        .collect();
    let raw_ttf: Vec<f64> = samples.iter().map(|s| s.days).collect();
    let adjusted_ttf: Vec<f64> = samples
        .iter()
        .filter(|s| !inputs.hygiene.is_excluded_from_ttf(&s.req_id))
        .map(|s| s.days)
        .collect();

    let scoped_events: Vec<&NormalizedEvent> = inputs
        .normalized
        .events
        .iter()
        .filter(|e| scoped.contains_key(e.req_id.as_str()))
        .collect();

    let hired_loops: HashSet<(&str, &str)> = dataset
        .candidates
        .iter()
        .filter(|c| c.disposition == Disposition::Hired)
        .map(|c| (c.req_id.as_str(), c.candidate_id.as_str()))
        .chain(
            scoped_events
                .iter()
                .filter(|e| e.enters(CanonicalStage::Hired) || e.event_type == EventType::OfferAccepted)
                .map(|e| (e.req_id.as_str(), e.candidate_id.as_str())),
        )
        .collect();
    let offered: BTreeSet<(&str, &str)> = scoped_events
        .iter()
        .filter(|e| e.enters(CanonicalStage::Offer) || e.event_type == EventType::OfferExtended)
        .filter(|e| filters.includes_time(e.occurred_at))
        .map(|e| (e.req_id.as_str(), e.candidate_id.as_str()))
        .collect();
    let offers_accepted = offered.iter().filter(|key| hired_loops.contains(*key)).count();

    let funnel = if inputs.normalized.completeness.is_complete {
        let in_range: Vec<&NormalizedEvent> = scoped_events
            .iter()
            .copied()
            .filter(|e| filters.includes_time(e.occurred_at))
            .collect();
        FunnelResult::Computed {
            steps: compute_funnel(&in_range),
        }
    } else {
        FunnelResult::InsufficientMapping {
            missing_stages: inputs.normalized.completeness.missing_stages.clone(),
        }
    };

    PeriodMetrics {
        range: filters.date_range,
        requisitions_in_scope: scoped.len(),
        open_reqs: scoped
            .values()
            .filter(|req| open_during(req, filters.date_range))
            .count(),
        hires: hired.len(),
        weighted_hires: weighted_hires(inputs.complexity, hired.iter().copied()),
        median_ttf_days: median(&raw_ttf),
        adjusted_median_ttf_days: median(&adjusted_ttf),
        ttf_sample_size: raw_ttf.len(),
        offers_extended: offered.len(),
        offers_accepted,
        offer_acceptance_rate: rate(offers_accepted, offered.len()),
        funnel,
    }
}

fn with_prior(inputs: &AnalysisInputs<'_>, filters: &Filters) -> (PeriodMetrics, Option<PeriodMetrics>, Option<PeriodDelta>) {
    let current = aggregate_period(inputs, filters);
    let prior = filters
        .date_range
        .map(|range| aggregate_period(inputs, &filters.with_range(Some(range.prior_period()))));
    let delta = prior.as_ref().map(|prior| PeriodDelta::between(&current, prior));
    (current, prior, delta)
}

/// Entry point: scope totals, prior-period comparison and per-recruiter rollups.
pub fn compute_overview(inputs: &AnalysisInputs<'_>) -> OverviewMetrics {
    let filters = inputs.filters;
    let (current, prior, delta) = with_prior(inputs, filters);

    let mut by_recruiter: BTreeMap<&str, Vec<&Requisition>> = BTreeMap::new();
    for req in inputs
        .dataset
        .requisitions
        .iter()
        .filter(|req| filters.includes_requisition(req))
    {
        by_recruiter.entry(req.recruiter_id.as_str()).or_default().push(req);
    }

    let recruiters = by_recruiter
        .into_iter()
        .map(|(recruiter_id, reqs)| {
            let (current, prior, delta) = with_prior(inputs, &filters.for_recruiter(recruiter_id));
            let weights: Vec<f64> = reqs
                .iter()
                .map(|req| {
                    inputs
                        .hm_weights
                        .get(&req.hiring_manager_id)
                        .copied()
                        .unwrap_or(1.0)
                })
                .collect();
            RecruiterSummary {
                recruiter_id: recruiter_id.to_string(),
                name: inputs.dataset.user_name(recruiter_id).map(str::to_string),
                avg_hm_weight: mean(&weights),
                current,
                prior,
                delta,
            }
        })
        .collect();

    OverviewMetrics {
        current,
        prior,
        delta,
        recruiters,
        mapping: inputs.normalized.completeness.clone(),
        unmapped_event_count: inputs.normalized.unmapped_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedStage;
    use chrono::{Duration, Utc};

    fn moved(cand: &str, to: CanonicalStage) -> NormalizedEvent {
        NormalizedEvent {
            candidate_id: cand.to_string(),
            req_id: "R1".to_string(),
            event_type: EventType::StageChange,
            from_stage: None,
            to_stage: Some(NormalizedStage::Canonical(to)),
            actor_user_id: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn funnel_counts_furthest_stage_per_loop() {
        let events = [
            moved("a", CanonicalStage::Screen),
            moved("a", CanonicalStage::HmScreen),
            moved("b", CanonicalStage::Screen),
            moved("c", CanonicalStage::Screen),
            moved("c", CanonicalStage::Final),
        ];
        let refs: Vec<&NormalizedEvent> = events.iter().collect();
        let steps = compute_funnel(&refs);
        assert_eq!(steps.len(), 4);
        assert_eq!((steps[0].entered, steps[0].converted), (3, 2));
        assert_eq!((steps[1].entered, steps[1].converted), (2, 1));
        assert_eq!((steps[2].entered, steps[2].converted), (1, 0));
        assert_eq!(steps[2].pass_through_rate, Some(0.0));
    }

    #[test]
    fn empty_step_reports_none_not_zero() {
        let events = [moved("a", CanonicalStage::Screen)];
        let refs: Vec<&NormalizedEvent> = events.iter().collect();
        let steps = compute_funnel(&refs);
        assert_eq!(steps[0].pass_through_rate, Some(0.0));
        for step in &steps[1..] {
            assert_eq!(step.entered, 0);
            assert_eq!(step.pass_through_rate, None);
        }
    }

    #[test]
    fn self_transitions_do_not_count() {
        let mut looping = moved("a", CanonicalStage::Screen);
        looping.from_stage = Some(NormalizedStage::Canonical(CanonicalStage::Screen));
        let steps = compute_funnel(&[&looping]);
        assert!(steps.iter().all(|s| s.entered == 0));
    }

    #[test]
    fn period_delta_subtracts_prior() {
        let base = PeriodMetrics {
            range: None,
            requisitions_in_scope: 3,
            open_reqs: 1,
            hires: 4,
            weighted_hires: 4.4,
            median_ttf_days: Some(30.0),
            adjusted_median_ttf_days: Some(28.0),
            ttf_sample_size: 4,
            offers_extended: 5,
            offers_accepted: 4,
            offer_acceptance_rate: Some(0.8),
            funnel: FunnelResult::Computed { steps: Vec::new() },
        };
        let prior = PeriodMetrics {
            hires: 6,
            median_ttf_days: None,
            ..base.clone()
        };
        let delta = PeriodDelta::between(&base, &prior);
        assert_eq!(delta.hires, -2);
        assert_eq!(delta.median_ttf_days, None);
        assert_eq!(delta.offer_acceptance_rate, Some(0.0));
    }

    #[test]
    fn open_during_range_uses_dates() {
        let now = Utc::now();
        let req = Requisition {
            req_id: "R1".to_string(),
            title: "Designer".to_string(),
            status: ReqStatus::Closed,
            recruiter_id: "rec".to_string(),
            hiring_manager_id: "hm".to_string(),
            opened_at: now - Duration::days(60),
            closed_at: Some(now - Duration::days(20)),
            level: None,
            job_family: None,
            region: None,
        };
        let recent = DateRange::trailing(now, 10);
        assert!(!open_during(&req, Some(recent)));
        assert!(open_during(&req, Some(recent.prior_period().prior_period())));
        assert!(!open_during(&req, None));
    }
}
