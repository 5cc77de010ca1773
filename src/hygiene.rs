use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::{EngineConfig, HygieneThresholds};
use crate::fill::{fill_dates, invalid_fill_count, time_to_fill};
use crate::models::{Candidate, Disposition, Event, ReqStatus, Requisition};
use crate::stats::{median, whole_days_between};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReqHealthStatus {
    Active,
    Stalled,
    Zombie,
    AtRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReqHealthAssessment {
    pub req_id: String,
    pub status: ReqHealthStatus,
    pub days_open: i64,
    pub days_since_last_activity: i64,
    pub active_candidate_count: usize,
    pub total_candidate_count: usize,
    pub excluded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GhostStatus {
    Stagnant,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GhostCandidate {
    pub candidate_id: String,
    pub req_id: String,
    pub current_stage: String,
    pub days_in_stage: i64,
    pub status: GhostStatus,
}

/// Records skipped by at least one calculation because they would corrupt it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnomalyCounts {
    pub self_transitions: usize,
    pub closed_before_opened: usize,
    pub orphan_events: usize,
    pub invalid_fill_dates: usize,
}

impl AnomalyCounts {
    pub fn total(&self) -> usize {
        self.self_transitions
            + self.closed_before_opened
            + self.orphan_events
            + self.invalid_fill_dates
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HygieneCounts {
    pub open_reqs: usize,
    pub active: usize,
    pub stalled: usize,
    pub zombie: usize,
    pub at_risk: usize,
    pub active_candidates: usize,
    pub stagnant_candidates: usize,
    pub abandoned_candidates: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HygieneSummary {
    pub assessments: Vec<ReqHealthAssessment>,
    pub ghost_candidates: Vec<GhostCandidate>,
    pub counts: HygieneCounts,
    pub anomalies: AnomalyCounts,
    /// Requisitions left out of "true" time-to-fill: manual exclusions plus zombies.
    pub ttf_exclusions: BTreeSet<String>,
    pub raw_median_ttf_days: Option<f64>,
    pub true_median_ttf_days: Option<f64>,
    pub ttf_improvement_pct: Option<f64>,
    pub hygiene_score: f64,
}

impl HygieneSummary {
    pub fn is_excluded_from_ttf(&self, req_id: &str) -> bool {
        self.ttf_exclusions.contains(req_id)
    }

    pub fn status_of(&self, req_id: &str) -> Option<ReqHealthStatus> {
        self.assessments
            .iter()
            .find(|assessment| assessment.req_id == req_id)
            .map(|assessment| assessment.status)
    }
}

/// Pure classification from elapsed inactivity, age and pipeline size.
pub fn classify_requisition(
    days_since_last_activity: i64,
    days_open: i64,
    total_candidates: usize,
    thresholds: &HygieneThresholds,
) -> ReqHealthStatus {
    if days_since_last_activity > thresholds.zombie_days {
        ReqHealthStatus::Zombie
    } else if days_since_last_activity >= thresholds.stalled_days {
        ReqHealthStatus::Stalled
    } else if days_open > thresholds.at_risk_days && total_candidates < thresholds.at_risk_min_candidates {
        ReqHealthStatus::AtRisk
    } else {
        ReqHealthStatus::Active
    }
}

pub fn assess_requisitions(
    requisitions: &[Requisition],
    candidates: &[Candidate],
    events: &[Event],
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> Vec<ReqHealthAssessment> {
    let mut last_activity: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for event in events {
        last_activity
            .entry(event.req_id.as_str())
            .and_modify(|at| *at = (*at).max(event.occurred_at))
            .or_insert(event.occurred_at);
    }

    let mut pipeline: HashMap<&str, (usize, usize)> = HashMap::new();
    for candidate in candidates {
        let entry = pipeline.entry(candidate.req_id.as_str()).or_insert((0, 0));
        entry.0 += 1;
        if candidate.disposition == Disposition::Active {
            entry.1 += 1;
        }
    }

    let thresholds = &config.hygiene_thresholds;
    requisitions
        .iter()
        .filter(|req| req.status == ReqStatus::Open)
        .map(|req| {
            let last = last_activity
                .get(req.req_id.as_str())
                .copied()
                .map_or(req.opened_at, |at| at.max(req.opened_at));
            let days_since_last_activity = whole_days_between(last, as_of);
            let days_open = whole_days_between(req.opened_at, as_of);
            let (total, active) = pipeline.get(req.req_id.as_str()).copied().unwrap_or((0, 0));
            ReqHealthAssessment {
                req_id: req.req_id.clone(),
                status: classify_requisition(days_since_last_activity, days_open, total, thresholds),
                days_open,
                days_since_last_activity,
                active_candidate_count: active,
                total_candidate_count: total,
                excluded: config.exclusions.excluded_req_ids.contains(&req.req_id),
            }
        })
        .collect()
}

pub fn detect_ghost_candidates(
    candidates: &[Candidate],
    thresholds: &HygieneThresholds,
    as_of: DateTime<Utc>,
) -> Vec<GhostCandidate> {
    candidates
        .iter()
        .filter(|candidate| candidate.disposition == Disposition::Active)
        .filter_map(|candidate| {
            let days_in_stage = whole_days_between(candidate.current_stage_entered_at, as_of);
            let status = if days_in_stage > thresholds.abandoned_days {
                GhostStatus::Abandoned
            } else if days_in_stage > thresholds.stagnant_days {
                GhostStatus::Stagnant
            } else {
                return None;
            };
            Some(GhostCandidate {
                candidate_id: candidate.candidate_id.clone(),
                req_id: candidate.req_id.clone(),
                current_stage: candidate.current_stage.clone(),
                days_in_stage,
                status,
            })
        })
        .collect()
}

pub fn count_anomalies(requisitions: &[Requisition], candidates: &[Candidate], events: &[Event]) -> AnomalyCounts {
    let known: HashSet<&str> = requisitions.iter().map(|req| req.req_id.as_str()).collect();
    let fills = fill_dates(candidates);
    AnomalyCounts {
        self_transitions: events.iter().filter(|e| e.is_self_transition()).count(),
        closed_before_opened: requisitions.iter().filter(|r| r.closed_before_opened()).count(),
        orphan_events: events
            .iter()
            .filter(|e| !known.contains(e.req_id.as_str()))
            .count(),
        invalid_fill_dates: invalid_fill_count(requisitions, &fills),
    }
}

/// 0–100; every penalty term grows with its anomaly count.
pub fn hygiene_score(counts: &HygieneCounts, anomalies: &AnomalyCounts, total_records: usize) -> f64 {
    let req_penalty = if counts.open_reqs == 0 {
        0.0
    } else {
        let weighted = counts.zombie as f64 + 0.5 * counts.stalled as f64 + 0.25 * counts.at_risk as f64;
        50.0 * weighted / counts.open_reqs as f64
    };
    let ghost_penalty = if counts.active_candidates == 0 {
        0.0
    } else {
        let weighted = counts.abandoned_candidates as f64 + 0.5 * counts.stagnant_candidates as f64;
        35.0 * weighted / counts.active_candidates as f64
    };
    let record_penalty = if total_records == 0 {
        0.0
    } else {
        15.0 * anomalies.total() as f64 / total_records as f64
    };
    (100.0 - req_penalty - ghost_penalty - record_penalty).clamp(0.0, 100.0)
}

pub fn calculate_data_hygiene_summary(
    requisitions: &[Requisition],
    candidates: &[Candidate],
    assessments: Vec<ReqHealthAssessment>,
    ghost_candidates: Vec<GhostCandidate>,
    anomalies: AnomalyCounts,
    config: &EngineConfig,
    total_records: usize,
) -> HygieneSummary {
    let mut counts = HygieneCounts {
        open_reqs: assessments.len(),
        active_candidates: candidates
            .iter()
            .filter(|c| c.disposition == Disposition::Active)
            .count(),
        ..HygieneCounts::default()
    };
    for assessment in &assessments {
        match assessment.status {
            ReqHealthStatus::Active => counts.active += 1,
            ReqHealthStatus::Stalled => counts.stalled += 1,
            ReqHealthStatus::Zombie => counts.zombie += 1,
            ReqHealthStatus::AtRisk => counts.at_risk += 1,
        }
    }
    for ghost in &ghost_candidates {
        match ghost.status {
            GhostStatus::Stagnant => counts.stagnant_candidates += 1,
            GhostStatus::Abandoned => counts.abandoned_candidates += 1,
        }
    }

    let mut ttf_exclusions = config.exclusions.excluded_req_ids.clone();
    if config.exclusions.exclude_zombies_from_ttf {
        ttf_exclusions.extend(
            assessments
                .iter()
                .filter(|a| a.status == ReqHealthStatus::Zombie)
                .map(|a| a.req_id.clone()),
        );
    }

    let fills = fill_dates(candidates);
    let samples: Vec<_> = requisitions
        .iter()
        .filter_map(|req| time_to_fill(req, &fills))
        .collect();
    let raw: Vec<f64> = samples.iter().map(|s| s.days).collect();
    let adjusted: Vec<f64> = samples
        .iter()
        .filter(|s| !ttf_exclusions.contains(&s.req_id))
        .map(|s| s.days)
        .collect();
    let raw_median_ttf_days = median(&raw);
    let true_median_ttf_days = median(&adjusted);
    let ttf_improvement_pct = match (raw_median_ttf_days, true_median_ttf_days) {
        (Some(raw), Some(adjusted)) if raw > 0.0 => Some((raw - adjusted) / raw * 100.0),
        _ => None,
    };

    let hygiene_score = hygiene_score(&counts, &anomalies, total_records);
    HygieneSummary {
        assessments,
        ghost_candidates,
        counts,
        anomalies,
        ttf_exclusions,
        raw_median_ttf_days,
        true_median_ttf_days,
        ttf_improvement_pct,
        hygiene_score,
    }
}

/// Entry point: classify, detect ghosts, count anomalies and summarize.
pub fn compute_hygiene(
    requisitions: &[Requisition],
    candidates: &[Candidate],
    events: &[Event],
    config: &EngineConfig,
    as_of: DateTime<Utc>,
) -> HygieneSummary {
    let assessments = assess_requisitions(requisitions, candidates, events, config, as_of);
    let ghosts = detect_ghost_candidates(candidates, &config.hygiene_thresholds, as_of);
    let anomalies = count_anomalies(requisitions, candidates, events);
    if anomalies.total() > 0 {
        debug!(?anomalies, "skipping anomalous records in affected calculations");
    }
    let total_records = requisitions.len() + candidates.len() + events.len();
    calculate_data_hygiene_summary(
        requisitions,
        candidates,
        assessments,
        ghosts,
        anomalies,
        config,
        total_records,
    )
}
