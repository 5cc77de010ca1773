use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::{EngineConfig, HmWeightPolicy};
use crate::confidence::ConfidenceLevel;
use crate::filters::Filters;
use crate::models::{Candidate, CanonicalStage, EventType, Requisition, User};
use crate::stages::NormalizedEvent;
use crate::stats::{hours_between, median, rate, SECONDS_PER_HOUR};

/// Hiring manager id → weight multiplier.
pub type HmWeights = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Sourcing,
    Screening,
    HmReview,
    Interview,
    FeedbackWait,
    DecisionWait,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BucketSeconds {
    sourcing: i64,
    screening: i64,
    hm_review: i64,
    interview: i64,
    feedback_wait: i64,
    decision_wait: i64,
}

impl BucketSeconds {
    fn add(&mut self, bucket: Bucket, seconds: i64) {
        let slot = match bucket {
            Bucket::Sourcing => &mut self.sourcing,
            Bucket::Screening => &mut self.screening,
            Bucket::HmReview => &mut self.hm_review,
            Bucket::Interview => &mut self.interview,
            Bucket::FeedbackWait => &mut self.feedback_wait,
            Bucket::DecisionWait => &mut self.decision_wait,
        };
        *slot += seconds;
    }

    fn merge(&mut self, other: &BucketSeconds) {
        self.sourcing += other.sourcing;
        self.screening += other.screening;
        self.hm_review += other.hm_review;
        self.interview += other.interview;
        self.feedback_wait += other.feedback_wait;
        self.decision_wait += other.decision_wait;
    }
}

/// Cycle time split into six disjoint buckets, in hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompositionBreakdown {
    pub sourcing_hours: f64,
    pub screening_hours: f64,
    pub hm_review_hours: f64,
    pub interview_hours: f64,
    pub feedback_wait_hours: f64,
    pub decision_wait_hours: f64,
    /// feedback wait + decision wait
    pub total_latency_hours: f64,
    /// sourcing + screening + hm review + interview
    pub active_time_hours: f64,
    pub total_cycle_hours: f64,
}

impl CompositionBreakdown {
    fn from_seconds(seconds: &BucketSeconds) -> Self {
        let hours = |s: i64| s as f64 / SECONDS_PER_HOUR;
        let latency = seconds.feedback_wait + seconds.decision_wait;
        let active = seconds.sourcing + seconds.screening + seconds.hm_review + seconds.interview;
        Self {
            sourcing_hours: hours(seconds.sourcing),
            screening_hours: hours(seconds.screening),
            hm_review_hours: hours(seconds.hm_review),
            interview_hours: hours(seconds.interview),
            feedback_wait_hours: hours(seconds.feedback_wait),
            decision_wait_hours: hours(seconds.decision_wait),
            total_latency_hours: hours(latency),
            active_time_hours: hours(active),
            total_cycle_hours: hours(latency + active),
        }
    }

    pub fn bucket_sum_hours(&self) -> f64 {
        self.sourcing_hours
            + self.screening_hours
            + self.hm_review_hours
            + self.interview_hours
            + self.feedback_wait_hours
            + self.decision_wait_hours
    }

    /// Share of the cycle spent waiting on the hiring manager, in percent.
    pub fn time_tax_pct(&self) -> Option<f64> {
        if self.total_cycle_hours > 0.0 {
            Some(self.total_latency_hours / self.total_cycle_hours * 100.0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightBasis {
    Computed,
    InsufficientLoops,
    NoBaseline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HmFriction {
    pub hiring_manager_id: String,
    pub name: Option<String>,
    pub req_count: usize,
    pub loop_count: usize,
    /// Loops in scope that were missing a clock-start or clock-end event.
    pub skipped_loops: usize,
    pub feedback_latency_median_hours: Option<f64>,
    pub decision_latency_median_hours: Option<f64>,
    pub latency_statistic_hours: Option<f64>,
    pub weight: f64,
    pub weight_basis: WeightBasis,
    pub confidence: ConfidenceLevel,
    pub composition: CompositionBreakdown,
    pub time_tax_pct: Option<f64>,
    pub offers_extended: usize,
    pub offers_accepted: usize,
    pub offer_acceptance_rate: Option<f64>,
}

pub fn hm_weights(friction: &[HmFriction]) -> HmWeights {
    friction
        .iter()
        .map(|hm| (hm.hiring_manager_id.clone(), hm.weight))
        .collect()
}

/// Clamped ratio to the population median. Fewer than `min_loops` loops always yields 1.0.
pub fn hm_weight(
    latency_statistic: Option<f64>,
    population_median: Option<f64>,
    loop_count: usize,
    policy: &HmWeightPolicy,
) -> (f64, WeightBasis) {
    if loop_count < policy.min_loops {
        return (1.0, WeightBasis::InsufficientLoops);
    }
    match (latency_statistic, population_median) {
        (Some(latency), Some(baseline)) if baseline > 0.0 => {
            ((latency / baseline).clamp(policy.min, policy.max), WeightBasis::Computed)
        }
        _ => (1.0, WeightBasis::NoBaseline),
    }
}

#[derive(Debug, Clone, Default)]
struct LoopOutcome {
    feedback_hours: Option<f64>,
    decision_hours: Option<f64>,
    buckets: Option<BucketSeconds>,
    /// Decision time, or the last event for undecided loops.
    anchor_at: Option<DateTime<Utc>>,
    offered: bool,
    accepted: bool,
}

fn base_bucket(stage: Option<CanonicalStage>) -> Option<Bucket> {
    match stage? {
        CanonicalStage::Lead | CanonicalStage::Applied => Some(Bucket::Sourcing),
        CanonicalStage::Screen => Some(Bucket::Screening),
        CanonicalStage::HmScreen => Some(Bucket::HmReview),
        CanonicalStage::Onsite | CanonicalStage::Final => Some(Bucket::Interview),
        _ => None,
    }
}

/// First event after `entry_idx` that ends the HM's review clock.
fn hm_action_after(events: &[&NormalizedEvent], entry_idx: usize, hm_id: &str) -> Option<DateTime<Utc>> {
    events[entry_idx + 1..]
        .iter()
        .find(|event| {
            event.actor_user_id.as_deref() == Some(hm_id)
                || event.event_type == EventType::FeedbackSubmitted
                || event.is_transition()
        })
        .map(|event| event.occurred_at)
}

fn partition_cycle(
    transitions: &[(usize, &NormalizedEvent)],
    events: &[&NormalizedEvent],
    hm_id: &str,
    first_contact_at: Option<DateTime<Utc>>,
    completed_at: DateTime<Utc>,
) -> BucketSeconds {
    let mut buckets = BucketSeconds::default();
    if let (Some(contact), Some((_, first))) = (first_contact_at, transitions.first()) {
        if contact < first.occurred_at {
            buckets.add(Bucket::Sourcing, (first.occurred_at - contact).num_seconds());
        }
    }
    let mut base = Bucket::Sourcing;
    for pair in transitions.windows(2) {
        let (entry_idx, entry) = pair[0];
        let start = entry.occurred_at;
        let end = pair[1].1.occurred_at;
        base = base_bucket(entry.to_canonical()).unwrap_or(base);

        // Only a real HM_SCREEN entry starts the feedback clock.
        let feedback_end = if entry.enters(CanonicalStage::HmScreen) {
            hm_action_after(events, entry_idx, hm_id).filter(|at| *at > start && *at <= end)
        } else {
            None
        };

        let mut cuts = vec![start, end];
        cuts.extend(feedback_end.filter(|at| *at < end));
        if completed_at > start && completed_at < end {
            cuts.push(completed_at);
        }
        cuts.sort();
        cuts.dedup();

        for piece in cuts.windows(2) {
            let (from, to) = (piece[0], piece[1]);
            let bucket = if from >= completed_at {
                Bucket::DecisionWait
            } else if feedback_end.is_some_and(|fb| from < fb) {
                Bucket::FeedbackWait
            } else {
                base
            };
            buckets.add(bucket, (to - from).num_seconds());
        }
    }
    buckets
}

/// `events` must be sorted by time.
fn analyze_loop(
    events: &[&NormalizedEvent],
    hm_id: &str,
    first_contact_at: Option<DateTime<Utc>>,
) -> LoopOutcome {
    let transitions: Vec<(usize, &NormalizedEvent)> = events
        .iter()
        .enumerate()
        .filter(|(_, event)| event.is_transition())
        .map(|(idx, event)| (idx, *event))
        .collect();

    let mut outcome = LoopOutcome {
        anchor_at: events.last().map(|event| event.occurred_at),
        offered: events
            .iter()
            .any(|e| e.enters(CanonicalStage::Offer) || e.event_type == EventType::OfferExtended),
        accepted: events
            .iter()
            .any(|e| e.enters(CanonicalStage::Hired) || e.event_type == EventType::OfferAccepted),
        ..LoopOutcome::default()
    };

    if let Some(&(entry_idx, entry)) = transitions.iter().find(|(_, e)| e.enters(CanonicalStage::HmScreen)) {
        outcome.feedback_hours = hm_action_after(events, entry_idx, hm_id)
            .filter(|at| *at >= entry.occurred_at)
            .map(|at| hours_between(entry.occurred_at, at));
    }

    let is_interview = |e: &NormalizedEvent| e.to_canonical().is_some_and(CanonicalStage::is_interview);
    let Some(first_interview) = transitions.iter().position(|(_, e)| is_interview(e)) else {
        return outcome;
    };
    let Some(decision) = transitions[first_interview..]
        .iter()
        .position(|(_, e)| e.to_canonical().is_some_and(CanonicalStage::is_decision))
        .map(|offset| offset + first_interview)
    else {
        return outcome;
    };

    let decided_at = transitions[decision].1.occurred_at;
    let last_interview = transitions[..decision]
        .iter()
        .rposition(|(_, e)| is_interview(e))
        .unwrap_or(first_interview);
    let interview_entered = transitions[last_interview].1.occurred_at;
    let completed_at = events
        .iter()
        .filter(|e| e.event_type == EventType::InterviewCompleted)
        .map(|e| e.occurred_at)
        .filter(|at| *at >= interview_entered && *at <= decided_at)
        .max()
        .unwrap_or(interview_entered);

    outcome.decision_hours = Some(hours_between(completed_at, decided_at));
    outcome.buckets = Some(partition_cycle(
        &transitions[..=decision],
        events,
        hm_id,
        first_contact_at,
        completed_at,
    ));
    outcome.anchor_at = Some(decided_at);
    outcome
}

#[derive(Default)]
struct HmAccumulator {
    req_count: usize,
    loop_count: usize,
    skipped_loops: usize,
    feedback: Vec<f64>,
    decision: Vec<f64>,
    loop_latency: Vec<f64>,
    buckets: BucketSeconds,
    offers_extended: usize,
    offers_accepted: usize,
}

/// Entry point: per-HM latency, composition, offer acceptance and weight.
pub fn compute_hm_friction(
    requisitions: &[Requisition],
    candidates: &[Candidate],
    events: &[NormalizedEvent],
    users: &[User],
    filters: &Filters,
    config: &EngineConfig,
) -> Vec<HmFriction> {
    let scoped: HashMap<&str, &Requisition> = requisitions
        .iter()
        .filter(|req| filters.includes_requisition(req))
        .map(|req| (req.req_id.as_str(), req))
        .collect();

    let mut accumulators: BTreeMap<&str, HmAccumulator> = BTreeMap::new();
    for req in scoped.values() {
        accumulators
            .entry(req.hiring_manager_id.as_str())
            .or_default()
            .req_count += 1;
    }

    let first_contact: HashMap<(&str, &str), DateTime<Utc>> = candidates
        .iter()
        .filter_map(|c| Some(((c.req_id.as_str(), c.candidate_id.as_str()), c.first_contact_at?)))
        .collect();

    let mut loops: BTreeMap<(&str, &str), Vec<&NormalizedEvent>> = BTreeMap::new();
    for event in events.iter().filter(|e| scoped.contains_key(e.req_id.as_str())) {
        loops
            .entry((event.req_id.as_str(), event.candidate_id.as_str()))
            .or_default()
            .push(event);
    }

    for ((req_id, candidate_id), mut loop_events) in loops {
        let Some(req) = scoped.get(req_id) else {
            continue;
        };
        loop_events.sort_by_key(|event| event.occurred_at);
        let hm_id = req.hiring_manager_id.as_str();
        let contact = first_contact.get(&(req_id, candidate_id)).copied();
        let outcome = analyze_loop(&loop_events, hm_id, contact);
        if !outcome.anchor_at.is_some_and(|at| filters.includes_time(at)) {
            continue;
        }

        let acc = accumulators.entry(hm_id).or_default();
        if outcome.offered {
            acc.offers_extended += 1;
            if outcome.accepted {
                acc.offers_accepted += 1;
            }
        }
        match (outcome.decision_hours, outcome.buckets) {
            (Some(decision), Some(buckets)) => {
                acc.loop_count += 1;
                if let Some(hours) = outcome.feedback_hours {
                    acc.feedback.push(hours);
                }
                acc.decision.push(decision);
                acc.loop_latency.push(decision + outcome.feedback_hours.unwrap_or(0.0));
                acc.buckets.merge(&buckets);
            }
            _ => acc.skipped_loops += 1,
        }
    }

    let policy = &config.hm_weight;
    let population: Vec<f64> = accumulators
        .values()
        .filter(|acc| acc.loop_count >= policy.min_loops)
        .filter_map(|acc| median(&acc.loop_latency))
        .collect();
    let population_median = median(&population);
    debug!(
        hiring_managers = accumulators.len(),
        baseline_hms = population.len(),
        ?population_median,
        "computed HM latency baseline"
    );

    accumulators
        .into_iter()
        .map(|(hm_id, acc)| {
            let latency_statistic_hours = median(&acc.loop_latency);
            let (weight, weight_basis) =
                hm_weight(latency_statistic_hours, population_median, acc.loop_count, policy);
            let composition = CompositionBreakdown::from_seconds(&acc.buckets);
            HmFriction {
                hiring_manager_id: hm_id.to_string(),
                name: users
                    .iter()
                    .find(|user| user.user_id == hm_id)
                    .map(|user| user.name.clone()),
                req_count: acc.req_count,
                loop_count: acc.loop_count,
                skipped_loops: acc.skipped_loops,
                feedback_latency_median_hours: median(&acc.feedback),
                decision_latency_median_hours: median(&acc.decision),
                latency_statistic_hours,
                weight,
                weight_basis,
                confidence: ConfidenceLevel::from_sample(acc.loop_count, policy.min_loops),
                time_tax_pct: composition.time_tax_pct(),
                composition,
                offers_extended: acc.offers_extended,
                offers_accepted: acc.offers_accepted,
                offer_acceptance_rate: rate(acc.offers_accepted, acc.offers_extended),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Disposition, NormalizedStage, ReqStatus};
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn move_to(req: &str, cand: &str, to: CanonicalStage, hours: i64) -> NormalizedEvent {
        NormalizedEvent {
            candidate_id: cand.to_string(),
            req_id: req.to_string(),
            event_type: EventType::StageChange,
            from_stage: None,
            to_stage: Some(NormalizedStage::Canonical(to)),
            actor_user_id: None,
            occurred_at: t0() + Duration::hours(hours),
        }
    }

    fn activity(req: &str, cand: &str, kind: EventType, actor: Option<&str>, hours: i64) -> NormalizedEvent {
        NormalizedEvent {
            candidate_id: cand.to_string(),
            req_id: req.to_string(),
            event_type: kind,
            from_stage: None,
            to_stage: None,
            actor_user_id: actor.map(str::to_string),
            occurred_at: t0() + Duration::hours(hours),
        }
    }

    fn req(id: &str, hm: &str) -> Requisition {
        Requisition {
            req_id: id.to_string(),
            title: "Engineer".to_string(),
            status: ReqStatus::Open,
            recruiter_id: "rec".to_string(),
            hiring_manager_id: hm.to_string(),
            opened_at: t0() - Duration::days(10),
            closed_at: None,
            level: None,
            job_family: None,
            region: None,
        }
    }

    /// A complete loop whose decision lands `decision_wait` hours after onsite entry.
    fn loop_events(req: &str, cand: &str, decision_wait: i64) -> Vec<NormalizedEvent> {
        vec![
            move_to(req, cand, CanonicalStage::Applied, 0),
            move_to(req, cand, CanonicalStage::Screen, 24),
            move_to(req, cand, CanonicalStage::HmScreen, 48),
            move_to(req, cand, CanonicalStage::Onsite, 96),
            move_to(req, cand, CanonicalStage::Offer, 96 + decision_wait),
        ]
    }

    fn friction_for(events: &[NormalizedEvent], reqs: &[Requisition]) -> Vec<HmFriction> {
        compute_hm_friction(reqs, &[], events, &[], &Filters::default(), &EngineConfig::default())
    }

    #[test]
    fn composition_partitions_cycle_exactly() {
        let mut events = loop_events("R1", "c1", 30);
        events.push(activity("R1", "c1", EventType::FeedbackSubmitted, Some("hm-a"), 60));
        events.push(activity("R1", "c1", EventType::InterviewCompleted, None, 100));
        let result = friction_for(&events, &[req("R1", "hm-a")]);
        let c = &result[0].composition;
        assert_eq!(c.sourcing_hours, 24.0);
        assert_eq!(c.screening_hours, 24.0);
        assert_eq!(c.feedback_wait_hours, 12.0);
        assert_eq!(c.hm_review_hours, 36.0);
        assert_eq!(c.interview_hours, 4.0);
        assert_eq!(c.decision_wait_hours, 26.0);
        assert_eq!(c.total_cycle_hours, 126.0);
        assert!((c.bucket_sum_hours() - (c.total_latency_hours + c.active_time_hours)).abs() < 1e-9);
        let tax = result[0].time_tax_pct.unwrap();
        assert!((tax - 38.0 / 126.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn feedback_clock_uses_hm_action() {
        let mut events = loop_events("R1", "c1", 10);
        events.push(activity("R1", "c1", EventType::Other, Some("hm-a"), 50));
        let result = friction_for(&events, &[req("R1", "hm-a")]);
        assert_eq!(result[0].feedback_latency_median_hours, Some(2.0));
        assert_eq!(result[0].decision_latency_median_hours, Some(10.0));
    }

    #[test]
    fn loops_without_decision_are_skipped() {
        let events = vec![
            move_to("R1", "c1", CanonicalStage::Screen, 0),
            move_to("R1", "c1", CanonicalStage::Onsite, 10),
        ];
        let result = friction_for(&events, &[req("R1", "hm-a")]);
        assert_eq!(result[0].loop_count, 0);
        assert_eq!(result[0].skipped_loops, 1);
        assert_eq!(result[0].decision_latency_median_hours, None);
        assert_eq!(result[0].composition.total_cycle_hours, 0.0);
        assert_eq!(result[0].time_tax_pct, None);
    }

    #[test]
    fn fewer_than_three_loops_forces_neutral_weight() {
        let mut events = Vec::new();
        let mut reqs = Vec::new();
        for (hm, wait) in [("hm-a", 10), ("hm-b", 10), ("hm-c", 10)] {
            let r = format!("R-{hm}");
            for i in 0..3 {
                events.extend(loop_events(&r, &format!("{hm}-{i}"), wait));
            }
            reqs.push(req(&r, hm));
        }
        reqs.push(req("R-slow", "hm-slow"));
        for i in 0..2 {
            events.extend(loop_events("R-slow", &format!("slow-{i}"), 500));
        }
        let result = friction_for(&events, &reqs);
        let slow = result.iter().find(|hm| hm.hiring_manager_id == "hm-slow").unwrap();
        assert_eq!(slow.loop_count, 2);
        assert_eq!(slow.weight, 1.0);
        assert_eq!(slow.weight_basis, WeightBasis::InsufficientLoops);
        assert_eq!(slow.confidence, ConfidenceLevel::Insufficient);
    }

    #[test]
    fn slow_hm_weight_clamps_at_upper_bound() {
        let mut events = Vec::new();
        let mut reqs = Vec::new();
        for (hm, wait) in [("hm-a", 96), ("hm-b", 48), ("hm-c", 48)] {
            let r = format!("R-{hm}");
            for i in 0..5 {
                events.extend(loop_events(&r, &format!("{hm}-{i}"), wait));
            }
            reqs.push(req(&r, hm));
        }
        let result = friction_for(&events, &reqs);
        let weights = hm_weights(&result);
        assert_eq!(result[0].decision_latency_median_hours, Some(96.0));
        assert_eq!(weights["hm-a"], 1.3);
        assert_eq!(weights["hm-b"], 1.0);
        assert_eq!(result[0].weight_basis, WeightBasis::Computed);
    }

    #[test]
    fn weight_respects_lower_bound() {
        let policy = HmWeightPolicy::default();
        assert_eq!(hm_weight(Some(10.0), Some(100.0), 5, &policy), (0.8, WeightBasis::Computed));
        assert_eq!(hm_weight(Some(10.0), None, 5, &policy), (1.0, WeightBasis::NoBaseline));
        assert_eq!(hm_weight(Some(500.0), Some(10.0), 2, &policy), (1.0, WeightBasis::InsufficientLoops));
    }

    #[test]
    fn feedback_median_ignores_incomplete_loops() {
        let mut events = loop_events("R1", "c1", 10);
        events.push(activity("R1", "c1", EventType::FeedbackSubmitted, Some("hm-a"), 58));
        for cand in ["c2", "c3"] {
            events.push(move_to("R1", cand, CanonicalStage::Screen, 0));
            events.push(move_to("R1", cand, CanonicalStage::HmScreen, 24));
            events.push(move_to("R1", cand, CanonicalStage::Rejected, 524));
        }
        let result = friction_for(&events, &[req("R1", "hm-a")]);
        assert_eq!(result[0].loop_count, 1);
        assert_eq!(result[0].skipped_loops, 2);
        assert_eq!(result[0].feedback_latency_median_hours, Some(10.0));
    }

    #[test]
    fn first_contact_lead_time_counts_as_sourcing() {
        let events = loop_events("R1", "c1", 30);
        let contacted = Candidate {
            candidate_id: "c1".to_string(),
            req_id: "R1".to_string(),
            source: "outbound".to_string(),
            disposition: Disposition::Active,
            current_stage: "Offer".to_string(),
            current_stage_entered_at: t0() + Duration::hours(126),
            first_contact_at: Some(t0() - Duration::hours(72)),
        };
        let reqs = [req("R1", "hm-a")];
        let config = EngineConfig::default();
        let with_contact =
            compute_hm_friction(&reqs, &[contacted.clone()], &events, &[], &Filters::default(), &config);
        let without = friction_for(&events, &reqs);

        let c = &with_contact[0].composition;
        assert_eq!(c.sourcing_hours, 96.0);
        assert_eq!(c.total_cycle_hours, without[0].composition.total_cycle_hours + 72.0);
        assert!(with_contact[0].time_tax_pct.unwrap() < without[0].time_tax_pct.unwrap());

        let late = Candidate {
            first_contact_at: Some(t0() + Duration::hours(5)),
            ..contacted
        };
        let ignored = compute_hm_friction(&reqs, &[late], &events, &[], &Filters::default(), &config);
        assert_eq!(ignored[0].composition.sourcing_hours, 24.0);
    }

    #[test]
    fn unmapped_step_after_hm_screen_is_not_feedback_wait() {
        let mut events = vec![
            move_to("R1", "c1", CanonicalStage::Applied, 0),
            move_to("R1", "c1", CanonicalStage::Screen, 24),
            move_to("R1", "c1", CanonicalStage::HmScreen, 48),
            activity("R1", "c1", EventType::FeedbackSubmitted, Some("hm-a"), 60),
        ];
        let mut unmapped = move_to("R1", "c1", CanonicalStage::Onsite, 72);
        unmapped.to_stage = Some(NormalizedStage::Unmapped);
        events.push(unmapped);
        events.push(move_to("R1", "c1", CanonicalStage::Onsite, 96));
        events.push(move_to("R1", "c1", CanonicalStage::Offer, 126));

        let result = friction_for(&events, &[req("R1", "hm-a")]);
        let c = &result[0].composition;
        assert_eq!(c.feedback_wait_hours, 12.0);
        assert_eq!(c.hm_review_hours, 36.0);
        assert_eq!(c.total_cycle_hours, 126.0);
    }

    #[test]
    fn offer_acceptance_is_tracked_per_hm() {
        let mut events = loop_events("R1", "c1", 5);
        events.push(move_to("R1", "c1", CanonicalStage::Hired, 120));
        events.extend(loop_events("R1", "c2", 5));
        let result = friction_for(&events, &[req("R1", "hm-a")]);
        assert_eq!(result[0].offers_extended, 2);
        assert_eq!(result[0].offers_accepted, 1);
        assert_eq!(result[0].offer_acceptance_rate, Some(0.5));
    }
}
