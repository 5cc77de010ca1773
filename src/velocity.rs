use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::confidence::{ConfidenceLevel, GatedMetric, SampleKind};
use crate::fill::{fill_dates, time_to_fill, TtfSample};
use crate::models::{CanonicalStage, Disposition, EventType};
use crate::pipeline::AnalysisInputs;
use crate::stages::NormalizedEvent;
use crate::stats::{mean, median, rate, whole_days_between};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayKind {
    CandidateOffer,
    Requisition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecayBucket {
    pub start_day: i64,
    /// Exclusive; `None` for the open-ended last bucket.
    pub end_day: Option<i64>,
    pub total: usize,
    pub positive: usize,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecayCurve {
    pub kind: DecayKind,
    pub buckets: Vec<DecayBucket>,
    pub overall_rate: GatedMetric,
    pub confidence: ConfidenceLevel,
    /// First bucket start where the rate falls below the overall rate × drop ratio.
    pub decay_start_day: Option<i64>,
}

/// One elapsed-time observation with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecaySample {
    pub elapsed_days: i64,
    pub positive: bool,
}

pub fn build_decay_curve(
    kind: DecayKind,
    samples: &[DecaySample],
    bucket_days: i64,
    bucket_count: usize,
    min_sample: usize,
    drop_ratio: f64,
) -> DecayCurve {
    let bucket_days = bucket_days.max(1);
    let bucket_count = bucket_count.max(1);
    let mut counts = vec![(0usize, 0usize); bucket_count];
    for sample in samples {
        let index = (sample.elapsed_days.max(0) / bucket_days) as usize;
        let slot = &mut counts[index.min(bucket_count - 1)];
        slot.0 += 1;
        if sample.positive {
            slot.1 += 1;
        }
    }

    let buckets: Vec<DecayBucket> = counts
        .iter()
        .enumerate()
        .map(|(index, (total, positive))| DecayBucket {
            start_day: index as i64 * bucket_days,
            end_day: (index + 1 < bucket_count).then(|| (index as i64 + 1) * bucket_days),
            total: *total,
            positive: *positive,
            rate: rate(*positive, *total),
        })
        .collect();

    let positives = samples.iter().filter(|s| s.positive).count();
    let overall_rate = GatedMetric::new(rate(positives, samples.len()), samples.len(), min_sample);
    let confidence = overall_rate.confidence;
    let decay_start_day = overall_rate.headline_value().and_then(|overall| {
        buckets
            .iter()
            .find(|bucket| bucket.rate.is_some_and(|r| r < overall * drop_ratio))
            .map(|bucket| bucket.start_day)
    });

    DecayCurve {
        kind,
        buckets,
        overall_rate,
        confidence,
        decay_start_day,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferRecord {
    pub candidate_id: String,
    pub req_id: String,
    pub extended_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub accepted: bool,
    pub elapsed_days: i64,
}

fn decision_after(events: &[&NormalizedEvent], extended_at: DateTime<Utc>) -> Option<(DateTime<Utc>, bool)> {
    events
        .iter()
        .filter(|e| e.occurred_at >= extended_at)
        .find_map(|e| {
            let accepted = e.event_type == EventType::OfferAccepted || e.enters(CanonicalStage::Hired);
            let declined = e.event_type == EventType::OfferDeclined
                || e.enters(CanonicalStage::Rejected)
                || e.enters(CanonicalStage::Withdrew);
            if accepted {
                Some((e.occurred_at, true))
            } else if declined {
                Some((e.occurred_at, false))
            } else {
                None
            }
        })
}

/// Offers extended in scope with their outcome; pending offers age until `as_of`.
pub fn collect_offers(inputs: &AnalysisInputs<'_>) -> Vec<OfferRecord> {
    let filters = inputs.filters;
    let scoped: HashSet<&str> = inputs
        .dataset
        .requisitions
        .iter()
        .filter(|req| filters.includes_requisition(req))
        .map(|req| req.req_id.as_str())
        .collect();
    let candidates: HashMap<(&str, &str), _> = inputs
        .dataset
        .candidates
        .iter()
        .map(|c| ((c.req_id.as_str(), c.candidate_id.as_str()), c))
        .collect();

    let mut loops: BTreeMap<(&str, &str), Vec<&NormalizedEvent>> = BTreeMap::new();
    for event in inputs
        .normalized
        .events
        .iter()
        .filter(|e| scoped.contains(e.req_id.as_str()))
    {
        loops
            .entry((event.req_id.as_str(), event.candidate_id.as_str()))
            .or_default()
            .push(event);
    }

    loops
        .into_iter()
        .filter_map(|(key, mut events)| {
            events.sort_by_key(|e| e.occurred_at);
            let extended_at = events
                .iter()
                .find(|e| e.enters(CanonicalStage::Offer) || e.event_type == EventType::OfferExtended)?
                .occurred_at;
            if !filters.includes_time(extended_at) {
                return None;
            }
            let decision = decision_after(&events, extended_at).or_else(|| {
                let candidate = candidates.get(&key)?;
                let at = candidate.current_stage_entered_at;
                match candidate.disposition {
                    _ if at < extended_at => None,
                    Disposition::Hired => Some((at, true)),
                    Disposition::Rejected | Disposition::Withdrawn => Some((at, false)),
                    Disposition::Active => None,
                }
            });
            let end = decision.map_or(inputs.as_of, |(at, _)| at);
            Some(OfferRecord {
                candidate_id: key.1.to_string(),
                req_id: key.0.to_string(),
                extended_at,
                decided_at: decision.map(|(at, _)| at),
                accepted: decision.is_some_and(|(_, accepted)| accepted),
                elapsed_days: whole_days_between(extended_at, end),
            })
        })
        .collect()
}

/// Requisitions opened in scope, aged to fill, close, or `as_of`.
pub fn requisition_decay_samples(inputs: &AnalysisInputs<'_>) -> Vec<DecaySample> {
    let filters = inputs.filters;
    let fills = fill_dates(&inputs.dataset.candidates);
    inputs
        .dataset
        .requisitions
        .iter()
        .filter(|req| filters.includes_requisition(req))
        .filter(|req| filters.includes_time(req.opened_at))
        .filter(|req| !req.closed_before_opened())
        .map(|req| match time_to_fill(req, &fills) {
            Some(sample) => DecaySample {
                elapsed_days: whole_days_between(req.opened_at, sample.filled_at),
                positive: true,
            },
            None => DecaySample {
                elapsed_days: whole_days_between(req.opened_at, req.closed_at.unwrap_or(inputs.as_of)),
                positive: false,
            },
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortFactor {
    HmWeight,
    PipelineDepth,
    Complexity,
    ReferralShare,
    OnsiteCount,
}

impl CohortFactor {
    pub const ALL: [CohortFactor; 5] = [
        CohortFactor::HmWeight,
        CohortFactor::PipelineDepth,
        CohortFactor::Complexity,
        CohortFactor::ReferralShare,
        CohortFactor::OnsiteCount,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CohortFactor::HmWeight => "HM weight",
            CohortFactor::PipelineDepth => "Pipeline depth",
            CohortFactor::Complexity => "Complexity",
            CohortFactor::ReferralShare => "Referral share",
            CohortFactor::OnsiteCount => "Onsite loops",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub fn from_gap(gap: f64) -> Self {
        if gap < 0.15 {
            ImpactLevel::Low
        } else if gap < 0.35 {
            ImpactLevel::Medium
        } else {
            ImpactLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorComparison {
    pub factor: CohortFactor,
    pub fast_mean: Option<f64>,
    pub slow_mean: Option<f64>,
    pub fast_median: Option<f64>,
    pub slow_median: Option<f64>,
    pub normalized_gap: Option<f64>,
    pub impact: Option<ImpactLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortComparison {
    pub hires: usize,
    pub confidence: ConfidenceLevel,
    pub quartile_size: usize,
    pub fast_req_ids: Vec<String>,
    pub slow_req_ids: Vec<String>,
    pub fast_median_ttf_days: Option<f64>,
    pub slow_median_ttf_days: Option<f64>,
    pub factors: Vec<FactorComparison>,
}

/// |slow − fast| relative to the larger magnitude; 0 when both are 0.
pub fn normalized_gap(fast: f64, slow: f64) -> f64 {
    let scale = fast.abs().max(slow.abs());
    if scale == 0.0 {
        0.0
    } else {
        (slow - fast).abs() / scale
    }
}

/// Ascending TTF, ties broken by requisition id.
pub fn rank_by_ttf(mut samples: Vec<TtfSample>) -> Vec<TtfSample> {
    samples.sort_by(|a, b| a.days.total_cmp(&b.days).then_with(|| a.req_id.cmp(&b.req_id)));
    samples
}

struct FactorValues<'a> {
    inputs: &'a AnalysisInputs<'a>,
    depth: HashMap<&'a str, (usize, usize)>,
    onsite: HashMap<&'a str, HashSet<&'a str>>,
    hiring_managers: HashMap<&'a str, &'a str>,
}

impl<'a> FactorValues<'a> {
    fn new(inputs: &'a AnalysisInputs<'a>) -> Self {
        let mut depth: HashMap<&str, (usize, usize)> = HashMap::new();
        for candidate in &inputs.dataset.candidates {
            let entry = depth.entry(candidate.req_id.as_str()).or_default();
            entry.0 += 1;
            if candidate.source.to_ascii_lowercase().contains("referral") {
                entry.1 += 1;
            }
        }
        let mut onsite: HashMap<&str, HashSet<&str>> = HashMap::new();
        for event in inputs
            .normalized
            .events
            .iter()
            .filter(|e| e.to_canonical().is_some_and(CanonicalStage::is_interview))
        {
            onsite
                .entry(event.req_id.as_str())
                .or_default()
                .insert(event.candidate_id.as_str());
        }
        let hiring_managers = inputs
            .dataset
            .requisitions
            .iter()
            .map(|req| (req.req_id.as_str(), req.hiring_manager_id.as_str()))
            .collect();
        Self {
            inputs,
            depth,
            onsite,
            hiring_managers,
        }
    }

    fn value(&self, factor: CohortFactor, req_id: &str) -> f64 {
        match factor {
            CohortFactor::HmWeight => self
                .hiring_managers
                .get(req_id)
                .and_then(|hm| self.inputs.hm_weights.get(*hm))
                .copied()
                .unwrap_or(1.0),
            CohortFactor::PipelineDepth => self.depth.get(req_id).map_or(0.0, |(total, _)| *total as f64),
            CohortFactor::Complexity => self
                .inputs
                .complexity
                .get(req_id)
                .map_or(1.0, |score| score.score),
            CohortFactor::ReferralShare => self
                .depth
                .get(req_id)
                .and_then(|(total, referrals)| rate(*referrals, *total))
                .unwrap_or(0.0),
            CohortFactor::OnsiteCount => self.onsite.get(req_id).map_or(0.0, |loops| loops.len() as f64),
        }
    }
}

pub fn compare_cohorts(inputs: &AnalysisInputs<'_>) -> CohortComparison {
    let filters = inputs.filters;
    let fills = fill_dates(&inputs.dataset.candidates);
    let ranked = rank_by_ttf(
        inputs
            .dataset
            .requisitions
            .iter()
            .filter(|req| filters.includes_requisition(req))
            .filter_map(|req| time_to_fill(req, &fills))
            .filter(|sample| filters.includes_time(sample.filled_at))
            .collect(),
    );

    let config = inputs.config;
    let min_sample = SampleKind::CohortHires.minimum(&config.decay_thresholds, &config.hm_weight);
    let confidence = ConfidenceLevel::from_sample(ranked.len(), min_sample);
    if !confidence.is_sufficient() {
        return CohortComparison {
            hires: ranked.len(),
            confidence,
            quartile_size: 0,
            fast_req_ids: Vec::new(),
            slow_req_ids: Vec::new(),
            fast_median_ttf_days: None,
            slow_median_ttf_days: None,
            factors: Vec::new(),
        };
    }

    let quartile_size = (ranked.len() / 4).max(1);
    let fast = &ranked[..quartile_size];
    let slow = &ranked[ranked.len() - quartile_size..];
    let values = FactorValues::new(inputs);
    let factors = CohortFactor::ALL
        .into_iter()
        .map(|factor| {
            let fast_values: Vec<f64> = fast.iter().map(|s| values.value(factor, &s.req_id)).collect();
            let slow_values: Vec<f64> = slow.iter().map(|s| values.value(factor, &s.req_id)).collect();
            let fast_mean = mean(&fast_values);
            let slow_mean = mean(&slow_values);
            let gap = fast_mean.zip(slow_mean).map(|(f, s)| normalized_gap(f, s));
            FactorComparison {
                factor,
                fast_mean,
                slow_mean,
                fast_median: median(&fast_values),
                slow_median: median(&slow_values),
                normalized_gap: gap,
                impact: gap.map(ImpactLevel::from_gap),
            }
        })
        .collect();

    let days = |cohort: &[TtfSample]| median(&cohort.iter().map(|s| s.days).collect::<Vec<_>>());
    CohortComparison {
        hires: ranked.len(),
        confidence,
        quartile_size,
        fast_req_ids: fast.iter().map(|s| s.req_id.clone()).collect(),
        slow_req_ids: slow.iter().map(|s| s.req_id.clone()).collect(),
        fast_median_ttf_days: days(fast),
        slow_median_ttf_days: days(slow),
        factors,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityMetrics {
    pub offers: Vec<OfferRecord>,
    pub candidate_decay: DecayCurve,
    pub requisition_decay: DecayCurve,
    pub cohort: CohortComparison,
}

/// Entry point: both decay curves and the cohort comparison.
pub fn compute_velocity(inputs: &AnalysisInputs<'_>) -> VelocityMetrics {
    let thresholds = &inputs.config.decay_thresholds;
    let offers = collect_offers(inputs);
    let offer_samples: Vec<DecaySample> = offers
        .iter()
        .map(|offer| DecaySample {
            elapsed_days: offer.elapsed_days,
            positive: offer.accepted,
        })
        .collect();
    let candidate_decay = build_decay_curve(
        DecayKind::CandidateOffer,
        &offer_samples,
        thresholds.offer_bucket_days,
        thresholds.bucket_count,
        thresholds.min_offers_for_decay,
        thresholds.decay_drop_ratio,
    );
    let requisition_decay = build_decay_curve(
        DecayKind::Requisition,
        &requisition_decay_samples(inputs),
        thresholds.req_bucket_days,
        thresholds.bucket_count,
        thresholds.min_reqs_for_decay,
        thresholds.decay_drop_ratio,
    );
    VelocityMetrics {
        offers,
        candidate_decay,
        requisition_decay,
        cohort: compare_cohorts(inputs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(outcomes: &[(i64, bool)]) -> Vec<DecaySample> {
        outcomes.iter()
            .map(|(elapsed_days, positive)| DecaySample {
                elapsed_days: *elapsed_days,
                positive: *positive,
            })
            .collect()
    }

    #[test]
    fn two_offers_are_insufficient() {
        let curve = build_decay_curve(DecayKind::CandidateOffer, &samples(&[(1, true), (20, false)]), 7, 6, 10, 0.8);
        assert_eq!(curve.confidence, ConfidenceLevel::Insufficient);
        assert_eq!(curve.decay_start_day, None);
        assert_eq!(curve.overall_rate.headline_value(), None);
        assert_eq!(curve.buckets[0].total, 1);
    }

    #[test]
    fn decay_starts_where_rate_drops() {
        let mut outcomes = vec![(2, true); 8];
        outcomes.extend([(9, true), (10, false), (12, false)]);
        outcomes.extend([(15, false), (16, false), (17, true)]);
        let curve = build_decay_curve(DecayKind::CandidateOffer, &samples(&outcomes), 7, 6, 10, 0.8);
        assert_eq!(curve.confidence, ConfidenceLevel::Low);
        assert_eq!(curve.buckets[0].rate, Some(1.0));
        assert_eq!(curve.decay_start_day, Some(7));
    }

    #[test]
    fn overflow_lands_in_open_bucket() {
        let curve = build_decay_curve(DecayKind::Requisition, &samples(&[(400, false)]), 30, 6, 10, 0.8);
        let last = curve.buckets.last().unwrap();
        assert_eq!(last.start_day, 150);
        assert_eq!(last.end_day, None);
        assert_eq!(last.total, 1);
        assert_eq!(curve.buckets[0].rate, None);
    }

    #[test]
    fn impact_levels_from_gap() {
        assert_eq!(ImpactLevel::from_gap(normalized_gap(1.0, 1.1)), ImpactLevel::Low);
        assert_eq!(ImpactLevel::from_gap(normalized_gap(1.0, 1.3)), ImpactLevel::Medium);
        assert_eq!(ImpactLevel::from_gap(normalized_gap(2.0, 8.0)), ImpactLevel::High);
        assert_eq!(normalized_gap(0.0, 0.0), 0.0);
    }

    #[test]
    fn ttf_ties_break_by_req_id() {
        let at = Utc::now();
        let sample = |id: &str, days: f64| TtfSample {
            req_id: id.to_string(),
            filled_at: at,
            days,
        };
        let ranked = rank_by_ttf(vec![sample("R3", 10.0), sample("R1", 10.0), sample("R2", 5.0)]);
        let ids: Vec<_> = ranked.iter().map(|s| s.req_id.as_str()).collect();
        assert_eq!(ids, vec!["R2", "R1", "R3"]);
    }
}
