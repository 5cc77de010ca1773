use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use funnel_analytics::config::{EngineConfig, HmWeightPolicy};
use funnel_analytics::confidence::ConfidenceLevel;
use funnel_analytics::filters::Filters;
use funnel_analytics::friction::{compute_hm_friction, hm_weight};
use funnel_analytics::models::{CanonicalStage, Event, EventType, NormalizedStage, ReqStatus, Requisition};
use funnel_analytics::overview::compute_funnel;
use funnel_analytics::stages::{normalize_stages, NormalizedEvent, StageMapping};
use funnel_analytics::velocity::{build_decay_curve, DecayKind, DecaySample};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
}

fn raw_event(from: Option<String>, to: Option<String>) -> Event {
    Event {
        candidate_id: "c".to_string(),
        req_id: "r".to_string(),
        event_type: EventType::StageChange,
        from_stage: from,
        to_stage: to,
        actor_user_id: None,
        occurred_at: t0(),
    }
}

fn stage_at(cand: &str, to: CanonicalStage, hours: i64) -> NormalizedEvent {
    NormalizedEvent {
        candidate_id: cand.to_string(),
        req_id: "R1".to_string(),
        event_type: EventType::StageChange,
        from_stage: None,
        to_stage: Some(NormalizedStage::Canonical(to)),
        actor_user_id: None,
        occurred_at: t0() + Duration::hours(hours),
    }
}

fn activity_at(cand: &str, kind: EventType, actor: Option<&str>, hours: i64) -> NormalizedEvent {
    NormalizedEvent {
        candidate_id: cand.to_string(),
        req_id: "R1".to_string(),
        event_type: kind,
        from_stage: None,
        to_stage: None,
        actor_user_id: actor.map(str::to_string),
        occurred_at: t0() + Duration::hours(hours),
    }
}

fn stage_strategy() -> impl Strategy<Value = CanonicalStage> {
    proptest::sample::select(CanonicalStage::ALL.to_vec())
}

proptest! {
    #[test]
    fn normalized_stages_are_canonical_or_unmapped(
        labels in proptest::collection::vec(proptest::option::of("[A-Za-z ]{0,16}"), 1..12),
        mapped in proptest::collection::vec(("[A-Za-z ]{1,16}", stage_strategy()), 0..6),
    ) {
        let mut mapping = StageMapping::default();
        for (raw, stage) in &mapped {
            mapping.set(raw, *stage, &[]);
        }
        let events: Vec<Event> = labels
            .windows(2)
            .map(|pair| raw_event(pair[0].clone(), pair[1].clone()))
            .collect();
        let allowed: Vec<&str> = CanonicalStage::ALL
            .iter()
            .map(|stage| stage.as_str())
            .chain([NormalizedStage::UNMAPPED])
            .collect();

        let normalized = normalize_stages(&events, &mapping);
        for event in &normalized.events {
            for stage in [event.from_stage, event.to_stage].into_iter().flatten() {
                let value = serde_json::to_value(stage).unwrap();
                let text = value.as_str().unwrap();
                prop_assert!(allowed.contains(&text), "unexpected stage {text}");
            }
        }
    }

    #[test]
    fn fewer_than_three_loops_always_weigh_one(
        loops in 0usize..3,
        latency in proptest::option::of(0.0..10_000.0f64),
        baseline in proptest::option::of(0.0..10_000.0f64),
    ) {
        let (weight, _) = hm_weight(latency, baseline, loops, &HmWeightPolicy::default());
        prop_assert_eq!(weight, 1.0);
    }

    #[test]
    fn weight_stays_within_clamp(
        loops in 3usize..50,
        latency in 0.0..10_000.0f64,
        baseline in 0.001..10_000.0f64,
    ) {
        let policy = HmWeightPolicy::default();
        let (weight, _) = hm_weight(Some(latency), Some(baseline), loops, &policy);
        prop_assert!(weight >= policy.min && weight <= policy.max);
    }

    #[test]
    fn composition_buckets_reconstruct_cycle(
        gaps in proptest::collection::vec(1i64..200, 6),
    ) {
        let mut at = 0;
        let mut mark = |gap: i64| { at += gap; at };
        let events = vec![
            stage_at("c1", CanonicalStage::Applied, 0),
            stage_at("c1", CanonicalStage::Screen, mark(gaps[0])),
            stage_at("c1", CanonicalStage::HmScreen, mark(gaps[1])),
            activity_at("c1", EventType::FeedbackSubmitted, Some("hm-1"), mark(gaps[2])),
            stage_at("c1", CanonicalStage::Onsite, mark(gaps[3])),
            activity_at("c1", EventType::InterviewCompleted, None, mark(gaps[4])),
            stage_at("c1", CanonicalStage::Offer, mark(gaps[5])),
        ];
        let req = Requisition {
            req_id: "R1".to_string(),
            title: "Engineer".to_string(),
            status: ReqStatus::Open,
            recruiter_id: "rec".to_string(),
            hiring_manager_id: "hm-1".to_string(),
            opened_at: t0(),
            closed_at: None,
            level: None,
            job_family: None,
            region: None,
        };

        let friction = compute_hm_friction(&[req], &[], &events, &[], &Filters::default(), &EngineConfig::default());
        prop_assert_eq!(friction.len(), 1);
        let composition = &friction[0].composition;
        let expected: i64 = gaps.iter().sum();
        prop_assert!((composition.total_cycle_hours - expected as f64).abs() < 1e-6);
        prop_assert!(
            (composition.bucket_sum_hours()
                - (composition.total_latency_hours + composition.active_time_hours))
                .abs()
                < 1e-6
        );
        prop_assert_eq!(friction[0].weight, 1.0);
    }

    #[test]
    fn confidence_respects_sample_floor(n in 0usize..200, min in 1usize..50) {
        let level = ConfidenceLevel::from_sample(n, min);
        if n < min {
            prop_assert_eq!(level, ConfidenceLevel::Insufficient);
        }
        if n < 2 * min {
            prop_assert_ne!(level, ConfidenceLevel::High);
        }
    }

    #[test]
    fn decay_curve_gates_on_sample_size(
        samples in proptest::collection::vec((0i64..120, any::<bool>()), 0..40),
        min in 1usize..20,
    ) {
        let samples: Vec<DecaySample> = samples
            .into_iter()
            .map(|(elapsed_days, positive)| DecaySample { elapsed_days, positive })
            .collect();
        let curve = build_decay_curve(DecayKind::CandidateOffer, &samples, 7, 6, min, 0.8);
        prop_assert_eq!(curve.buckets.len(), 6);
        prop_assert_eq!(curve.buckets.iter().map(|b| b.total).sum::<usize>(), samples.len());
        if samples.len() < min {
            prop_assert_eq!(curve.confidence, ConfidenceLevel::Insufficient);
            prop_assert_eq!(curve.decay_start_day, None);
        }
        if samples.len() < 2 * min {
            prop_assert_ne!(curve.confidence, ConfidenceLevel::High);
        }
    }

    #[test]
    fn empty_funnel_steps_report_none(
        moves in proptest::collection::vec((0usize..6, stage_strategy()), 0..30),
    ) {
        let events: Vec<NormalizedEvent> = moves
            .iter()
            .enumerate()
            .map(|(i, (cand, stage))| stage_at(&format!("c{cand}"), *stage, i as i64))
            .collect();
        let refs: Vec<&NormalizedEvent> = events.iter().collect();
        for step in compute_funnel(&refs) {
            if step.entered == 0 {
                prop_assert_eq!(step.pass_through_rate, None);
            } else {
                let rate = step.pass_through_rate.unwrap();
                prop_assert!((0.0..=1.0).contains(&rate));
            }
        }
    }
}
