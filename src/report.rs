use std::fmt::Write;

use crate::confidence::{GatedMetric, INSUFFICIENT_DISPLAY};
use crate::filters::Filters;
use crate::friction::WeightBasis;
use crate::overview::{FunnelResult, PeriodDelta, PeriodMetrics};
use crate::pipeline::MetricsReport;
use crate::velocity::{DecayCurve, ImpactLevel};

fn days(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}d"))
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.0}%", v * 100.0))
}

fn signed(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:+.1}{unit}"))
}

fn scope_label(filters: &Filters) -> String {
    let mut parts = Vec::new();
    match filters.date_range {
        Some(range) => parts.push(format!("{} to {}", range.start, range.end)),
        None => parts.push("all time".to_string()),
    }
    for (label, values) in [
        ("recruiter", &filters.recruiter_ids),
        ("function", &filters.functions),
        ("region", &filters.regions),
    ] {
        if !values.is_empty() {
            let joined: Vec<&str> = values.iter().map(String::as_str).collect();
            parts.push(format!("{label} {}", joined.join("/")));
        }
    }
    parts.join(", ")
}

fn write_period(output: &mut String, metrics: &PeriodMetrics) {
    let _ = writeln!(
        output,
        "- Requisitions in scope: {} ({} open)",
        metrics.requisitions_in_scope, metrics.open_reqs
    );
    let _ = writeln!(
        output,
        "- Hires: {} (complexity-weighted {:.2})",
        metrics.hires, metrics.weighted_hires
    );
    let _ = writeln!(
        output,
        "- Median time to fill: {} raw, {} adjusted across {} fills",
        days(metrics.median_ttf_days),
        days(metrics.adjusted_median_ttf_days),
        metrics.ttf_sample_size
    );
    let _ = writeln!(
        output,
        "- Offers: {} extended, {} accepted ({})",
        metrics.offers_extended,
        metrics.offers_accepted,
        pct(metrics.offer_acceptance_rate)
    );
}

fn write_delta(output: &mut String, delta: &PeriodDelta) {
    let _ = writeln!(
        output,
        "- Versus prior period: hires {:+}, weighted hires {:+.2}, median TTF {}, acceptance {}",
        delta.hires,
        delta.weighted_hires,
        signed(delta.median_ttf_days, "d"),
        signed(delta.offer_acceptance_rate.map(|r| r * 100.0), "pts")
    );
}

fn write_decay(output: &mut String, title: &str, curve: &DecayCurve) {
    let _ = writeln!(output);
    let _ = writeln!(output, "### {title}");
    let overall: &GatedMetric = &curve.overall_rate;
    let _ = writeln!(
        output,
        "Overall rate {} from {} samples (confidence {})",
        overall.render(|v| format!("{:.0}%", v * 100.0)),
        overall.n,
        curve.confidence
    );
    if let Some(reason) = &overall.reason {
        let _ = writeln!(output, "_{reason}_");
    }
    let decay_start = curve
        .decay_start_day
        .map_or_else(|| INSUFFICIENT_DISPLAY.to_string(), |day| format!("day {day}"));
    let _ = writeln!(output, "Decay starts: {decay_start}");
    if !curve.confidence.is_sufficient() {
        return;
    }
    for bucket in &curve.buckets {
        let span = match bucket.end_day {
            Some(end) => format!("{}-{}d", bucket.start_day, end - 1),
            None => format!("{}d+", bucket.start_day),
        };
        let _ = writeln!(
            output,
            "- {span}: {}/{} ({})",
            bucket.positive,
            bucket.total,
            pct(bucket.rate)
        );
    }
}

pub fn build_report(report: &MetricsReport) -> String {
    let mut output = String::new();
    let overview = &report.overview;
    let hygiene = &report.hygiene;

    let _ = writeln!(output, "# Recruiting Funnel Report");
    let _ = writeln!(
        output,
        "Generated {} for {}",
        report.as_of.format("%Y-%m-%d %H:%M UTC"),
        scope_label(&report.filters)
    );
    if !overview.mapping.is_complete {
        let _ = writeln!(
            output,
            "> Stage mapping incomplete; missing: {}",
            overview.mapping.missing_stages.join(", ")
        );
    }
    if report.unmapped_event_count > 0 {
        let _ = writeln!(
            output,
            "> {} events reference unmapped stage labels",
            report.unmapped_event_count
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Hygiene");
    let _ = writeln!(output, "Hygiene score: {:.0}/100", hygiene.hygiene_score);
    let counts = &hygiene.counts;
    let _ = writeln!(
        output,
        "- Open requisitions: {} ({} active, {} stalled, {} zombie, {} at risk)",
        counts.open_reqs, counts.active, counts.stalled, counts.zombie, counts.at_risk
    );
    let _ = writeln!(
        output,
        "- Ghost candidates: {} stagnant, {} abandoned of {} active",
        counts.stagnant_candidates, counts.abandoned_candidates, counts.active_candidates
    );
    let _ = writeln!(
        output,
        "- Time to fill: {} raw, {} true ({} excluded requisitions)",
        days(hygiene.raw_median_ttf_days),
        days(hygiene.true_median_ttf_days),
        hygiene.ttf_exclusions.len()
    );
    if let Some(improvement) = hygiene.ttf_improvement_pct {
        let _ = writeln!(output, "- Cleaning the data changes median TTF by {improvement:.1}%");
    }
    if hygiene.anomalies.total() > 0 {
        let anomalies = &hygiene.anomalies;
        let _ = writeln!(
            output,
            "- Skipped records: {} self transitions, {} closed before opened, {} orphan events, {} invalid fills",
            anomalies.self_transitions,
            anomalies.closed_before_opened,
            anomalies.orphan_events,
            anomalies.invalid_fill_dates
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    write_period(&mut output, &overview.current);
    if let Some(delta) = &overview.delta {
        write_delta(&mut output, delta);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Funnel");
    match &overview.current.funnel {
        FunnelResult::InsufficientMapping { missing_stages } => {
            let _ = writeln!(
                output,
                "Pass-through rates withheld until these stages are mapped: {}",
                missing_stages.join(", ")
            );
        }
        FunnelResult::Computed { steps } => {
            for step in steps {
                let _ = writeln!(
                    output,
                    "- {} → {}: {}/{} ({})",
                    step.from,
                    step.to,
                    step.converted,
                    step.entered,
                    pct(step.pass_through_rate)
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recruiters");
    if overview.recruiters.is_empty() {
        let _ = writeln!(output, "No requisitions in scope.");
    }
    for recruiter in &overview.recruiters {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "### {}",
            recruiter.name.as_deref().unwrap_or(&recruiter.recruiter_id)
        );
        if let Some(weight) = recruiter.avg_hm_weight {
            let _ = writeln!(output, "- Average HM weight: {weight:.2}");
        }
        write_period(&mut output, &recruiter.current);
        if let Some(delta) = &recruiter.delta {
            write_delta(&mut output, delta);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Hiring Manager Friction");
    if report.hm_friction.is_empty() {
        let _ = writeln!(output, "No hiring managers in scope.");
    }
    for hm in &report.hm_friction {
        let weight = match hm.weight_basis {
            WeightBasis::Computed => format!("{:.2}", hm.weight),
            WeightBasis::InsufficientLoops => format!("1.00 ({} loops, confidence {})", hm.loop_count, hm.confidence),
            WeightBasis::NoBaseline => "1.00 (no baseline)".to_string(),
        };
        let _ = writeln!(
            output,
            "- {}: weight {}, feedback {}, decision {}, time tax {}",
            hm.name.as_deref().unwrap_or(&hm.hiring_manager_id),
            weight,
            hm.feedback_latency_median_hours
                .map_or_else(|| "n/a".to_string(), |h| format!("{h:.0}h")),
            hm.decision_latency_median_hours
                .map_or_else(|| "n/a".to_string(), |h| format!("{h:.0}h")),
            hm.time_tax_pct
                .map_or_else(|| "n/a".to_string(), |p| format!("{p:.0}%"))
        );
    }

    let velocity = &report.velocity;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Velocity");
    write_decay(&mut output, "Offer acceptance by days to decision", &velocity.candidate_decay);
    write_decay(&mut output, "Requisition fill rate by days open", &velocity.requisition_decay);

    let cohort = &velocity.cohort;
    let _ = writeln!(output);
    let _ = writeln!(output, "### Fast vs slow hires");
    if !cohort.confidence.is_sufficient() {
        let _ = writeln!(
            output,
            "{INSUFFICIENT_DISPLAY} ({} filled requisitions, confidence {})",
            cohort.hires, cohort.confidence
        );
    } else {
        let _ = writeln!(
            output,
            "Fastest {} fills median {}, slowest median {} (confidence {})",
            cohort.quartile_size,
            days(cohort.fast_median_ttf_days),
            days(cohort.slow_median_ttf_days),
            cohort.confidence
        );
        for factor in &cohort.factors {
            let impact = factor
                .impact
                .map_or("n/a", |impact| match impact {
                    ImpactLevel::Low => "low",
                    ImpactLevel::Medium => "medium",
                    ImpactLevel::High => "high",
                });
            let _ = writeln!(
                output,
                "- {}: fast {:.2} vs slow {:.2} ({impact} impact)",
                factor.factor.label(),
                factor.fast_mean.unwrap_or_default(),
                factor.slow_mean.unwrap_or_default()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::Dataset;
    use crate::pipeline::run_pipeline;
    use chrono::Utc;

    #[test]
    fn empty_dataset_renders_every_section() {
        let report = run_pipeline(&Dataset::default(), &Filters::default(), &EngineConfig::default(), Utc::now());
        let text = build_report(&report);
        for heading in [
            "# Recruiting Funnel Report",
            "## Data Hygiene",
            "## Overview",
            "## Funnel",
            "## Recruiters",
            "## Hiring Manager Friction",
            "## Velocity",
        ] {
            assert!(text.contains(heading), "missing {heading}");
        }
        assert!(text.contains("No requisitions in scope."));
    }

    #[test]
    fn insufficient_decay_renders_placeholder() {
        let report = run_pipeline(&Dataset::default(), &Filters::default(), &EngineConfig::default(), Utc::now());
        let text = build_report(&report);
        assert!(text.contains(&format!("Overall rate {INSUFFICIENT_DISPLAY}")));
        assert!(text.contains(&format!("Decay starts: {INSUFFICIENT_DISPLAY}")));
    }
}
