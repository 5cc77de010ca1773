use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{ComplexityWeights, EngineConfig};
use crate::friction::HmWeights;
use crate::models::Requisition;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityScore {
    pub req_id: String,
    pub level_factor: f64,
    pub family_factor: f64,
    pub region_factor: f64,
    pub hm_weight: f64,
    pub score: f64,
}

/// Requisition id → score. Every requisition passed in gets an entry.
pub type ComplexityScores = BTreeMap<String, ComplexityScore>;

fn factor(table: &BTreeMap<String, f64>, attribute: Option<&str>) -> f64 {
    attribute
        .map(|value| value.trim().to_ascii_lowercase())
        .and_then(|key| table.get(&key).copied())
        .filter(|factor| factor.is_finite() && *factor > 0.0)
        .unwrap_or(1.0)
}

/// Policy-table difficulty before the hiring manager multiplier.
pub fn base_complexity(req: &Requisition, weights: &ComplexityWeights) -> (f64, f64, f64) {
    (
        factor(&weights.level, req.level.as_deref()),
        factor(&weights.job_family, req.job_family.as_deref()),
        factor(&weights.region, req.region.as_deref()),
    )
}

pub fn compute_complexity(
    requisitions: &[Requisition],
    hm_weights: &HmWeights,
    config: &EngineConfig,
) -> ComplexityScores {
    requisitions
        .iter()
        .map(|req| {
            let (level_factor, family_factor, region_factor) =
                base_complexity(req, &config.complexity_weights);
            let hm_weight = hm_weights
                .get(&req.hiring_manager_id)
                .copied()
                .filter(|weight| weight.is_finite() && *weight > 0.0)
                .unwrap_or(1.0);
            let score = level_factor * family_factor * region_factor * hm_weight;
            (
                req.req_id.clone(),
                ComplexityScore {
                    req_id: req.req_id.clone(),
                    level_factor,
                    family_factor,
                    region_factor,
                    hm_weight,
                    score,
                },
            )
        })
        .collect()
}

/// Σ complexity with one requisition id per hire; unknown ids count 1.0.
pub fn weighted_hires<'a>(scores: &ComplexityScores, hired_req_ids: impl IntoIterator<Item = &'a str>) -> f64 {
    hired_req_ids
        .into_iter()
        .map(|req_id| scores.get(req_id).map_or(1.0, |score| score.score))
        .sum()
}
