use std::fmt;

use serde::Serialize;

use crate::config::{DecayThresholds, HmWeightPolicy};

/// Placeholder rendered instead of a headline number that lacks evidence.
pub const INSUFFICIENT_DISPLAY: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Insufficient,
    Low,
    Med,
    High,
}

impl ConfidenceLevel {
    /// Below `min` is insufficient; HIGH needs at least four times `min`.
    pub fn from_sample(n: usize, min: usize) -> Self {
        let min = min.max(1);
        if n < min {
            ConfidenceLevel::Insufficient
        } else if n < min * 2 {
            ConfidenceLevel::Low
        } else if n < min * 4 {
            ConfidenceLevel::Med
        } else {
            ConfidenceLevel::High
        }
    }

    pub fn is_sufficient(self) -> bool {
        self != ConfidenceLevel::Insufficient
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfidenceLevel::Insufficient => "INSUFFICIENT",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Med => "MED",
            ConfidenceLevel::High => "HIGH",
        };
        f.write_str(label)
    }
}

/// Metric families with their own, non-interchangeable sample floors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    Offers,
    Requisitions,
    CohortHires,
    HmLoops,
}

impl SampleKind {
    pub fn minimum(self, decay: &DecayThresholds, hm: &HmWeightPolicy) -> usize {
        match self {
            SampleKind::Offers => decay.min_offers_for_decay,
            SampleKind::Requisitions => decay.min_reqs_for_decay,
            SampleKind::CohortHires => decay.min_hires_for_cohort,
            SampleKind::HmLoops => hm.min_loops,
        }
    }
}

/// A statistic bundled with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatedMetric {
    pub value: Option<f64>,
    pub n: usize,
    pub min_sample: usize,
    pub confidence: ConfidenceLevel,
    pub reason: Option<String>,
}

impl GatedMetric {
    pub fn new(value: Option<f64>, n: usize, min_sample: usize) -> Self {
        let confidence = ConfidenceLevel::from_sample(n, min_sample);
        let reason = if !confidence.is_sufficient() {
            Some(format!("insufficient data: {n} of {min_sample} required samples"))
        } else if value.is_none() {
            Some("no value could be computed".to_string())
        } else {
            None
        };
        Self {
            value,
            n,
            min_sample,
            confidence,
            reason,
        }
    }

    /// The value, but only when it may be presented as reliable.
    pub fn headline_value(&self) -> Option<f64> {
        if self.confidence.is_sufficient() {
            self.value
        } else {
            None
        }
    }

    pub fn render(&self, format: impl Fn(f64) -> String) -> String {
        match self.headline_value() {
            Some(value) => format(value),
            None => INSUFFICIENT_DISPLAY.to_string(),
        }
    }
}
