use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::stages::StageMapping;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Every knob the metrics engine reads. Passed explicitly into each stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub stage_mapping: StageMapping,
    #[serde(default)]
    pub hygiene_thresholds: HygieneThresholds,
    #[serde(default)]
    pub decay_thresholds: DecayThresholds,
    #[serde(default)]
    pub complexity_weights: ComplexityWeights,
    #[serde(default)]
    pub hm_weight: HmWeightPolicy,
    #[serde(default)]
    pub exclusions: ExclusionConfig,
}

impl EngineConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Copy with every out-of-range value reset to its documented default.
    pub fn sanitized(&self) -> Self {
        Self {
            stage_mapping: self.stage_mapping.clone(),
            hygiene_thresholds: self.hygiene_thresholds.sanitized(),
            decay_thresholds: self.decay_thresholds.sanitized(),
            complexity_weights: self.complexity_weights.sanitized(),
            hm_weight: self.hm_weight.sanitized(),
            exclusions: self.exclusions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HygieneThresholds {
    #[serde(default = "default_stalled_days")]
    pub stalled_days: i64,
    #[serde(default = "default_zombie_days")]
    pub zombie_days: i64,
    #[serde(default = "default_at_risk_days")]
    pub at_risk_days: i64,
    #[serde(default = "default_at_risk_min_candidates")]
    pub at_risk_min_candidates: usize,
    #[serde(default = "default_stagnant_days")]
    pub stagnant_days: i64,
    #[serde(default = "default_abandoned_days")]
    pub abandoned_days: i64,
}

impl Default for HygieneThresholds {
    fn default() -> Self {
        Self {
            stalled_days: default_stalled_days(),
            zombie_days: default_zombie_days(),
            at_risk_days: default_at_risk_days(),
            at_risk_min_candidates: default_at_risk_min_candidates(),
            stagnant_days: default_stagnant_days(),
            abandoned_days: default_abandoned_days(),
        }
    }
}

impl HygieneThresholds {
    fn sanitized(&self) -> Self {
        let mut out = self.clone();
        if out.stalled_days <= 0 || out.zombie_days <= 0 || out.zombie_days <= out.stalled_days {
            warn!(
                stalled_days = out.stalled_days,
                zombie_days = out.zombie_days,
                "invalid inactivity thresholds; using defaults"
            );
            out.stalled_days = default_stalled_days();
            out.zombie_days = default_zombie_days();
        }
        if out.at_risk_days <= 0 {
            warn!(at_risk_days = out.at_risk_days, "invalid at-risk age; using default");
            out.at_risk_days = default_at_risk_days();
        }
        if out.at_risk_min_candidates == 0 {
            warn!("at_risk_min_candidates must be positive; using default");
            out.at_risk_min_candidates = default_at_risk_min_candidates();
        }
        if out.stagnant_days <= 0
            || out.abandoned_days <= 0
            || out.abandoned_days <= out.stagnant_days
        {
            warn!(
                stagnant_days = out.stagnant_days,
                abandoned_days = out.abandoned_days,
                "invalid ghost candidate thresholds; using defaults"
            );
            out.stagnant_days = default_stagnant_days();
            out.abandoned_days = default_abandoned_days();
        }
        out
    }
}

fn default_stalled_days() -> i64 {
    14
}
fn default_zombie_days() -> i64 {
    30
}
fn default_at_risk_days() -> i64 {
    120
}
fn default_at_risk_min_candidates() -> usize {
    5
}
fn default_stagnant_days() -> i64 {
    10
}
fn default_abandoned_days() -> i64 {
    30
}

/// Minimum sample sizes and bucket shapes for decay and cohort analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayThresholds {
    #[serde(default = "default_min_offers_for_decay")]
    pub min_offers_for_decay: usize,
    #[serde(default = "default_min_reqs_for_decay")]
    pub min_reqs_for_decay: usize,
    #[serde(default = "default_min_hires_for_cohort")]
    pub min_hires_for_cohort: usize,
    #[serde(default = "default_offer_bucket_days")]
    pub offer_bucket_days: i64,
    #[serde(default = "default_req_bucket_days")]
    pub req_bucket_days: i64,
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,
    /// A bucket is "cold" once its rate falls below this fraction of the overall rate.
    #[serde(default = "default_decay_drop_ratio")]
    pub decay_drop_ratio: f64,
}

impl Default for DecayThresholds {
    fn default() -> Self {
        Self {
            min_offers_for_decay: default_min_offers_for_decay(),
            min_reqs_for_decay: default_min_reqs_for_decay(),
            min_hires_for_cohort: default_min_hires_for_cohort(),
            offer_bucket_days: default_offer_bucket_days(),
            req_bucket_days: default_req_bucket_days(),
            bucket_count: default_bucket_count(),
            decay_drop_ratio: default_decay_drop_ratio(),
        }
    }
}

impl DecayThresholds {
    fn sanitized(&self) -> Self {
        let mut out = self.clone();
        if out.min_offers_for_decay == 0 {
            warn!("min_offers_for_decay must be positive; using default");
            out.min_offers_for_decay = default_min_offers_for_decay();
        }
        if out.min_reqs_for_decay == 0 {
            warn!("min_reqs_for_decay must be positive; using default");
            out.min_reqs_for_decay = default_min_reqs_for_decay();
        }
        if out.min_hires_for_cohort < 4 {
            warn!(
                min_hires_for_cohort = out.min_hires_for_cohort,
                "cohort comparison needs at least one hire per quartile; using default"
            );
            out.min_hires_for_cohort = default_min_hires_for_cohort();
        }
        if out.offer_bucket_days <= 0 {
            warn!(offer_bucket_days = out.offer_bucket_days, "invalid offer bucket width; using default");
            out.offer_bucket_days = default_offer_bucket_days();
        }
        if out.req_bucket_days <= 0 {
            warn!(req_bucket_days = out.req_bucket_days, "invalid requisition bucket width; using default");
            out.req_bucket_days = default_req_bucket_days();
        }
        if out.bucket_count < 2 {
            warn!(bucket_count = out.bucket_count, "decay curves need two buckets; using default");
            out.bucket_count = default_bucket_count();
        }
        if !(out.decay_drop_ratio > 0.0 && out.decay_drop_ratio <= 1.0) {
            warn!(decay_drop_ratio = out.decay_drop_ratio, "decay ratio outside (0, 1]; using default");
            out.decay_drop_ratio = default_decay_drop_ratio();
        }
        out
    }
}

fn default_min_offers_for_decay() -> usize {
    10
}
fn default_min_reqs_for_decay() -> usize {
    10
}
fn default_min_hires_for_cohort() -> usize {
    8
}
fn default_offer_bucket_days() -> i64 {
    7
}
fn default_req_bucket_days() -> i64 {
    30
}
fn default_bucket_count() -> usize {
    6
}
fn default_decay_drop_ratio() -> f64 {
    0.8
}

/// Policy tables for requisition difficulty. Keys are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityWeights {
    #[serde(default = "default_level_factors")]
    pub level: BTreeMap<String, f64>,
    #[serde(default = "default_family_factors")]
    pub job_family: BTreeMap<String, f64>,
    #[serde(default = "default_region_factors")]
    pub region: BTreeMap<String, f64>,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            level: default_level_factors(),
            job_family: default_family_factors(),
            region: default_region_factors(),
        }
    }
}

impl ComplexityWeights {
    fn sanitized(&self) -> Self {
        Self {
            level: sanitize_table("level", &self.level, default_level_factors),
            job_family: sanitize_table("job_family", &self.job_family, default_family_factors),
            region: sanitize_table("region", &self.region, default_region_factors),
        }
    }
}

fn sanitize_table(
    name: &str,
    table: &BTreeMap<String, f64>,
    defaults: fn() -> BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let fallback = defaults();
    table
        .iter()
        .map(|(key, factor)| {
            let key = key.trim().to_ascii_lowercase();
            if factor.is_finite() && *factor > 0.0 {
                (key, *factor)
            } else {
                let replacement = fallback.get(&key).copied().unwrap_or(1.0);
                warn!(table = name, key = %key, factor, replacement, "non-positive complexity factor");
                (key, replacement)
            }
        })
        .collect()
}

fn table(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(key, factor)| (key.to_string(), *factor))
        .collect()
}

fn default_level_factors() -> BTreeMap<String, f64> {
    table(&[
        ("intern", 0.8),
        ("junior", 0.9),
        ("mid", 1.0),
        ("senior", 1.15),
        ("staff", 1.3),
        ("principal", 1.45),
        ("manager", 1.25),
        ("director", 1.5),
        ("vp", 1.7),
        ("executive", 1.8),
    ])
}

fn default_family_factors() -> BTreeMap<String, f64> {
    table(&[
        ("engineering", 1.2),
        ("data", 1.15),
        ("product", 1.1),
        ("design", 1.05),
        ("sales", 0.95),
        ("marketing", 1.0),
        ("operations", 0.9),
        ("support", 0.85),
    ])
}

fn default_region_factors() -> BTreeMap<String, f64> {
    table(&[("remote", 0.95), ("emea", 1.05), ("apac", 1.1)])
}

/// Clamp bounds and evidence floor for hiring manager weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmWeightPolicy {
    #[serde(default = "default_weight_min")]
    pub min: f64,
    #[serde(default = "default_weight_max")]
    pub max: f64,
    #[serde(default = "default_min_loops")]
    pub min_loops: usize,
}

impl Default for HmWeightPolicy {
    fn default() -> Self {
        Self {
            min: default_weight_min(),
            max: default_weight_max(),
            min_loops: default_min_loops(),
        }
    }
}

impl HmWeightPolicy {
    fn sanitized(&self) -> Self {
        let mut out = self.clone();
        let bounds_ok =
            out.min.is_finite() && out.max.is_finite() && out.min > 0.0 && out.min <= 1.0 && out.max >= 1.0;
        if !bounds_ok {
            warn!(min = out.min, max = out.max, "HM weight bounds must bracket 1.0; using defaults");
            out.min = default_weight_min();
            out.max = default_weight_max();
        }
        if out.min_loops < default_min_loops() {
            warn!(min_loops = out.min_loops, "HM weight evidence floor below 3 loops; using default");
            out.min_loops = default_min_loops();
        }
        out
    }
}

fn default_weight_min() -> f64 {
    0.8
}
fn default_weight_max() -> f64 {
    1.3
}
fn default_min_loops() -> usize {
    3
}

/// User-controlled overlay of requisitions removed from time-to-fill math.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionConfig {
    #[serde(default)]
    pub excluded_req_ids: BTreeSet<String>,
    #[serde(default = "default_exclude_zombies")]
    pub exclude_zombies_from_ttf: bool,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            excluded_req_ids: BTreeSet::new(),
            exclude_zombies_from_ttf: default_exclude_zombies(),
        }
    }
}

fn default_exclude_zombies() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config.hygiene_thresholds, HygieneThresholds::default());
        assert_eq!(config.decay_thresholds.min_offers_for_decay, 10);
        assert!(config.exclusions.exclude_zombies_from_ttf);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [hygiene_thresholds]
            zombie_days = 45

            [exclusions]
            excluded_req_ids = ["REQ-9"]
            "#,
        )
        .unwrap();
        assert_eq!(config.hygiene_thresholds.zombie_days, 45);
        assert_eq!(config.hygiene_thresholds.stalled_days, 14);
        assert!(config.exclusions.excluded_req_ids.contains("REQ-9"));
    }

    #[test]
    fn negative_thresholds_are_clamped_to_defaults() {
        let mut config = EngineConfig::default();
        config.hygiene_thresholds.stalled_days = -3;
        config.decay_thresholds.offer_bucket_days = 0;
        config.hm_weight.min = 1.4;
        let clean = config.sanitized();
        assert_eq!(clean.hygiene_thresholds.stalled_days, 14);
        assert_eq!(clean.hygiene_thresholds.zombie_days, 30);
        assert_eq!(clean.decay_thresholds.offer_bucket_days, 7);
        assert_eq!(clean.hm_weight.min, 0.8);
        assert_eq!(clean.hm_weight.max, 1.3);
    }

    #[test]
    fn non_positive_complexity_factor_is_replaced() {
        let mut config = EngineConfig::default();
        config.complexity_weights.level.insert("Senior".to_string(), -1.0);
        let clean = config.sanitized();
        assert_eq!(clean.complexity_weights.level.get("senior"), Some(&1.15));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/funnel.toml")).unwrap();
        assert_eq!(config.hm_weight, HmWeightPolicy::default());
    }
}
