use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CanonicalStage, Candidate, Event, EventType, NormalizedStage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMapping {
    #[serde(default)]
    pub mappings: BTreeMap<String, CanonicalStage>,
    #[serde(default)]
    pub observed: BTreeSet<String>,
    #[serde(default)]
    pub is_complete: bool,
}

impl StageMapping {
    /// Rebuild after an import: keep every existing entry, suggest mappings
    /// only for labels with no entry yet, and refresh the completeness flag.
    pub fn rebuild(observed: BTreeSet<String>, existing: &StageMapping, events: &[Event]) -> Self {
        let mut mappings = existing.mappings.clone();
        let known = existing.lookup();
        let fresh: Vec<String> = observed
            .iter()
            .filter(|raw| resolve_with(&known, raw).is_none())
            .cloned()
            .collect();

        for suggestion in auto_suggest_mappings(&fresh) {
            if let Some(stage) = suggestion.suggested {
                debug!(raw = %suggestion.raw_stage, stage = %stage, rule = ?suggestion.rule, "auto-mapped stage");
                mappings.insert(suggestion.raw_stage, stage);
            }
        }

        let mut mapping = StageMapping {
            mappings,
            observed,
            is_complete: false,
        };
        mapping.is_complete = validate_mapping_completeness(&mapping, events).is_complete;
        mapping
    }

    /// Record a user edit. The completeness flag is refreshed against `events`.
    pub fn set(&mut self, raw_stage: &str, stage: CanonicalStage, events: &[Event]) {
        let key = stage_key(raw_stage);
        self.mappings
            .retain(|existing, _| stage_key(existing) != key);
        self.mappings.insert(raw_stage.trim().to_string(), stage);
        self.is_complete = validate_mapping_completeness(self, events).is_complete;
    }

    pub fn resolve(&self, raw_stage: &str) -> Option<CanonicalStage> {
        resolve_with(&self.lookup(), raw_stage)
    }

    fn lookup(&self) -> HashMap<String, CanonicalStage> {
        self.mappings
            .iter()
            .map(|(raw, stage)| (stage_key(raw), *stage))
            .collect()
    }
}

fn resolve_with(lookup: &HashMap<String, CanonicalStage>, raw_stage: &str) -> Option<CanonicalStage> {
    lookup
        .get(&stage_key(raw_stage))
        .copied()
        .or_else(|| raw_stage.parse::<CanonicalStage>().ok())
}

/// Case- and punctuation-insensitive key: "HM-Phone  Screen" → "hm phone screen".
pub fn stage_key(raw_stage: &str) -> String {
    raw_stage
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn extract_all_stages(candidates: &[Candidate], events: &[Event]) -> BTreeSet<String> {
    let mut stages = BTreeSet::new();
    for candidate in candidates {
        insert_label(&mut stages, Some(&candidate.current_stage));
    }
    for event in events {
        insert_label(&mut stages, event.from_stage.as_ref());
        insert_label(&mut stages, event.to_stage.as_ref());
    }
    stages
}

fn insert_label(stages: &mut BTreeSet<String>, label: Option<&String>) {
    if let Some(label) = label {
        let trimmed = label.trim();
        if !trimmed.is_empty() {
            stages.insert(trimmed.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// At least one keyword present.
    Any(&'static [&'static str]),
    /// Every group has at least one keyword present.
    All(&'static [&'static [&'static str]]),
}

#[derive(Debug, Clone, Copy)]
struct SuggestionRule {
    name: &'static str,
    pattern: Pattern,
    target: CanonicalStage,
    priority: u8,
}

const SUGGESTION_RULES: &[SuggestionRule] = &[
    SuggestionRule {
        name: "withdrew",
        pattern: Pattern::Any(&["withdr", "dropped out"]),
        target: CanonicalStage::Withdrew,
        priority: 100,
    },
    SuggestionRule {
        name: "rejected",
        pattern: Pattern::Any(&["reject", "decline", "disqualif", "not selected"]),
        target: CanonicalStage::Rejected,
        priority: 95,
    },
    SuggestionRule {
        name: "hired",
        pattern: Pattern::Any(&["hire", "accept", "onboard"]),
        target: CanonicalStage::Hired,
        priority: 90,
    },
    SuggestionRule {
        name: "hm_screen",
        pattern: Pattern::All(&[&["screen"], &["hm", "manager", "hiring"]]),
        target: CanonicalStage::HmScreen,
        priority: 80,
    },
    SuggestionRule {
        name: "offer",
        pattern: Pattern::Any(&["offer"]),
        target: CanonicalStage::Offer,
        priority: 70,
    },
    SuggestionRule {
        name: "final",
        pattern: Pattern::Any(&["final"]),
        target: CanonicalStage::Final,
        priority: 65,
    },
    SuggestionRule {
        name: "onsite",
        pattern: Pattern::Any(&["onsite", "on site", "loop", "panel"]),
        target: CanonicalStage::Onsite,
        priority: 60,
    },
    SuggestionRule {
        name: "screen",
        pattern: Pattern::Any(&["screen", "phone", "recruiter call"]),
        target: CanonicalStage::Screen,
        priority: 50,
    },
    SuggestionRule {
        name: "interview",
        pattern: Pattern::Any(&["interview", "technical"]),
        target: CanonicalStage::Onsite,
        priority: 40,
    },
    SuggestionRule {
        name: "applied",
        pattern: Pattern::Any(&["appl", "inbound", "new"]),
        target: CanonicalStage::Applied,
        priority: 30,
    },
    SuggestionRule {
        name: "lead",
        pattern: Pattern::Any(&["lead", "sourced", "prospect"]),
        target: CanonicalStage::Lead,
        priority: 20,
    },
];

/// Keywords of three characters or fewer must match a whole token so that
/// "hm" does not fire inside an unrelated word.
fn keyword_matches(key: &str, keyword: &str) -> bool {
    if keyword.len() <= 3 {
        key.split(' ').any(|token| token == keyword)
    } else {
        key.contains(keyword)
    }
}

impl Pattern {
    fn matches(self, key: &str) -> bool {
        match self {
            Pattern::Any(keywords) => keywords.iter().any(|kw| keyword_matches(key, kw)),
            Pattern::All(groups) => groups
                .iter()
                .all(|group| group.iter().any(|kw| keyword_matches(key, kw))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingSuggestion {
    pub raw_stage: String,
    pub suggested: Option<CanonicalStage>,
    pub rule: Option<&'static str>,
}

fn suggest(raw_stage: &str) -> Option<&'static SuggestionRule> {
    let key = stage_key(raw_stage);
    let mut rules: Vec<&SuggestionRule> = SUGGESTION_RULES.iter().collect();
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules.into_iter().find(|rule| rule.pattern.matches(&key))
}

pub fn auto_suggest_mappings<S: AsRef<str>>(raw_stages: &[S]) -> Vec<MappingSuggestion> {
    raw_stages
        .iter()
        .map(|raw| {
            let raw = raw.as_ref();
            let rule = raw
                .parse::<CanonicalStage>()
                .ok()
                .map(|stage| (stage, "canonical_name"))
                .or_else(|| suggest(raw).map(|rule| (rule.target, rule.name)));
            MappingSuggestion {
                raw_stage: raw.to_string(),
                suggested: rule.map(|(stage, _)| stage),
                rule: rule.map(|(_, name)| name),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingCompleteness {
    pub is_complete: bool,
    pub missing_stages: Vec<String>,
}

/// Complete iff every raw stage that takes part in an observed transition resolves.
pub fn validate_mapping_completeness(mapping: &StageMapping, events: &[Event]) -> MappingCompleteness {
    let lookup = mapping.lookup();
    let mut missing = BTreeSet::new();
    for event in events {
        for label in [&event.from_stage, &event.to_stage].into_iter().flatten() {
            let trimmed = label.trim();
            if !trimmed.is_empty() && resolve_with(&lookup, trimmed).is_none() {
                missing.insert(trimmed.to_string());
            }
        }
    }
    MappingCompleteness {
        is_complete: missing.is_empty(),
        missing_stages: missing.into_iter().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub candidate_id: String,
    pub req_id: String,
    pub event_type: EventType,
    pub from_stage: Option<NormalizedStage>,
    pub to_stage: Option<NormalizedStage>,
    pub actor_user_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl NormalizedEvent {
    pub fn enters(&self, stage: CanonicalStage) -> bool {
        self.to_stage == Some(NormalizedStage::Canonical(stage))
    }

    pub fn to_canonical(&self) -> Option<CanonicalStage> {
        self.to_stage.and_then(NormalizedStage::canonical)
    }

    pub fn from_canonical(&self) -> Option<CanonicalStage> {
        self.from_stage.and_then(NormalizedStage::canonical)
    }

    /// A stage move whose canonical endpoints differ. Self transitions are not moves.
    pub fn is_transition(&self) -> bool {
        match (self.from_stage, self.to_stage) {
            (Some(from), Some(to)) => from != to,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizedEvents {
    pub events: Vec<NormalizedEvent>,
    /// Events with at least one stage that resolved to `UNMAPPED`.
    pub unmapped_count: usize,
    pub completeness: MappingCompleteness,
}

pub fn normalize_event_stages(events: &[Event], mapping: &StageMapping) -> Vec<NormalizedEvent> {
    let lookup = mapping.lookup();
    let normalize = |label: &Option<String>| {
        label.as_ref().map(|raw| match resolve_with(&lookup, raw.trim()) {
            Some(stage) => NormalizedStage::Canonical(stage),
            None => NormalizedStage::Unmapped,
        })
    };
    events
        .iter()
        .map(|event| NormalizedEvent {
            candidate_id: event.candidate_id.clone(),
            req_id: event.req_id.clone(),
            event_type: event.event_type,
            from_stage: normalize(&event.from_stage),
            to_stage: normalize(&event.to_stage),
            actor_user_id: event.actor_user_id.clone(),
            occurred_at: event.occurred_at,
        })
        .collect()
}

/// Entry point: normalize every event and report unmapped counts and completeness.
pub fn normalize_stages(events: &[Event], mapping: &StageMapping) -> NormalizedEvents {
    let normalized = normalize_event_stages(events, mapping);
    let unmapped_count = normalized
        .iter()
        .filter(|event| {
            event.from_stage == Some(NormalizedStage::Unmapped)
                || event.to_stage == Some(NormalizedStage::Unmapped)
        })
        .count();
    let completeness = validate_mapping_completeness(mapping, events);
    debug!(
        events = normalized.len(),
        unmapped = unmapped_count,
        complete = completeness.is_complete,
        "normalized event stages"
    );
    NormalizedEvents {
        events: normalized,
        unmapped_count,
        completeness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(from: Option<&str>, to: Option<&str>) -> Event {
        Event {
            candidate_id: "c1".to_string(),
            req_id: "r1".to_string(),
            event_type: EventType::StageChange,
            from_stage: from.map(str::to_string),
            to_stage: to.map(str::to_string),
            actor_user_id: None,
            occurred_at: Utc::now(),
        }
    }

    fn suggested(raw: &str) -> Option<CanonicalStage> {
        auto_suggest_mappings(&[raw])[0].suggested
    }

    #[test]
    fn suggests_common_ats_labels() {
        let labels = ["Phone Screen", "HM Phone Screen", "Onsite Loop", "Offer Extended"];
        let stages: Vec<_> = auto_suggest_mappings(&labels)
            .into_iter()
            .map(|s| s.suggested)
            .collect();
        assert_eq!(
            stages,
            vec![
                Some(CanonicalStage::Screen),
                Some(CanonicalStage::HmScreen),
                Some(CanonicalStage::Onsite),
                Some(CanonicalStage::Offer),
            ]
        );
    }

    #[test]
    fn hm_screen_beats_plain_screen() {
        assert_eq!(suggested("Hiring Manager Screen"), Some(CanonicalStage::HmScreen));
        assert_eq!(suggested("manager screen"), Some(CanonicalStage::HmScreen));
    }

    #[test]
    fn outcome_keywords_win_over_offer() {
        assert_eq!(suggested("Offer Accepted"), Some(CanonicalStage::Hired));
        assert_eq!(suggested("Offer Declined"), Some(CanonicalStage::Rejected));
        assert_eq!(suggested("Candidate Withdrew"), Some(CanonicalStage::Withdrew));
    }

    #[test]
    fn short_keywords_need_whole_tokens() {
        assert_eq!(suggested("Rhythm Check"), None);
        assert_eq!(suggested("Renewal"), None);
    }

    #[test]
    fn unmatched_labels_stay_unmapped() {
        let suggestions = auto_suggest_mappings(&["Background Check"]);
        assert_eq!(suggestions[0].suggested, None);
        assert_eq!(suggestions[0].rule, None);
    }

    #[test]
    fn extracts_from_candidates_and_both_event_sides() {
        let candidate = Candidate {
            candidate_id: "c1".to_string(),
            req_id: "r1".to_string(),
            source: "Referral".to_string(),
            disposition: crate::models::Disposition::Active,
            current_stage: "Take Home".to_string(),
            current_stage_entered_at: Utc::now(),
            first_contact_at: None,
        };
        let events = vec![event(Some("Phone Screen"), Some("Onsite")), event(None, Some("  "))];
        let stages = extract_all_stages(&[candidate], &events);
        let expected: BTreeSet<String> = ["Onsite", "Phone Screen", "Take Home"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(stages, expected);
    }

    #[test]
    fn unmapped_stages_become_sentinel() {
        let mut mapping = StageMapping::default();
        mapping
            .mappings
            .insert("Phone Screen".to_string(), CanonicalStage::Screen);
        let normalized = normalize_stages(&[event(Some("phone screen"), Some("Take Home"))], &mapping);
        let only = &normalized.events[0];
        assert_eq!(only.from_stage, Some(NormalizedStage::Canonical(CanonicalStage::Screen)));
        assert_eq!(only.to_stage, Some(NormalizedStage::Unmapped));
        assert_eq!(normalized.unmapped_count, 1);
        assert!(!normalized.completeness.is_complete);
        assert_eq!(normalized.completeness.missing_stages, vec!["Take Home".to_string()]);
    }

    #[test]
    fn canonical_labels_resolve_without_mapping() {
        let normalized = normalize_stages(&[event(Some("SCREEN"), Some("hm_screen"))], &StageMapping::default());
        assert!(normalized.completeness.is_complete);
        assert_eq!(normalized.unmapped_count, 0);
    }

    #[test]
    fn rebuild_keeps_user_edits() {
        let events = vec![event(Some("Phone Screen"), Some("Team Chat"))];
        let mut existing = StageMapping::default();
        existing
            .mappings
            .insert("Phone Screen".to_string(), CanonicalStage::HmScreen);
        let observed = extract_all_stages(&[], &events);
        let rebuilt = StageMapping::rebuild(observed, &existing, &events);
        assert_eq!(rebuilt.resolve("Phone Screen"), Some(CanonicalStage::HmScreen));
        assert!(!rebuilt.is_complete);

        let mut edited = rebuilt;
        edited.set("team chat", CanonicalStage::Onsite, &events);
        assert!(edited.is_complete);
        assert_eq!(edited.resolve("Team Chat"), Some(CanonicalStage::Onsite));
    }
}
