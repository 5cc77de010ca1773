use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Fixed pipeline taxonomy every raw ATS stage label is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalStage {
    Lead,
    Applied,
    Screen,
    HmScreen,
    Onsite,
    Final,
    Offer,
    Hired,
    Rejected,
    Withdrew,
}

impl CanonicalStage {
    pub const ALL: [CanonicalStage; 10] = [
        CanonicalStage::Lead,
        CanonicalStage::Applied,
        CanonicalStage::Screen,
        CanonicalStage::HmScreen,
        CanonicalStage::Onsite,
        CanonicalStage::Final,
        CanonicalStage::Offer,
        CanonicalStage::Hired,
        CanonicalStage::Rejected,
        CanonicalStage::Withdrew,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalStage::Lead => "LEAD",
            CanonicalStage::Applied => "APPLIED",
            CanonicalStage::Screen => "SCREEN",
            CanonicalStage::HmScreen => "HM_SCREEN",
            CanonicalStage::Onsite => "ONSITE",
            CanonicalStage::Final => "FINAL",
            CanonicalStage::Offer => "OFFER",
            CanonicalStage::Hired => "HIRED",
            CanonicalStage::Rejected => "REJECTED",
            CanonicalStage::Withdrew => "WITHDREW",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CanonicalStage::Hired | CanonicalStage::Rejected | CanonicalStage::Withdrew
        )
    }

    /// Next stage on the happy path; `None` for terminal stages.
    pub fn successor(self) -> Option<CanonicalStage> {
        match self {
            CanonicalStage::Lead => Some(CanonicalStage::Applied),
            CanonicalStage::Applied => Some(CanonicalStage::Screen),
            CanonicalStage::Screen => Some(CanonicalStage::HmScreen),
            CanonicalStage::HmScreen => Some(CanonicalStage::Onsite),
            CanonicalStage::Onsite => Some(CanonicalStage::Final),
            CanonicalStage::Final => Some(CanonicalStage::Offer),
            CanonicalStage::Offer => Some(CanonicalStage::Hired),
            CanonicalStage::Hired | CanonicalStage::Rejected | CanonicalStage::Withdrew => None,
        }
    }

    pub fn is_interview(self) -> bool {
        matches!(self, CanonicalStage::Onsite | CanonicalStage::Final)
    }

    /// Stages that end an interview loop with a decision.
    pub fn is_decision(self) -> bool {
        matches!(
            self,
            CanonicalStage::Offer
                | CanonicalStage::Hired
                | CanonicalStage::Rejected
                | CanonicalStage::Withdrew
        )
    }
}

impl fmt::Display for CanonicalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalStage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        CanonicalStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == key)
            .ok_or_else(|| format!("unknown canonical stage '{value}'"))
    }
}

/// A stage after normalization: either canonical or the explicit unmapped sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizedStage {
    Canonical(CanonicalStage),
    Unmapped,
}

impl NormalizedStage {
    pub const UNMAPPED: &'static str = "UNMAPPED";

    pub fn as_str(self) -> &'static str {
        match self {
            NormalizedStage::Canonical(stage) => stage.as_str(),
            NormalizedStage::Unmapped => Self::UNMAPPED,
        }
    }

    pub fn canonical(self) -> Option<CanonicalStage> {
        match self {
            NormalizedStage::Canonical(stage) => Some(stage),
            NormalizedStage::Unmapped => None,
        }
    }
}

impl Serialize for NormalizedStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StageChange,
    InterviewCompleted,
    FeedbackSubmitted,
    OfferExtended,
    OfferAccepted,
    OfferDeclined,
    #[serde(other)]
    Other,
}

impl EventType {
    /// Lenient parse for ATS export vocabularies; unknown values become `Other`.
    pub fn parse_lenient(value: &str) -> EventType {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "stage_change" | "stage_changed" | "moved" | "stage" => EventType::StageChange,
            "interview_completed" | "interview_complete" | "interview" => {
                EventType::InterviewCompleted
            }
            "feedback_submitted" | "feedback" | "scorecard_submitted" => {
                EventType::FeedbackSubmitted
            }
            "offer_extended" | "offer_sent" | "offer_created" => EventType::OfferExtended,
            "offer_accepted" => EventType::OfferAccepted,
            "offer_declined" | "offer_rejected" => EventType::OfferDeclined,
            _ => EventType::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::StageChange => "stage_change",
            EventType::InterviewCompleted => "interview_completed",
            EventType::FeedbackSubmitted => "feedback_submitted",
            EventType::OfferExtended => "offer_extended",
            EventType::OfferAccepted => "offer_accepted",
            EventType::OfferDeclined => "offer_declined",
            EventType::Other => "other",
        }
    }
}

/// Immutable stage-transition or activity fact from the ATS export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub candidate_id: String,
    pub req_id: String,
    pub event_type: EventType,
    pub from_stage: Option<String>,
    pub to_stage: Option<String>,
    pub actor_user_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// True when both stages are present and equal once case and whitespace are ignored.
    pub fn is_self_transition(&self) -> bool {
        match (&self.from_stage, &self.to_stage) {
            (Some(from), Some(to)) => from.trim().eq_ignore_ascii_case(to.trim()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReqStatus {
    Open,
    Closed,
    Canceled,
}

impl FromStr for ReqStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" | "on_hold" | "on hold" => Ok(ReqStatus::Open),
            "closed" | "filled" => Ok(ReqStatus::Closed),
            "canceled" | "cancelled" => Ok(ReqStatus::Canceled),
            other => Err(format!("unknown requisition status '{other}'")),
        }
    }
}

impl ReqStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReqStatus::Open => "Open",
            ReqStatus::Closed => "Closed",
            ReqStatus::Canceled => "Canceled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requisition {
    pub req_id: String,
    pub title: String,
    pub status: ReqStatus,
    pub recruiter_id: String,
    pub hiring_manager_id: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub level: Option<String>,
    pub job_family: Option<String>,
    pub region: Option<String>,
}

impl Requisition {
    pub fn closed_before_opened(&self) -> bool {
        self.closed_at.is_some_and(|closed| closed < self.opened_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    Active,
    Hired,
    Rejected,
    Withdrawn,
}

impl FromStr for Disposition {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" | "in_process" | "in process" => Ok(Disposition::Active),
            "hired" => Ok(Disposition::Hired),
            "rejected" | "declined" => Ok(Disposition::Rejected),
            "withdrawn" | "withdrew" => Ok(Disposition::Withdrawn),
            other => Err(format!("unknown candidate disposition '{other}'")),
        }
    }
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Active => "Active",
            Disposition::Hired => "Hired",
            Disposition::Rejected => "Rejected",
            Disposition::Withdrawn => "Withdrawn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: String,
    pub req_id: String,
    pub source: String,
    pub disposition: Disposition,
    pub current_stage: String,
    pub current_stage_entered_at: DateTime<Utc>,
    pub first_contact_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    Recruiter,
    HiringManager,
    Interviewer,
    Admin,
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "recruiter" | "sourcer" => Ok(UserRole::Recruiter),
            "hiring_manager" | "hm" | "manager" => Ok(UserRole::HiringManager),
            "interviewer" => Ok(UserRole::Interviewer),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("unknown user role '{other}'")),
        }
    }
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Recruiter => "recruiter",
            UserRole::HiringManager => "hiring_manager",
            UserRole::Interviewer => "interviewer",
            UserRole::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub role: UserRole,
}

/// Complete in-memory snapshot the engine computes over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub requisitions: Vec<Requisition>,
    pub candidates: Vec<Candidate>,
    pub events: Vec<Event>,
    pub users: Vec<User>,
}

impl Dataset {
    pub fn user_name(&self, user_id: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|user| user.user_id == user_id)
            .map(|user| user.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_stages_have_no_successor() {
        for stage in CanonicalStage::ALL {
            assert_eq!(stage.is_terminal(), stage.successor().is_none(), "{stage}");
        }
    }

    #[test]
    fn canonical_stage_parses_display_form() {
        assert_eq!("hm screen".parse::<CanonicalStage>(), Ok(CanonicalStage::HmScreen));
        assert_eq!("OFFER".parse::<CanonicalStage>(), Ok(CanonicalStage::Offer));
        assert!("interview".parse::<CanonicalStage>().is_err());
    }

    #[test]
    fn self_transition_ignores_case() {
        let event = Event {
            candidate_id: "c1".to_string(),
            req_id: "r1".to_string(),
            event_type: EventType::StageChange,
            from_stage: Some("Phone Screen".to_string()),
            to_stage: Some(" phone screen".to_string()),
            actor_user_id: None,
            occurred_at: Utc::now(),
        };
        assert!(event.is_self_transition());
    }

    #[test]
    fn event_type_parse_is_lenient() {
        assert_eq!(EventType::parse_lenient("Offer Sent"), EventType::OfferExtended);
        assert_eq!(EventType::parse_lenient("scorecard-submitted"), EventType::FeedbackSubmitted);
        assert_eq!(EventType::parse_lenient("email"), EventType::Other);
    }
}
