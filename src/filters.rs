use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Requisition;

/// Longest trailing window accepted, roughly a century.
pub const MAX_WINDOW_DAYS: i64 = 36_525;

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Swaps the bounds when given in reverse order.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// The `days`-long window ending on `as_of` (inclusive), clamped to `1..=MAX_WINDOW_DAYS`.
    pub fn trailing(as_of: DateTime<Utc>, days: i64) -> Self {
        let end = as_of.date_naive();
        let span = Duration::days(days.clamp(1, MAX_WINDOW_DAYS) - 1);
        Self::new(end.checked_sub_signed(span).unwrap_or(NaiveDate::MIN), end)
    }

    pub fn length_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The immediately preceding window of identical length, saturating at the earliest date.
    pub fn prior_period(&self) -> Self {
        let length = self.length_days();
        Self {
            start: self
                .start
                .checked_sub_signed(Duration::days(length))
                .unwrap_or(NaiveDate::MIN),
            end: self.start.pred_opt().unwrap_or(NaiveDate::MIN),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        day >= self.start && day <= self.end
    }
}

/// Scope for a metrics run. Empty sets mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub recruiter_ids: BTreeSet<String>,
    #[serde(default)]
    pub functions: BTreeSet<String>,
    #[serde(default)]
    pub regions: BTreeSet<String>,
}

impl Filters {
    pub fn includes_requisition(&self, req: &Requisition) -> bool {
        (self.recruiter_ids.is_empty() || self.recruiter_ids.contains(&req.recruiter_id))
            && matches_optional(&self.functions, req.job_family.as_deref())
            && matches_optional(&self.regions, req.region.as_deref())
    }

    pub fn includes_time(&self, at: DateTime<Utc>) -> bool {
        self.date_range.is_none_or(|range| range.contains(at))
    }

    pub fn with_range(&self, range: Option<DateRange>) -> Self {
        Self {
            date_range: range,
            ..self.clone()
        }
    }

    pub fn for_recruiter(&self, recruiter_id: &str) -> Self {
        Self {
            recruiter_ids: BTreeSet::from([recruiter_id.to_string()]),
            ..self.clone()
        }
    }
}

fn matches_optional(allowed: &BTreeSet<String>, value: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    value.is_some_and(|value| {
        allowed
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(value.trim()))
    })
}
