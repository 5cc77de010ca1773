use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Candidate, Disposition, Requisition};
use crate::stats::days_between;

/// Earliest hire per requisition, taken from Hired candidates' stage-entry time.
pub fn fill_dates(candidates: &[Candidate]) -> HashMap<&str, DateTime<Utc>> {
    let mut fills: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for candidate in candidates
        .iter()
        .filter(|c| c.disposition == Disposition::Hired)
    {
        fills
            .entry(candidate.req_id.as_str())
            .and_modify(|at| *at = (*at).min(candidate.current_stage_entered_at))
            .or_insert(candidate.current_stage_entered_at);
    }
    fills
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtfSample {
    pub req_id: String,
    pub filled_at: DateTime<Utc>,
    pub days: f64,
}

/// Time-to-fill for one requisition, or `None` when it is unfilled or its
/// dates are inconsistent (closed before opened, hire before open).
pub fn time_to_fill(req: &Requisition, fills: &HashMap<&str, DateTime<Utc>>) -> Option<TtfSample> {
    let filled_at = *fills.get(req.req_id.as_str())?;
    if req.closed_before_opened() || filled_at < req.opened_at {
        return None;
    }
    Some(TtfSample {
        req_id: req.req_id.clone(),
        filled_at,
        days: days_between(req.opened_at, filled_at),
    })
}

/// Filled requisitions whose dates cannot produce a valid time-to-fill.
pub fn invalid_fill_count(requisitions: &[Requisition], fills: &HashMap<&str, DateTime<Utc>>) -> usize {
    requisitions
        .iter()
        .filter(|req| fills.contains_key(req.req_id.as_str()) && time_to_fill(req, fills).is_none())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReqStatus;
    use chrono::Duration;

    fn req(id: &str, opened_at: DateTime<Utc>, closed_at: Option<DateTime<Utc>>) -> Requisition {
        Requisition {
            req_id: id.to_string(),
            title: "Analyst".to_string(),
            status: ReqStatus::Closed,
            recruiter_id: "rec".to_string(),
            hiring_manager_id: "hm".to_string(),
            opened_at,
            closed_at,
            level: None,
            job_family: None,
            region: None,
        }
    }

    fn hire(req_id: &str, at: DateTime<Utc>) -> Candidate {
        Candidate {
            candidate_id: format!("{req_id}-{}", at.timestamp()),
            req_id: req_id.to_string(),
            source: "LinkedIn".to_string(),
            disposition: Disposition::Hired,
            current_stage: "Hired".to_string(),
            current_stage_entered_at: at,
            first_contact_at: None,
        }
    }

    #[test]
    fn earliest_hire_fills_requisition() {
        let opened = Utc::now() - Duration::days(60);
        let candidates = vec![hire("R1", opened + Duration::days(40)), hire("R1", opened + Duration::days(30))];
        let fills = fill_dates(&candidates);
        let sample = time_to_fill(&req("R1", opened, None), &fills).unwrap();
        assert!((sample.days - 30.0).abs() < 1e-9);
    }

    #[test]
    fn inconsistent_dates_are_skipped() {
        let opened = Utc::now() - Duration::days(60);
        let candidates = [hire("R1", opened + Duration::days(5))];
        let fills = fill_dates(&candidates);
        let broken = req("R1", opened, Some(opened - Duration::days(1)));
        assert!(time_to_fill(&broken, &fills).is_none());
        assert_eq!(invalid_fill_count(&[broken], &fills), 1);
    }
}
