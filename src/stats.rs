use chrono::{DateTime, Utc};

pub const SECONDS_PER_HOUR: f64 = 3600.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// `numerator / denominator`, or `None` when there is nothing to divide by.
pub fn rate(numerator: usize, denominator: usize) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / SECONDS_PER_HOUR
}

pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / SECONDS_PER_DAY
}

/// Whole days elapsed, never negative.
pub fn whole_days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn rate_is_none_without_denominator() {
        assert_eq!(rate(0, 0), None);
        assert_eq!(rate(0, 4), Some(0.0));
    }

    #[test]
    fn elapsed_days_clamp_at_zero() {
        let now = Utc::now();
        assert_eq!(whole_days_between(now, now - Duration::days(3)), 0);
        assert_eq!(whole_days_between(now - Duration::days(3), now), 3);
        assert!((hours_between(now, now + Duration::minutes(90)) - 1.5).abs() < 1e-9);
    }
}
