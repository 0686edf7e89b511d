//! ISO-week helpers
//!
//! All week bucketing is Monday-anchored and done in UTC, matching the
//! reference deployment. A week is identified by the date of its Monday.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Monday of the ISO week containing `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Monday of the ISO week containing `ts`, bucketed in UTC.
pub fn week_of(ts: DateTime<Utc>) -> NaiveDate {
    week_start_of(ts.date_naive())
}

/// Last day of the week starting at `week_start` (Sunday).
pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(6)
}

/// Monday of the most recent *completed* ISO week in UTC.
pub fn most_recent_completed_week(now: DateTime<Utc>) -> NaiveDate {
    week_start_of(now.date_naive()) - Duration::days(7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_week_start_is_monday() {
        // 2025-11-10 is a Monday
        let monday = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        assert_eq!(week_start_of(monday), monday);

        // Any later day in that week maps back to the same Monday
        let thursday = NaiveDate::from_ymd_opt(2025, 11, 13).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2025, 11, 16).unwrap();
        assert_eq!(week_start_of(thursday), monday);
        assert_eq!(week_start_of(sunday), monday);
    }

    #[test]
    fn test_week_end() {
        let monday = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        assert_eq!(week_end(monday), NaiveDate::from_ymd_opt(2025, 11, 16).unwrap());
    }

    #[test]
    fn test_most_recent_completed_week() {
        // Wednesday 2025-11-12 -> previous Monday 2025-11-03
        let now = Utc.with_ymd_and_hms(2025, 11, 12, 9, 0, 0).unwrap();
        assert_eq!(
            most_recent_completed_week(now),
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
        );

        // Monday itself still points at last week's Monday
        let monday = Utc.with_ymd_and_hms(2025, 11, 10, 0, 0, 0).unwrap();
        assert_eq!(
            most_recent_completed_week(monday),
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
        );
    }
}
