//! Time utilities for Crossrate.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// A timestamp with timezone (always UTC for Crossrate).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Get the current day in UTC.
///
/// Rates carry day granularity; this is the only clock read the engine
/// needs outside of cache expiry.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// The calendar month a date falls in, as a (year, month) pair.
pub fn month_of(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_today_matches_now() {
        assert_eq!(today(), now().date_naive());
    }

    #[test]
    fn test_month_of() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        assert_eq!(month_of(date), (2024, 6));
    }
}
