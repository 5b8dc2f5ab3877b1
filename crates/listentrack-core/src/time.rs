//! UTC calendar helpers shared by the store, engines and reports.
//!
//! Every day/week/month boundary in listentrack is UTC aligned.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};

/// Storage format for sample timestamps. Fixed width, so lexical order
/// in SQLite matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Midnight UTC at the start of `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Half-open `[00:00, next 00:00)` bounds of `date`.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day_start(date);
    (start, start + Duration::days(1))
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month before the one containing `date`.
pub fn previous_month_start(date: NaiveDate) -> NaiveDate {
    let first = month_start(date);
    first.checked_sub_months(Months::new(1)).unwrap_or(first)
}

/// First day of the year containing `date`.
pub fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_format_is_fixed_width_utc() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(format_timestamp(&at), "2024-03-05T07:08:09.000Z");
        assert_eq!(parse_timestamp("2024-03-05T07:08:09.000Z").unwrap(), at);
    }

    #[test]
    fn week_start_is_monday() {
        // 2024-03-07 is a Thursday
        let thursday = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(week_start(thursday), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn previous_month_wraps_year() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            previous_month_start(jan),
            NaiveDate::from_ymd_opt(2023, 12, 1).unwrap()
        );
    }
}
