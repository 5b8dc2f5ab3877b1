//! Hour-of-day profile over a named range.

use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::round_to;
use crate::storage::Aggregate;
use crate::time::{day_start, month_start, previous_month_start, week_start, year_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveRange {
    Today,
    Yesterday,
    #[serde(rename = "last7days")]
    Last7Days,
    ThisWeek,
    LastWeek,
    #[serde(rename = "last28days")]
    Last28Days,
    ThisMonth,
    LastMonth,
    LastYear,
    ThisYear,
    All,
}

impl CurveRange {
    pub const NAMES: [&'static str; 11] = [
        "today",
        "yesterday",
        "last7days",
        "this_week",
        "last_week",
        "last28days",
        "this_month",
        "last_month",
        "last_year",
        "this_year",
        "all",
    ];

    /// `[start, end)` for this range as of `now`. `None` means unbounded.
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let today = now.date_naive();
        let today_start = day_start(today);
        let tomorrow = today_start + Duration::days(1);
        let days_back = |n: i64| (today_start - Duration::days(n), today_start);
        Some(match self {
            CurveRange::Today => (today_start, tomorrow),
            CurveRange::Yesterday => days_back(1),
            CurveRange::Last7Days => days_back(7),
            CurveRange::ThisWeek => (day_start(week_start(today)), tomorrow),
            CurveRange::LastWeek => {
                let monday = day_start(week_start(today));
                (monday - Duration::days(7), monday)
            }
            CurveRange::Last28Days => days_back(28),
            CurveRange::ThisMonth => (day_start(month_start(today)), tomorrow),
            CurveRange::LastMonth => (
                day_start(previous_month_start(today)),
                day_start(month_start(today)),
            ),
            CurveRange::LastYear => days_back(365),
            CurveRange::ThisYear => (day_start(year_start(today)), tomorrow),
            CurveRange::All => return None,
        })
    }

    /// Ranges that contain the current, incomplete hour.
    pub fn includes_today(&self) -> bool {
        matches!(
            self,
            CurveRange::Today
                | CurveRange::ThisWeek
                | CurveRange::ThisMonth
                | CurveRange::ThisYear
                | CurveRange::All
        )
    }
}

impl FromStr for CurveRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "today" => CurveRange::Today,
            "yesterday" => CurveRange::Yesterday,
            "last7days" => CurveRange::Last7Days,
            "this_week" => CurveRange::ThisWeek,
            "last_week" => CurveRange::LastWeek,
            "last28days" => CurveRange::Last28Days,
            "this_month" => CurveRange::ThisMonth,
            "last_month" => CurveRange::LastMonth,
            "last_year" => CurveRange::LastYear,
            "this_year" => CurveRange::ThisYear,
            "all" => CurveRange::All,
            other => {
                return Err(format!(
                    "unknown range '{other}', expected one of: {}",
                    Self::NAMES.join(", ")
                ))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurvePoint {
    pub hour: u8,
    /// One decimal. `None` for hours without data and for the masked hour.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curve {
    pub range: CurveRange,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub points: Vec<CurvePoint>,
    pub average: Option<f64>,
}

/// Lay per-hour aggregates out on 24 slots, masking the in-progress hour
/// when the range includes today.
pub(crate) fn build_curve(
    range: CurveRange,
    now: DateTime<Utc>,
    by_hour: &std::collections::BTreeMap<u8, Aggregate>,
    overall: Option<Aggregate>,
) -> Curve {
    let masked = range.includes_today().then(|| now.hour() as u8);
    let points = (0u8..24)
        .map(|hour| CurvePoint {
            hour,
            value: if masked == Some(hour) {
                None
            } else {
                by_hour.get(&hour).map(|agg| round_to(agg.avg, 1))
            },
        })
        .collect();
    let bounds = range.bounds(now);
    Curve {
        range,
        start: bounds.map(|(s, _)| s),
        end: bounds.map(|(_, e)| e),
        points,
        average: overall.map(|agg| round_to(agg.avg, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn parses_every_name() {
        for name in CurveRange::NAMES {
            assert!(name.parse::<CurveRange>().is_ok(), "{name}");
        }
        assert!("fortnight".parse::<CurveRange>().is_err());
    }

    #[test]
    fn range_bounds() {
        // Wednesday
        let now = at(2024, 3, 13, 15);
        assert_eq!(
            CurveRange::Yesterday.bounds(now),
            Some((at(2024, 3, 12, 0), at(2024, 3, 13, 0)))
        );
        assert_eq!(
            CurveRange::ThisWeek.bounds(now),
            Some((at(2024, 3, 11, 0), at(2024, 3, 14, 0)))
        );
        assert_eq!(
            CurveRange::LastWeek.bounds(now),
            Some((at(2024, 3, 4, 0), at(2024, 3, 11, 0)))
        );
        assert_eq!(
            CurveRange::LastMonth.bounds(now),
            Some((at(2024, 2, 1, 0), at(2024, 3, 1, 0)))
        );
        assert_eq!(CurveRange::All.bounds(now), None);
    }

    #[test]
    fn current_hour_is_masked_only_for_ranges_with_today() {
        let now = at(2024, 3, 13, 15);
        let mut by_hour = BTreeMap::new();
        for hour in [14u8, 15] {
            by_hour.insert(
                hour,
                Aggregate {
                    avg: 10.04,
                    max: 11,
                    min: 9,
                    count: 3,
                },
            );
        }

        let today = build_curve(CurveRange::Today, now, &by_hour, None);
        assert_eq!(today.points.len(), 24);
        assert_eq!(today.points[14].value, Some(10.0));
        assert_eq!(today.points[15].value, None);
        assert_eq!(today.points[0].value, None);

        let yesterday = build_curve(CurveRange::Yesterday, now, &by_hour, None);
        assert_eq!(yesterday.points[15].value, Some(10.0));
    }
}
