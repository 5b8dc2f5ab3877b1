//! Once-a-day report trigger.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use serde::Serialize;

use super::engine::ReportKind;
use crate::storage::ReportsConfig;

/// Decides which reports fire. Evaluates at most once per UTC day, and
/// only during the 00:00 UTC hour.
#[derive(Debug, Clone, Serialize)]
pub struct ReportScheduler {
    daily: bool,
    weekly: bool,
    monthly: bool,
    last_checked_day: Option<NaiveDate>,
}

impl ReportScheduler {
    pub fn new(config: &ReportsConfig) -> Self {
        Self {
            daily: config.daily,
            weekly: config.weekly,
            monthly: config.monthly,
            last_checked_day: None,
        }
    }

    pub fn last_checked_day(&self) -> Option<NaiveDate> {
        self.last_checked_day
    }

    pub fn any_enabled(&self) -> bool {
        self.daily || self.weekly || self.monthly
    }

    /// Kinds due at `now`. Records the day on the first evaluation inside
    /// the 00:00 hour; later calls that day return nothing.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<ReportKind> {
        let today = now.date_naive();
        if now.hour() != 0 || self.last_checked_day == Some(today) {
            return Vec::new();
        }
        self.last_checked_day = Some(today);

        let mut kinds = Vec::new();
        if self.daily {
            kinds.push(ReportKind::Daily);
        }
        if self.weekly && today.weekday() == Weekday::Mon {
            kinds.push(ReportKind::Weekly);
        }
        if self.monthly && today.day() == 1 {
            kinds.push(ReportKind::Monthly);
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn all_enabled() -> ReportScheduler {
        ReportScheduler::new(&ReportsConfig {
            daily: true,
            weekly: true,
            monthly: true,
            ..ReportsConfig::default()
        })
    }

    #[test]
    fn every_five_minutes_for_a_day_fires_each_kind_once() {
        // Monday 2024-04-01: daily, weekly and monthly are all due.
        let mut scheduler = all_enabled();
        let start = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let mut fired = Vec::new();
        for i in 0..288 {
            fired.extend(scheduler.due(start + Duration::minutes(5 * i)));
        }
        assert_eq!(
            fired,
            vec![ReportKind::Daily, ReportKind::Weekly, ReportKind::Monthly]
        );
    }

    #[test]
    fn outside_midnight_hour_nothing_fires_and_day_is_not_consumed() {
        let mut scheduler = all_enabled();
        let noon = Utc.with_ymd_and_hms(2024, 4, 2, 12, 0, 0).unwrap();
        assert!(scheduler.due(noon).is_empty());
        assert_eq!(scheduler.last_checked_day(), None);
    }

    #[test]
    fn weekly_only_on_monday_monthly_only_on_first() {
        let mut scheduler = all_enabled();
        // Tuesday 2024-04-02
        let tuesday = Utc.with_ymd_and_hms(2024, 4, 2, 0, 10, 0).unwrap();
        assert_eq!(scheduler.due(tuesday), vec![ReportKind::Daily]);
    }

    #[test]
    fn disabled_kinds_never_fire() {
        let mut scheduler = ReportScheduler::new(&ReportsConfig::default());
        let monday_first = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert!(scheduler.due(monday_first).is_empty());
        assert!(!scheduler.any_enabled());
    }
}
