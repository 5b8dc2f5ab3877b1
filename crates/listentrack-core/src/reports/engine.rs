//! Period statistics and comparative reports.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{round_to, CalibrationEngine};
use crate::error::StoreError;
use crate::storage::SampleStore;
use crate::time::{day_start, month_start, previous_month_start, week_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Daily,
    Weekly,
    Monthly,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [ReportKind::Daily, ReportKind::Weekly, ReportKind::Monthly];

    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::Daily => "Daily report",
            ReportKind::Weekly => "Weekly report",
            ReportKind::Monthly => "Monthly report",
        }
    }
}

impl std::str::FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(ReportKind::Daily),
            "weekly" => Ok(ReportKind::Weekly),
            "monthly" => Ok(ReportKind::Monthly),
            other => Err(format!("unknown report kind: {other}")),
        }
    }
}

/// Aggregates over a half-open interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    /// One decimal.
    pub avg_count: f64,
    pub max_count: u32,
    pub min_count: u32,
    pub sample_count: u64,
    /// `round(raw average x calibration factor)`.
    pub predicted_streams: u64,
}

/// A UTC-aligned `[start, end)` interval with a human label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

impl Period {
    fn days(first: NaiveDate, end_exclusive: NaiveDate, label: String) -> Self {
        Self {
            start: day_start(first),
            end: day_start(end_exclusive),
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub previous: PeriodStats,
    pub avg_delta: f64,
    /// `None` when the previous average is 0.
    pub avg_delta_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    pub title: String,
    pub period: Period,
    pub previous_period: Period,
    pub stats: PeriodStats,
    /// Omitted when the previous period had no samples.
    pub comparison: Option<Comparison>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReportEngine {
    store: Arc<SampleStore>,
    calibration: CalibrationEngine,
}

impl ReportEngine {
    pub fn new(store: Arc<SampleStore>, calibration: CalibrationEngine) -> Self {
        Self { store, calibration }
    }

    /// `None` when the interval holds no samples.
    pub fn stats_for_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<PeriodStats>, StoreError> {
        Ok(self.period_with_raw_avg(start, end)?.map(|(_, stats)| stats))
    }

    /// Period stats plus the unrounded average they were built from.
    fn period_with_raw_avg(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(f64, PeriodStats)>, StoreError> {
        let Some(agg) = self.store.aggregate(start, end)? else {
            return Ok(None);
        };
        let factor = self.calibration.factor();
        Ok(Some((
            agg.avg,
            PeriodStats {
                avg_count: round_to(agg.avg, 1),
                max_count: agg.max,
                min_count: agg.min,
                sample_count: agg.count,
                predicted_streams: (agg.avg * factor).round().max(0.0) as u64,
            },
        )))
    }

    /// The reported period and the one it is compared with.
    pub fn periods(kind: ReportKind, now: DateTime<Utc>) -> (Period, Period) {
        let today = now.date_naive();
        match kind {
            ReportKind::Daily => {
                let yesterday = today - Duration::days(1);
                let before = yesterday - Duration::days(1);
                (
                    Period::days(yesterday, today, format!("{yesterday} (UTC)")),
                    Period::days(before, yesterday, format!("{before} (UTC)")),
                )
            }
            ReportKind::Weekly => {
                let this_monday = week_start(today);
                let last_monday = this_monday - Duration::days(7);
                let prev_monday = last_monday - Duration::days(7);
                let week_label = |monday: NaiveDate| {
                    format!("{monday} ~ {}", monday + Duration::days(6))
                };
                (
                    Period::days(last_monday, this_monday, week_label(last_monday)),
                    Period::days(prev_monday, last_monday, week_label(prev_monday)),
                )
            }
            ReportKind::Monthly => {
                let this_month = month_start(today);
                let last_month = previous_month_start(today);
                let prev_month = previous_month_start(last_month);
                (
                    Period::days(last_month, this_month, last_month.format("%B %Y").to_string()),
                    Period::days(prev_month, last_month, prev_month.format("%B %Y").to_string()),
                )
            }
        }
    }

    /// Build the report for `kind` as of `now`. `None` when the reported
    /// period has no samples.
    pub fn generate(&self, kind: ReportKind, now: DateTime<Utc>) -> Result<Option<Report>, StoreError> {
        let (period, previous_period) = Self::periods(kind, now);
        let Some((avg, stats)) = self.period_with_raw_avg(period.start, period.end)? else {
            return Ok(None);
        };
        let comparison = self
            .period_with_raw_avg(previous_period.start, previous_period.end)?
            .map(|(previous_avg, previous)| {
                let delta = avg - previous_avg;
                let avg_delta = round_to(delta, 1);
                let avg_delta_pct =
                    (previous_avg != 0.0).then(|| round_to(delta / previous_avg * 100.0, 1));
                Comparison {
                    previous,
                    avg_delta,
                    avg_delta_pct,
                }
            });

        Ok(Some(Report {
            kind,
            title: kind.title().to_string(),
            period,
            previous_period,
            stats,
            comparison,
            generated_at: now,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CalibrationEngine;
    use crate::storage::ListenerSample;
    use chrono::TimeZone;

    fn engine() -> ReportEngine {
        let store = Arc::new(SampleStore::open_in_memory().unwrap());
        let calibration = CalibrationEngine::new(store.clone(), 480.0);
        ReportEngine::new(store, calibration)
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn empty_interval_has_no_stats() {
        let engine = engine();
        assert!(engine
            .stats_for_period(at(2024, 1, 1, 0), at(2024, 1, 2, 0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn stats_round_average_and_predict_from_raw() {
        let engine = engine();
        for count in [10, 10, 11] {
            engine
                .store
                .append(&ListenerSample::new(at(2024, 1, 1, 5), count))
                .unwrap();
        }
        let stats = engine
            .stats_for_period(at(2024, 1, 1, 0), at(2024, 1, 2, 0))
            .unwrap()
            .unwrap();
        assert_eq!(stats.avg_count, 10.3);
        assert_eq!(stats.sample_count, 3);
        // 10.333.. x 480 = 4960
        assert_eq!(stats.predicted_streams, 4960);
    }

    #[test]
    fn weekly_period_is_last_complete_week() {
        // Wednesday 2024-03-13
        let (period, previous) = ReportEngine::periods(ReportKind::Weekly, at(2024, 3, 13, 0));
        assert_eq!(period.start, at(2024, 3, 4, 0));
        assert_eq!(period.end, at(2024, 3, 11, 0));
        assert_eq!(period.label, "2024-03-04 ~ 2024-03-10");
        assert_eq!(previous.start, at(2024, 2, 26, 0));
        assert_eq!(previous.end, period.start);
    }

    #[test]
    fn monthly_period_compares_calendar_months() {
        let (period, previous) = ReportEngine::periods(ReportKind::Monthly, at(2024, 3, 1, 0));
        assert_eq!(period.start, at(2024, 2, 1, 0));
        assert_eq!(period.end, at(2024, 3, 1, 0));
        assert_eq!(period.label, "February 2024");
        assert_eq!(previous.start, at(2024, 1, 1, 0));
        assert_eq!(previous.end, at(2024, 2, 1, 0));
    }

    #[test]
    fn daily_report_with_comparison() {
        let engine = engine();
        engine
            .store
            .append(&ListenerSample::new(at(2024, 1, 1, 10), 100))
            .unwrap();
        engine
            .store
            .append(&ListenerSample::new(at(2024, 1, 2, 10), 120))
            .unwrap();

        let report = engine
            .generate(ReportKind::Daily, at(2024, 1, 3, 0))
            .unwrap()
            .unwrap();
        assert_eq!(report.stats.avg_count, 120.0);
        let cmp = report.comparison.unwrap();
        assert_eq!(cmp.avg_delta, 20.0);
        assert_eq!(cmp.avg_delta_pct, Some(20.0));
    }

    #[test]
    fn report_without_samples_is_none_and_missing_previous_is_omitted() {
        let engine = engine();
        assert!(engine
            .generate(ReportKind::Daily, at(2024, 1, 3, 0))
            .unwrap()
            .is_none());

        engine
            .store
            .append(&ListenerSample::new(at(2024, 1, 2, 10), 120))
            .unwrap();
        let report = engine
            .generate(ReportKind::Daily, at(2024, 1, 3, 0))
            .unwrap()
            .unwrap();
        assert!(report.comparison.is_none());
    }

    #[test]
    fn comparison_uses_unrounded_averages() {
        let engine = engine();
        // Previous day averages 10.0417, shown as 10.0.
        for i in 0..24 {
            let count = if i == 0 { 11 } else { 10 };
            engine
                .store
                .append(&ListenerSample::new(at(2024, 1, 1, i), count))
                .unwrap();
        }
        for count in [10, 11] {
            engine
                .store
                .append(&ListenerSample::new(at(2024, 1, 2, 10), count))
                .unwrap();
        }

        let report = engine
            .generate(ReportKind::Daily, at(2024, 1, 3, 0))
            .unwrap()
            .unwrap();
        let cmp = report.comparison.unwrap();
        assert_eq!(cmp.previous.avg_count, 10.0);
        assert_eq!(cmp.avg_delta, 0.5);
        // 0.4583 / 10.0417, not 0.5 / 10.0
        assert_eq!(cmp.avg_delta_pct, Some(4.6));
    }
}
