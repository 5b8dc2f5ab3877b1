//! Same-day stream prediction and short-term trend.
//!
//! Today's partial-day average is compared with the same hours of recent
//! history; that ratio scales the historical daily stream estimate.

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

use super::calibration::CalibrationEngine;
use super::round_to;
use crate::error::StoreError;
use crate::storage::{AnalysisConfig, SampleStore};
use crate::time::day_start;

/// Why no prediction could be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    /// The first UTC hour has no completed hour to compare.
    EarlyHour,
    NoHistory,
    NoDataToday,
    NoHistoricalSameHours,
    NoHistoricalDaily,
}

impl Unavailable {
    pub fn message(&self) -> &'static str {
        match self {
            Unavailable::EarlyHour => "not enough data this early in the day",
            Unavailable::NoHistory => "no historical day with data",
            Unavailable::NoDataToday => "no samples yet today",
            Unavailable::NoHistoricalSameHours => "no historical data for the same hours",
            Unavailable::NoHistoricalDaily => "cannot compute historical daily streams",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

/// Change of the trailing window against the window before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub hours: u32,
    pub recent_avg: Option<f64>,
    pub previous_avg: Option<f64>,
    /// Percent change, one decimal. 0 when either window is empty.
    pub percent: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub current_hour: u32,
    pub today_avg: f64,
    pub today_samples: u64,
    pub historical_same_hours_avg: f64,
    pub historical_days: u64,
    pub coefficient: f64,
    pub calibration_factor: f64,
    pub historical_daily_streams: u64,
    pub predicted_streams: u64,
    pub trend_percent: f64,
    pub trend: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Unavailable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(flatten)]
    pub estimate: Option<Estimate>,
}

impl Prediction {
    fn unavailable(reason: Unavailable) -> Self {
        Self {
            available: false,
            reason: Some(reason),
            message: Some(reason.message()),
            estimate: None,
        }
    }

    fn available(estimate: Estimate) -> Self {
        Self {
            available: true,
            reason: None,
            message: None,
            estimate: Some(estimate),
        }
    }
}

#[derive(Clone)]
pub struct PredictionEngine {
    store: Arc<SampleStore>,
    calibration: CalibrationEngine,
    max_history_days: u32,
    trend_threshold_pct: f64,
}

impl PredictionEngine {
    pub fn new(store: Arc<SampleStore>, calibration: CalibrationEngine, config: &AnalysisConfig) -> Self {
        Self {
            store,
            calibration,
            max_history_days: config.max_history_days.max(1),
            trend_threshold_pct: config.trend_threshold_pct,
        }
    }

    /// Predict today's total streams from the hours completed so far.
    pub fn predict_today(&self, now: DateTime<Utc>) -> Result<Prediction, StoreError> {
        let hour = now.hour();
        if hour == 0 {
            return Ok(Prediction::unavailable(Unavailable::EarlyHour));
        }

        let today = now.date_naive();
        let today_start = day_start(today);

        let historical_days = self.store.distinct_days_before(today)?;
        if historical_days < 1 {
            return Ok(Prediction::unavailable(Unavailable::NoHistory));
        }

        let today_so_far = self
            .store
            .aggregate(today_start, today_start + Duration::hours(i64::from(hour)))?;
        let Some(today_so_far) = today_so_far else {
            return Ok(Prediction::unavailable(Unavailable::NoDataToday));
        };

        let days_to_use = historical_days.min(u64::from(self.max_history_days));
        let history_start = today_start - Duration::days(days_to_use as i64);

        // Pool the per-hour groups below the current hour.
        let (weighted, samples) = self
            .store
            .group_by_hour_of_day(history_start, today_start)?
            .range(..hour as u8)
            .fold((0.0, 0u64), |(sum, n), (_, agg)| {
                (sum + agg.avg * agg.count as f64, n + agg.count)
            });
        let same_hours_avg = (samples > 0).then(|| weighted / samples as f64);
        let Some(same_hours_avg) = same_hours_avg.filter(|avg| *avg > 0.0) else {
            return Ok(Prediction::unavailable(Unavailable::NoHistoricalSameHours));
        };

        let daily = self.store.daily_aggregates(history_start, today_start)?;
        if daily.is_empty() {
            return Ok(Prediction::unavailable(Unavailable::NoHistoricalDaily));
        }
        let daily_avg =
            daily.iter().map(|d| d.aggregate.avg).sum::<f64>() / daily.len() as f64;

        let factor = self.calibration.factor();
        let coefficient = today_so_far.avg / same_hours_avg;
        let historical_daily_streams = daily_avg * factor;
        let predicted_streams = (historical_daily_streams * coefficient).round();
        let trend = self.trend(now, 1)?;

        Ok(Prediction::available(Estimate {
            current_hour: hour,
            today_avg: round_to(today_so_far.avg, 1),
            today_samples: today_so_far.count,
            historical_same_hours_avg: round_to(same_hours_avg, 1),
            historical_days: days_to_use,
            coefficient: round_to(coefficient, 3),
            calibration_factor: round_to(factor, 2),
            historical_daily_streams: historical_daily_streams.round().max(0.0) as u64,
            predicted_streams: predicted_streams.max(0.0) as u64,
            trend_percent: trend.percent,
            trend: trend.direction,
        }))
    }

    /// Trailing `hours` window against the `hours` before it.
    pub fn trend(&self, now: DateTime<Utc>, hours: u32) -> Result<Trend, StoreError> {
        let hours = hours.max(1);
        let span = Duration::hours(i64::from(hours));
        let recent = self.store.aggregate(now - span, now)?.map(|a| a.avg);
        let previous = self.store.aggregate(now - span - span, now - span)?.map(|a| a.avg);

        let change = match (recent, previous) {
            (Some(r), Some(p)) if p > 0.0 => (r - p) / p * 100.0,
            _ => 0.0,
        };
        let percent = round_to(change, 1);
        let direction = if change > self.trend_threshold_pct {
            TrendDirection::Up
        } else if change < -self.trend_threshold_pct {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        };

        Ok(Trend {
            hours,
            recent_avg: recent.map(|v| round_to(v, 1)),
            previous_avg: previous.map(|v| round_to(v, 1)),
            percent,
            direction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::calibration::DEFAULT_FACTOR;
    use crate::storage::ListenerSample;
    use chrono::{NaiveDate, TimeZone};

    fn engine() -> PredictionEngine {
        let store = Arc::new(SampleStore::open_in_memory().unwrap());
        let calibration = CalibrationEngine::new(store.clone(), DEFAULT_FACTOR);
        PredictionEngine::new(store, calibration, &AnalysisConfig::default())
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    fn add(engine: &PredictionEngine, t: DateTime<Utc>, count: u32) {
        engine.store.append(&ListenerSample::new(t, count)).unwrap();
    }

    #[test]
    fn unavailable_in_first_hour() {
        let engine = engine();
        add(&engine, at(1, 10, 0), 50);
        let p = engine.predict_today(at(2, 0, 30)).unwrap();
        assert!(!p.available);
        assert_eq!(p.reason, Some(Unavailable::EarlyHour));
    }

    #[test]
    fn unavailable_without_history() {
        let engine = engine();
        add(&engine, at(2, 1, 0), 50);
        let p = engine.predict_today(at(2, 5, 0)).unwrap();
        assert_eq!(p.reason, Some(Unavailable::NoHistory));
    }

    #[test]
    fn unavailable_without_samples_today() {
        let engine = engine();
        add(&engine, at(1, 1, 0), 50);
        // Today's only sample is in the current, incomplete hour.
        add(&engine, at(2, 5, 10), 50);
        let p = engine.predict_today(at(2, 5, 30)).unwrap();
        assert_eq!(p.reason, Some(Unavailable::NoDataToday));
    }

    #[test]
    fn unavailable_without_same_hours_history() {
        let engine = engine();
        add(&engine, at(1, 20, 0), 50);
        add(&engine, at(2, 1, 0), 50);
        let p = engine.predict_today(at(2, 3, 0)).unwrap();
        assert_eq!(p.reason, Some(Unavailable::NoHistoricalSameHours));
    }

    #[test]
    fn end_to_end_example() {
        let engine = engine();
        for h in 0..24 {
            add(&engine, at(1, h, 0), 100);
        }
        engine
            .store
            .upsert_actual(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 48000)
            .unwrap();
        for h in 0..3 {
            add(&engine, at(2, h, 0), 120);
        }

        let p = engine.predict_today(at(2, 3, 30)).unwrap();
        assert!(p.available);
        let e = p.estimate.unwrap();
        assert_eq!(e.current_hour, 3);
        assert_eq!(e.today_avg, 120.0);
        assert_eq!(e.today_samples, 3);
        assert_eq!(e.historical_same_hours_avg, 100.0);
        assert_eq!(e.historical_days, 1);
        assert_eq!(e.coefficient, 1.2);
        assert_eq!(e.calibration_factor, 480.0);
        assert_eq!(e.historical_daily_streams, 48000);
        assert_eq!(e.predicted_streams, 57600);
    }

    #[test]
    fn history_is_capped_to_max_days() {
        let engine = engine();
        // Ten days of 10s, then the latest seven days of 100s.
        for d in 1..=10 {
            add(&engine, at(d, 1, 0), if d <= 3 { 10 } else { 100 });
        }
        add(&engine, at(11, 1, 0), 100);
        let e = engine.predict_today(at(11, 2, 0)).unwrap().estimate.unwrap();
        assert_eq!(e.historical_days, 7);
        assert_eq!(e.historical_same_hours_avg, 100.0);
        assert_eq!(e.coefficient, 1.0);
    }

    #[test]
    fn trend_classification() {
        let engine = engine();
        let now = at(1, 12, 0);
        add(&engine, now - Duration::minutes(90), 100);
        add(&engine, now - Duration::minutes(30), 110);
        let trend = engine.trend(now, 1).unwrap();
        assert_eq!(trend.percent, 10.0);
        assert_eq!(trend.direction, TrendDirection::Up);

        add(&engine, now - Duration::minutes(20), 94);
        // recent avg 102 -> +2 %
        let trend = engine.trend(now, 1).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn trend_with_empty_window_is_stable_zero() {
        let engine = engine();
        let now = at(1, 12, 0);
        add(&engine, now - Duration::minutes(30), 110);
        let trend = engine.trend(now, 1).unwrap();
        assert_eq!(trend.percent, 0.0);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.previous_avg, None);
    }

    #[test]
    fn trend_classifies_before_rounding() {
        let engine = engine();
        let now = at(1, 12, 0);
        add(&engine, now - Duration::minutes(90), 10_000);
        // +5.04 % shows as 5.0 but is above the threshold.
        add(&engine, now - Duration::minutes(30), 10_504);
        let trend = engine.trend(now, 1).unwrap();
        assert_eq!(trend.percent, 5.0);
        assert_eq!(trend.direction, TrendDirection::Up);
    }
}
