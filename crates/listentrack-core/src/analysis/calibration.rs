//! Calibration factor: streams per average listener.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use super::round_to;
use crate::error::StoreError;
use crate::storage::SampleStore;
use crate::time::day_bounds;

/// Factor used when no day has both ground truth and samples.
pub const DEFAULT_FACTOR: f64 = 480.0;

/// One ground-truth day and what it implies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationPoint {
    pub date: NaiveDate,
    pub streams: u64,
    /// Average listener count that day, if it had samples.
    pub avg_listeners: Option<f64>,
    /// `streams / avg_listeners`, when the average is non-zero.
    pub factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationSummary {
    /// `None` when there is no ground truth at all.
    pub factor: Option<f64>,
    pub records: usize,
    pub valid_days: usize,
    pub message: String,
    pub points: Vec<CalibrationPoint>,
}

#[derive(Clone)]
pub struct CalibrationEngine {
    store: Arc<SampleStore>,
    default_factor: f64,
}

impl CalibrationEngine {
    pub fn new(store: Arc<SampleStore>, default_factor: f64) -> Self {
        Self {
            store,
            default_factor,
        }
    }

    pub fn default_factor(&self) -> f64 {
        self.default_factor
    }

    /// Per-day factors for every ground-truth record, newest first.
    pub fn points(&self) -> Result<Vec<CalibrationPoint>, StoreError> {
        self.store
            .list_actuals()?
            .into_iter()
            .map(|record| {
                let (start, end) = day_bounds(record.date);
                let avg_listeners = self.store.aggregate(start, end)?.map(|a| a.avg);
                let factor = avg_listeners
                    .filter(|avg| *avg > 0.0)
                    .map(|avg| record.streams as f64 / avg);
                Ok(CalibrationPoint {
                    date: record.date,
                    streams: record.streams,
                    avg_listeners,
                    factor,
                })
            })
            .collect()
    }

    /// Unweighted mean of the per-day factors, or the default when no day
    /// qualifies. Always defined: store errors fall back to the default.
    pub fn factor(&self) -> f64 {
        match self.points() {
            Ok(points) => mean_factor(&points).unwrap_or(self.default_factor),
            Err(e) => {
                warn!(error = %e, "calibration query failed, using default factor");
                self.default_factor
            }
        }
    }

    pub fn summary(&self) -> Result<CalibrationSummary, StoreError> {
        let points = self.points()?;
        let valid_days = points.iter().filter(|p| p.factor.is_some()).count();
        let records = points.len();

        let (factor, message) = if records == 0 {
            (None, "no ground-truth records yet".to_string())
        } else {
            let factor = mean_factor(&points).unwrap_or(self.default_factor);
            let message = if valid_days == 0 {
                format!("{records} record(s) but no sampled days; using default factor")
            } else {
                format!("based on {valid_days} day(s) of data")
            };
            (Some(round_to(factor, 2)), message)
        };

        Ok(CalibrationSummary {
            factor,
            records,
            valid_days,
            message,
            points,
        })
    }
}

fn mean_factor(points: &[CalibrationPoint]) -> Option<f64> {
    let factors: Vec<f64> = points.iter().filter_map(|p| p.factor).collect();
    if factors.is_empty() {
        None
    } else {
        Some(factors.iter().sum::<f64>() / factors.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ListenerSample;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn engine_with(samples: &[(u32, u32)]) -> CalibrationEngine {
        let store = Arc::new(SampleStore::open_in_memory().unwrap());
        for (d, count) in samples {
            let at = Utc.with_ymd_and_hms(2024, 1, *d, 12, 0, 0).unwrap();
            store.append(&ListenerSample::new(at, *count)).unwrap();
        }
        CalibrationEngine::new(store, DEFAULT_FACTOR)
    }

    #[test]
    fn default_without_ground_truth() {
        let engine = engine_with(&[(1, 10)]);
        assert_eq!(engine.factor(), 480.0);
        let summary = engine.summary().unwrap();
        assert_eq!(summary.factor, None);
        assert_eq!(summary.records, 0);
    }

    #[test]
    fn unweighted_mean_of_daily_factors() {
        let engine = engine_with(&[(1, 10), (2, 20)]);
        engine.store.upsert_actual(day(1), 4800).unwrap();
        engine.store.upsert_actual(day(2), 4800).unwrap();
        // 480 and 240
        assert_eq!(engine.factor(), 360.0);
        let summary = engine.summary().unwrap();
        assert_eq!(summary.factor, Some(360.0));
        assert_eq!(summary.valid_days, 2);
    }

    #[test]
    fn days_without_samples_are_excluded() {
        let engine = engine_with(&[(1, 10)]);
        engine.store.upsert_actual(day(1), 4800).unwrap();
        engine.store.upsert_actual(day(5), 999_999).unwrap();
        assert_eq!(engine.factor(), 480.0);
        assert_eq!(engine.summary().unwrap().valid_days, 1);
    }

    #[test]
    fn zero_average_day_is_excluded_but_zero_streams_count() {
        let engine = engine_with(&[(1, 0), (2, 10)]);
        engine.store.upsert_actual(day(1), 100).unwrap();
        engine.store.upsert_actual(day(2), 0).unwrap();
        assert_eq!(engine.factor(), 0.0);
    }

    #[test]
    fn only_unsampled_records_fall_back_to_default() {
        let engine = engine_with(&[]);
        engine.store.upsert_actual(day(3), 1000).unwrap();
        let summary = engine.summary().unwrap();
        assert_eq!(summary.factor, Some(480.0));
        assert_eq!(summary.valid_days, 0);
    }
}
