//! Read/maintenance surface over the store, the analysis engines and the
//! report pipeline. The CLI talks to this; the daemon shares it for the
//! report check.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use tracing::info;

use super::curve::{build_curve, Curve, CurveRange};
use super::views::{
    DailyPage, DailyRow, HourRow, ImportSummary, NotificationStatus, Overview, PeakSample, Status,
};
use crate::analysis::{
    round_to, CalibrationEngine, CalibrationSummary, Prediction, PredictionEngine, Trend,
};
use crate::error::{Result, ValidationError};
use crate::notify::templates::{alert_html, AlertContext};
use crate::notify::NotificationCenter;
use crate::reports::{PeriodStats, Report, ReportDispatcher, ReportEngine, ReportKind, ReportScheduler};
use crate::sampling::SESSION_KEY;
use crate::session::SessionState;
use crate::storage::{
    ActualStreamRecord, Aggregate, Config, ListenerSample, NotificationConfig, ReportsConfig,
    SampleStore,
};
use crate::time::format_timestamp;

/// Default number of samples returned by [`Analytics::recent`].
pub const DEFAULT_RECENT_LIMIT: usize = 1000;
/// Window of [`Analytics::realtime`].
pub const REALTIME_WINDOW_MINUTES: i64 = 5;
const MAX_TREND_HOURS: u32 = 24 * 7;

pub struct Analytics {
    store: Arc<SampleStore>,
    calibration: CalibrationEngine,
    prediction: PredictionEngine,
    reports: ReportDispatcher,
    notifications: Arc<NotificationCenter>,
    notification_config: NotificationConfig,
    reports_config: ReportsConfig,
}

impl Analytics {
    pub fn new(store: Arc<SampleStore>, notifications: Arc<NotificationCenter>, config: &Config) -> Self {
        let calibration = CalibrationEngine::new(store.clone(), config.analysis.default_factor);
        let prediction = PredictionEngine::new(store.clone(), calibration.clone(), &config.analysis);
        let reports = ReportDispatcher::new(
            ReportEngine::new(store.clone(), calibration.clone()),
            notifications.clone(),
            ReportScheduler::new(&config.reports),
        );
        Self {
            store,
            calibration,
            prediction,
            reports,
            notifications,
            notification_config: config.notifications.clone(),
            reports_config: config.reports.clone(),
        }
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    pub fn reports(&self) -> &ReportDispatcher {
        &self.reports
    }

    pub fn overview(&self) -> Result<Overview> {
        let summary = self.store.summary()?;
        Ok(Overview {
            total_records: summary.total_records,
            max_count: summary.max_count,
            min_count: summary.min_count,
            avg_count: summary.avg_count.map(|avg| avg.round().max(0.0) as u64),
            latest_count: summary.latest.map(|s| s.count),
            latest_time: summary.latest.map(|s| s.timestamp),
        })
    }

    /// Latest `limit` samples, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ListenerSample>> {
        Ok(self.store.recent(limit)?)
    }

    /// Samples from the last few minutes, oldest first.
    pub fn realtime(&self, now: DateTime<Utc>) -> Result<Vec<ListenerSample>> {
        Ok(self
            .store
            .since(now - Duration::minutes(REALTIME_WINDOW_MINUTES))?)
    }

    pub fn peaks(&self, limit: usize) -> Result<Vec<PeakSample>> {
        Ok(self
            .store
            .peaks(limit)?
            .into_iter()
            .map(|s| PeakSample {
                timestamp: s.timestamp,
                count: s.count,
                day_of_week: s.timestamp.weekday().num_days_from_sunday(),
                hour: s.timestamp.hour(),
            })
            .collect())
    }

    /// One page of per-day rows, newest first.
    pub fn daily(&self, limit: usize, offset: usize) -> Result<DailyPage> {
        let factor = self.calibration.factor();
        let rows = self
            .store
            .daily_page(limit, offset)?
            .into_iter()
            .map(|day| daily_row(day.date, &day.aggregate, factor))
            .collect();
        let total = self.store.count_days()?;
        Ok(DailyPage {
            rows,
            has_more: ((offset + limit) as u64) < total,
            total,
        })
    }

    /// Per-day rows for the last seven days, newest first.
    pub fn daily_comparison(&self, now: DateTime<Utc>) -> Result<Vec<DailyRow>> {
        let factor = self.calibration.factor();
        let mut rows: Vec<DailyRow> = self
            .store
            .daily_aggregates(now - Duration::days(7), now)?
            .into_iter()
            .map(|day| daily_row(day.date, &day.aggregate, factor))
            .collect();
        rows.reverse();
        Ok(rows)
    }

    pub fn curve(&self, range: CurveRange, now: DateTime<Utc>) -> Result<Curve> {
        let (by_hour, overall) = match range.bounds(now) {
            Some((start, end)) => (
                self.store.group_by_hour_of_day(start, end)?,
                self.store.aggregate(start, end)?,
            ),
            None => {
                let summary = self.store.summary()?;
                let overall = match (summary.avg_count, summary.max_count, summary.min_count) {
                    (Some(avg), Some(max), Some(min)) => Some(Aggregate {
                        avg,
                        max,
                        min,
                        count: summary.total_records,
                    }),
                    _ => None,
                };
                (self.store.group_by_hour_all()?, overall)
            }
        };
        Ok(build_curve(range, now, &by_hour, overall))
    }

    /// Hour-of-day grouping across all data.
    pub fn hourly_all(&self) -> Result<Vec<HourRow>> {
        Ok(hour_rows(self.store.group_by_hour_all()?))
    }

    pub fn hourly(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<HourRow>> {
        check_range(start, end)?;
        Ok(hour_rows(self.store.group_by_hour_of_day(start, end)?))
    }

    pub fn stats_for_period(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Option<PeriodStats>> {
        check_range(start, end)?;
        Ok(self.reports.engine().stats_for_period(start, end)?)
    }

    pub fn calibration(&self) -> Result<CalibrationSummary> {
        Ok(self.calibration.summary()?)
    }

    pub fn predict_today(&self, now: DateTime<Utc>) -> Result<Prediction> {
        Ok(self.prediction.predict_today(now)?)
    }

    pub fn trend(&self, now: DateTime<Utc>, hours: u32) -> Result<Trend> {
        if hours == 0 || hours > MAX_TREND_HOURS {
            return Err(ValidationError::InvalidValue {
                field: "hours".into(),
                message: format!("must be between 1 and {MAX_TREND_HOURS}"),
            }
            .into());
        }
        Ok(self.prediction.trend(now, hours)?)
    }

    // ── ground truth ────────────────────────────────────────────────────

    pub fn list_actuals(&self) -> Result<Vec<ActualStreamRecord>> {
        Ok(self.store.list_actuals()?)
    }

    pub fn set_actual(&self, date: NaiveDate, streams: u64) -> Result<()> {
        self.store.upsert_actual(date, streams)?;
        info!(%date, streams, "ground truth recorded");
        Ok(())
    }

    /// Returns whether a record existed.
    pub fn delete_actual(&self, date: NaiveDate) -> Result<bool> {
        let existed = self.store.delete_actual(date)?;
        if existed {
            info!(%date, "ground truth deleted");
        }
        Ok(existed)
    }

    // ── maintenance ─────────────────────────────────────────────────────

    /// Delete every sample (ground truth is kept). Returns the deleted count.
    pub fn clear_samples(&self) -> Result<u64> {
        let deleted = self.store.clear_samples()?;
        info!(deleted, "samples cleared");
        Ok(deleted)
    }

    /// Insert samples whose timestamps are not yet present.
    pub fn import(&self, samples: &[ListenerSample]) -> Result<ImportSummary> {
        let source_records = samples.len() as u64;
        let inserted = self.store.import(samples)?;
        let total = self.store.summary()?.total_records;
        info!(source_records, inserted, total, "import finished");
        Ok(ImportSummary {
            source_records,
            existing: source_records - inserted,
            inserted,
            total,
        })
    }

    /// Every sample as `timestamp,listenerCount` CSV with a header row.
    pub fn export_csv(&self) -> Result<String> {
        let samples = self.store.all()?;
        let mut csv = String::with_capacity(32 * (samples.len() + 1));
        csv.push_str("timestamp,listenerCount\n");
        for sample in samples {
            csv.push_str(&format_timestamp(&sample.timestamp));
            csv.push(',');
            csv.push_str(&sample.count.to_string());
            csv.push('\n');
        }
        Ok(csv)
    }

    // ── status and mail ─────────────────────────────────────────────────

    /// Last published daemon session, if any.
    pub fn session(&self) -> Result<Option<SessionState>> {
        match self.store.kv_get(SESSION_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn status(&self) -> Result<Status> {
        let summary = self.store.summary()?;
        Ok(Status {
            session: self.session()?,
            data_count: summary.total_records,
            last_data_time: summary.latest.map(|s| s.timestamp),
        })
    }

    pub fn notification_status(&self) -> NotificationStatus {
        NotificationStatus {
            config: self.notification_config.masked(),
            usable: self.notifications.is_enabled(),
            provider: self.notifications.provider(),
            problem: self.notifications.misconfigured().map(str::to_string),
            last_delivered: self.notifications.last_delivered(),
            cooldown_minutes: self.notifications.cooldown_minutes(),
            reports: self.reports_config.clone(),
        }
    }

    /// Send a test mail now, bypassing the cooldown.
    pub async fn send_test_notification(&self, now: DateTime<Utc>) -> Result<()> {
        let session = self.session()?.unwrap_or_default();
        let ctx = AlertContext {
            now,
            last_success: session.last_success,
            consecutive_errors: session.consecutive_errors,
        };
        let body = alert_html(
            "Test notification",
            "Mail delivery is configured correctly.",
            &ctx,
        );
        self.notifications.send_now("Test notification", &body).await?;
        Ok(())
    }

    /// Build a report without sending it.
    pub fn report_preview(&self, kind: ReportKind, now: DateTime<Utc>) -> Result<Option<Report>> {
        Ok(self.reports.engine().generate(kind, now)?)
    }

    /// Generate and mail a report now. `None` when the period is empty.
    pub async fn send_report(&self, kind: ReportKind, now: DateTime<Utc>) -> Result<Option<Report>> {
        self.reports.send(kind, now).await
    }
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(ValidationError::InvalidTimeRange { start, end }.into());
    }
    Ok(())
}

fn daily_row(date: NaiveDate, agg: &Aggregate, factor: f64) -> DailyRow {
    DailyRow {
        date,
        avg_count: round_to(agg.avg, 1),
        max_count: agg.max,
        min_count: agg.min,
        samples: agg.count,
        predicted_streams: (agg.avg * factor).round().max(0.0) as u64,
    }
}

fn hour_rows(by_hour: std::collections::BTreeMap<u8, Aggregate>) -> Vec<HourRow> {
    by_hour
        .into_iter()
        .map(|(hour, agg)| HourRow {
            hour,
            avg_count: agg.avg.round().max(0.0) as u64,
            max_count: agg.max,
            min_count: agg.min,
            samples: agg.count,
        })
        .collect()
}
