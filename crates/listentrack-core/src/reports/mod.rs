//! Periodic summary reports: period statistics, the once-a-day trigger,
//! HTML rendering and delivery through the notification center.

mod engine;
mod render;
mod schedule;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

pub use engine::{Comparison, Period, PeriodStats, Report, ReportEngine, ReportKind};
pub use render::report_html;
pub use schedule::ReportScheduler;

use crate::error::CoreError;
use crate::notify::NotificationCenter;

/// What happened to one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportDelivery {
    Sent { kind: ReportKind },
    /// The period had no samples; nothing was sent.
    Empty { kind: ReportKind },
    Failed { kind: ReportKind, message: String },
}

/// Generates due reports and mails them.
pub struct ReportDispatcher {
    engine: ReportEngine,
    notifications: Arc<NotificationCenter>,
    schedule: Mutex<ReportScheduler>,
}

impl ReportDispatcher {
    pub fn new(
        engine: ReportEngine,
        notifications: Arc<NotificationCenter>,
        schedule: ReportScheduler,
    ) -> Self {
        Self {
            engine,
            notifications,
            schedule: Mutex::new(schedule),
        }
    }

    pub fn engine(&self) -> &ReportEngine {
        &self.engine
    }

    /// Periodic check. Does nothing unless mail is usable and `now` falls
    /// in a not-yet-checked 00:00 UTC hour.
    pub async fn check(&self, now: DateTime<Utc>) -> Vec<ReportDelivery> {
        if !self.notifications.is_enabled() {
            return Vec::new();
        }
        let due = match self.schedule.lock() {
            Ok(mut schedule) => schedule.due(now),
            Err(_) => {
                error!("report schedule poisoned");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(due.len());
        for kind in due {
            let delivery = match self.send(kind, now).await {
                Ok(Some(_)) => ReportDelivery::Sent { kind },
                Ok(None) => ReportDelivery::Empty { kind },
                Err(e) => {
                    error!(?kind, error = %e, "report failed");
                    ReportDelivery::Failed {
                        kind,
                        message: e.to_string(),
                    }
                }
            };
            out.push(delivery);
        }
        out
    }

    /// Generate and mail one report now. `Ok(None)` when the period is empty.
    pub async fn send(&self, kind: ReportKind, now: DateTime<Utc>) -> Result<Option<Report>, CoreError> {
        let Some(report) = self.engine.generate(kind, now)? else {
            info!(?kind, "no samples in report period, skipping");
            return Ok(None);
        };
        let subject = format!("{} - {}", report.title, report.period.label);
        self.notifications
            .send_now(&subject, &report_html(&report))
            .await?;
        info!(?kind, period = %report.period.label, "report sent");
        Ok(Some(report))
    }
}
