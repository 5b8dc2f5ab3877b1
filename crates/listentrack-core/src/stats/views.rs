//! Serializable query results.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::session::SessionState;
use crate::storage::{NotificationConfig, ReportsConfig};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_records: u64,
    pub max_count: Option<u32>,
    pub min_count: Option<u32>,
    /// Rounded to a whole listener.
    pub avg_count: Option<u64>,
    pub latest_count: Option<u32>,
    pub latest_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakSample {
    pub timestamp: DateTime<Utc>,
    pub count: u32,
    /// 0 = Sunday.
    pub day_of_week: u32,
    pub hour: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub avg_count: f64,
    pub max_count: u32,
    pub min_count: u32,
    pub samples: u64,
    pub predicted_streams: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPage {
    pub rows: Vec<DailyRow>,
    pub has_more: bool,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourRow {
    pub hour: u8,
    /// Rounded to a whole listener.
    pub avg_count: u64,
    pub max_count: u32,
    pub min_count: u32,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub source_records: u64,
    pub existing: u64,
    pub inserted: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    /// Last snapshot published by the sampling daemon, if it ever ran.
    pub session: Option<SessionState>,
    pub data_count: u64,
    pub last_data_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationStatus {
    /// Secrets masked.
    pub config: NotificationConfig,
    pub usable: bool,
    pub provider: Option<&'static str>,
    pub problem: Option<String>,
    pub last_delivered: Option<DateTime<Utc>>,
    pub cooldown_minutes: i64,
    pub reports: ReportsConfig,
}
