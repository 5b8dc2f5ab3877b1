//! Listener statistics: overview, per-day and per-hour views, curves,
//! peaks, maintenance and status, behind the [`Analytics`] facade.

mod analytics;
mod curve;
mod views;

pub use analytics::{Analytics, DEFAULT_RECENT_LIMIT, REALTIME_WINDOW_MINUTES};
pub use curve::{Curve, CurvePoint, CurveRange};
pub use views::{
    DailyPage, DailyRow, HourRow, ImportSummary, NotificationStatus, Overview, PeakSample, Status,
};
