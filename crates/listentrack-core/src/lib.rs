//! # listentrack Core Library
//!
//! Core logic for listentrack, a long-running sampler of an artist's live
//! "people listening now" figure. The `listentrack` CLI is a thin layer over
//! this crate: the daemon drives the sampling and report schedulers, every
//! other command queries or maintains the store through [`Analytics`].
//!
//! ## Architecture
//!
//! - **Sampling**: a fixed-interval [`Scheduler`] runs one [`Orchestrator`]
//!   tick at a time; the orchestrator drives a [`Probe`] and feeds the
//!   [`SessionMachine`]
//! - **Storage**: in-memory SQLite working database with periodic
//!   checkpoints to disk ([`SampleStore`]) and TOML configuration
//! - **Analysis**: calibration factor and same-day stream prediction
//! - **Reports and alerts**: daily/weekly/monthly summaries and failure
//!   alerts delivered through a [`Notifier`]

pub mod analysis;
pub mod clock;
pub mod error;
pub mod events;
pub mod notify;
pub mod reports;
pub mod sampling;
pub mod session;
pub mod stats;
pub mod storage;
pub mod time;

pub use analysis::{CalibrationEngine, Prediction, PredictionEngine};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, NotifyError, ProbeError, StoreError, ValidationError};
pub use events::{Event, TickOutcome, TickReport};
pub use notify::{NotificationCenter, Notifier};
pub use reports::{Report, ReportDispatcher, ReportEngine, ReportKind, ReportScheduler};
pub use sampling::{HttpProbe, Orchestrator, Probe, Scheduler};
pub use session::{SessionMachine, SessionPhase, SessionState};
pub use stats::{Analytics, CurveRange};
pub use storage::{Config, DaemonLock, Inbox, ListenerSample, SampleStore, StoreRequest};
