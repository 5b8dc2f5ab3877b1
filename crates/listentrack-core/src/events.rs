use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionPhase;

/// Every session state change produces an Event.
/// The orchestrator logs them and turns the alerting ones into notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SampleRecorded {
        count: u32,
        at: DateTime<Utc>,
    },
    /// The page loaded but the listener count was not on it.
    SignalMissing {
        consecutive_errors: u32,
        at: DateTime<Utc>,
    },
    /// The probe itself failed (transport, timeout, not ready).
    ProbeFailed {
        message: String,
        consecutive_errors: u32,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
        at: DateTime<Utc>,
    },
    /// The failure counter just reached the alert threshold.
    FailureThresholdReached {
        consecutive_errors: u32,
        at: DateTime<Utc>,
    },
    /// The session hit the login boundary. Sampling stops until
    /// credentials are supplied.
    LoginRequired {
        message: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Whether this event should be delivered to the operator.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Event::FailureThresholdReached { .. } | Event::LoginRequired { .. }
        )
    }
}

/// What a single sampling tick did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Session is waiting for the operator; the probe was not touched.
    AwaitingLogin,
    /// A sample was stored.
    Sampled { count: u32, checkpointed: bool },
    /// A sample was read but could not be stored.
    StoreFailed { count: u32, message: String },
    /// The page had no listener count.
    NoSignal { consecutive_errors: u32 },
    /// The sample call failed; a reload is forced next tick.
    ProbeFailed { consecutive_errors: u32 },
    /// Reloading the session did not produce a ready page.
    ReloadFailed { consecutive_errors: u32 },
    /// Reloading the session landed on the login page.
    LoginRequired,
}

/// A tick's outcome plus the session events it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub events: Vec<Event>,
}
