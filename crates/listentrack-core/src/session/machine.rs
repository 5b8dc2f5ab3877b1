//! Session state machine.
//!
//! Tracks whether the probe's page is usable, whether the login boundary was
//! hit, and how many attempts in a row failed. Pure and clock-free: every
//! transition takes `now` from the caller and returns the events it caused.
//!
//! ## State Transitions
//!
//! ```text
//! Loading --ready--> Ready --no signal x N--> Degraded --next tick--> Loading
//!    |                 \--probe error------------------------------> Loading
//!    \--login page--> NeedsLogin --credentials_supplied--> Loading
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::storage::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// The page is not (or no longer) known to be ready; next tick reloads.
    Loading,
    Ready,
    /// Too many misses in a row; next tick reloads.
    Degraded,
    /// Terminal until the operator supplies credentials.
    NeedsLogin,
}

/// Snapshot of the session, as exposed to status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub ready: bool,
    pub needs_login: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub consecutive_errors: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Loading,
            ready: false,
            needs_login: false,
            last_success: None,
            last_error: None,
            error_message: None,
            consecutive_errors: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionThresholds {
    /// Failure count at which the operator is alerted.
    pub notify_after: u32,
    /// Failure count at which a ready page is reloaded.
    pub reload_after: u32,
}

impl Default for SessionThresholds {
    fn default() -> Self {
        Self {
            notify_after: 5,
            reload_after: 10,
        }
    }
}

impl From<&SessionConfig> for SessionThresholds {
    fn from(config: &SessionConfig) -> Self {
        Self {
            notify_after: config.notify_after_errors.max(1),
            reload_after: config.reload_after_errors.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    thresholds: SessionThresholds,
}

impl SessionMachine {
    pub fn new(thresholds: SessionThresholds) -> Self {
        Self {
            state: SessionState::default(),
            thresholds,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.state.consecutive_errors
    }

    pub fn thresholds(&self) -> SessionThresholds {
        self.thresholds
    }

    /// Whether the next tick must reload before sampling.
    pub fn needs_reload(&self) -> bool {
        matches!(self.state.phase, SessionPhase::Loading | SessionPhase::Degraded)
    }

    /// A sample was read. Clears the failure streak.
    pub fn record_success(&mut self, count: u32, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        self.enter(SessionPhase::Ready, now, &mut events);
        self.state.consecutive_errors = 0;
        self.state.last_success = Some(now);
        self.state.error_message = None;
        events.push(Event::SampleRecorded { count, at: now });
        events
    }

    /// The page was readable but carried no count.
    pub fn record_no_signal(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        self.fail("listener count not found".into(), now, &mut events);
        events.push(Event::SignalMissing {
            consecutive_errors: self.state.consecutive_errors,
            at: now,
        });
        if self.state.phase == SessionPhase::Ready
            && self.state.consecutive_errors >= self.thresholds.reload_after
        {
            self.enter(SessionPhase::Degraded, now, &mut events);
        }
        events
    }

    /// The sample call errored. Counts as a miss and forces a reload.
    pub fn record_probe_error(&mut self, message: String, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        self.fail(message.clone(), now, &mut events);
        events.push(Event::ProbeFailed {
            message,
            consecutive_errors: self.state.consecutive_errors,
            at: now,
        });
        self.enter(SessionPhase::Loading, now, &mut events);
        events
    }

    /// A reload is starting. `Degraded` hands over to `Loading`.
    pub fn begin_reload(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        if self.state.phase == SessionPhase::Degraded {
            self.enter(SessionPhase::Loading, now, &mut events);
        }
        events
    }

    /// The reload produced a usable page.
    pub fn record_reload_ready(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        self.enter(SessionPhase::Ready, now, &mut events);
        self.state.consecutive_errors = 0;
        self.state.error_message = None;
        events
    }

    /// The reload failed or the page never became ready.
    pub fn record_reload_failed(&mut self, message: String, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        self.fail(message.clone(), now, &mut events);
        events.push(Event::ProbeFailed {
            message,
            consecutive_errors: self.state.consecutive_errors,
            at: now,
        });
        self.enter(SessionPhase::Loading, now, &mut events);
        events
    }

    /// The reload redirected to the login page.
    pub fn record_login_required(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        if self.state.phase == SessionPhase::NeedsLogin {
            return events;
        }
        let message = "session expired, login required".to_string();
        self.state.needs_login = true;
        self.state.last_error = Some(now);
        self.state.error_message = Some(message.clone());
        self.enter(SessionPhase::NeedsLogin, now, &mut events);
        events.push(Event::LoginRequired { message, at: now });
        events
    }

    /// The operator supplied fresh credentials; reload on the next tick.
    pub fn credentials_supplied(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        if self.state.phase != SessionPhase::NeedsLogin {
            return events;
        }
        self.state.needs_login = false;
        self.state.error_message = None;
        self.enter(SessionPhase::Loading, now, &mut events);
        events
    }

    fn fail(&mut self, message: String, now: DateTime<Utc>, events: &mut Vec<Event>) {
        let before = self.state.consecutive_errors;
        self.state.consecutive_errors = before.saturating_add(1);
        self.state.last_error = Some(now);
        self.state.error_message = Some(message);

        let threshold = self.thresholds.notify_after;
        if before < threshold && self.state.consecutive_errors >= threshold {
            events.push(Event::FailureThresholdReached {
                consecutive_errors: self.state.consecutive_errors,
                at: now,
            });
        }
    }

    fn enter(&mut self, phase: SessionPhase, now: DateTime<Utc>, events: &mut Vec<Event>) {
        let from = self.state.phase;
        self.state.phase = phase;
        self.state.ready = phase == SessionPhase::Ready;
        if from != phase {
            events.push(Event::PhaseChanged {
                from,
                to: phase,
                at: now,
            });
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(SessionThresholds::default())
    }
}
