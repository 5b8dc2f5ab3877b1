//! Sampling orchestrator: the body of every sampling tick.
//!
//! Consults the session machine, drives the probe, writes accepted samples
//! to the store and turns alerting session events into notifications.
//! One sampling attempt per tick; serialization of ticks is the
//! scheduler's job, probe exclusivity is enforced here by an async mutex.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::probe::{Probe, Reading};
use crate::clock::Clock;
use crate::error::NotifyError;
use crate::events::{Event, TickOutcome, TickReport};
use crate::notify::templates::{alert_html, AlertContext};
use crate::notify::{AlertCategory, NotificationCenter};
use crate::session::{SessionMachine, SessionPhase, SessionState};
use crate::storage::{ListenerSample, SampleStore};

/// Key of the session snapshot in the store's key-value table.
pub const SESSION_KEY: &str = "session";

pub struct Orchestrator {
    probe: AsyncMutex<Box<dyn Probe>>,
    session: Mutex<SessionMachine>,
    store: Arc<SampleStore>,
    notifications: Arc<NotificationCenter>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        probe: Box<dyn Probe>,
        session: SessionMachine,
        store: Arc<SampleStore>,
        notifications: Arc<NotificationCenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probe: AsyncMutex::new(probe),
            session: Mutex::new(session),
            store,
            notifications,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut SessionMachine) -> R) -> R {
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut session)
    }

    /// Current session snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.with_session(|s| s.state().clone())
    }

    /// Swap in a probe built from fresh credentials and resume sampling.
    /// Waits for an in-flight tick to release the current probe.
    pub async fn replace_probe(&self, probe: Box<dyn Probe>) -> Vec<Event> {
        {
            let mut current = self.probe.lock().await;
            info!(probe = probe.name(), "probe replaced");
            *current = probe;
        }
        self.credentials_supplied()
    }

    /// Operator supplied fresh credentials; sampling resumes next tick.
    pub fn credentials_supplied(&self) -> Vec<Event> {
        let now = self.clock.now();
        let events = self.with_session(|s| s.credentials_supplied(now));
        self.handle_events(&events, now);
        events
    }

    /// Run one sampling tick.
    pub async fn tick(&self) -> TickReport {
        let report = self.run_tick().await;
        self.publish_snapshot();
        report
    }

    /// Record the session snapshot in the store for out-of-process status
    /// queries. It becomes durable with the next checkpoint.
    fn publish_snapshot(&self) {
        let state = self.snapshot();
        match serde_json::to_string(&state) {
            Ok(json) => {
                if let Err(e) = self.store.kv_set(SESSION_KEY, &json) {
                    warn!(error = %e, "failed to record session snapshot");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode session snapshot"),
        }
    }

    async fn run_tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut events = Vec::new();

        let (phase, needs_reload) = self.with_session(|s| (s.phase(), s.needs_reload()));
        if phase == SessionPhase::NeedsLogin {
            debug!("awaiting login, probe not touched");
            return TickReport {
                outcome: TickOutcome::AwaitingLogin,
                events,
            };
        }

        let mut probe = self.probe.lock().await;

        if needs_reload {
            events.extend(self.with_session(|s| s.begin_reload(now)));
            debug!(probe = probe.name(), "reloading session");
            let failure = match probe.ensure_ready().await {
                Ok(readiness) if readiness.needs_login => {
                    events.extend(self.with_session(|s| s.record_login_required(now)));
                    self.handle_events(&events, now);
                    return TickReport {
                        outcome: TickOutcome::LoginRequired,
                        events,
                    };
                }
                Ok(readiness) if readiness.ready => {
                    events.extend(self.with_session(|s| s.record_reload_ready(now)));
                    None
                }
                Ok(_) => Some("page not ready after reload".to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(message) = failure {
                events.extend(self.with_session(|s| s.record_reload_failed(message, now)));
                let consecutive_errors = self.with_session(|s| s.consecutive_errors());
                self.handle_events(&events, now);
                return TickReport {
                    outcome: TickOutcome::ReloadFailed { consecutive_errors },
                    events,
                };
            }
        }

        let outcome = match probe.sample().await {
            Ok(Reading {
                count: Some(count), ..
            }) => {
                events.extend(self.with_session(|s| s.record_success(count, now)));
                self.persist(ListenerSample::new(now, count))
            }
            Ok(Reading {
                count: None,
                excerpt,
            }) => {
                events.extend(self.with_session(|s| s.record_no_signal(now)));
                let consecutive_errors = self.with_session(|s| s.consecutive_errors());
                if consecutive_errors % 3 == 0 {
                    if let Some(excerpt) = excerpt {
                        debug!(consecutive_errors, %excerpt, "listener count not found");
                    }
                }
                TickOutcome::NoSignal { consecutive_errors }
            }
            Err(e) => {
                events.extend(self.with_session(|s| s.record_probe_error(e.to_string(), now)));
                TickOutcome::ProbeFailed {
                    consecutive_errors: self.with_session(|s| s.consecutive_errors()),
                }
            }
        };

        self.handle_events(&events, now);
        TickReport { outcome, events }
    }

    fn persist(&self, sample: ListenerSample) -> TickOutcome {
        match self.store.append(&sample) {
            Ok(receipt) => TickOutcome::Sampled {
                count: sample.count,
                checkpointed: receipt.checkpointed,
            },
            Err(e) => {
                error!(error = %e, count = sample.count, "failed to store sample");
                TickOutcome::StoreFailed {
                    count: sample.count,
                    message: e.to_string(),
                }
            }
        }
    }

    fn handle_events(&self, events: &[Event], now: DateTime<Utc>) {
        for event in events {
            match event {
                Event::SampleRecorded { count, .. } => debug!(count, "sample recorded"),
                Event::SignalMissing {
                    consecutive_errors, ..
                } => debug!(consecutive_errors, "signal missing"),
                Event::ProbeFailed {
                    message,
                    consecutive_errors,
                    ..
                } => warn!(consecutive_errors, %message, "probe failed"),
                Event::PhaseChanged { from, to, .. } => {
                    info!(?from, ?to, "session phase changed")
                }
                Event::FailureThresholdReached {
                    consecutive_errors, ..
                } => {
                    warn!(consecutive_errors, "failure threshold reached");
                    let message = format!(
                        "Sampling has failed {consecutive_errors} times in a row. \
                         The page may have changed or the session may be stale."
                    );
                    self.alert(
                        AlertCategory::ConsecutiveFailures,
                        "Sampling keeps failing",
                        &message,
                        now,
                    );
                }
                Event::LoginRequired { message, .. } => {
                    warn!(%message, "login required");
                    self.alert(
                        AlertCategory::LoginExpired,
                        "Login required",
                        "The session expired. Supply fresh credentials to resume sampling.",
                        now,
                    );
                }
            }
        }
    }

    fn alert(&self, category: AlertCategory, title: &str, message: &str, now: DateTime<Utc>) {
        let state = self.snapshot();
        let ctx = AlertContext {
            now,
            last_success: state.last_success,
            consecutive_errors: state.consecutive_errors,
        };
        match self
            .notifications
            .dispatch_alert(category, title, alert_html(title, message, &ctx), now)
        {
            Ok(()) => debug!(?category, "alert queued"),
            Err(NotifyError::Disabled) => debug!(?category, "notifications disabled"),
            Err(NotifyError::CoolingDown { remaining_min }) => {
                debug!(?category, remaining_min, "alert suppressed by cooldown")
            }
            Err(e) => warn!(?category, error = %e, "alert not sent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ProbeError;
    use crate::sampling::probe::Readiness;
    use crate::session::SessionThresholds;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::VecDeque;

    /// Replays scripted answers; defaults to ready / no signal when empty.
    #[derive(Default)]
    struct ScriptedProbe {
        readiness: VecDeque<Result<Readiness, ProbeError>>,
        readings: VecDeque<Result<Reading, ProbeError>>,
        reloads: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn ensure_ready(&mut self) -> Result<Readiness, ProbeError> {
            self.reloads
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.readiness
                .pop_front()
                .unwrap_or(Ok(Readiness::ready()))
        }

        async fn sample(&mut self) -> Result<Reading, ProbeError> {
            self.readings
                .pop_front()
                .unwrap_or(Ok(Reading::missing(None)))
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn orchestrator(probe: ScriptedProbe) -> (Orchestrator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let orch = Orchestrator::new(
            Box::new(probe),
            SessionMachine::new(SessionThresholds::default()),
            Arc::new(SampleStore::open_in_memory().unwrap()),
            Arc::new(NotificationCenter::disabled()),
            clock.clone(),
        );
        (orch, clock)
    }

    #[tokio::test]
    async fn first_tick_reloads_then_samples() {
        let probe = ScriptedProbe {
            readings: VecDeque::from([Ok(Reading::found(120))]),
            ..Default::default()
        };
        let reloads = probe.reloads.clone();
        let (orch, _) = orchestrator(probe);

        let report = orch.tick().await;
        assert_eq!(
            report.outcome,
            TickOutcome::Sampled {
                count: 120,
                checkpointed: false
            }
        );
        assert_eq!(reloads.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(orch.snapshot().phase, SessionPhase::Ready);
        assert_eq!(orch.store().summary().unwrap().total_records, 1);
    }

    #[tokio::test]
    async fn no_signal_leaves_store_untouched() {
        let (orch, _) = orchestrator(ScriptedProbe::default());
        let report = orch.tick().await;
        assert_eq!(report.outcome, TickOutcome::NoSignal { consecutive_errors: 1 });
        assert_eq!(orch.store().summary().unwrap().total_records, 0);
    }

    #[tokio::test]
    async fn ten_misses_force_reload_on_next_tick() {
        let probe = ScriptedProbe::default();
        let reloads = probe.reloads.clone();
        let (orch, clock) = orchestrator(probe);

        for _ in 0..10 {
            orch.tick().await;
            clock.advance(Duration::seconds(5));
        }
        assert_eq!(orch.snapshot().phase, SessionPhase::Degraded);
        assert_eq!(reloads.load(std::sync::atomic::Ordering::SeqCst), 1);

        orch.tick().await;
        assert_eq!(reloads.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn probe_error_forces_reload_even_below_threshold() {
        let probe = ScriptedProbe {
            readings: VecDeque::from([
                Ok(Reading::found(5)),
                Err(ProbeError::Timeout { timeout_secs: 30 }),
                Ok(Reading::found(6)),
            ]),
            ..Default::default()
        };
        let reloads = probe.reloads.clone();
        let (orch, _) = orchestrator(probe);

        orch.tick().await;
        let report = orch.tick().await;
        assert_eq!(report.outcome, TickOutcome::ProbeFailed { consecutive_errors: 1 });
        assert_eq!(orch.snapshot().phase, SessionPhase::Loading);

        let report = orch.tick().await;
        assert!(matches!(report.outcome, TickOutcome::Sampled { count: 6, .. }));
        assert_eq!(reloads.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(orch.snapshot().consecutive_errors, 0);
    }

    #[tokio::test]
    async fn login_boundary_stops_sampling_until_credentials() {
        let probe = ScriptedProbe {
            readiness: VecDeque::from([Ok(Readiness::login_required())]),
            readings: VecDeque::from([Ok(Reading::found(9))]),
            ..Default::default()
        };
        let reloads = probe.reloads.clone();
        let (orch, _) = orchestrator(probe);

        assert_eq!(orch.tick().await.outcome, TickOutcome::LoginRequired);
        assert_eq!(orch.tick().await.outcome, TickOutcome::AwaitingLogin);
        assert_eq!(reloads.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(orch.snapshot().needs_login);

        orch.credentials_supplied();
        let report = orch.tick().await;
        assert!(matches!(report.outcome, TickOutcome::Sampled { count: 9, .. }));
    }

    #[tokio::test]
    async fn failed_reload_counts_as_error() {
        let probe = ScriptedProbe {
            readiness: VecDeque::from([
                Ok(Readiness::not_ready()),
                Err(ProbeError::Transport("dns".into())),
            ]),
            ..Default::default()
        };
        let (orch, _) = orchestrator(probe);
        assert_eq!(
            orch.tick().await.outcome,
            TickOutcome::ReloadFailed { consecutive_errors: 1 }
        );
        assert_eq!(
            orch.tick().await.outcome,
            TickOutcome::ReloadFailed { consecutive_errors: 2 }
        );
        assert_eq!(orch.snapshot().error_message.as_deref(), Some("Probe transport failed: dns"));
    }

    #[tokio::test]
    async fn tick_publishes_session_snapshot() {
        let probe = ScriptedProbe {
            readings: VecDeque::from([Ok(Reading::found(42))]),
            ..Default::default()
        };
        let (orch, _) = orchestrator(probe);
        orch.tick().await;

        let json = orch.store().kv_get(SESSION_KEY).unwrap().unwrap();
        let state: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, orch.snapshot());
        assert!(state.ready);
    }

    #[tokio::test]
    async fn replacing_probe_clears_login_requirement() {
        let probe = ScriptedProbe {
            readiness: VecDeque::from([Ok(Readiness::login_required())]),
            ..Default::default()
        };
        let (orch, _) = orchestrator(probe);
        assert_eq!(orch.tick().await.outcome, TickOutcome::LoginRequired);

        let fresh = ScriptedProbe {
            readings: VecDeque::from([Ok(Reading::found(77))]),
            ..Default::default()
        };
        orch.replace_probe(Box::new(fresh)).await;
        assert!(!orch.snapshot().needs_login);
        let report = orch.tick().await;
        assert!(matches!(report.outcome, TickOutcome::Sampled { count: 77, .. }));
    }
}
