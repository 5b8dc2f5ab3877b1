//! Alert dispatch with per-category cooldown.
//!
//! Alerts are fire-and-forget: [`NotificationCenter::dispatch_alert`]
//! reserves the cooldown slot, spawns the send, and returns. The slot is
//! released again when delivery fails so the next occurrence can retry.
//! Spawned sends are tracked so shutdown can wait for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::build_notifier;
use super::traits::Notifier;
use crate::error::NotifyError;
use crate::storage::NotificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    LoginExpired,
    ConsecutiveFailures,
}

#[derive(Debug, Default)]
struct GateState {
    reserved: HashMap<AlertCategory, DateTime<Utc>>,
    last_delivered: Option<DateTime<Utc>>,
}

pub struct NotificationCenter {
    notifier: Option<Arc<dyn Notifier>>,
    /// Set when notifications are enabled but the transport could not be built.
    misconfigured: Option<String>,
    subject_prefix: String,
    cooldown: Duration,
    state: Arc<Mutex<GateState>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl NotificationCenter {
    pub fn new(
        notifier: Option<Arc<dyn Notifier>>,
        subject_prefix: impl Into<String>,
        cooldown_minutes: u32,
    ) -> Self {
        Self {
            notifier,
            misconfigured: None,
            subject_prefix: subject_prefix.into(),
            cooldown: Duration::minutes(i64::from(cooldown_minutes)),
            state: Arc::new(Mutex::new(GateState::default())),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Build from `[notifications]`. A disabled or incomplete section
    /// yields a center that refuses every send.
    pub fn from_config(config: &NotificationConfig) -> Self {
        let mut center = Self::new(None, config.subject_prefix.clone(), config.cooldown_minutes);
        if !config.enabled {
            return center;
        }
        match build_notifier(config) {
            Ok(notifier) => {
                info!(provider = notifier.name(), "notifications enabled");
                center.notifier = Some(notifier);
            }
            Err(e) => {
                warn!(error = %e, "notifications enabled but not usable");
                center.misconfigured = Some(e.to_string());
            }
        }
        center
    }

    pub fn disabled() -> Self {
        Self::new(None, "", 30)
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn provider(&self) -> Option<&'static str> {
        self.notifier.as_ref().map(|n| n.name())
    }

    /// Why an enabled section could not produce a transport.
    pub fn misconfigured(&self) -> Option<&str> {
        self.misconfigured.as_deref()
    }

    pub fn cooldown_minutes(&self) -> i64 {
        self.cooldown.num_minutes()
    }

    pub fn last_delivered(&self) -> Option<DateTime<Utc>> {
        self.state.lock().ok().and_then(|s| s.last_delivered)
    }

    fn subject(&self, subject: &str) -> String {
        if self.subject_prefix.is_empty() {
            subject.to_string()
        } else {
            format!("{} {subject}", self.subject_prefix)
        }
    }

    fn notifier(&self) -> Result<Arc<dyn Notifier>, NotifyError> {
        match (&self.notifier, &self.misconfigured) {
            (Some(n), _) => Ok(Arc::clone(n)),
            (None, Some(reason)) => Err(NotifyError::NotConfigured(reason.clone())),
            (None, None) => Err(NotifyError::Disabled),
        }
    }

    /// Claim the cooldown slot for `category` at `now`.
    fn reserve(&self, category: AlertCategory, now: DateTime<Utc>) -> Result<(), NotifyError> {
        let mut state = self.state.lock().map_err(|_| NotifyError::Transport {
            provider: "gate",
            message: "cooldown state poisoned".into(),
        })?;
        if let Some(last) = state.reserved.get(&category) {
            let elapsed = now - *last;
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                let remaining_min = (remaining.num_seconds() + 59) / 60;
                return Err(NotifyError::CoolingDown { remaining_min });
            }
        }
        state.reserved.insert(category, now);
        Ok(())
    }

    /// Queue an alert without waiting for delivery. Returns the reason it
    /// was not queued, if any.
    pub fn dispatch_alert(
        &self,
        category: AlertCategory,
        subject: &str,
        body_html: String,
        now: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        let notifier = self.notifier()?;
        self.reserve(category, now)?;

        let subject = self.subject(subject);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            match notifier.send(&subject, &body_html).await {
                Ok(()) => {
                    info!(provider = notifier.name(), %subject, "alert delivered");
                    if let Ok(mut s) = state.lock() {
                        s.last_delivered = Some(Utc::now());
                    }
                }
                Err(e) => {
                    error!(provider = notifier.name(), error = %e, "alert delivery failed");
                    if let Ok(mut s) = state.lock() {
                        if s.reserved.get(&category) == Some(&now) {
                            s.reserved.remove(&category);
                        }
                    }
                }
            }
        });

        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
        Ok(())
    }

    /// Send now and wait, bypassing the cooldown. Used for reports and
    /// operator-triggered test mail.
    pub async fn send_now(&self, subject: &str, body_html: &str) -> Result<(), NotifyError> {
        let notifier = self.notifier()?;
        let subject = self.subject(subject);
        notifier.send(&subject, body_html).await?;
        info!(provider = notifier.name(), %subject, "mail delivered");
        if let Ok(mut s) = self.state.lock() {
            s.last_delivered = Some(Utc::now());
        }
        Ok(())
    }

    fn take_pending(&self) -> Vec<JoinHandle<()>> {
        match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Wait for every spawned alert to finish.
    pub async fn drain(&self) {
        for handle in self.take_pending() {
            if let Err(e) = handle.await {
                warn!(error = %e, "alert task ended abnormally");
            }
        }
    }

    /// Like [`drain`](Self::drain), but give up after `limit` and abort
    /// the sends still running. Returns whether everything finished.
    pub async fn drain_within(&self, limit: std::time::Duration) -> bool {
        let mut handles = self.take_pending();
        let deadline = tokio::time::Instant::now() + limit;
        while !handles.is_empty() {
            let last = handles.len() - 1;
            match tokio::time::timeout_at(deadline, &mut handles[last]).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "alert task ended abnormally"),
                Err(_) => {
                    for handle in &handles {
                        handle.abort();
                    }
                    warn!(abandoned = handles.len(), "alert sends still running, aborted");
                    return false;
                }
            }
            handles.pop();
        }
        true
    }
}
