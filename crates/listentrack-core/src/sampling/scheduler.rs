//! Fixed-interval trigger with a single active-tick guard.
//!
//! Each firing spawns the job behind a [`TickGuard`]. A firing that finds
//! the previous job still running is skipped, never queued. Missed timer
//! ticks are skipped as well.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Held while a tick body runs. Released on drop, including on panic.
#[derive(Debug)]
pub struct TickGuard {
    active: Arc<AtomicBool>,
}

impl TickGuard {
    /// Enter the tick, or `None` if another tick holds the guard.
    pub fn try_enter(active: &Arc<AtomicBool>) -> Option<Self> {
        active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                active: Arc::clone(active),
            })
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    name: &'static str,
    period: Duration,
    active: Arc<AtomicBool>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period: period.max(Duration::from_millis(1)),
            active: Arc::new(AtomicBool::new(false)),
            shutdown: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether a tick body is running right now.
    pub fn tick_in_flight(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start firing `job` every period, the first time immediately.
    /// Calling `start` on a started scheduler does nothing.
    pub fn start<F, Fut>(&mut self, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.handle.is_some() {
            warn!(scheduler = self.name, "already started");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let name = self.name;
        let period = self.period;
        let active = Arc::clone(&self.active);

        info!(scheduler = name, period_ms = period.as_millis() as u64, "scheduler started");

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight: Option<JoinHandle<()>> = None;

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let Some(guard) = TickGuard::try_enter(&active) else {
                            debug!(scheduler = name, "previous tick still running, skipping");
                            continue;
                        };
                        let fut = job();
                        in_flight = Some(tokio::spawn(async move {
                            let _guard = guard;
                            fut.await;
                        }));
                    }
                    _ = rx.changed() => break,
                }
            }

            if let Some(last) = in_flight {
                if let Err(e) = last.await {
                    warn!(scheduler = name, error = %e, "tick ended abnormally");
                }
            }
            info!(scheduler = name, "scheduler stopped");
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
    }

    /// Stop firing and wait for an in-flight tick to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(scheduler = self.name, error = %e, "scheduler task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let active = Arc::new(AtomicBool::new(false));
        let first = TickGuard::try_enter(&active).unwrap();
        assert!(TickGuard::try_enter(&active).is_none());
        drop(first);
        assert!(TickGuard::try_enter(&active).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ticks_never_overlap() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let mut scheduler = Scheduler::new("test", Duration::from_secs(5));
        {
            let (running, max_seen, runs) = (running.clone(), max_seen.clone(), runs.clone());
            scheduler.start(move || {
                let (running, max_seen, runs) = (running.clone(), max_seen.clone(), runs.clone());
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                    // Three periods long.
                    tokio::time::sleep(Duration::from_secs(15)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }

        tokio::time::sleep(Duration::from_secs(62)).await;
        scheduler.stop().await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        let runs = runs.load(Ordering::SeqCst);
        assert!((3..=5).contains(&runs), "runs = {runs}");
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert!(!scheduler.tick_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_tick() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut scheduler = Scheduler::new("test", Duration::from_secs(60));
        {
            let finished = finished.clone();
            scheduler.start(move || {
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    finished.store(true, Ordering::SeqCst);
                }
            });
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.tick_in_flight());
        scheduler.stop().await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(!scheduler.is_started());
    }
}
