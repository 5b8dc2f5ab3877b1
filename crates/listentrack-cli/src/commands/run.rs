//! `listentrack run`: the sampling daemon.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use listentrack_core::reports::ReportDelivery;
use listentrack_core::session::SessionThresholds;
use listentrack_core::{
    Analytics, Config, DaemonLock, HttpProbe, Inbox, NotificationCenter, Orchestrator,
    SampleStore, Scheduler, SessionMachine, SystemClock,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{runtime, CmdResult, Context};

/// Upper bound on waiting for queued mail at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(ctx: Context) -> CmdResult {
    runtime()?.block_on(daemon(ctx))
}

async fn daemon(ctx: Context) -> CmdResult {
    let config = &ctx.config;
    let db_path = config.database_path()?;
    // Claimed before the store is read so CLI writes from here on queue.
    let _lock = DaemonLock::acquire(&db_path)?;
    // The only fatal failure: without a store there is nothing to do.
    let store = ctx.open_store()?;
    let inbox = Inbox::for_database(&db_path);
    apply_queued(&inbox, &store);
    let notifications = Arc::new(NotificationCenter::from_config(&config.notifications));
    let analytics = Arc::new(Analytics::new(store.clone(), notifications.clone(), config));

    let probe = HttpProbe::new(&config.sampling)?;
    let orchestrator = Arc::new(Orchestrator::new(
        Box::new(probe),
        SessionMachine::new(SessionThresholds::from(&config.session)),
        store.clone(),
        notifications.clone(),
        Arc::new(SystemClock),
    ));
    let credentials = Arc::new(CredentialWatch::new(ctx.config_path.clone(), config));

    let mut sampler = Scheduler::new("sampling", Duration::from_secs(config.sampling.interval_secs));
    {
        let orchestrator = orchestrator.clone();
        let credentials = credentials.clone();
        let inbox = inbox.clone();
        let store = store.clone();
        sampler.start(move || {
            let orchestrator = orchestrator.clone();
            let credentials = credentials.clone();
            let inbox = inbox.clone();
            let store = store.clone();
            async move {
                apply_queued(&inbox, &store);
                if orchestrator.snapshot().needs_login {
                    credentials.poll(&orchestrator).await;
                }
                let report = orchestrator.tick().await;
                debug!(outcome = ?report.outcome, events = report.events.len(), "tick finished");
            }
        });
    }

    let mut report_check = Scheduler::new(
        "report-check",
        Duration::from_secs(config.reports.check_interval_secs),
    );
    {
        let analytics = analytics.clone();
        report_check.start(move || {
            let analytics = analytics.clone();
            async move {
                for delivery in analytics.reports().check(Utc::now()).await {
                    match delivery {
                        ReportDelivery::Failed { kind, message } => {
                            warn!(?kind, %message, "report not delivered")
                        }
                        other => info!(delivery = ?other, "report check"),
                    }
                }
            }
        });
    }

    info!(
        target_url = %config.sampling.target_url,
        interval_secs = config.sampling.interval_secs,
        database = %store.path().map(|p| p.display().to_string()).unwrap_or_default(),
        "listentrack running, Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    sampler.stop().await;
    report_check.stop().await;
    apply_queued(&inbox, &store);
    store.checkpoint()?;
    info!("final checkpoint written");
    if !notifications.drain_within(DRAIN_TIMEOUT).await {
        warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "pending notifications abandoned");
    }
    Ok(())
}

/// Apply writes the CLI queued while this daemon owns the store.
fn apply_queued(inbox: &Inbox, store: &SampleStore) {
    match inbox.apply_pending(store) {
        Ok(applied) if !applied.is_empty() => {
            info!(count = applied.len(), "queued store requests applied")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "queued store requests not applied"),
    }
}

/// Re-reads the config file while the session waits for login, and swaps
/// in a new probe once the cookie header changes.
struct CredentialWatch {
    path: std::path::PathBuf,
    cookie: Mutex<Option<String>>,
}

impl CredentialWatch {
    fn new(path: std::path::PathBuf, config: &Config) -> Self {
        Self {
            path,
            cookie: Mutex::new(config.sampling.cookie_header.clone()),
        }
    }

    async fn poll(&self, orchestrator: &Orchestrator) {
        let fresh = match Config::load_from(&self.path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "cannot re-read config for credentials");
                return;
            }
        };
        let mut cookie = self.cookie.lock().await;
        if fresh.sampling.cookie_header == *cookie {
            return;
        }
        match HttpProbe::new(&fresh.sampling) {
            Ok(probe) => {
                *cookie = fresh.sampling.cookie_header.clone();
                info!("new credentials found in config");
                orchestrator.replace_probe(Box::new(probe)).await;
            }
            Err(e) => warn!(error = %e, "new credentials unusable"),
        }
    }
}
