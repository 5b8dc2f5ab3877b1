pub mod actual;
pub mod analysis;
pub mod config;
pub mod data;
pub mod notify;
pub mod report;
pub mod run;
pub mod stats;
pub mod status;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use listentrack_core::{Analytics, Config, DaemonLock, Inbox, NotificationCenter, SampleStore, StoreRequest};
use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn Error>>;

/// Resolved config plus where it came from.
pub struct Context {
    pub config_path: PathBuf,
    pub config: Config,
}

impl Context {
    pub fn load(path: Option<PathBuf>) -> Result<Self, Box<dyn Error>> {
        let config_path = match path {
            Some(path) => path,
            None => Config::default_path()?,
        };
        let config = Config::load_from(&config_path)?;
        Ok(Self {
            config_path,
            config,
        })
    }

    pub fn open_store(&self) -> Result<Arc<SampleStore>, Box<dyn Error>> {
        let path = self.config.database_path()?;
        Ok(Arc::new(SampleStore::open(
            path,
            self.config.storage.checkpoint_every,
        )?))
    }

    pub fn analytics(&self) -> Result<Analytics, Box<dyn Error>> {
        let store = self.open_store()?;
        let notifications = Arc::new(NotificationCenter::from_config(&self.config.notifications));
        Ok(Analytics::new(store, notifications, &self.config))
    }
}

/// How a store write was carried out.
pub enum Write {
    /// Queued for the running daemon, which applies it on its next tick.
    Queued(PathBuf),
    /// No daemon: apply directly through `Analytics`.
    Direct(Analytics),
}

impl Context {
    /// Route `request` to the daemon's inbox when a daemon owns the
    /// database, otherwise hand back `Analytics` for a direct write.
    pub fn write(&self, request: StoreRequest) -> Result<Write, Box<dyn Error>> {
        let db_path = self.config.database_path()?;
        if DaemonLock::is_held(&db_path) {
            let path = Inbox::for_database(&db_path).submit(&request)?;
            return Ok(Write::Queued(path));
        }
        Ok(Write::Direct(self.analytics()?))
    }
}

/// Output for a write handed to the daemon.
pub fn print_queued(path: &std::path::Path) -> CmdResult {
    print_json(&serde_json::json!({
        "queued": true,
        "request": path.display().to_string(),
    }))
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runtime for commands that talk to the network.
pub fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn Error>> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, Box<dyn Error>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{raw}' (expected YYYY-MM-DD): {e}").into())
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, Box<dyn Error>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = parse_date(raw)?;
    Ok(listentrack_core::time::day_start(date))
}
