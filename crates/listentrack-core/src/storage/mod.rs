mod config;
mod inbox;
pub mod migrations;
pub mod store;

pub use config::{
    AnalysisConfig, Config, NotificationConfig, NotifyProvider, ReportsConfig, SamplingConfig,
    SessionConfig, SmtpConfig, StorageConfig,
};
pub use inbox::{AppliedRequest, DaemonLock, Inbox, StoreRequest};
pub use store::{
    ActualStreamRecord, Aggregate, AppendReceipt, DailyAggregate, HourlyAggregate,
    ListenerSample, SampleStore, StoreSummary,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/listentrack[-dev]/` based on LISTENTRACK_ENV.
///
/// Set LISTENTRACK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("LISTENTRACK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("listentrack-dev")
    } else {
        base_dir.join("listentrack")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
