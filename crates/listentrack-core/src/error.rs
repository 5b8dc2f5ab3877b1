//! Core error types for listentrack-core.
//!
//! One thiserror enum per concern, aggregated into [`CoreError`].
//! Only a store that cannot be opened at startup is fatal; everything
//! else is logged by the caller and retried on the next scheduled tick.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for listentrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Sample store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Probe transport errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Notification transport errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Store-specific errors (the persistence error class).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open or restore the database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Durable checkpoint failed
    #[error("Checkpoint to {path} failed: {message}")]
    CheckpointFailed { path: PathBuf, message: String },

    /// A stored value could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Request inbox could not be read or written
    #[error("Request inbox {path}: {message}")]
    Inbox { path: PathBuf, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The connection mutex was poisoned by a panicking writer
    #[error("Store connection poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine the data directory
    #[error("Cannot determine data directory: {0}")]
    DataDir(String),
}

/// Probe transport failures.
///
/// "Signal not found" is not an error; it is a [`crate::sampling::Reading`] with no count.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Network or page-level failure
    #[error("Probe transport failed: {0}")]
    Transport(String),

    /// The probe did not answer in time
    #[error("Probe timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The probe is misconfigured (bad URL, missing target)
    #[error("Probe misconfigured: {0}")]
    Misconfigured(String),
}

/// Notification transport failures.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Notifications are switched off
    #[error("Notifications are disabled")]
    Disabled,

    /// A required setting is missing
    #[error("Notifier not configured: {0}")]
    NotConfigured(String),

    /// Suppressed by the cooldown window
    #[error("Cooling down, next send allowed in {remaining_min} minute(s)")]
    CoolingDown { remaining_min: i64 },

    /// Provider rejected the message
    #[error("{provider} rejected the message (HTTP {status}): {body}")]
    Rejected {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// Transport-level failure
    #[error("{provider} transport failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be after start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_nests_into_core_error() {
        let err: CoreError = StoreError::Locked.into();
        assert_eq!(err.to_string(), "Store error: Database is locked");
    }

    #[test]
    fn cooldown_message_reports_minutes() {
        let err = NotifyError::CoolingDown { remaining_min: 12 };
        assert!(err.to_string().contains("12 minute"));
    }

    #[test]
    fn no_rows_maps_to_query_failed() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::QueryFailed(_)));
    }
}
