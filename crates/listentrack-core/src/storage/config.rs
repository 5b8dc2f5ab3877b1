//! TOML-based application configuration.
//!
//! Covers:
//! - Sampling target, cadence and probe transport
//! - Session thresholds (alert and reload)
//! - Database file and checkpoint batch size
//! - Notification provider, recipients and cooldown
//! - Scheduled report switches
//! - Calibration and prediction tuning
//!
//! Configuration is stored at `~/.config/listentrack/config.toml` unless a
//! path is given explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Probe target and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_target_url")]
    pub target_url: String,
    /// Raw `Cookie` header sent with every probe request.
    #[serde(default)]
    pub cookie_header: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Substrings of the final page URL that mean the session expired.
    #[serde(default = "default_login_markers")]
    pub login_markers: Vec<String>,
}

/// Consecutive-failure thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_notify_after_errors")]
    pub notify_after_errors: u32,
    #[serde(default = "default_reload_after_errors")]
    pub reload_after_errors: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `<data_dir>/listeners.db`.
    #[serde(default)]
    pub database_file: Option<PathBuf>,
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u32,
}

/// Mail transport used for alerts and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyProvider {
    Resend,
    Smtp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Implicit TLS (port 465 style). STARTTLS is used otherwise.
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: NotifyProvider,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    #[serde(default)]
    pub to: String,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default)]
    pub resend_api_key: String,
    #[serde(default = "default_resend_endpoint")]
    pub resend_endpoint: String,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default)]
    pub daily: bool,
    #[serde(default)]
    pub weekly: bool,
    #[serde(default)]
    pub monthly: bool,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

/// Calibration and prediction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Streams per average listener used when no ground truth exists.
    #[serde(default = "default_factor")]
    pub default_factor: f64,
    #[serde(default = "default_max_history_days")]
    pub max_history_days: u32,
    #[serde(default = "default_trend_threshold_pct")]
    pub trend_threshold_pct: f64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/listentrack/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

// Default functions
fn default_interval_secs() -> u64 {
    5
}
fn default_target_url() -> String {
    "https://artists.spotify.com/".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("listentrack/", env!("CARGO_PKG_VERSION")).into()
}
fn default_login_markers() -> Vec<String> {
    vec!["accounts.spotify.com".into(), "login".into()]
}
fn default_notify_after_errors() -> u32 {
    5
}
fn default_reload_after_errors() -> u32 {
    10
}
fn default_checkpoint_every() -> u32 {
    super::store::DEFAULT_CHECKPOINT_EVERY
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_provider() -> NotifyProvider {
    NotifyProvider::Resend
}
fn default_cooldown_minutes() -> u32 {
    30
}
fn default_from() -> String {
    "Listentrack <onboarding@resend.dev>".into()
}
fn default_subject_prefix() -> String {
    "[listentrack]".into()
}
fn default_resend_endpoint() -> String {
    "https://api.resend.com/emails".into()
}
fn default_check_interval_secs() -> u64 {
    300
}
fn default_factor() -> f64 {
    480.0
}
fn default_max_history_days() -> u32 {
    7
}
fn default_trend_threshold_pct() -> f64 {
    5.0
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            target_url: default_target_url(),
            cookie_header: None,
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            login_markers: default_login_markers(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            notify_after_errors: default_notify_after_errors(),
            reload_after_errors: default_reload_after_errors(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: None,
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            secure: false,
            user: String::new(),
            pass: String::new(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            cooldown_minutes: default_cooldown_minutes(),
            to: String::new(),
            from: default_from(),
            subject_prefix: default_subject_prefix(),
            resend_api_key: String::new(),
            resend_endpoint: default_resend_endpoint(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            daily: false,
            weekly: false,
            monthly: false,
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_factor: default_factor(),
            max_history_days: default_max_history_days(),
            trend_threshold_pct: default_trend_threshold_pct(),
        }
    }
}

impl NotificationConfig {
    /// Copy with secrets replaced by a fixed mask, for status output.
    pub fn masked(&self) -> Self {
        fn mask(secret: &str) -> String {
            if secret.is_empty() {
                String::new()
            } else {
                "********".into()
            }
        }
        let mut copy = self.clone();
        copy.resend_api_key = mask(&self.resend_api_key);
        copy.smtp.pass = mask(&self.smtp.pass);
        copy
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default config file location.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`, writing defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let fail = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| fail(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| fail(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. The new value must parse
    /// as the type of the existing one. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Resolved database file path.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database_file {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("listeners.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sampling.interval_secs, 5);
        assert_eq!(parsed.notifications.provider, NotifyProvider::Resend);
        assert_eq!(parsed.sampling.login_markers, default_login_markers());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            "[session]\nnotify_after_errors = 3\n\n[notifications]\nprovider = \"smtp\"\n",
        )
        .unwrap();
        assert_eq!(parsed.session.notify_after_errors, 3);
        assert_eq!(parsed.session.reload_after_errors, 10);
        assert_eq!(parsed.notifications.provider, NotifyProvider::Smtp);
        assert_eq!(parsed.notifications.smtp.port, 587);
        assert_eq!(parsed.analysis.default_factor, 480.0);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("session.reload_after_errors").as_deref(), Some("10"));
        assert_eq!(cfg.get("notifications.smtp.port").as_deref(), Some("587"));
        assert_eq!(cfg.get("reports.daily").as_deref(), Some("false"));
        assert!(cfg.get("session.missing_key").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.set("reports.weekly", "true").unwrap();
        cfg.set("notifications.cooldown_minutes", "45").unwrap();
        cfg.set("analysis.trend_threshold_pct", "7.5").unwrap();
        cfg.set("notifications.provider", "smtp").unwrap();
        cfg.set("sampling.cookie_header", "sp_dc=abc").unwrap();
        assert!(cfg.reports.weekly);
        assert_eq!(cfg.notifications.cooldown_minutes, 45);
        assert_eq!(cfg.analysis.trend_threshold_pct, 7.5);
        assert_eq!(cfg.notifications.provider, NotifyProvider::Smtp);
        assert_eq!(cfg.sampling.cookie_header.as_deref(), Some("sp_dc=abc"));
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("session.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("reports.daily", "not_a_bool"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("notifications.provider", "carrier-pigeon"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.storage.checkpoint_every, 12);

        let mut edited = cfg.clone();
        edited.set("storage.checkpoint_every", "24").unwrap();
        edited.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().storage.checkpoint_every, 24);
    }

    #[test]
    fn masked_hides_secrets() {
        let mut cfg = NotificationConfig::default();
        cfg.resend_api_key = "re_live_123".into();
        let masked = cfg.masked();
        assert_eq!(masked.resend_api_key, "********");
        assert_eq!(masked.smtp.pass, "");
    }
}
