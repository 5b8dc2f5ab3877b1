//! Write requests from other processes while the daemon owns the store.
//!
//! The daemon's working database is private and every checkpoint replaces
//! the database file, so a write made directly to the file by another
//! process would be lost. While the daemon holds its [`DaemonLock`], the
//! CLI drops [`StoreRequest`]s into the [`Inbox`] directory instead and the
//! daemon applies them to its own store, where the usual checkpoint after
//! each write makes them durable.
//!
//! Files next to the database:
//! - `<db>.lock`: pid of the running daemon
//! - `<db>.inbox/*.json`: one pending request per file, applied in name order

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::store::{ListenerSample, SampleStore};
use crate::error::StoreError;

fn sibling(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn inbox_error(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::Inbox {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Marks the database as owned by a running daemon. Removed on drop.
#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
}

impl DaemonLock {
    pub fn path_for(db_path: &Path) -> PathBuf {
        sibling(db_path, ".lock")
    }

    /// Whether a daemon currently claims the database at `db_path`.
    pub fn is_held(db_path: &Path) -> bool {
        Self::path_for(db_path).exists()
    }

    /// Claim the database. A lock left behind by a crashed daemon is
    /// replaced with a warning.
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be written.
    pub fn acquire(db_path: &Path) -> Result<Self, StoreError> {
        let path = Self::path_for(db_path);
        if let Ok(previous) = std::fs::read_to_string(&path) {
            warn!(path = %path.display(), pid = previous.trim(), "replacing existing daemon lock");
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| inbox_error(&path, e))?;
        }
        std::fs::write(&path, std::process::id().to_string()).map_err(|e| inbox_error(&path, e))?;
        Ok(Self { path })
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "cannot remove daemon lock");
        }
    }
}

/// A store write queued for the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreRequest {
    SetActual { date: NaiveDate, streams: u64 },
    DeleteActual { date: NaiveDate },
    ClearSamples,
    Import { samples: Vec<ListenerSample> },
}

/// What applying one request did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AppliedRequest {
    SetActual { date: NaiveDate, streams: u64 },
    DeleteActual { date: NaiveDate, existed: bool },
    ClearSamples { deleted: u64 },
    Import { source_records: u64, inserted: u64 },
}

impl StoreRequest {
    /// Apply to `store`. Each write checkpoints on its own.
    pub fn apply(&self, store: &SampleStore) -> Result<AppliedRequest, StoreError> {
        Ok(match self {
            StoreRequest::SetActual { date, streams } => {
                store.upsert_actual(*date, *streams)?;
                AppliedRequest::SetActual {
                    date: *date,
                    streams: *streams,
                }
            }
            StoreRequest::DeleteActual { date } => AppliedRequest::DeleteActual {
                date: *date,
                existed: store.delete_actual(*date)?,
            },
            StoreRequest::ClearSamples => AppliedRequest::ClearSamples {
                deleted: store.clear_samples()?,
            },
            StoreRequest::Import { samples } => AppliedRequest::Import {
                source_records: samples.len() as u64,
                inserted: store.import(samples)?,
            },
        })
    }
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Directory of pending [`StoreRequest`]s for one database.
#[derive(Debug, Clone)]
pub struct Inbox {
    dir: PathBuf,
}

impl Inbox {
    pub fn for_database(db_path: &Path) -> Self {
        Self {
            dir: sibling(db_path, ".inbox"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue `request`. The file appears atomically under its final name.
    ///
    /// # Errors
    /// Returns an error if the request cannot be written.
    pub fn submit(&self, request: &StoreRequest) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| inbox_error(&self.dir, e))?;
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let name = format!("{stamp:020}-{:010}-{seq:06}", std::process::id());

        let staged = self.dir.join(format!("{name}.tmp"));
        let path = self.dir.join(format!("{name}.json"));
        let body = serde_json::to_vec(request).map_err(|e| inbox_error(&staged, e))?;
        std::fs::write(&staged, body).map_err(|e| inbox_error(&staged, e))?;
        std::fs::rename(&staged, &path).map_err(|e| inbox_error(&path, e))?;
        Ok(path)
    }

    /// Request files waiting to be applied, oldest first.
    pub fn pending(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(inbox_error(&self.dir, e)),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| inbox_error(&self.dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Apply every pending request to `store` in submission order.
    ///
    /// A request file that cannot be decoded is renamed to `*.rejected`
    /// and skipped. A store failure stops the pass and leaves the request
    /// in place for the next one.
    ///
    /// # Errors
    /// Returns the first store or inbox error.
    pub fn apply_pending(&self, store: &SampleStore) -> Result<Vec<AppliedRequest>, StoreError> {
        let mut applied = Vec::new();
        for path in self.pending()? {
            let request = std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    serde_json::from_slice::<StoreRequest>(&raw).map_err(|e| e.to_string())
                });
            let request = match request {
                Ok(request) => request,
                Err(message) => {
                    error!(path = %path.display(), %message, "rejecting unreadable request");
                    std::fs::rename(&path, path.with_extension("rejected"))
                        .map_err(|e| inbox_error(&path, e))?;
                    continue;
                }
            };

            let outcome = request.apply(store)?;
            std::fs::remove_file(&path).map_err(|e| inbox_error(&path, e))?;
            info!(request = ?outcome, "applied queued store request");
            applied.push(outcome);
        }
        Ok(applied)
    }
}
