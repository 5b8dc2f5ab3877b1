//! SQLite-backed sample store.
//!
//! The working database lives in memory so every append is visible to the
//! next query immediately. Durability comes from checkpoints: an online
//! backup into `<file>.partial` followed by a rename onto the database
//! file. A checkpoint runs every `checkpoint_every` accepted samples, after
//! every ground-truth write or bulk delete, and when the caller asks for one
//! (graceful shutdown).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::backup::Progress;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::migrations;
use crate::error::StoreError;
use crate::time::{day_start, format_timestamp, parse_timestamp};

/// Default number of accepted samples between checkpoints.
pub const DEFAULT_CHECKPOINT_EVERY: u32 = 12;

/// One observation of the live listener count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSample {
    pub timestamp: DateTime<Utc>,
    pub count: u32,
}

impl ListenerSample {
    pub fn new(timestamp: DateTime<Utc>, count: u32) -> Self {
        Self { timestamp, count }
    }
}

/// Operator-entered ground truth for one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualStreamRecord {
    pub date: NaiveDate,
    pub streams: u64,
}

/// Average/max/min/count over a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub avg: f64,
    pub max: u32,
    pub min: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub aggregate: Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub hour: u8,
    #[serde(flatten)]
    pub aggregate: Aggregate,
}

/// Result of [`SampleStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendReceipt {
    pub id: i64,
    /// This append reached the checkpoint batch size.
    pub checkpointed: bool,
}

/// Whole-table summary used by the overview and status views.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSummary {
    pub total_records: u64,
    pub max_count: Option<u32>,
    pub min_count: Option<u32>,
    pub avg_count: Option<f64>,
    pub latest: Option<ListenerSample>,
}

struct Inner {
    conn: Connection,
    since_checkpoint: u32,
}

/// Time series of listener samples plus the sparse ground-truth table.
pub struct SampleStore {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
    checkpoint_every: u32,
}

impl SampleStore {
    /// Open the store backed by the database file at `path`.
    ///
    /// The file is restored into the working database when it exists;
    /// otherwise it is created by the first checkpoint.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or migrated.
    pub fn open(path: impl Into<PathBuf>, checkpoint_every: u32) -> Result<Self, StoreError> {
        let path = path.into();
        let mut conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: path.clone(),
            source,
        })?;

        if path.exists() {
            conn.restore(DatabaseName::Main, &path, None::<fn(Progress)>)
                .map_err(|source| StoreError::OpenFailed {
                    path: path.clone(),
                    source,
                })?;
            info!(path = %path.display(), "restored working database");
        } else if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::CheckpointFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
        }

        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                since_checkpoint: 0,
            }),
            path: Some(path),
            checkpoint_every: checkpoint_every.max(1),
        })
    }

    /// Open a store with no backing file. Checkpoints are no-ops.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                since_checkpoint: 0,
            }),
            path: None,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn checkpoint_every(&self) -> u32 {
        self.checkpoint_every
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    // ── writes ──────────────────────────────────────────────────────────

    /// Append one sample. Every `checkpoint_every`-th append also
    /// checkpoints; a failed checkpoint is logged, not returned.
    pub fn append(&self, sample: &ListenerSample) -> Result<AppendReceipt, StoreError> {
        let mut inner = self.lock()?;
        inner.conn.execute(
            "INSERT INTO listeners (timestamp, listener_count) VALUES (?1, ?2)",
            params![format_timestamp(&sample.timestamp), sample.count],
        )?;
        let id = inner.conn.last_insert_rowid();

        inner.since_checkpoint += 1;
        let checkpointed = inner.since_checkpoint >= self.checkpoint_every;
        if checkpointed {
            if let Err(e) = self.checkpoint_locked(&mut inner) {
                error!(error = %e, "periodic checkpoint failed");
            }
        }
        Ok(AppendReceipt { id, checkpointed })
    }

    /// Insert or replace the ground truth for `date`, then checkpoint.
    /// As with [`append`](Self::append), a failed checkpoint is logged.
    pub fn upsert_actual(&self, date: NaiveDate, streams: u64) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.conn.execute(
            "INSERT INTO actual_streams (date, streams, created_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(date) DO UPDATE SET
                streams = excluded.streams,
                created_at = excluded.created_at",
            params![date.to_string(), streams],
        )?;
        self.checkpoint_after_write(&mut inner, "ground truth upsert");
        Ok(())
    }

    /// Delete the ground truth for `date`. Returns whether a record existed.
    pub fn delete_actual(&self, date: NaiveDate) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let deleted = inner.conn.execute(
            "DELETE FROM actual_streams WHERE date = ?1",
            params![date.to_string()],
        )?;
        self.checkpoint_after_write(&mut inner, "ground truth delete");
        Ok(deleted > 0)
    }

    /// Delete every listener sample (ground truth is kept) and checkpoint.
    /// Returns the number of deleted samples.
    pub fn clear_samples(&self) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let deleted = inner.conn.execute("DELETE FROM listeners", [])?;
        inner
            .conn
            .execute("DELETE FROM sqlite_sequence WHERE name = 'listeners'", [])?;
        info!(deleted, "cleared listener samples");
        self.checkpoint_after_write(&mut inner, "sample clear");
        Ok(deleted as u64)
    }

    /// Insert samples whose timestamp is not already stored, then
    /// checkpoint. Returns the number inserted.
    pub fn import(&self, samples: &[ListenerSample]) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let mut inserted = 0u64;
        {
            let tx = inner.conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO listeners (timestamp, listener_count)
                     SELECT ?1, ?2
                     WHERE NOT EXISTS (SELECT 1 FROM listeners WHERE timestamp = ?1)",
                )?;
                for sample in samples {
                    inserted += stmt.execute(params![
                        format_timestamp(&sample.timestamp),
                        sample.count
                    ])? as u64;
                }
            }
            tx.commit()?;
        }
        self.checkpoint_after_write(&mut inner, "import");
        Ok(inserted)
    }

    /// Write the working database to the backing file now.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        self.checkpoint_locked(&mut inner)
    }

    /// Accepted samples since the last checkpoint.
    pub fn pending_samples(&self) -> Result<u32, StoreError> {
        Ok(self.lock()?.since_checkpoint)
    }

    /// The write is already live in the working database; a failed
    /// checkpoint only delays durability until the next one.
    fn checkpoint_after_write(&self, inner: &mut Inner, write: &'static str) {
        if let Err(e) = self.checkpoint_locked(inner) {
            error!(error = %e, write, "checkpoint after write failed");
        }
    }

    fn checkpoint_locked(&self, inner: &mut Inner) -> Result<(), StoreError> {
        // Reset first: a failed checkpoint still starts a new batch.
        let pending = std::mem::take(&mut inner.since_checkpoint);
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let partial = path.with_extension("db.partial");
        let fail = |message: String| StoreError::CheckpointFailed {
            path: path.to_path_buf(),
            message,
        };
        inner
            .conn
            .backup(DatabaseName::Main, &partial, None)
            .map_err(|e| fail(e.to_string()))?;
        std::fs::rename(&partial, path).map_err(|e| fail(e.to_string()))?;

        debug!(pending, path = %path.display(), "checkpoint written");
        Ok(())
    }

    // ── reads ───────────────────────────────────────────────────────────

    /// Samples in `[start, end)` in insertion order.
    pub fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ListenerSample>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT timestamp, listener_count FROM listeners
             WHERE timestamp >= ?1 AND timestamp < ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(
            params![format_timestamp(&start), format_timestamp(&end)],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
        )?;
        decode_samples(rows)
    }

    /// Samples at or after `start`, in insertion order.
    pub fn since(&self, start: DateTime<Utc>) -> Result<Vec<ListenerSample>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT timestamp, listener_count FROM listeners
             WHERE timestamp >= ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![format_timestamp(&start)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        decode_samples(rows)
    }

    /// Every sample, in insertion order.
    pub fn all(&self) -> Result<Vec<ListenerSample>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner
            .conn
            .prepare("SELECT timestamp, listener_count FROM listeners ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        decode_samples(rows)
    }

    /// The latest `limit` samples, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ListenerSample>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT timestamp, listener_count FROM listeners
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        let mut samples = decode_samples(rows)?;
        samples.reverse();
        Ok(samples)
    }

    /// The `limit` highest samples, ties broken by insertion order.
    pub fn peaks(&self, limit: usize) -> Result<Vec<ListenerSample>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT timestamp, listener_count FROM listeners
             ORDER BY listener_count DESC, id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        decode_samples(rows)
    }

    /// Aggregate over `[start, end)`; `None` when the interval is empty.
    pub fn aggregate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Aggregate>, StoreError> {
        let inner = self.lock()?;
        let row = inner.conn.query_row(
            "SELECT AVG(listener_count), MAX(listener_count), MIN(listener_count), COUNT(*)
             FROM listeners
             WHERE timestamp >= ?1 AND timestamp < ?2",
            params![format_timestamp(&start), format_timestamp(&end)],
            |row| {
                Ok((
                    row.get::<_, Option<f64>>(0)?,
                    row.get::<_, Option<u32>>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, u64>(3)?,
                ))
            },
        )?;
        Ok(match row {
            (Some(avg), Some(max), Some(min), count) if count > 0 => Some(Aggregate {
                avg,
                max,
                min,
                count,
            }),
            _ => None,
        })
    }

    /// Samples in `[start, end)` grouped by UTC hour of day. Hours without
    /// samples are absent.
    pub fn group_by_hour_of_day(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<u8, Aggregate>, StoreError> {
        self.hourly(Some((start, end)))
    }

    /// Hour-of-day grouping over the whole table.
    pub fn group_by_hour_all(&self) -> Result<BTreeMap<u8, Aggregate>, StoreError> {
        self.hourly(None)
    }

    fn hourly(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<BTreeMap<u8, Aggregate>, StoreError> {
        let (start, end) = match range {
            Some((start, end)) => (Some(format_timestamp(&start)), Some(format_timestamp(&end))),
            None => (None, None),
        };
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT CAST(strftime('%H', timestamp) AS INTEGER) AS hour,
                    AVG(listener_count), MAX(listener_count), MIN(listener_count), COUNT(*)
             FROM listeners
             WHERE (?1 IS NULL OR timestamp >= ?1) AND (?2 IS NULL OR timestamp < ?2)
             GROUP BY hour
             ORDER BY hour",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok((
                row.get::<_, u8>(0)?,
                Aggregate {
                    avg: row.get(1)?,
                    max: row.get(2)?,
                    min: row.get(3)?,
                    count: row.get(4)?,
                },
            ))
        })?;
        let mut hours = BTreeMap::new();
        for row in rows {
            let (hour, aggregate) = row?;
            hours.insert(hour, aggregate);
        }
        Ok(hours)
    }

    /// Per-UTC-day aggregates in `[start, end)`, oldest first.
    pub fn daily_aggregates(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailyAggregate>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT DATE(timestamp) AS day,
                    AVG(listener_count), MAX(listener_count), MIN(listener_count), COUNT(*)
             FROM listeners
             WHERE timestamp >= ?1 AND timestamp < ?2
             GROUP BY day
             ORDER BY day ASC",
        )?;
        let rows = stmt.query_map(
            params![format_timestamp(&start), format_timestamp(&end)],
            daily_row,
        )?;
        decode_days(rows)
    }

    /// One page of per-day aggregates, newest first.
    pub fn daily_page(&self, limit: usize, offset: usize) -> Result<Vec<DailyAggregate>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT DATE(timestamp) AS day,
                    AVG(listener_count), MAX(listener_count), MIN(listener_count), COUNT(*)
             FROM listeners
             GROUP BY day
             ORDER BY day DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], daily_row)?;
        decode_days(rows)
    }

    /// Number of distinct UTC days with at least one sample.
    pub fn count_days(&self) -> Result<u64, StoreError> {
        let inner = self.lock()?;
        Ok(inner.conn.query_row(
            "SELECT COUNT(DISTINCT DATE(timestamp)) FROM listeners",
            [],
            |row| row.get(0),
        )?)
    }

    /// Number of distinct UTC days with samples strictly before `date`.
    pub fn distinct_days_before(&self, date: NaiveDate) -> Result<u64, StoreError> {
        let inner = self.lock()?;
        Ok(inner.conn.query_row(
            "SELECT COUNT(DISTINCT DATE(timestamp)) FROM listeners WHERE timestamp < ?1",
            params![format_timestamp(&day_start(date))],
            |row| row.get(0),
        )?)
    }

    /// Earliest sample timestamp, if any.
    pub fn first_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.lock()?;
        let raw: Option<String> = inner
            .conn
            .query_row(
                "SELECT timestamp FROM listeners ORDER BY timestamp ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| decode_timestamp(&s)).transpose()
    }

    pub fn summary(&self) -> Result<StoreSummary, StoreError> {
        let inner = self.lock()?;
        let (total_records, max_count, min_count, avg_count) = inner.conn.query_row(
            "SELECT COUNT(*), MAX(listener_count), MIN(listener_count), AVG(listener_count)
             FROM listeners",
            [],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, Option<u32>>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            },
        )?;
        let latest = inner
            .conn
            .query_row(
                "SELECT timestamp, listener_count FROM listeners ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
            )
            .optional()?
            .map(|(ts, count)| decode_timestamp(&ts).map(|t| ListenerSample::new(t, count)))
            .transpose()?;

        Ok(StoreSummary {
            total_records,
            max_count,
            min_count,
            avg_count,
            latest,
        })
    }

    /// Ground-truth records, newest date first.
    pub fn list_actuals(&self) -> Result<Vec<ActualStreamRecord>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner
            .conn
            .prepare("SELECT date, streams FROM actual_streams ORDER BY date DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (date, streams) = row?;
            records.push(ActualStreamRecord {
                date: decode_date("actual_streams", &date)?,
                streams,
            });
        }
        Ok(records)
    }

    pub fn get_actual(&self, date: NaiveDate) -> Result<Option<u64>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .conn
            .query_row(
                "SELECT streams FROM actual_streams WHERE date = ?1",
                params![date.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Read a value from the key-value table.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Write a value to the key-value table. Persisted by the next checkpoint.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let inner = self.lock()?;
        inner.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn daily_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, Aggregate)> {
    Ok((
        row.get(0)?,
        Aggregate {
            avg: row.get(1)?,
            max: row.get(2)?,
            min: row.get(3)?,
            count: row.get(4)?,
        },
    ))
}

fn decode_samples<I>(rows: I) -> Result<Vec<ListenerSample>, StoreError>
where
    I: Iterator<Item = rusqlite::Result<(String, u32)>>,
{
    rows.map(|row| {
        let (ts, count) = row?;
        Ok(ListenerSample::new(decode_timestamp(&ts)?, count))
    })
    .collect()
}

fn decode_days<I>(rows: I) -> Result<Vec<DailyAggregate>, StoreError>
where
    I: Iterator<Item = rusqlite::Result<(String, Aggregate)>>,
{
    rows.map(|row| {
        let (day, aggregate) = row?;
        Ok(DailyAggregate {
            date: decode_date("listeners", &day)?,
            aggregate,
        })
    })
    .collect()
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(raw).map_err(|e| StoreError::CorruptRow {
        table: "listeners",
        message: format!("timestamp {raw:?}: {e}"),
    })
}

fn decode_date(table: &'static str, raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| StoreError::CorruptRow {
        table,
        message: format!("date {raw:?}: {e}"),
    })
}
