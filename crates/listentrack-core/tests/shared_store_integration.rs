//! A daemon and the CLI working on the same database file.
//!
//! The daemon's checkpoints replace the file with its working copy, so
//! writes from other processes must reach it through the request inbox.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use listentrack_core::{DaemonLock, Inbox, ListenerSample, SampleStore, StoreRequest};

fn sample(i: i64) -> ListenerSample {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    ListenerSample::new(start + Duration::seconds(5 * i), 100)
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

#[test]
fn queued_ground_truth_survives_daemon_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listeners.db");

    let lock = DaemonLock::acquire(&path).unwrap();
    let daemon = SampleStore::open(&path, 12).unwrap();
    let inbox = Inbox::for_database(&path);

    // CLI side: a daemon owns the file, so the write is queued.
    assert!(DaemonLock::is_held(&path));
    inbox
        .submit(&StoreRequest::SetActual { date: day(1), streams: 48_000 })
        .unwrap();

    // Daemon side: apply before sampling, then a batch of samples.
    assert_eq!(inbox.apply_pending(&daemon).unwrap().len(), 1);
    for i in 1..=12 {
        daemon.append(&sample(i)).unwrap();
    }

    let reopened = SampleStore::open(&path, 12).unwrap();
    assert_eq!(reopened.get_actual(day(1)).unwrap(), Some(48_000));
    assert_eq!(reopened.summary().unwrap().total_records, 12);

    drop(lock);
    assert!(!DaemonLock::is_held(&path));
}

#[test]
fn queued_clear_and_import_are_not_undone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listeners.db");
    let _lock = DaemonLock::acquire(&path).unwrap();
    let daemon = SampleStore::open(&path, 12).unwrap();
    let inbox = Inbox::for_database(&path);
    for i in 1..=5 {
        daemon.append(&sample(i)).unwrap();
    }

    inbox.submit(&StoreRequest::ClearSamples).unwrap();
    inbox
        .submit(&StoreRequest::Import { samples: vec![sample(100), sample(101)] })
        .unwrap();
    inbox.apply_pending(&daemon).unwrap();

    for i in 200..212 {
        daemon.append(&sample(i)).unwrap();
    }
    let reopened = SampleStore::open(&path, 12).unwrap();
    assert_eq!(reopened.summary().unwrap().total_records, 14);
    assert!(inbox.pending().unwrap().is_empty());
}

#[test]
fn requests_queued_while_stopped_apply_on_next_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listeners.db");
    let inbox = Inbox::for_database(&path);
    inbox
        .submit(&StoreRequest::SetActual { date: day(2), streams: 900 })
        .unwrap();
    inbox.submit(&StoreRequest::DeleteActual { date: day(2) }).unwrap();
    inbox
        .submit(&StoreRequest::SetActual { date: day(3), streams: 700 })
        .unwrap();

    let _lock = DaemonLock::acquire(&path).unwrap();
    let daemon = SampleStore::open(&path, 12).unwrap();
    inbox.apply_pending(&daemon).unwrap();

    let reopened = SampleStore::open(&path, 12).unwrap();
    assert_eq!(reopened.get_actual(day(2)).unwrap(), None);
    assert_eq!(reopened.get_actual(day(3)).unwrap(), Some(700));
}
