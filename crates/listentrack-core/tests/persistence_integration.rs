//! Checkpoint durability: what a fresh process sees after each write path.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use listentrack_core::{ListenerSample, SampleStore};

fn sample(i: i64) -> ListenerSample {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    ListenerSample::new(start + Duration::seconds(5 * i), 100 + i as u32)
}

fn durable_count(path: &std::path::Path) -> u64 {
    if !path.exists() {
        return 0;
    }
    SampleStore::open(path, 12)
        .unwrap()
        .summary()
        .unwrap()
        .total_records
}

#[test]
fn checkpoint_on_every_twelfth_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listeners.db");
    let store = SampleStore::open(&path, 12).unwrap();

    for i in 1..=11 {
        assert!(!store.append(&sample(i)).unwrap().checkpointed);
    }
    assert_eq!(durable_count(&path), 0);
    // Visible in the working database all along.
    assert_eq!(store.summary().unwrap().total_records, 11);

    assert!(store.append(&sample(12)).unwrap().checkpointed);
    assert_eq!(durable_count(&path), 12);

    for i in 13..=23 {
        assert!(!store.append(&sample(i)).unwrap().checkpointed);
    }
    assert_eq!(durable_count(&path), 12);
    assert!(store.append(&sample(24)).unwrap().checkpointed);
    assert_eq!(durable_count(&path), 24);
}

#[test]
fn explicit_checkpoint_persists_partial_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listeners.db");
    {
        let store = SampleStore::open(&path, 12).unwrap();
        for i in 1..=5 {
            store.append(&sample(i)).unwrap();
        }
        store.checkpoint().unwrap();
        assert_eq!(store.pending_samples().unwrap(), 0);
    }
    let reopened = SampleStore::open(&path, 12).unwrap();
    let samples = reopened.recent(10).unwrap();
    assert_eq!(samples.len(), 5);
    assert_eq!(samples[0], sample(1));
}

#[test]
fn ground_truth_writes_are_durable_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listeners.db");
    let store = SampleStore::open(&path, 12).unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    store.append(&sample(1)).unwrap();
    store.upsert_actual(day, 48_000).unwrap();

    let other = SampleStore::open(&path, 12).unwrap();
    assert_eq!(other.get_actual(day).unwrap(), Some(48_000));
    // The pending sample went out with the same checkpoint.
    assert_eq!(other.summary().unwrap().total_records, 1);
    assert_eq!(store.pending_samples().unwrap(), 0);

    assert!(store.delete_actual(day).unwrap());
    let other = SampleStore::open(&path, 12).unwrap();
    assert_eq!(other.get_actual(day).unwrap(), None);
}

#[test]
fn clear_is_durable_and_keeps_ground_truth() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listeners.db");
    let store = SampleStore::open(&path, 12).unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    for i in 1..=12 {
        store.append(&sample(i)).unwrap();
    }
    store.upsert_actual(day, 1_000).unwrap();

    assert_eq!(store.clear_samples().unwrap(), 12);
    let other = SampleStore::open(&path, 12).unwrap();
    assert_eq!(other.summary().unwrap().total_records, 0);
    assert_eq!(other.get_actual(day).unwrap(), Some(1_000));
}

#[test]
fn no_partial_file_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listeners.db");
    let store = SampleStore::open(&path, 1).unwrap();
    store.append(&sample(1)).unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["listeners.db".to_string()]);
}

#[test]
fn failed_checkpoint_after_write_keeps_the_write() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let path = data_dir.join("listeners.db");
    let store = SampleStore::open(&path, 12).unwrap();
    // The checkpoint target is gone from here on.
    std::fs::remove_dir_all(&data_dir).unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    store.upsert_actual(day, 48_000).unwrap();
    assert_eq!(store.get_actual(day).unwrap(), Some(48_000));
    assert_eq!(store.import(&[sample(1), sample(2)]).unwrap(), 2);
    assert!(store.delete_actual(day).unwrap());
    assert_eq!(store.clear_samples().unwrap(), 2);
    assert!(store.checkpoint().is_err());

    // Durability resumes once the directory is back.
    std::fs::create_dir_all(&data_dir).unwrap();
    store.upsert_actual(day, 50_000).unwrap();
    let other = SampleStore::open(&path, 12).unwrap();
    assert_eq!(other.get_actual(day).unwrap(), Some(50_000));
}
