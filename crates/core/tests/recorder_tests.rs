//! Integration tests for the rotating CSV speed log.
//!
//! Every test works in its own temporary directory and inspects the
//! files the sink leaves behind.

use std::fs;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use carspeed_core::recorder::{RecordEvent, RecordSink, RecorderConfig, CSV_HEADER};
use carspeed_core::{CoreError, SeverityState};

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("log file should be readable")
        .lines()
        .map(str::to_string)
        .collect()
}

fn log_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

// ---------------------------------------------------------------------------
// Test: construction creates the directory and writes the header
// ---------------------------------------------------------------------------

#[test]
fn open_creates_missing_directory_and_header() {
    let root = tempfile::tempdir().unwrap();
    let log_dir = root.path().join("nested").join("logs");

    let sink = RecordSink::open(RecorderConfig::new(&log_dir)).expect("sink should open");

    assert!(log_dir.is_dir());
    let path = sink.current_path().unwrap();
    assert!(path.starts_with(&log_dir));
    assert_eq!(path.extension().unwrap(), "csv");
    assert_eq!(lines(path), vec![CSV_HEADER.to_string()]);
}

// ---------------------------------------------------------------------------
// Test: rows follow the header in call order
// ---------------------------------------------------------------------------

#[test]
fn rows_are_appended_after_header() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = RecordSink::open(RecorderConfig::new(dir.path())).unwrap();

    assert!(sink.log_speed_data(10.0, 10.0, SeverityState::Relaxed).is_empty());
    assert!(sink.log_speed_data(35.5, 22.75, SeverityState::Normal).is_empty());

    let content = lines(sink.current_path().unwrap());
    assert_eq!(content.len(), 3);
    assert_eq!(content[0], CSV_HEADER);
    assert!(content[1].ends_with(",10.00,10.00,RELAXED"), "{}", content[1]);
    assert!(content[2].ends_with(",35.50,22.75,NORMAL"), "{}", content[2]);

    let timestamp = content[1].split(',').next().unwrap();
    assert!(
        chrono::DateTime::parse_from_rfc3339(timestamp).is_ok(),
        "timestamp should be ISO-8601: {timestamp}"
    );
}

// ---------------------------------------------------------------------------
// Test: disabling suppresses writes until re-enabled
// ---------------------------------------------------------------------------

#[test]
fn disabled_sink_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RecorderConfig::new(dir.path());
    config.enabled = false;
    let mut sink = RecordSink::open(config).unwrap();

    sink.log_speed_data(50.0, 50.0, SeverityState::Normal);
    assert_eq!(lines(sink.current_path().unwrap()).len(), 1);

    sink.set_enabled(true);
    sink.log_speed_data(50.0, 50.0, SeverityState::Normal);
    assert_eq!(lines(sink.current_path().unwrap()).len(), 2);
}

// ---------------------------------------------------------------------------
// Test: rotation happens exactly when size >= max_file_size
// ---------------------------------------------------------------------------

#[test]
fn rotates_when_size_reaches_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = RecordSink::open(RecorderConfig::new(dir.path())).unwrap();
    sink.log_speed_data(90.0, 85.0, SeverityState::Alert);

    let first = sink.current_path().unwrap().to_path_buf();
    let size = fs::metadata(&first).unwrap().len();

    // One byte of headroom: no rotation yet.
    sink.set_max_file_size(size + 1);
    assert!(sink.log_speed_data(91.0, 86.0, SeverityState::Alert).is_empty());
    assert_eq!(sink.current_path().unwrap(), first.as_path());

    // Now well past the limit: the next write rotates.
    let events = sink.log_speed_data(92.0, 87.0, SeverityState::Alert);
    let second = sink.current_path().unwrap().to_path_buf();

    assert_eq!(events, vec![RecordEvent::Rotated(second.clone())]);
    assert_ne!(first, second);
    assert_eq!(lines(&first).len(), 3);
}

#[test]
fn rotation_triggers_at_exact_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = RecordSink::open(RecorderConfig::new(dir.path())).unwrap();
    sink.log_speed_data(90.0, 85.0, SeverityState::Alert);

    let first = sink.current_path().unwrap().to_path_buf();
    sink.set_max_file_size(fs::metadata(&first).unwrap().len());

    assert_matches!(
        sink.log_speed_data(91.0, 86.0, SeverityState::Alert).as_slice(),
        [RecordEvent::Rotated(_)]
    );
}

// ---------------------------------------------------------------------------
// Test: every rotated file starts with the header
// ---------------------------------------------------------------------------

#[test]
fn every_file_starts_with_header() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RecorderConfig::new(dir.path());
    config.max_file_size = 1;
    let mut sink = RecordSink::open(config).unwrap();

    let mut rotations = 0;
    for i in 0..5 {
        let speed = 100.0 + f64::from(i);
        if let [RecordEvent::Rotated(_)] =
            sink.log_speed_data(speed, speed, SeverityState::Warning).as_slice()
        {
            rotations += 1;
        }
    }

    // The header alone already reaches the 1-byte limit.
    assert_eq!(rotations, 5);
    let files = log_files(dir.path());
    assert_eq!(files.len(), 6);
    for file in &files {
        assert_eq!(lines(file)[0], CSV_HEADER);
        assert!(lines(file).len() <= 2);
    }
}

// ---------------------------------------------------------------------------
// Test: open failures are reported and leave the sink closed
// ---------------------------------------------------------------------------

#[test]
fn open_fails_when_directory_cannot_be_created() {
    let root = tempfile::tempdir().unwrap();
    let blocker = root.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();

    let result = RecordSink::open(RecorderConfig::new(blocker.join("logs")));
    assert_matches!(result, Err(CoreError::Io { .. }));
}

#[test]
fn failed_rotation_suspends_logging_until_reopen() {
    let root = tempfile::tempdir().unwrap();
    let log_dir = root.path().join("logs");
    let mut sink = RecordSink::open(RecorderConfig::new(&log_dir)).unwrap();
    sink.set_max_file_size(1);

    // Replace the directory with a plain file so the next open fails.
    fs::remove_dir_all(&log_dir).unwrap();
    fs::write(&log_dir, "in the way").unwrap();

    assert_matches!(
        sink.log_speed_data(130.0, 125.0, SeverityState::Scared).as_slice(),
        [RecordEvent::Error(_)]
    );
    assert!(!sink.is_open());
    assert!(sink.log_speed_data(130.0, 125.0, SeverityState::Scared).is_empty());

    fs::remove_file(&log_dir).unwrap();
    sink.set_max_file_size(u64::MAX);
    let path = sink.reopen().expect("reopen should succeed").to_path_buf();

    assert!(sink.log_speed_data(130.0, 125.0, SeverityState::Scared).is_empty());
    assert_eq!(lines(&path).len(), 2);
}
