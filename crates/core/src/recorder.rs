//! Size-rotated CSV log of every processed reading.
//!
//! [`RecordSink`] appends one `timestamp,raw,smoothed,state` row per
//! reading and flushes it straight to disk. Before each write the size
//! of the open file is checked; once it has reached the limit the file
//! is closed and a fresh timestamped one is started with its own header.
//!
//! I/O failures never propagate out of [`RecordSink::log_speed_data`].
//! They are reported as [`RecordEvent::Error`] and the sink drops its
//! file handle, staying silent until [`RecordSink::reopen`] succeeds.
//! The host decides when to retry.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::error::CoreError;
use crate::severity::SeverityState;
use crate::types::Timestamp;

/// Column header written at the top of every log file.
pub const CSV_HEADER: &str = "timestamp,raw_speed_kmh,smoothed_speed_kmh,expression_state";

/// Default rotation threshold: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

const FILE_PREFIX: &str = "speed_log_";
const FILE_EXTENSION: &str = "csv";

/// Settings for a [`RecordSink`].
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory receiving the log files; created if missing.
    pub log_dir: PathBuf,
    /// Rotate once the open file reaches this many bytes.
    pub max_file_size: u64,
    pub enabled: bool,
}

impl RecorderConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            enabled: true,
        }
    }
}

/// Something the caller should know about after a write.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    /// The previous file was full; logging continues in this new file.
    Rotated(PathBuf),
    /// Opening or writing failed. The sink holds no open file now.
    Error(String),
}

#[derive(Debug)]
struct OpenLog {
    path: PathBuf,
    file: File,
    size: u64,
}

/// Append-only CSV writer with size-based rotation.
#[derive(Debug)]
pub struct RecordSink {
    log_dir: PathBuf,
    max_file_size: u64,
    enabled: bool,
    current: Option<OpenLog>,
    #[cfg(test)]
    fail_next_write: bool,
}

impl RecordSink {
    /// Create the log directory if needed and open a new log file.
    pub fn open(config: RecorderConfig) -> Result<Self, CoreError> {
        let mut sink = Self::closed(config);
        sink.reopen()?;
        Ok(sink)
    }

    /// A sink with no open file. Every write is a no-op until
    /// [`reopen`](Self::reopen) succeeds.
    pub fn closed(config: RecorderConfig) -> Self {
        Self {
            log_dir: config.log_dir,
            max_file_size: config.max_file_size,
            enabled: config.enabled,
            current: None,
            #[cfg(test)]
            fail_next_write: false,
        }
    }

    /// Close the current file (if any) and start a new one.
    pub fn reopen(&mut self) -> Result<&Path, CoreError> {
        self.current = None;
        let log = open_log_file(&self.log_dir)?;
        tracing::info!(path = %log.path.display(), "Opened speed log file");
        Ok(self.current.insert(log).path.as_path())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        tracing::info!(enabled, "Speed logging toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_max_file_size(&mut self, max_file_size: u64) {
        self.max_file_size = max_file_size;
        tracing::info!(max_file_size, "Max log file size set");
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Path of the file currently written to.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    /// Append one row for a processed reading.
    ///
    /// A no-op when logging is disabled or no file is open. When the
    /// open file has reached the size limit it is rotated first.
    /// Returns what happened in order: a rotation, a failure, or a
    /// rotation followed by the failure of the row write.
    pub fn log_speed_data(
        &mut self,
        raw: f64,
        smoothed: f64,
        state: SeverityState,
    ) -> Vec<RecordEvent> {
        let mut events = Vec::new();
        if !self.enabled {
            return events;
        }
        let Some(size) = self.current.as_ref().map(|log| log.size) else {
            return events;
        };

        if size >= self.max_file_size {
            match self.rotate() {
                Ok(path) => events.push(RecordEvent::Rotated(path)),
                Err(e) => {
                    events.push(self.fail(e));
                    return events;
                }
            }
        }

        let row = format_row(Utc::now(), raw, smoothed, state);
        match self.write_line(&row) {
            Ok(()) => tracing::debug!(raw, smoothed, state = %state, "Logged speed row"),
            Err(e) => events.push(self.fail(e)),
        }
        events
    }

    fn rotate(&mut self) -> Result<PathBuf, CoreError> {
        let old = self.current.take().map(|log| log.path);
        tracing::info!(
            old = ?old,
            max_file_size = self.max_file_size,
            "Log file size limit reached, rotating",
        );
        let path = self.reopen()?.to_path_buf();
        Ok(path)
    }

    fn write_line(&mut self, line: &str) -> Result<(), CoreError> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_write) {
            let path = self.current_path().map(Path::to_path_buf).unwrap_or_default();
            return Err(CoreError::io(path, std::io::Error::other("disk full")));
        }
        match self.current.as_mut() {
            Some(log) => log.append(line),
            None => Ok(()),
        }
    }

    fn fail(&mut self, error: CoreError) -> RecordEvent {
        tracing::error!(error = %error, "Speed logging failed, logging suspended");
        self.current = None;
        RecordEvent::Error(error.to_string())
    }
}

impl OpenLog {
    /// Append `line` plus a newline and flush it.
    fn append(&mut self, line: &str) -> Result<(), CoreError> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        self.file
            .write_all(&bytes)
            .and_then(|()| self.file.flush())
            .map_err(|e| CoreError::io(&self.path, e))?;
        self.size += bytes.len() as u64;
        Ok(())
    }
}

/// Open a fresh log file in `dir`, writing the header if it is empty.
fn open_log_file(dir: &Path) -> Result<OpenLog, CoreError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;
        tracing::info!(dir = %dir.display(), "Created log directory");
    }

    let path = unused_log_path(dir, Utc::now());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| CoreError::io(&path, e))?;
    let size = file.metadata().map_err(|e| CoreError::io(&path, e))?.len();

    let mut log = OpenLog { path, file, size };
    if log.size == 0 {
        log.append(CSV_HEADER)?;
    }
    Ok(log)
}

/// `speed_log_YYYYMMDD_HHMMSS_mmm.csv`, with a numeric suffix when a
/// file of that name already exists.
fn unused_log_path(dir: &Path, now: Timestamp) -> PathBuf {
    let stamp = now.format("%Y%m%d_%H%M%S_%3f").to_string();
    let mut path = dir.join(format!("{FILE_PREFIX}{stamp}.{FILE_EXTENSION}"));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!("{FILE_PREFIX}{stamp}_{suffix}.{FILE_EXTENSION}"));
        suffix += 1;
    }
    path
}

/// Render one CSV row (without newline).
pub fn format_row(timestamp: Timestamp, raw: f64, smoothed: f64, state: SeverityState) -> String {
    format!(
        "{},{raw:.2},{smoothed:.2},{}",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        state.as_str(),
    )
}
