//! Agent configuration.
//!
//! Loaded from a JSON file with one object per section. Every section
//! and every field is optional; anything missing takes its default.
//! Sections this agent does not use (`display`, `character`) are
//! ignored.
//!
//! ```json
//! {
//!   "speed_thresholds": { "relaxed_max": 20, "normal_max": 60,
//!                         "alert_max": 100, "warning_max": 120,
//!                         "hysteresis_margin": 2.0 },
//!   "afb": { "url": "ws://localhost:1234/api", "token": "",
//!            "reconnect_interval_ms": 1000, "max_retries": 5 },
//!   "smoothing": { "window_size": 5 },
//!   "logging": { "enabled": true, "level": "info",
//!                "log_dir": "/var/log/carspeedboy", "max_file_size_mb": 10 }
//! }
//! ```
//!
//! | Env Var           | Effect                                        |
//! |-------------------|-----------------------------------------------|
//! | `CARSPEED_CONFIG` | Config file path (default [`DEFAULT_CONFIG_PATH`]) |
//! | `AFB_URL`         | Overrides `afb.url`                           |
//! | `AFB_TOKEN`       | Overrides `afb.token`                         |

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use carspeed_core::classifier::DEFAULT_HYSTERESIS_MARGIN;
use carspeed_core::smoother::DEFAULT_WINDOW_SIZE;
use carspeed_core::{RecorderConfig, SpeedThresholds};
use carspeed_vss::messages::DEFAULT_SIGNAL_PATH;
use carspeed_vss::{ReconnectConfig, StreamConfig};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/carspeedboy/config.json";
pub const CONFIG_PATH_ENV: &str = "CARSPEED_CONFIG";
pub const URL_ENV: &str = "AFB_URL";
pub const TOKEN_ENV: &str = "AFB_TOKEN";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Full agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub speed_thresholds: ThresholdsSection,
    pub afb: AfbSection,
    pub smoothing: SmoothingSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsSection {
    pub relaxed_max: f64,
    pub normal_max: f64,
    pub alert_max: f64,
    pub warning_max: f64,
    pub hysteresis_margin: f64,
}

impl Default for ThresholdsSection {
    fn default() -> Self {
        let defaults = SpeedThresholds::default();
        Self {
            relaxed_max: defaults.relaxed_max,
            normal_max: defaults.normal_max,
            alert_max: defaults.alert_max,
            warning_max: defaults.warning_max,
            hysteresis_margin: DEFAULT_HYSTERESIS_MARGIN,
        }
    }
}

/// Connection to the signal bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AfbSection {
    pub url: String,
    pub token: String,
    /// Base delay of the exponential reconnect backoff.
    pub reconnect_interval_ms: u64,
    pub max_retries: u32,
    pub signal_path: String,
    /// Readings older than this count as stale.
    pub data_timeout_ms: u64,
}

impl Default for AfbSection {
    fn default() -> Self {
        Self {
            url: "ws://localhost:1234/api".into(),
            token: String::new(),
            reconnect_interval_ms: 1000,
            max_retries: 5,
            signal_path: DEFAULT_SIGNAL_PATH.into(),
            data_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSection {
    pub window_size: usize,
}

impl Default for SmoothingSection {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Whether speed rows are written to the CSV log.
    pub enabled: bool,
    /// Default `tracing` level when `RUST_LOG` is unset.
    pub level: String,
    pub log_dir: PathBuf,
    pub max_file_size_mb: u64,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".into(),
            log_dir: PathBuf::from("/var/log/carspeedboy"),
            max_file_size_mb: 10,
        }
    }
}

impl AppConfig {
    /// Path named by `CARSPEED_CONFIG`, or the default location.
    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Like [`from_file`](Self::from_file), but never fails: problems are
    /// logged and the defaults used instead.
    pub fn load(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Configuration loaded");
                config
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Using default configuration");
                Self::default()
            }
        }
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Apply `AFB_URL` / `AFB_TOKEN` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(URL_ENV).filter(|v| !v.is_empty()) {
            tracing::info!(url = %url, "Signal bus URL overridden from environment");
            self.afb.url = url;
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.is_empty()) {
            tracing::info!("Signal bus token overridden from environment");
            self.afb.token = token;
        }
    }

    pub fn thresholds(&self) -> SpeedThresholds {
        let section = &self.speed_thresholds;
        SpeedThresholds {
            relaxed_max: section.relaxed_max,
            normal_max: section.normal_max,
            alert_max: section.alert_max,
            warning_max: section.warning_max,
        }
    }

    pub fn hysteresis_margin(&self) -> f64 {
        self.speed_thresholds.hysteresis_margin
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            signal_path: self.afb.signal_path.clone(),
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(self.afb.reconnect_interval_ms),
                max_retries: self.afb.max_retries,
            },
            data_timeout: Duration::from_millis(self.afb.data_timeout_ms),
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            log_dir: self.logging.log_dir.clone(),
            max_file_size: self.logging.max_file_size_mb.saturating_mul(BYTES_PER_MB),
            enabled: self.logging.enabled,
        }
    }

    /// Filter for the config at `path`, read before any subscriber is
    /// installed. Falls back to the default level without logging.
    pub fn log_filter_for(path: &Path) -> String {
        Self::from_file(path)
            .unwrap_or_default()
            .default_log_filter()
    }

    /// `tracing` filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> String {
        let level = &self.logging.level;
        format!("carspeed_agent={level},carspeed_vss={level},carspeed_core={level}")
    }
}
