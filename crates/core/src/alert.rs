//! User-facing alert levels derived from severity transitions.
//!
//! [`AlertSink`] collapses the five severity states into four alert
//! levels and only speaks up when the level itself changes. Raised
//! alerts are kept in a bounded history, oldest evicted first.

use std::collections::VecDeque;

use chrono::Utc;
use serde::Serialize;

use crate::severity::{SeverityState, StateTransition};
use crate::types::Timestamp;

/// Maximum number of raised alerts kept in history.
pub const ALERT_HISTORY_CAPACITY: usize = 100;

/// Notification level for the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Nothing to report.
    #[default]
    None,
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    /// Level raised for a given severity state.
    pub fn for_state(state: SeverityState) -> Self {
        match state {
            SeverityState::Relaxed | SeverityState::Normal => Self::None,
            SeverityState::Alert => Self::Info,
            SeverityState::Warning => Self::Warning,
            SeverityState::Scared => Self::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// One raised alert. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub timestamp: Timestamp,
    pub level: AlertLevel,
    pub message: String,
}

/// What the sink reports after a state change.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    Triggered { level: AlertLevel, message: String },
    Cleared,
}

/// Tracks the current alert level and the history of raised alerts.
#[derive(Debug)]
pub struct AlertSink {
    current_level: AlertLevel,
    history: VecDeque<AlertRecord>,
    capacity: usize,
}

impl Default for AlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSink {
    pub fn new() -> Self {
        Self::with_capacity(ALERT_HISTORY_CAPACITY)
    }

    /// A sink keeping at most `capacity` records (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            current_level: AlertLevel::None,
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn current_level(&self) -> AlertLevel {
        self.current_level
    }

    /// Raised alerts, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &AlertRecord> {
        self.history.iter()
    }

    /// React to a severity transition.
    ///
    /// Returns `None` when the mapped level did not change, so moving
    /// between two states with the same level never re-raises an alert.
    pub fn on_state_changed(&mut self, transition: StateTransition) -> Option<AlertEvent> {
        let level = AlertLevel::for_state(transition.new);
        if level == self.current_level {
            return None;
        }
        self.current_level = level;

        if level == AlertLevel::None {
            tracing::info!(state = %transition.new, "Alert cleared");
            return Some(AlertEvent::Cleared);
        }

        let message = alert_message(transition.new).to_string();
        self.push_record(AlertRecord {
            timestamp: Utc::now(),
            level,
            message: message.clone(),
        });
        tracing::info!(level = level.as_str(), message = %message, "Alert triggered");
        Some(AlertEvent::Triggered { level, message })
    }

    fn push_record(&mut self, record: AlertRecord) {
        self.history.push_back(record);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }
}

fn alert_message(state: SeverityState) -> &'static str {
    match state {
        SeverityState::Alert => "Speed is getting high. Please be cautious.",
        SeverityState::Warning => "Speed is very high! Slow down.",
        SeverityState::Scared => "CRITICAL: Speed is dangerously high! Reduce speed immediately!",
        SeverityState::Relaxed | SeverityState::Normal => "Normal operation",
    }
}
