//! The five ordered severity states a smoothed speed can fall into.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity bucket for the current speed, ordered from calmest to most
/// dangerous.
///
/// Serializes to the canonical uppercase name used in the CSV log.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityState {
    #[default]
    Relaxed,
    Normal,
    Alert,
    Warning,
    Scared,
}

impl SeverityState {
    /// Every state, lowest first.
    pub const ALL: [SeverityState; 5] = [
        SeverityState::Relaxed,
        SeverityState::Normal,
        SeverityState::Alert,
        SeverityState::Warning,
        SeverityState::Scared,
    ];

    /// Canonical uppercase name (`RELAXED`, `NORMAL`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relaxed => "RELAXED",
            Self::Normal => "NORMAL",
            Self::Alert => "ALERT",
            Self::Warning => "WARNING",
            Self::Scared => "SCARED",
        }
    }

    /// Lowercase name handed to display collaborators.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Relaxed => "relaxed",
            Self::Normal => "normal",
            Self::Alert => "alert",
            Self::Warning => "warning",
            Self::Scared => "scared",
        }
    }
}

impl fmt::Display for SeverityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change of severity state. `old` and `new` always differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub old: SeverityState,
    pub new: SeverityState,
}
