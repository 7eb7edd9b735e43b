use chrono::Utc;
use serde::Serialize;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Lowest plausible vehicle speed in km/h.
pub const MIN_SPEED_KMH: f64 = 0.0;

/// Highest plausible vehicle speed in km/h. Anything above is sensor noise.
pub const MAX_SPEED_KMH: f64 = 300.0;

/// One raw speed sample as received from the signal source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Raw speed in km/h.
    pub value: f64,
    /// Wall-clock time the sample was accepted.
    pub timestamp: Timestamp,
}

impl Reading {
    /// A reading stamped with the current time.
    pub fn new(value: f64) -> Self {
        Self::at(value, Utc::now())
    }

    pub fn at(value: f64, timestamp: Timestamp) -> Self {
        Self { value, timestamp }
    }
}
