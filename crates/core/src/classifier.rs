//! Hysteresis state machine mapping smoothed speed to a [`SeverityState`].
//!
//! Pure logic with no I/O. The classifier remembers the previous speed so
//! it can tell rising input from flat or falling input: the hysteresis
//! margin is added to every cut point only when the new value is not
//! greater than the previous one. A value belongs to the first state
//! whose `threshold + margin` it does not exceed.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::severity::{SeverityState, StateTransition};

pub const DEFAULT_HYSTERESIS_MARGIN: f64 = 2.0;

/// Upper bounds (inclusive, km/h) of the four lower severity states.
/// Anything above `warning_max` is [`SeverityState::Scared`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedThresholds {
    pub relaxed_max: f64,
    pub normal_max: f64,
    pub alert_max: f64,
    pub warning_max: f64,
}

impl Default for SpeedThresholds {
    fn default() -> Self {
        Self {
            relaxed_max: 20.0,
            normal_max: 60.0,
            alert_max: 100.0,
            warning_max: 120.0,
        }
    }
}

impl SpeedThresholds {
    /// Cut points paired with the state each one bounds, lowest first.
    fn cut_points(&self) -> [(f64, SeverityState); 4] {
        [
            (self.relaxed_max, SeverityState::Relaxed),
            (self.normal_max, SeverityState::Normal),
            (self.alert_max, SeverityState::Alert),
            (self.warning_max, SeverityState::Warning),
        ]
    }

    /// Cut points must be finite and strictly ascending.
    pub fn validate(&self) -> Result<(), CoreError> {
        let points = self.cut_points();
        if let Some((value, state)) = points.iter().find(|(v, _)| !v.is_finite()) {
            return Err(CoreError::Validation(format!(
                "threshold for {state} must be finite, got {value}"
            )));
        }
        for pair in points.windows(2) {
            let ((lower, lower_state), (upper, upper_state)) = (pair[0], pair[1]);
            if lower >= upper {
                return Err(CoreError::Validation(format!(
                    "threshold for {lower_state} ({lower}) must be below {upper_state} ({upper})"
                )));
            }
        }
        Ok(())
    }
}

/// Severity classifier with direction-dependent hysteresis.
#[derive(Debug, Clone)]
pub struct Classifier {
    thresholds: SpeedThresholds,
    margin: f64,
    current: SeverityState,
    last_speed: f64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            thresholds: SpeedThresholds::default(),
            margin: DEFAULT_HYSTERESIS_MARGIN,
            current: SeverityState::Relaxed,
            last_speed: 0.0,
        }
    }
}

impl Classifier {
    /// Build a classifier starting in [`SeverityState::Relaxed`].
    pub fn new(thresholds: SpeedThresholds, margin: f64) -> Result<Self, CoreError> {
        thresholds.validate()?;
        if !margin.is_finite() || margin < 0.0 {
            return Err(CoreError::Validation(format!(
                "hysteresis margin must be a non-negative number, got {margin}"
            )));
        }
        Ok(Self {
            thresholds,
            margin,
            ..Self::default()
        })
    }

    /// Replace the thresholds. The current state is kept until the next
    /// [`update_speed`](Self::update_speed).
    pub fn set_thresholds(&mut self, thresholds: SpeedThresholds) -> Result<(), CoreError> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        tracing::info!(
            relaxed_max = thresholds.relaxed_max,
            normal_max = thresholds.normal_max,
            alert_max = thresholds.alert_max,
            warning_max = thresholds.warning_max,
            "Speed thresholds set",
        );
        Ok(())
    }

    pub fn thresholds(&self) -> &SpeedThresholds {
        &self.thresholds
    }

    pub fn current_state(&self) -> SeverityState {
        self.current
    }

    pub fn last_speed(&self) -> f64 {
        self.last_speed
    }

    /// Classify `speed` and return the transition if the state changed.
    ///
    /// `speed` becomes the reference for the next hysteresis decision
    /// whether or not a transition happened.
    pub fn update_speed(&mut self, speed: f64) -> Option<StateTransition> {
        let candidate = self.determine_state(speed);
        self.last_speed = speed;

        if candidate == self.current {
            return None;
        }

        let transition = StateTransition {
            old: self.current,
            new: candidate,
        };
        self.current = candidate;
        tracing::debug!(
            old = %transition.old,
            new = %transition.new,
            speed,
            "Severity state changed",
        );
        Some(transition)
    }

    fn determine_state(&self, speed: f64) -> SeverityState {
        let margin = if speed > self.last_speed {
            0.0
        } else {
            self.margin
        };

        self.thresholds
            .cut_points()
            .into_iter()
            .find(|(max, _)| speed <= max + margin)
            .map(|(_, state)| state)
            .unwrap_or(SeverityState::Scared)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn transition(old: SeverityState, new: SeverityState) -> Option<StateTransition> {
        Some(StateTransition { old, new })
    }

    #[test]
    fn starts_relaxed() {
        let classifier = Classifier::default();
        assert_eq!(classifier.current_state(), SeverityState::Relaxed);
        assert_eq!(classifier.last_speed(), 0.0);
    }

    #[test]
    fn rising_sequence_walks_every_state_once() {
        use SeverityState::*;
        let mut c = Classifier::default();

        assert_eq!(c.update_speed(10.0), None);
        assert_eq!(c.update_speed(40.0), transition(Relaxed, Normal));
        assert_eq!(c.update_speed(80.0), transition(Normal, Alert));
        assert_eq!(c.update_speed(110.0), transition(Alert, Warning));
        assert_eq!(c.update_speed(150.0), transition(Warning, Scared));
    }

    #[test]
    fn rising_crossings_use_raw_thresholds() {
        use SeverityState::*;
        let mut c = Classifier::default();

        assert_eq!(c.update_speed(20.0), None);
        assert_eq!(c.update_speed(20.5), transition(Relaxed, Normal));
        assert_eq!(c.update_speed(60.0), None);
        assert_eq!(c.update_speed(61.0), transition(Normal, Alert));
        assert_eq!(c.update_speed(121.0), transition(Alert, Scared));
    }

    #[test]
    fn falling_reading_within_margin_drops_state() {
        let mut c = Classifier::default();
        c.update_speed(30.0);
        assert_eq!(c.current_state(), SeverityState::Normal);

        // 21 <= relaxed_max + margin (22)
        assert_eq!(
            c.update_speed(21.0),
            transition(SeverityState::Normal, SeverityState::Relaxed)
        );
    }

    #[test]
    fn falling_reading_beyond_margin_keeps_state() {
        let mut c = Classifier::default();
        c.update_speed(30.0);

        // 22.5 > 22, still Normal
        assert_eq!(c.update_speed(22.5), None);
        assert_eq!(c.current_state(), SeverityState::Normal);
    }

    #[test]
    fn exact_margin_boundary_is_inclusive() {
        let mut c = Classifier::default();
        c.update_speed(30.0);
        assert_eq!(
            c.update_speed(22.0),
            transition(SeverityState::Normal, SeverityState::Relaxed)
        );
    }

    #[test]
    fn flat_reading_applies_margin() {
        let mut c = Classifier::default();
        c.update_speed(61.0);
        assert_eq!(c.current_state(), SeverityState::Alert);

        // Same value again counts as not rising: 61 <= 60 + 2.
        assert_eq!(
            c.update_speed(61.0),
            transition(SeverityState::Alert, SeverityState::Normal)
        );
    }

    #[test]
    fn repeated_state_emits_nothing() {
        let mut c = Classifier::default();
        assert!(c.update_speed(30.0).is_some());
        assert_eq!(c.update_speed(40.0), None);
        assert_eq!(c.update_speed(45.0), None);
        assert_eq!(c.last_speed(), 45.0);
    }

    #[test]
    fn last_speed_tracks_every_update() {
        let mut c = Classifier::default();
        c.update_speed(50.0);
        c.update_speed(55.0);
        assert_eq!(c.last_speed(), 55.0);
    }

    #[test]
    fn custom_thresholds_and_margin() {
        let thresholds = SpeedThresholds {
            relaxed_max: 10.0,
            normal_max: 30.0,
            alert_max: 50.0,
            warning_max: 70.0,
        };
        let mut c = Classifier::new(thresholds, 5.0).unwrap();

        assert_eq!(
            c.update_speed(40.0),
            transition(SeverityState::Relaxed, SeverityState::Alert)
        );
        // Falling to 34: 34 <= 30 + 5
        assert_eq!(
            c.update_speed(34.0),
            transition(SeverityState::Alert, SeverityState::Normal)
        );
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let thresholds = SpeedThresholds {
            normal_max: 10.0,
            ..SpeedThresholds::default()
        };
        assert_matches!(
            Classifier::new(thresholds, 2.0),
            Err(CoreError::Validation(_))
        );

        let mut c = Classifier::default();
        assert!(c.set_thresholds(thresholds).is_err());
        assert_eq!(*c.thresholds(), SpeedThresholds::default());
    }

    #[test]
    fn rejects_bad_margin_and_non_finite_thresholds() {
        assert!(Classifier::new(SpeedThresholds::default(), -1.0).is_err());
        assert!(Classifier::new(SpeedThresholds::default(), f64::NAN).is_err());

        let thresholds = SpeedThresholds {
            warning_max: f64::INFINITY,
            ..SpeedThresholds::default()
        };
        assert!(thresholds.validate().is_err());
    }
}
