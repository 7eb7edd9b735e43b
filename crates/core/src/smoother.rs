//! Moving-average noise filter over raw speed readings.
//!
//! Readings outside the plausible range are rejected before they can
//! reach the window, so a single glitch never skews the average.

use std::collections::VecDeque;

use crate::types::{MAX_SPEED_KMH, MIN_SPEED_KMH};

pub const MIN_WINDOW_SIZE: usize = 1;
pub const MAX_WINDOW_SIZE: usize = 20;
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Result of feeding one raw reading to the [`Smoother`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothingOutcome {
    /// The reading was accepted; carries the new moving average.
    Smoothed(f64),
    /// The reading was out of range and discarded; carries the raw value.
    Abnormal(f64),
}

/// Fixed-capacity moving average.
#[derive(Debug, Clone)]
pub struct Smoother {
    window_size: usize,
    samples: VecDeque<f64>,
    smoothed: f64,
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl Smoother {
    /// Create a smoother; `window_size` is clamped to
    /// [`MIN_WINDOW_SIZE`]..=[`MAX_WINDOW_SIZE`].
    pub fn new(window_size: usize) -> Self {
        let window_size = clamp_window(window_size);
        Self {
            window_size,
            samples: VecDeque::with_capacity(window_size),
            smoothed: 0.0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Last emitted average, or 0 when nothing has been accepted yet.
    pub fn smoothed(&self) -> f64 {
        self.smoothed
    }

    /// Resize the window. Shrinking drops the oldest samples at once
    /// and [`smoothed`](Self::smoothed) is recomputed over what remains.
    /// Nothing is emitted.
    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = clamp_window(window_size);
        while self.samples.len() > self.window_size {
            self.samples.pop_front();
        }
        self.smoothed = self.average();
        tracing::debug!(window_size = self.window_size, "Smoothing window resized");
    }

    /// Feed one raw reading.
    pub fn on_reading(&mut self, raw: f64) -> SmoothingOutcome {
        if !is_plausible(raw) {
            tracing::warn!(raw, "Abnormal speed reading discarded");
            return SmoothingOutcome::Abnormal(raw);
        }

        self.samples.push_back(raw);
        if self.samples.len() > self.window_size {
            self.samples.pop_front();
        }

        self.smoothed = self.average();
        tracing::debug!(
            raw,
            smoothed = self.smoothed,
            samples = self.samples.len(),
            "Speed smoothed",
        );
        SmoothingOutcome::Smoothed(self.smoothed)
    }

    /// Forget every sample and zero the output.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.smoothed = 0.0;
    }

    fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

fn clamp_window(window_size: usize) -> usize {
    let clamped = window_size.clamp(MIN_WINDOW_SIZE, MAX_WINDOW_SIZE);
    if clamped != window_size {
        tracing::warn!(
            requested = window_size,
            used = clamped,
            "Smoothing window size out of range, clamped",
        );
    }
    clamped
}

/// NaN and infinities fail both comparisons and are rejected too.
fn is_plausible(raw: f64) -> bool {
    (MIN_SPEED_KMH..=MAX_SPEED_KMH).contains(&raw)
}
