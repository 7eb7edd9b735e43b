//! Processing pipeline: StreamClient events in, [`PipelineEvent`]s out.
//!
//! One [`StreamEvent`] is handled to completion before the next is
//! taken off the channel. A reading flows
//! Smoother -> Classifier -> {AlertSink, RecordSink}, and everything
//! that happens along the way is published on the [`EventBus`] in that
//! order.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use carspeed_core::{
    AlertEvent, AlertSink, Classifier, RecordEvent, RecordSink, Reading, Smoother,
    SmoothingOutcome,
};
use carspeed_events::{EventBus, PipelineEventKind};
use carspeed_vss::StreamEvent;

use crate::config::AppConfig;

/// Minimum time between attempts to reopen a failed speed log.
pub const RECORDER_REOPEN_INTERVAL: Duration = Duration::from_secs(30);

pub struct Pipeline {
    smoother: Smoother,
    classifier: Classifier,
    alerts: AlertSink,
    recorder: RecordSink,
    bus: EventBus,
    reopen_interval: Duration,
    last_reopen_attempt: Option<Instant>,
}

impl Pipeline {
    pub fn new(
        smoother: Smoother,
        classifier: Classifier,
        alerts: AlertSink,
        recorder: RecordSink,
        bus: EventBus,
    ) -> Self {
        Self {
            smoother,
            classifier,
            alerts,
            recorder,
            bus,
            reopen_interval: RECORDER_REOPEN_INTERVAL,
            last_reopen_attempt: None,
        }
    }

    /// Override how long a closed speed log waits between reopen attempts.
    pub fn with_reopen_interval(mut self, interval: Duration) -> Self {
        self.reopen_interval = interval;
        self
    }

    /// Build every component from `config`.
    ///
    /// Invalid thresholds fall back to the defaults. If the log file
    /// cannot be opened the pipeline still runs, without recording, and
    /// an error event is published. Opening is retried from later
    /// readings, see [`retry_recorder`](Self::retry_recorder).
    pub fn from_config(config: &AppConfig, bus: EventBus) -> Self {
        let smoother = Smoother::new(config.smoothing.window_size);

        let classifier = Classifier::new(config.thresholds(), config.hysteresis_margin())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid speed thresholds, using defaults");
                Classifier::default()
            });

        let recorder_config = config.recorder_config();
        let mut open_failed = false;
        let recorder = RecordSink::open(recorder_config.clone()).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Speed log unavailable, recording suspended");
            bus.publish(PipelineEventKind::Error {
                message: e.to_string(),
            });
            open_failed = true;
            RecordSink::closed(recorder_config)
        });

        let mut pipeline = Self::new(smoother, classifier, AlertSink::new(), recorder, bus);
        if open_failed {
            pipeline.last_reopen_attempt = Some(Instant::now());
        }
        pipeline
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn alerts(&self) -> &AlertSink {
        &self.alerts
    }

    pub fn recorder(&self) -> &RecordSink {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut RecordSink {
        &mut self.recorder
    }

    /// Try to reopen a speed log that failed earlier.
    ///
    /// Does nothing while logging is disabled, a file is open, or the
    /// previous attempt is more recent than the reopen interval. On
    /// success the new file is published as [`PipelineEventKind::LogRotated`].
    /// Returns whether a file is open afterwards.
    pub fn retry_recorder(&mut self) -> bool {
        if self.recorder.is_open() {
            return true;
        }
        if !self.recorder.is_enabled() {
            return false;
        }
        if self
            .last_reopen_attempt
            .is_some_and(|at| at.elapsed() < self.reopen_interval)
        {
            return false;
        }

        self.last_reopen_attempt = Some(Instant::now());
        match self.recorder.reopen() {
            Ok(path) => {
                let path = path.to_path_buf();
                tracing::info!(path = %path.display(), "Speed logging resumed");
                self.bus.publish(PipelineEventKind::LogRotated { path });
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "Speed log still unavailable");
                false
            }
        }
    }

    /// Handle one event from the stream client.
    ///
    /// Breaks with the message of a terminal stream error; the client
    /// has stopped by then and nothing more will arrive.
    pub fn handle(&mut self, event: StreamEvent) -> ControlFlow<String> {
        match event {
            StreamEvent::ConnectionEstablished => {
                tracing::info!("Signal source connected");
                self.bus.publish(PipelineEventKind::ConnectionEstablished);
            }
            StreamEvent::ConnectionLost => {
                tracing::warn!("Signal source connection lost");
                self.bus.publish(PipelineEventKind::ConnectionLost);
            }
            StreamEvent::Reading(reading) => self.process_reading(reading),
            StreamEvent::Error(message) => {
                tracing::error!(error = %message, "Signal source failed");
                self.bus.publish(PipelineEventKind::Error {
                    message: message.clone(),
                });
                return ControlFlow::Break(message);
            }
        }
        ControlFlow::Continue(())
    }

    /// Drain `events` until the channel closes or a terminal error
    /// arrives. Returns the terminal error, if any.
    pub async fn run(&mut self, mut events: mpsc::Receiver<StreamEvent>) -> Option<String> {
        while let Some(event) = events.recv().await {
            if let ControlFlow::Break(message) = self.handle(event) {
                return Some(message);
            }
        }
        tracing::info!("Stream event channel closed");
        None
    }

    fn process_reading(&mut self, reading: Reading) {
        let raw = reading.value;
        let smoothed = match self.smoother.on_reading(raw) {
            SmoothingOutcome::Smoothed(value) => value,
            SmoothingOutcome::Abnormal(value) => {
                self.bus
                    .publish(PipelineEventKind::AbnormalReading { value });
                return;
            }
        };
        self.bus
            .publish(PipelineEventKind::SmoothedSpeedUpdated { raw, smoothed });

        if let Some(transition) = self.classifier.update_speed(smoothed) {
            self.bus.publish(PipelineEventKind::StateChanged {
                old: transition.old,
                new: transition.new,
            });

            match self.alerts.on_state_changed(transition) {
                Some(AlertEvent::Triggered { level, message }) => {
                    self.bus
                        .publish(PipelineEventKind::AlertTriggered { level, message });
                }
                Some(AlertEvent::Cleared) => {
                    self.bus.publish(PipelineEventKind::AlertCleared);
                }
                None => {}
            }
        }

        let state = self.classifier.current_state();
        self.retry_recorder();
        for event in self.recorder.log_speed_data(raw, smoothed, state) {
            match event {
                RecordEvent::Rotated(path) => {
                    self.bus.publish(PipelineEventKind::LogRotated { path });
                }
                RecordEvent::Error(message) => {
                    self.last_reopen_attempt = Some(Instant::now());
                    self.bus.publish(PipelineEventKind::Error { message });
                }
            }
        }
    }
}
