//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans [`PipelineEvent`]s out to any number of
//! collaborators. The pipeline publishes in processing order, so every
//! subscriber sees the events of one reading before those of the next.

use std::path::PathBuf;

use carspeed_core::types::Timestamp;
use carspeed_core::{AlertLevel, SeverityState};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// What happened in the pipeline.
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type":"state_changed","old":"NORMAL","new":"ALERT"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// The stream client connected and subscribed.
    ConnectionEstablished,
    /// The stream client lost its connection; a reconnect is scheduled.
    ConnectionLost,
    /// A raw reading was outside the plausible range and discarded.
    AbnormalReading { value: f64 },
    /// A reading was accepted and the moving average recomputed.
    SmoothedSpeedUpdated { raw: f64, smoothed: f64 },
    /// The severity state changed.
    StateChanged {
        old: SeverityState,
        new: SeverityState,
    },
    /// A driver alert was raised.
    AlertTriggered { level: AlertLevel, message: String },
    /// The alert level went back to none.
    AlertCleared,
    /// The speed log rotated into a new file.
    LogRotated { path: PathBuf },
    /// Something went wrong that the host may want to act on.
    Error { message: String },
}

/// A [`PipelineEventKind`] stamped with the time it was published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEvent {
    #[serde(flatten)]
    pub kind: PipelineEventKind,
    pub timestamp: Timestamp,
}

impl PipelineEvent {
    pub fn new(kind: PipelineEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

impl From<PipelineEventKind> for PipelineEvent {
    fn from(kind: PipelineEventKind) -> Self {
        Self::new(kind)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per subscriber before the slowest one starts lagging.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out hub between the pipeline and its collaborators.
///
/// ```rust
/// use carspeed_events::bus::{EventBus, PipelineEventKind};
///
/// let bus = EventBus::default();
/// let mut display = bus.subscribe();
///
/// bus.publish(PipelineEventKind::AlertCleared);
/// assert_eq!(display.try_recv().unwrap().kind, PipelineEventKind::AlertCleared);
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// A subscriber more than `capacity` events behind skips ahead and
    /// gets `RecvError::Lagged` once.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Stamp and broadcast `event`. Dropped when nobody listens.
    pub fn publish(&self, event: impl Into<PipelineEvent>) {
        let event = event.into();
        tracing::trace!(kind = ?event.kind, "Publishing pipeline event");
        let _ = self.sender.send(event);
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn state_change_reaches_subscriber() {
        let bus = EventBus::default();
        let mut display = bus.subscribe();

        bus.publish(PipelineEventKind::StateChanged {
            old: SeverityState::Normal,
            new: SeverityState::Alert,
        });

        let event = display.recv().await.unwrap();
        assert_eq!(
            event.kind,
            PipelineEventKind::StateChanged {
                old: SeverityState::Normal,
                new: SeverityState::Alert,
            }
        );
    }

    #[tokio::test]
    async fn every_collaborator_sees_the_same_event() {
        let bus = EventBus::default();
        let mut display = bus.subscribe();
        let mut console = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(PipelineEventKind::AlertCleared);

        let seen_by_display = display.recv().await.unwrap();
        let seen_by_console = console.recv().await.unwrap();
        assert_eq!(seen_by_display.kind, PipelineEventKind::AlertCleared);
        assert_eq!(seen_by_console, seen_by_display);
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::default();
        let mut display = bus.subscribe();

        bus.publish(PipelineEventKind::SmoothedSpeedUpdated {
            raw: 30.0,
            smoothed: 30.0,
        });
        bus.publish(PipelineEventKind::ConnectionLost);

        assert!(matches!(
            display.recv().await.unwrap().kind,
            PipelineEventKind::SmoothedSpeedUpdated { .. }
        ));
        assert_eq!(display.recv().await.unwrap().kind, PipelineEventKind::ConnectionLost);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::default();
        bus.publish(PipelineEventKind::ConnectionEstablished);

        let mut late = bus.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();

        for raw in [10.0, 20.0, 30.0] {
            bus.publish(PipelineEventKind::AbnormalReading { value: raw });
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(
            slow.recv().await.unwrap().kind,
            PipelineEventKind::AbnormalReading { value: 20.0 }
        );
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = PipelineEvent::new(PipelineEventKind::AlertTriggered {
            level: AlertLevel::Warning,
            message: "Speed is very high! Slow down.".into(),
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "alert_triggered");
        assert_eq!(json["level"], "warning");
        assert_eq!(json["message"], "Speed is very high! Slow down.");
        assert!(json["timestamp"].is_string());
    }
}
