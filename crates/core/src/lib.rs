//! Signal-processing core for the speed telemetry pipeline.
//!
//! Everything here is synchronous and free of network I/O. Each
//! component owns its state exclusively and reports what happened by
//! returning an event value (or `None` when nothing changed), leaving
//! fan-out to the caller.

pub mod alert;
pub mod classifier;
pub mod error;
pub mod recorder;
pub mod severity;
pub mod smoother;
pub mod types;

pub use alert::{AlertEvent, AlertLevel, AlertRecord, AlertSink};
pub use classifier::{Classifier, SpeedThresholds};
pub use error::CoreError;
pub use recorder::{RecordEvent, RecordSink, RecorderConfig};
pub use severity::{SeverityState, StateTransition};
pub use smoother::{Smoother, SmoothingOutcome};
pub use types::{Reading, Timestamp};
