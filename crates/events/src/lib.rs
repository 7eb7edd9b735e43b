//! Event bus for the speed telemetry pipeline.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PipelineEvent`]: the envelope every collaborator (display,
//!   operator console, diagnostics) receives.

pub mod bus;

pub use bus::{EventBus, PipelineEvent, PipelineEventKind};
