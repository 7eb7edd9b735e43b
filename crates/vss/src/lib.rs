//! Signal bus client for the speed telemetry pipeline.
//!
//! Provides the VSS wire messages, the WebSocket connector, the
//! reconnection policy and the [`StreamClient`] that ties them together
//! and surfaces raw speed readings as [`StreamEvent`]s.

pub mod client;
pub mod events;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod stream;

pub use events::StreamEvent;
pub use reconnect::ReconnectConfig;
pub use stream::{ConnectionState, StreamClient, StreamConfig, StreamError};
