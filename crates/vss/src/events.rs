//! Events emitted by the [`StreamClient`](crate::stream::StreamClient).
//!
//! They are delivered in arrival order on the client's mpsc channel so
//! the consumer can process each reading to completion before taking
//! the next.

use carspeed_core::Reading;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The WebSocket is up and the subscription request has been sent.
    ConnectionEstablished,

    /// An established connection dropped; a reconnect is scheduled.
    ConnectionLost,

    /// A well-formed value for the subscribed signal.
    Reading(Reading),

    /// Terminal failure: the retry budget is spent and the client has
    /// stopped. Emitted at most once per `initialize`.
    Error(String),
}
