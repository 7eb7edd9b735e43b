//! WebSocket message processing for one connected session.
//!
//! Sends the subscription request, then reads frames until the socket
//! closes, errors, or the client is shut down. Each text frame for the
//! subscribed signal becomes a [`Reading`] on the event channel.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use carspeed_core::Reading;

use crate::client::{VssClientError, VssStream};
use crate::events::StreamEvent;
use crate::messages::{parse_signal_value, FrameRejection, SubscribeRequest};
use crate::stream::{Command, ConnectionState, Link};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Peer close, transport error, or stream exhausted.
    Closed,
    /// The client was shut down.
    Cancelled,
}

/// Drive a connected session until it ends.
pub(crate) async fn process_session(
    ws_stream: VssStream,
    signal_path: &str,
    link: &Link,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws_stream.split();
    let mut subscribed_path = signal_path.to_string();

    if let Err(e) = send_subscribe(&mut sink, &subscribed_path).await {
        tracing::error!(error = %e, "Failed to send subscription request");
        return SessionEnd::Closed;
    }
    link.set_state(ConnectionState::Subscribed);

    loop {
        tokio::select! {
            _ = link.cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            Some(command) = commands.recv() => match command {
                Command::Subscribe(path) => {
                    if let Err(e) = send_subscribe(&mut sink, &path).await {
                        tracing::error!(error = %e, path = %path, "Failed to send subscription request");
                        return SessionEnd::Closed;
                    }
                    subscribed_path = path;
                    link.set_state(ConnectionState::Subscribed);
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reading) = handle_text_message(&text, &subscribed_path) {
                        link.mark_reading();
                        link.emit(StreamEvent::Reading(reading)).await;
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Signal bus closed WebSocket");
                    return SessionEnd::Closed;
                }
                Some(Ok(_)) => {
                    tracing::trace!("Ignoring binary frame");
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket receive error");
                    return SessionEnd::Closed;
                }
                None => {
                    tracing::info!("WebSocket stream exhausted");
                    return SessionEnd::Closed;
                }
            }
        }
    }
}

/// Turn one text frame into a reading, or log why it was dropped.
pub fn handle_text_message(text: &str, signal_path: &str) -> Option<Reading> {
    match parse_signal_value(text, signal_path) {
        Ok(value) => {
            tracing::debug!(value, "Speed value received");
            Some(Reading::new(value))
        }
        Err(FrameRejection::NotAnEvent) => {
            tracing::debug!(raw_message = %text, "Ignoring non-event frame");
            None
        }
        Err(FrameRejection::OtherSignal(event)) => {
            tracing::debug!(event = %event, "Ignoring event for another signal");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Discarding signal frame");
            None
        }
    }
}

/// Serialize and send a subscription request for `path`.
async fn send_subscribe<S>(sink: &mut S, path: &str) -> Result<(), VssClientError>
where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = SubscribeRequest::new(path)
        .to_json()
        .map_err(|e| VssClientError::Protocol(e.to_string()))?;

    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| VssClientError::Protocol(e.to_string()))?;

    tracing::info!(path, "Subscribed to signal");
    Ok(())
}
