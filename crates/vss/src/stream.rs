//! Reconnecting stream client for a single vehicle signal.
//!
//! [`StreamClient`] owns a background connection task that dials the
//! signal bus, subscribes to the configured signal path, and forwards
//! every accepted value as a [`StreamEvent::Reading`]. When the
//! connection drops it reconnects with exponential backoff
//! ([`ReconnectPolicy`]); once the retry budget is spent it emits a
//! single terminal [`StreamEvent::Error`] and stops.
//!
//! Events travel over a bounded mpsc channel handed out by
//! [`StreamClient::new`], which keeps them in arrival order for the
//! single processing sequence downstream.
//!
//! Connection state: `Disconnected -> Connecting -> Connected ->
//! Subscribed`, falling back to `Disconnected` on any transport error or
//! peer close.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::VssClient;
use crate::events::StreamEvent;
use crate::messages::DEFAULT_SIGNAL_PATH;
use crate::processor::{process_session, SessionEnd};
use crate::reconnect::{ReconnectConfig, ReconnectPolicy};

/// Readings older than this make [`StreamClient::is_data_valid`] false.
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_millis(5000);

/// Message carried by the terminal error event.
pub const RECONNECT_EXHAUSTED_MESSAGE: &str = "Cannot reconnect to signal source";

/// Capacity of the event channel towards the processing sequence.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`StreamClient::shutdown`] waits for the connection task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a [`StreamClient`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Signal subscribed to on every (re)connect.
    pub signal_path: String,
    pub reconnect: ReconnectConfig,
    /// Freshness window for [`StreamClient::is_data_valid`].
    pub data_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            signal_path: DEFAULT_SIGNAL_PATH.to_string(),
            reconnect: ReconnectConfig::default(),
            data_timeout: DEFAULT_DATA_TIMEOUT,
        }
    }
}

/// Lifecycle of the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Subscribed)
    }
}

/// Requests from the client handle to the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(String),
}

#[derive(Debug)]
struct LinkStatus {
    state: ConnectionState,
    retry_count: u32,
    last_reading_at: Option<Instant>,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_count: 0,
            last_reading_at: None,
        }
    }
}

/// Status shared between the client handle and its connection task.
///
/// The mutex is never held across an `.await`.
#[derive(Debug, Clone, Default)]
struct SharedStatus(Arc<Mutex<LinkStatus>>);

impl SharedStatus {
    fn lock(&self) -> MutexGuard<'_, LinkStatus> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything the connection task needs to report back.
pub(crate) struct Link {
    status: SharedStatus,
    event_tx: mpsc::Sender<StreamEvent>,
    pub(crate) cancel: CancellationToken,
}

impl Link {
    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut status = self.status.lock();
        if status.state != state {
            tracing::debug!(from = ?status.state, to = ?state, "Connection state changed");
            status.state = state;
        }
    }

    fn on_connected(&self) {
        let mut status = self.status.lock();
        status.state = ConnectionState::Connected;
        status.retry_count = 0;
    }

    fn set_retry_count(&self, retry_count: u32) {
        self.status.lock().retry_count = retry_count;
    }

    pub(crate) fn mark_reading(&self) {
        self.status.lock().last_reading_at = Some(Instant::now());
    }

    /// Deliver an event, giving up only if the client is shut down while
    /// the channel is full. A dropped receiver is ignored.
    pub(crate) async fn emit(&self, event: StreamEvent) {
        tokio::select! {
            biased;
            _ = self.event_tx.send(event) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}

/// Handle to a running connection task.
struct Session {
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Reconnecting client for one signal of the vehicle signal bus.
pub struct StreamClient {
    config: StreamConfig,
    status: SharedStatus,
    event_tx: mpsc::Sender<StreamEvent>,
    session: Option<Session>,
}

impl StreamClient {
    /// Create an idle client and the receiver its events arrive on.
    pub fn new(config: StreamConfig) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let client = Self {
            config,
            status: SharedStatus::default(),
            event_tx,
            session: None,
        };
        (client, event_rx)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start connecting to `url` in the background.
    ///
    /// Returns as soon as the parameters are checked and the connection
    /// task is spawned; it says nothing about whether the connection
    /// comes up. Must be called from within a Tokio runtime.
    pub fn initialize(&mut self, url: &str, token: &str) -> Result<(), StreamError> {
        if self
            .session
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
        {
            return Err(StreamError::AlreadyRunning);
        }

        let client =
            VssClient::new(url, token).map_err(|e| StreamError::InvalidParameters(e.to_string()))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StreamError::NoRuntime)?;

        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let link = Link {
            status: self.status.clone(),
            event_tx: self.event_tx.clone(),
            cancel: cancel.clone(),
        };

        {
            let mut status = self.status.lock();
            status.state = ConnectionState::Connecting;
            status.retry_count = 0;
        }

        let config = self.config.clone();
        tracing::info!(url = %client.url(), signal = %config.signal_path, "Connecting to signal bus");
        let task = runtime.spawn(async move {
            run_connection_loop(client, config, link, command_rx).await;
        });

        self.session = Some(Session {
            cancel,
            commands: command_tx,
            task,
        });
        Ok(())
    }

    /// Ask the bus for updates on `signal_path`.
    ///
    /// Only valid while connected; otherwise a warning is logged and
    /// `false` returned. The connection task also subscribes on its own
    /// after every (re)connect.
    pub fn subscribe(&self, signal_path: &str) -> bool {
        let state = self.state();
        if !state.is_connected() {
            tracing::warn!(?state, signal = signal_path, "Not connected, cannot subscribe");
            return false;
        }
        self.session.as_ref().is_some_and(|session| {
            session
                .commands
                .send(Command::Subscribe(signal_path.to_string()))
                .is_ok()
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    /// Number of reconnect attempts scheduled since the last successful
    /// connect.
    pub fn retry_count(&self) -> u32 {
        self.status.lock().retry_count
    }

    /// True while connected and the last reading is younger than the
    /// configured data timeout. Detects a sensor that went quiet
    /// without closing the socket.
    pub fn is_data_valid(&self) -> bool {
        let status = self.status.lock();
        status.state.is_connected()
            && status
                .last_reading_at
                .is_some_and(|at| at.elapsed() < self.config.data_timeout)
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        tracing::info!("Shutting down stream client");
        session.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, session.task)
            .await
            .is_err()
        {
            tracing::warn!("Connection task did not stop in time");
        }

        self.status.lock().state = ConnectionState::Disconnected;
        tracing::info!("Stream client shut down");
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }
}

/// Connect -> process -> back off -> reconnect, until cancelled or the
/// retry budget runs out.
async fn run_connection_loop(
    client: VssClient,
    config: StreamConfig,
    link: Link,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut policy = ReconnectPolicy::new(config.reconnect.clone());

    loop {
        link.set_state(ConnectionState::Connecting);
        let attempt = tokio::select! {
            _ = link.cancel.cancelled() => break,
            result = client.connect() => result,
        };

        match attempt {
            Ok(conn) => {
                policy.reset();
                link.on_connected();
                link.emit(StreamEvent::ConnectionEstablished).await;

                let end =
                    process_session(conn.ws_stream, &config.signal_path, &link, &mut commands)
                        .await;
                link.set_state(ConnectionState::Disconnected);
                if end == SessionEnd::Cancelled {
                    break;
                }

                tracing::warn!("Disconnected from signal bus");
                link.emit(StreamEvent::ConnectionLost).await;
            }
            Err(e) => {
                link.set_state(ConnectionState::Disconnected);
                tracing::warn!(error = %e, "Connection attempt failed");
            }
        }

        let Some(delay) = policy.next_delay() else {
            tracing::error!(
                max_retries = config.reconnect.max_retries,
                "Max retries reached, giving up",
            );
            link.emit(StreamEvent::Error(RECONNECT_EXHAUSTED_MESSAGE.to_string()))
                .await;
            break;
        };
        link.set_retry_count(policy.retry_count());

        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt = policy.retry_count(),
            "Reconnecting to signal bus",
        );
        tokio::select! {
            _ = link.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    link.set_state(ConnectionState::Disconnected);
    tracing::info!("Connection task exited");
}

/// Errors returned by [`StreamClient::initialize`].
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Invalid connection parameters: {0}")]
    InvalidParameters(String),

    /// A connection task is still running; shut it down first.
    #[error("Stream client is already running")]
    AlreadyRunning,

    #[error("No Tokio runtime available for the connection task")]
    NoRuntime,
}
