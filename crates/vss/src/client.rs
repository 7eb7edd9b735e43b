//! WebSocket client for the vehicle signal bus.
//!
//! [`VssClient`] holds the endpoint URL and the opaque bearer token.
//! Call [`VssClient::connect`] to establish a live [`VssConnection`].

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Uri};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Raw WebSocket stream type used for signal bus connections.
pub type VssStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection settings for one signal bus endpoint.
#[derive(Debug, Clone)]
pub struct VssClient {
    url: String,
    token: String,
}

/// A live WebSocket connection to the signal bus.
pub struct VssConnection {
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: VssStream,
}

impl VssClient {
    /// Create a client after checking that `url` is a `ws://` or
    /// `wss://` URL with a host.
    ///
    /// `token` is opaque; an empty token disables authentication. It is
    /// rejected up front if it cannot be sent as a bearer header.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self, VssClientError> {
        let url = url.into();
        validate_url(&url)?;
        let client = Self {
            url,
            token: token.into(),
        };
        client.handshake_request()?;
        Ok(client)
    }

    /// Endpoint URL without the token.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL actually dialled: the percent-encoded token is appended as a
    /// `token` query parameter when present.
    pub fn request_url(&self) -> String {
        if self.token.is_empty() {
            return self.url.clone();
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}token={}",
            self.url,
            urlencoding::encode(&self.token)
        )
    }

    /// Handshake request carrying the token in the query and, raw, as an
    /// `Authorization: Bearer` header.
    fn handshake_request(&self) -> Result<Request, VssClientError> {
        let mut request = self
            .request_url()
            .into_client_request()
            .map_err(|e| VssClientError::InvalidUrl(e.to_string()))?;

        if !self.token.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
                .map_err(|e| VssClientError::InvalidToken(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
        }
        Ok(request)
    }

    /// Open the WebSocket.
    pub async fn connect(&self) -> Result<VssConnection, VssClientError> {
        let request = self.handshake_request()?;

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| {
            VssClientError::Connection(format!(
                "Failed to connect to signal bus at {}: {e}",
                self.url
            ))
        })?;

        tracing::info!(url = %self.url, "Connected to signal bus");

        Ok(VssConnection { ws_stream })
    }
}

/// Accept only absolute `ws`/`wss` URLs with a host.
pub fn validate_url(url: &str) -> Result<(), VssClientError> {
    let uri: Uri = url
        .parse()
        .map_err(|e| VssClientError::InvalidUrl(format!("{url}: {e}")))?;

    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        other => {
            return Err(VssClientError::InvalidUrl(format!(
                "{url}: expected ws:// or wss:// scheme, got {}",
                other.unwrap_or("none")
            )))
        }
    }

    if uri.host().map_or(true, str::is_empty) {
        return Err(VssClientError::InvalidUrl(format!("{url}: missing host")));
    }
    Ok(())
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum VssClientError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The token cannot be carried in an HTTP header.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
