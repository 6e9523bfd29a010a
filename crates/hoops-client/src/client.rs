//! Reconnecting relay watcher.
//!
//! This module provides the `RelayClient` which handles:
//! - Connection to the relay over WebSocket
//! - Automatic reconnection with exponential backoff
//! - Forwarding refresh signals to the caller's event loop
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::env;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hoops_core::ScreenId;
use hoops_protocol::{parse_greeting, DEFAULT_PORT, SCREEN_ID_PARAM};

use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Environment variable overriding the relay URL.
pub const ENV_URL: &str = "HOOPS_URL";

/// Picks the relay URL: explicit value, then `HOOPS_URL`, then localhost.
pub fn resolve_url(explicit: Option<String>) -> String {
    explicit
        .or_else(|| env::var(ENV_URL).ok())
        .unwrap_or_else(|| format!("ws://127.0.0.1:{DEFAULT_PORT}"))
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the relay client.
///
/// # Example
///
/// ```rust
/// use hoops_client::RelayClientConfig;
/// use std::time::Duration;
///
/// let config = RelayClientConfig {
///     url: "ws://10.0.0.5:5634".to_string(),
///     retry_initial_delay: Duration::from_millis(500),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Relay WebSocket URL, without query string.
    pub url: String,

    /// Optional screen label sent as `?screenid=`.
    pub screen_id: Option<ScreenId>,

    /// Initial delay before first retry after connection failure.
    pub retry_initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub retry_multiplier: f64,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            url: resolve_url(None),
            screen_id: None,
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
        }
    }
}

impl RelayClientConfig {
    /// URL used for the upgrade request, including the screen label.
    pub fn endpoint(&self) -> String {
        match &self.screen_id {
            Some(screen) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!(
                    "{}{separator}{SCREEN_ID_PARAM}={}",
                    self.url,
                    utf8_percent_encode(screen.as_str(), NON_ALPHANUMERIC)
                )
            }
            None => self.url.clone(),
        }
    }

    /// Delay to use after waiting `current`.
    fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.retry_multiplier) as u64;
        Duration::from_millis(next_ms).min(self.retry_max_delay)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Events forwarded to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connected and greeted; `prefix` is the relay's short id for us.
    Connected { prefix: String },

    /// A notification arrived; the view should re-fetch its data.
    Refresh { payload: String },

    /// The connection dropped; the client will retry.
    Disconnected,
}

// ============================================================================
// Relay Client
// ============================================================================

/// Watches the relay and turns every broadcast into a [`ClientEvent::Refresh`].
///
/// # Connection Lifecycle
///
/// 1. Client attempts to connect to the relay
/// 2. On success, waits for the greeting and reports `Connected`
/// 3. Forwards every text frame as `Refresh`
/// 4. On disconnect, reports `Disconnected` and retries with exponential backoff
pub struct RelayClient {
    config: RelayClientConfig,

    /// Channel to send events to the caller.
    event_tx: mpsc::UnboundedSender<ClientEvent>,

    /// Cancellation token for graceful shutdown.
    cancel_token: CancellationToken,
}

impl RelayClient {
    #[must_use]
    pub fn new(
        config: RelayClientConfig,
        event_tx: mpsc::UnboundedSender<ClientEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            cancel_token,
        }
    }

    /// Main loop that maintains the connection to the relay.
    ///
    /// Runs until the cancellation token is triggered or the event receiver
    /// is dropped. The retry delay carries across connections and only
    /// resets once the relay greets us, so a relay that accepts and then
    /// drops us (full registry, shutting down) is retried with backoff.
    pub async fn run(&self) {
        info!(url = %self.config.endpoint(), "Relay client starting");

        let mut delay = self.config.retry_initial_delay;

        loop {
            if self.cancel_token.is_cancelled() || self.event_tx.is_closed() {
                info!("Relay client shutting down");
                return;
            }

            let mut ws = match self.connect_with_retry(&mut delay).await {
                Ok(ws) => ws,
                Err(e) => {
                    if !self.cancel_token.is_cancelled() {
                        error!(error = %e, "Failed to connect to relay");
                    }
                    continue;
                }
            };

            let greeting = tokio::select! {
                greeting = read_greeting(&mut ws) => greeting,
                _ = self.cancel_token.cancelled() => {
                    let _ = ws.close(None).await;
                    continue;
                }
            };

            match greeting {
                Ok(prefix) => {
                    delay = self.config.retry_initial_delay;
                    if let Err(e) = self.handle_connection(ws, prefix).await {
                        warn!(error = %e, "Connection ended with error");
                    }

                    // Receiver may already be gone during shutdown.
                    let _ = self.event_tx.send(ClientEvent::Disconnected);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Relay dropped connection before greeting"
                    );
                    let _ = self.event_tx.send(ClientEvent::Disconnected);

                    if !self.backoff(&mut delay).await {
                        info!("Connection retry cancelled");
                    }
                }
            }
        }
    }

    /// Connects with exponential backoff until successful or cancelled.
    ///
    /// Starts from `delay` and leaves it at the next value to wait.
    async fn connect_with_retry(&self, delay: &mut Duration) -> Result<WsStream> {
        let endpoint = self.config.endpoint();
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);
            debug!(attempt, url = %endpoint, "Attempting to connect to relay");

            match connect_async(endpoint.as_str()).await {
                Ok((ws, _response)) => {
                    debug!(attempt, "Connection successful");
                    return Ok(ws);
                }
                Err(e) if attempt == 1 => {
                    warn!(url = %endpoint, error = %e, "Relay not reachable, will retry");
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Connection attempt failed");
                }
            }

            if !self.backoff(delay).await {
                info!("Connection retry cancelled");
                return Err(ClientError::Cancelled);
            }
        }
    }

    /// Sleeps for `delay` and advances it. Returns false if cancelled first.
    async fn backoff(&self, delay: &mut Duration) -> bool {
        tokio::select! {
            _ = sleep(*delay) => {
                *delay = self.config.next_delay(*delay);
                true
            }
            _ = self.cancel_token.cancelled() => false,
        }
    }

    /// Reports the greeting, then forwards frames until disconnect.
    async fn handle_connection(&self, mut ws: WsStream, prefix: String) -> Result<()> {
        info!(prefix = %prefix, "Connected to relay");
        let _ = self.event_tx.send(ClientEvent::Connected { prefix });

        loop {
            tokio::select! {
                next = ws.next() => match next {
                    None | Some(Ok(Message::Close(_))) => {
                        info!("Relay closed connection");
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(Message::Text(text))) => {
                        debug!(payload = %text.as_str(), "Refresh received");
                        if self
                            .event_tx
                            .send(ClientEvent::Refresh { payload: text.as_str().to_string() })
                            .is_err()
                        {
                            let _ = ws.close(None).await;
                            return Ok(());
                        }
                    }
                    Some(Ok(_)) => {}
                },

                _ = self.cancel_token.cancelled() => {
                    debug!("Relay client cancelled, closing connection");
                    let _ = ws.close(None).await;
                    return Ok(());
                }
            }
        }
    }
}

/// Waits for the first frame and checks that it is a greeting.
pub(crate) async fn read_greeting(ws: &mut WsStream) -> Result<String> {
    loop {
        match ws.next().await {
            None | Some(Ok(Message::Close(_))) => return Err(ClientError::Closed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Text(text))) => {
                return parse_greeting(text.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ClientError::Protocol(format!("expected greeting, got {:?}", text.as_str()))
                    });
            }
            // Control frames may precede the greeting.
            Some(Ok(_)) => {}
        }
    }
}
