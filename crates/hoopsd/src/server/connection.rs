//! Connection handler for individual client connections.
//!
//! Each accepted TCP stream gets its own `ConnectionHandler` that drives the
//! connection through its lifecycle:
//!
//! ```text
//! Open ──handshake + register──▶ Active ──close/error/shutdown──▶ Closing ──drain──▶ Closed
//! ```
//!
//! While `Active` the handler reads frames and hands them to the hub, and a
//! dedicated writer task owns the socket sink and drains the connection's
//! outbound queue.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hoops_core::{ConnectionId, ConnectionState, Notification, ScreenId};
use hoops_protocol::{canonicalize, greeting, screen_id_from_query, RawFrame};

use crate::config::RelayConfig;
use crate::hub::{HubError, HubHandle};
use crate::registry::{ConnectionEntry, RegistryError, RegistryHandle, RemovalReason};

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Upper bound for the HTTP upgrade handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Registration attempts before giving up on id collisions
const MAX_REGISTER_ATTEMPTS: usize = 3;

/// Per-connection limits derived from [`RelayConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub write_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub outbound_buffer: usize,
    pub max_message_size: usize,
}

impl From<&RelayConfig> for ConnectionSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            write_timeout: config.write_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
            outbound_buffer: config.outbound_buffer.max(1),
            max_message_size: config.max_message_size,
        }
    }
}

/// Why a connection left `Active`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CloseReason {
    /// Client sent a close frame
    CloseFrame,
    /// Stream ended without a close frame
    EndOfStream,
    /// Read error on the transport
    Transport(String),
    /// Shutdown token cancelled (send failure or server shutdown)
    Shutdown,
    /// Hub no longer accepts notifications
    HubStopped,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseFrame => f.write_str("close frame"),
            Self::EndOfStream => f.write_str("end of stream"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Shutdown => f.write_str("shutdown requested"),
            Self::HubStopped => f.write_str("hub stopped"),
        }
    }
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    /// Identifier, regenerated only on registry collision
    id: ConnectionId,

    /// Source of replacement ids after a collision
    next_id: fn() -> ConnectionId,

    /// Label from the `screenid` query parameter
    screen_id: Option<ScreenId>,

    /// Current lifecycle state
    state: ConnectionState,

    peer_addr: SocketAddr,

    registry: RegistryHandle,

    hub: HubHandle,

    settings: ConnectionSettings,

    /// Server-wide shutdown token
    server_shutdown: CancellationToken,

    /// This connection's token; a child of `server_shutdown`
    shutdown: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a handler for a freshly accepted stream.
    ///
    /// The connection id is generated here, at accept time.
    pub fn new(
        peer_addr: SocketAddr,
        registry: RegistryHandle,
        hub: HubHandle,
        settings: ConnectionSettings,
        server_shutdown: &CancellationToken,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            next_id: ConnectionId::generate,
            screen_id: None,
            state: ConnectionState::Open,
            peer_addr,
            registry,
            hub,
            settings,
            server_shutdown: server_shutdown.clone(),
            shutdown: server_shutdown.child_token(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Replaces the accept-time id and the generator used after collisions.
    #[cfg(test)]
    fn with_ids(mut self, initial: ConnectionId, next_id: fn() -> ConnectionId) -> Self {
        self.id = initial;
        self.next_id = next_id;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the connection to completion and returns its final state.
    pub async fn run(mut self, stream: TcpStream) -> ConnectionState {
        debug!(connection_id = %self.id, peer = %self.peer_addr, "New client connected");

        let ws = match self.handshake(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(
                    connection_id = %self.id,
                    peer = %self.peer_addr,
                    error = %e,
                    "Handshake failed"
                );
                self.transition(ConnectionState::Closing);
                self.transition(ConnectionState::Closed);
                return self.state;
            }
        };

        let (mut sink, mut source) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.settings.outbound_buffer);

        if let Err(e) = self.register(outbound_tx).await {
            warn!(
                connection_id = %self.id,
                error = %e,
                "Registration failed, closing connection"
            );
            self.transition(ConnectionState::Closing);
            let _ = timeout(self.settings.write_timeout, sink.close()).await;
            self.transition(ConnectionState::Closed);
            return self.state;
        }

        self.transition(ConnectionState::Active);
        info!(
            connection_id = %self.id,
            screen_id = ?self.screen_id,
            peer = %self.peer_addr,
            "Client connected"
        );

        let writer = tokio::spawn(write_loop(
            self.id,
            sink,
            outbound_rx,
            Message::text(greeting(&self.id)),
            self.settings.write_timeout,
            self.shutdown.clone(),
        ));

        let reason = self.read_loop(&mut source).await;
        drop(source);
        self.close(reason, writer).await;
        self.state
    }

    /// Performs the WebSocket upgrade, capturing the `screenid` label.
    async fn handshake(&mut self, stream: TcpStream) -> Result<WsStream, ConnectionError> {
        let mut screen_id = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            screen_id = screen_id_from_query(request.uri().query());
            Ok(response)
        };

        let ws = timeout(HANDSHAKE_TIMEOUT, accept_hdr_async(stream, callback))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout)?
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

        self.screen_id = screen_id;
        Ok(ws)
    }

    /// Registers this connection, retrying with a fresh id on collision.
    async fn register(&mut self, outbound: mpsc::Sender<Message>) -> Result<(), ConnectionError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let entry = ConnectionEntry::new(
                self.id,
                self.screen_id.clone(),
                outbound.clone(),
                self.shutdown.clone(),
            );

            match self.registry.register(entry).await {
                Ok(id) => {
                    self.id = id;
                    return Ok(());
                }
                Err(RegistryError::DuplicateId(taken)) if attempt < MAX_REGISTER_ATTEMPTS => {
                    self.id = (self.next_id)();
                    warn!(
                        taken = %taken,
                        connection_id = %self.id,
                        attempt,
                        "Connection id collision, retrying with a new id"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads frames until the connection should leave `Active`.
    async fn read_loop(&self, source: &mut WsSource) -> CloseReason {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return CloseReason::Shutdown,

                next = source.next() => match next {
                    None => return CloseReason::EndOfStream,
                    Some(Err(e)) => return CloseReason::Transport(e.to_string()),
                    Some(Ok(Message::Close(_))) => return CloseReason::CloseFrame,
                    Some(Ok(message)) => match self.handle_frame(message).await {
                        Ok(()) => {}
                        Err(ConnectionError::Hub(e)) => {
                            error!(connection_id = %self.id, error = %e, "Cannot relay message");
                            return CloseReason::HubStopped;
                        }
                        Err(e) => {
                            warn!(connection_id = %self.id, error = %e, "Dropping inbound frame");
                        }
                    },
                },
            }
        }
    }

    /// Canonicalizes a data frame and submits it for broadcast.
    ///
    /// Control frames are answered by the transport and not relayed.
    async fn handle_frame(&self, message: Message) -> Result<(), ConnectionError> {
        let payload = match &message {
            Message::Text(text) => self.canonical(RawFrame::Text(text.as_str()))?,
            Message::Binary(bytes) => self.canonical(RawFrame::Binary(&bytes[..]))?,
            _ => return Ok(()),
        };

        info!(connection_id = %self.id, message = %payload, "Message received");

        self.hub
            .broadcast(Notification::from_connection(self.id, payload))
            .await?;
        Ok(())
    }

    fn canonical(&self, frame: RawFrame<'_>) -> Result<String, ConnectionError> {
        if frame.len() > self.settings.max_message_size {
            return Err(ConnectionError::MessageTooLarge {
                size: frame.len(),
                max: self.settings.max_message_size,
            });
        }
        Ok(canonicalize(frame))
    }

    /// Closing → Closed: unregister once, then let the writer drain.
    async fn close(&mut self, reason: CloseReason, mut writer: JoinHandle<()>) {
        self.transition(ConnectionState::Closing);

        let removal = if self.server_shutdown.is_cancelled() {
            RemovalReason::Shutdown
        } else {
            RemovalReason::Closed
        };
        let removed = self.registry.unregister(self.id, removal).await;
        debug!(
            connection_id = %self.id,
            removed,
            "Connection left registry"
        );

        if timeout(self.settings.shutdown_timeout, &mut writer).await.is_err() {
            warn!(
                connection_id = %self.id,
                timeout = ?self.settings.shutdown_timeout,
                "Writer did not drain in time, aborting"
            );
            writer.abort();
        }

        self.transition(ConnectionState::Closed);
        info!(connection_id = %self.id, reason = %reason, "Client disconnected");
    }

    fn transition(&mut self, next: ConnectionState) {
        match self.state.transition(next) {
            Ok(state) => {
                debug!(
                    connection_id = %self.id,
                    from = %self.state,
                    to = %state,
                    "Connection state changed"
                );
                self.state = state;
            }
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Ignoring invalid state transition");
            }
        }
    }
}

/// Owns the socket sink: sends the greeting, then drains the outbound queue.
///
/// Ends when every sender is gone (the connection left the registry), after
/// sending a close frame. A failed or timed-out write cancels `shutdown` so
/// the reader moves the connection to `Closing`.
async fn write_loop(
    id: ConnectionId,
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Message>,
    greeting: Message,
    write_timeout: Duration,
    shutdown: CancellationToken,
) {
    if let Err(e) = write_frame(&mut sink, greeting, write_timeout).await {
        debug!(connection_id = %id, error = %e, "Greeting failed");
        shutdown.cancel();
        return;
    }

    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write_frame(&mut sink, frame, write_timeout).await {
            warn!(connection_id = %id, error = %e, "Send failed, closing connection");
            shutdown.cancel();
            return;
        }
    }

    // Peer may already be gone; nothing left to report.
    let _ = timeout(write_timeout, sink.close()).await;
}

async fn write_frame(
    sink: &mut WsSink,
    frame: Message,
    write_timeout: Duration,
) -> Result<(), ConnectionError> {
    match timeout(write_timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),
}
