//! WebSocket listener for the relay daemon.
//!
//! The server:
//! - Binds a TCP listener on the configured host and port
//! - Spawns a ConnectionHandler for each accepted stream
//! - Keeps accepting after individual accept failures
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │                 │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │ broadcast
//!         ▼
//! ┌─────────────────┐
//! │   HubHandle     │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, ConnectionSettings};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::hub::HubHandle;
use crate::registry::RegistryHandle;

/// Default bind host (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// WebSocket server for the relay daemon.
///
/// Binding happens in [`RelayServer::bind`] so callers see address errors
/// before anything is spawned; [`RelayServer::run`] then accepts until the
/// cancellation token fires.
pub struct RelayServer {
    listener: TcpListener,

    /// Resolved address (differs from config when binding port 0)
    local_addr: SocketAddr,

    registry: RegistryHandle,

    hub: HubHandle,

    settings: ConnectionSettings,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log correlation
    connection_counter: AtomicU64,

    /// Live connection tasks, drained on shutdown
    tracker: TaskTracker,
}

impl RelayServer {
    /// Binds the listener described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address is unavailable.
    pub async fn bind(
        config: &RelayConfig,
        registry: RegistryHandle,
        hub: HubHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let (host, port) = config.bind_addr();
        let bind_error = |e: std::io::Error| ServerError::Bind {
            addr: format!("{host}:{port}"),
            error: e.to_string(),
        };

        let listener = TcpListener::bind((host, port)).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        info!(addr = %local_addr, "Relay server listening");

        Ok(Self {
            listener,
            local_addr,
            registry,
            hub,
            settings: ConnectionSettings::from(config),
            cancel_token,
            connection_counter: AtomicU64::new(0),
            tracker: TaskTracker::new(),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop.
    ///
    /// Listens for connections until the cancellation token is triggered,
    /// then waits up to the shutdown timeout for connection tasks to finish.
    pub async fn run(&self) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer_addr, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        self.drain(self.settings.shutdown_timeout).await;
        Ok(())
    }

    /// Spawns a handler task for an accepted stream.
    fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr, connection_number: u64) {
        let handler = ConnectionHandler::new(
            peer_addr,
            self.registry.clone(),
            self.hub.clone(),
            self.settings,
            &self.cancel_token,
        );

        self.tracker.spawn(async move {
            let id = handler.id();
            let state = handler.run(stream).await;
            debug!(
                connection_id = %id,
                connection_number,
                state = %state,
                "Connection task finished"
            );
        });
    }

    /// Waits for in-flight connections to close.
    async fn drain(&self, limit: Duration) {
        self.tracker.close();
        let open = self.tracker.len();

        if timeout(limit, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "Connections still open after shutdown timeout"
            );
        } else {
            info!(closed = open, "Server cleanup complete");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::spawn_hub;
    use crate::registry::spawn_registry;

    fn local_config() -> RelayConfig {
        RelayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_host() {
        assert_eq!(DEFAULT_HOST, RelayConfig::default().host);
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:5634".to_string(),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("0.0.0.0:5634"));
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let registry = spawn_registry(8);
        let hub = spawn_hub(registry.clone(), Duration::from_millis(100), 8);
        let server = RelayServer::bind(&local_config(), registry, hub, CancellationToken::new())
            .await
            .unwrap();

        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_run_returns_after_cancel() {
        let registry = spawn_registry(8);
        let hub = spawn_hub(registry.clone(), Duration::from_millis(100), 8);
        let cancel = CancellationToken::new();
        let server = RelayServer::bind(&local_config(), registry, hub, cancel.clone())
            .await
            .unwrap();

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), server.run()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
