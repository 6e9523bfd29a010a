//! Error types for the relay client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

// ============================================================================
// Client Error Type
// ============================================================================

/// Relay client errors.
///
/// Connection errors usually mean the relay is not running; check
/// `hoopsd status` or the `HOOPS_URL` in use.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to open the WebSocket connection.
    #[error("Failed to connect to relay at {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The relay sent something other than what the exchange expects.
    ///
    /// The first frame on every connection must be the greeting.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The relay closed the connection before the exchange finished.
    #[error("Relay closed the connection")]
    Closed,

    /// The exchange did not finish in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The client was cancelled before a connection was established.
    #[error("Cancelled")]
    Cancelled,

    /// WebSocket transport error passthrough.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
