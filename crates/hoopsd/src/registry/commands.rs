//! Registry actor commands, entries, and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `ConnectionEntry`: What the registry stores per live connection
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::fmt;

use hoops_core::{ConnectionId, ScreenId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Registry Entry
// ============================================================================

/// Sending half of a connection's outbound frame queue.
///
/// The connection's writer task is the only reader, so it is the only task
/// that ever touches the socket sink.
pub type OutboundSender = mpsc::Sender<Message>;

/// A live connection as seen by the registry.
///
/// Entries are cheap to clone and hold no transport resources directly: a
/// stale clone can only produce a failed send, never a dangling handle.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    /// Unique connection identifier
    pub id: ConnectionId,

    /// Optional client-supplied screen label
    pub screen_id: Option<ScreenId>,

    /// Outbound frame queue drained by the connection's writer task
    pub outbound: OutboundSender,

    /// Cancelling this moves the connection's lifecycle to `Closing`
    pub shutdown: CancellationToken,
}

impl ConnectionEntry {
    pub fn new(
        id: ConnectionId,
        screen_id: Option<ScreenId>,
        outbound: OutboundSender,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            screen_id,
            outbound,
            shutdown,
        }
    }
}

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert a new connection.
    ///
    /// # Errors
    /// - `RegistryError::DuplicateId` if the id is already registered
    /// - `RegistryError::RegistryFull` if at maximum capacity
    Register {
        /// The entry to insert (boxed to keep the enum small)
        entry: Box<ConnectionEntry>,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<ConnectionId, RegistryError>>,
    },

    /// Remove a connection if present.
    ///
    /// Responds `true` if an entry was removed. Removing an absent id is not
    /// an error.
    Unregister {
        id: ConnectionId,
        reason: RemovalReason,
        respond_to: oneshot::Sender<bool>,
    },

    /// Point-in-time copy of all entries.
    Snapshot {
        respond_to: oneshot::Sender<Vec<ConnectionEntry>>,
    },

    /// Number of registered connections.
    Count { respond_to: oneshot::Sender<usize> },

    /// Whether a connection is registered.
    Contains {
        id: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },
}

// ============================================================================
// Removal Reasons
// ============================================================================

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Lifecycle reached `Closing` (close frame, transport error, EOF)
    Closed,
    /// A broadcast send failed or timed out
    SendFailed,
    /// Server shutdown
    Shutdown,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Closed => "closed",
            Self::SendFailed => "send_failed",
            Self::Shutdown => "shutdown",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Id collision; the caller should retry with a fresh id
    #[error("Connection id already registered: {0}")]
    DuplicateId(ConnectionId),

    #[error("Registry full (max: {max})")]
    RegistryFull { max: usize },

    /// The actor has stopped
    #[error("Registry channel closed")]
    ChannelClosed,
}
