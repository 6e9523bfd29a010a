//! Broadcast notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::connection::ConnectionId;

/// Where a notification came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Relayed from an inbound client frame.
    Connection { id: ConnectionId },

    /// Pushed in-process by a collaborator (e.g. the player store after a write).
    External { source: String },
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection { id } => write!(f, "connection:{id}"),
            Self::External { source } => write!(f, "external:{source}"),
        }
    }
}

/// Immutable unit of broadcast content.
///
/// Every notification is delivered to all registered connections, the
/// originating connection included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    payload: String,
    origin: Origin,
    created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification relayed from a client connection.
    pub fn from_connection(id: ConnectionId, payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            origin: Origin::Connection { id },
            created_at: Utc::now(),
        }
    }

    /// Creates a notification triggered outside the relay.
    pub fn external(source: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            origin: Origin::External {
                source: source.into(),
            },
            created_at: Utc::now(),
        }
    }

    /// Canonical string sent to every peer.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time elapsed since the notification was created.
    pub fn age(&self) -> std::time::Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or_default()
    }
}
