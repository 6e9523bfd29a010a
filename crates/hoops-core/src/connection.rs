//! Connection identity and lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Number of leading id characters shown in the connect greeting.
pub const SHORT_ID_LEN: usize = 5;

/// Unique identifier for one accepted client connection.
///
/// Generated at accept time from a random 128-bit UUIDv4. An id is never
/// reused: a reconnecting client always receives a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new random connection ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the truncated form used in client-facing greetings.
    ///
    /// The hyphenated UUID always starts with eight hex digits, so the
    /// prefix is plain ASCII.
    pub fn short(&self) -> String {
        self.0
            .hyphenated()
            .to_string()
            .chars()
            .take(SHORT_ID_LEN)
            .collect()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Opaque client-supplied screen label (the `screenid` query parameter).
///
/// Never validated; carried for logging only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenId(String);

impl ScreenId {
    /// Creates a new ScreenId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Lifecycle State
// ============================================================================

/// Lifecycle state of a single connection.
///
/// ```text
/// Open ──▶ Active ──▶ Closing ──▶ Closed
///   │                   ▲
///   └───────────────────┘
/// ```
///
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Transport accepted, handshake or registration not yet complete.
    #[default]
    Open,

    /// Registered and exchanging frames.
    Active,

    /// Close initiated; no further sends are accepted.
    Closing,

    /// Resources released.
    Closed,
}

impl ConnectionState {
    /// Returns the lowercase label used in logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Active)
                | (Self::Open, Self::Closing)
                | (Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Validates and returns the next state.
    pub fn transition(self, next: ConnectionState) -> DomainResult<ConnectionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
