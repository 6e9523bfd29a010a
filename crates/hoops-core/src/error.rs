//! Domain-specific error types following panic-free policy.

use crate::ConnectionState;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Lifecycle transition not permitted by the state machine
    #[error("Invalid connection state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
