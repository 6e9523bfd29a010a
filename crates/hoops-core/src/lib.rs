//! hoops core - Shared types for the scoreboard refresh relay
//!
//! This crate provides the domain types shared between
//! the relay daemon (hoopsd) and its clients.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod connection;
pub mod error;
pub mod notification;

// Re-exports for convenience
pub use connection::{ConnectionId, ConnectionState, ScreenId, SHORT_ID_LEN};
pub use error::{DomainError, DomainResult};
pub use notification::{Notification, Origin};
