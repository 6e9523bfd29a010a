//! Connection registry using Actor pattern.
//!
//! The registry is the authoritative in-memory set of live connections.
//! It receives commands via a tokio mpsc channel, so `register`, `unregister`
//! and `snapshot` are mutually exclusive without a lock being held across
//! network I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryActor  │
//! └─────────────────┘     └────────▲────────┘
//!   register/unregister            │ snapshot
//!   (mpsc + oneshot)               │
//!                         ┌────────┴────────┐
//!                         │ Hub dispatcher  │
//!                         └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, DEFAULT_MAX_CONNECTIONS};
pub use commands::{
    ConnectionEntry, OutboundSender, RegistryCommand, RegistryError, RemovalReason,
};
pub use handle::RegistryHandle;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// # Example
///
/// ```no_run
/// use hoopsd::registry::{spawn_registry, DEFAULT_MAX_CONNECTIONS};
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);
///     let live = handle.snapshot().await;
///     assert!(live.is_empty());
/// }
/// ```
pub fn spawn_registry(max_connections: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, max_connections);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
