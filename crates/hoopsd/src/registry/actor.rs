//! Registry actor - owns the connection table and processes commands.
//!
//! The RegistryActor is the single owner of the connection table.
//! It receives commands via an mpsc channel, so registration, removal and
//! snapshots are serialized without a lock and never wait on network I/O.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Response send failures are ignored (the requester went away)

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hoops_core::ConnectionId;

use super::commands::{ConnectionEntry, RegistryCommand, RegistryError, RemovalReason};

/// Default capacity of the connection table.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all connection entries.
///
/// Implements the actor pattern: receives commands via mpsc channel and
/// processes them sequentially in a single task.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Live connections keyed by id
    connections: HashMap<ConnectionId, ConnectionEntry>,

    /// Capacity bound
    max_connections: usize,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `max_connections` - Registrations beyond this fail with `RegistryFull`
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, max_connections: usize) -> Self {
        Self {
            receiver,
            connections: HashMap::new(),
            max_connections,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!(max_connections = self.max_connections, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            connections = self.connections.len(),
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register { entry, respond_to } => {
                let result = self.handle_register(*entry);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Unregister {
                id,
                reason,
                respond_to,
            } => {
                let removed = self.handle_unregister(id, reason);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.connections.values().cloned().collect());
            }
            RegistryCommand::Count { respond_to } => {
                let _ = respond_to.send(self.connections.len());
            }
            RegistryCommand::Contains { id, respond_to } => {
                let _ = respond_to.send(self.connections.contains_key(&id));
            }
        }
    }

    fn handle_register(&mut self, entry: ConnectionEntry) -> Result<ConnectionId, RegistryError> {
        let id = entry.id;

        if self.connections.contains_key(&id) {
            warn!(connection_id = %id, "Connection id collision");
            return Err(RegistryError::DuplicateId(id));
        }

        if self.connections.len() >= self.max_connections {
            warn!(
                connection_id = %id,
                max = self.max_connections,
                "Registry full, rejecting connection"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_connections,
            });
        }

        debug!(
            connection_id = %id,
            screen_id = ?entry.screen_id,
            "Connection registered"
        );
        self.connections.insert(id, entry);
        Ok(id)
    }

    fn handle_unregister(&mut self, id: ConnectionId, reason: RemovalReason) -> bool {
        match self.connections.remove(&id) {
            Some(_) => {
                debug!(
                    connection_id = %id,
                    reason = %reason,
                    remaining = self.connections.len(),
                    "Connection unregistered"
                );
                true
            }
            None => {
                debug!(
                    connection_id = %id,
                    reason = %reason,
                    "Unregister of absent connection ignored"
                );
                false
            }
        }
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of connections currently registered.
    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
