//! Broadcast hub.
//!
//! Client frames and in-process triggers both end up here as
//! [`Notification`]s. A single dispatcher task drains the queue in order,
//! snapshots the registry, and pushes the payload to every connection's
//! outbound queue.
//!
//! # Architecture
//!
//! ```text
//!  ConnectionHandler ──┐
//!                      ├──▶ dispatch queue ──▶ Dispatcher ──▶ outbound[id] ──▶ writer task
//!  player store  ──────┘      (mpsc, FIFO)         │
//!                                                  └──▶ registry.unregister(id) on failure
//! ```

mod dispatcher;

pub use dispatcher::{BroadcastReport, SendFailure};

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use hoops_core::Notification;

use crate::registry::RegistryHandle;
use dispatcher::{DispatchRequest, Dispatcher};

/// Default dispatch queue depth.
pub const DEFAULT_DISPATCH_BUFFER: usize = 256;

/// Spawn the hub dispatcher and return a handle for submitting broadcasts.
pub fn spawn_hub(
    registry: RegistryHandle,
    write_timeout: Duration,
    dispatch_buffer: usize,
) -> HubHandle {
    let (tx, rx) = mpsc::channel(dispatch_buffer.max(1));
    tokio::spawn(Dispatcher::new(rx, registry, write_timeout).run());
    HubHandle { sender: tx }
}

/// Cheap-to-clone handle for submitting broadcasts.
///
/// Collaborators that change player data hold one of these and call
/// [`HubHandle::broadcast`] with [`Notification::external`]; the hub treats
/// those exactly like client-originated frames.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<DispatchRequest>,
}

impl HubHandle {
    /// Queue a notification for delivery to every registered connection.
    ///
    /// Returns once the notification is queued. Per-connection order follows
    /// the order of these calls.
    pub async fn broadcast(&self, notification: Notification) -> Result<(), HubError> {
        self.sender
            .send(DispatchRequest {
                notification,
                respond_to: None,
            })
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Queue a notification and wait until it has been dispatched.
    pub async fn broadcast_and_wait(
        &self,
        notification: Notification,
    ) -> Result<BroadcastReport, HubError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(DispatchRequest {
                notification,
                respond_to: Some(tx),
            })
            .await
            .map_err(|_| HubError::Stopped)?;

        rx.await.map_err(|_| HubError::Stopped)
    }
}

/// Errors returned to broadcast callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("Broadcast hub stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{spawn_registry, ConnectionEntry};
    use hoops_core::ConnectionId;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_util::sync::CancellationToken;

    const TEST_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

    struct Peer {
        id: ConnectionId,
        rx: mpsc::Receiver<Message>,
        shutdown: CancellationToken,
    }

    async fn add_peer(registry: &RegistryHandle, capacity: usize) -> Peer {
        let (tx, rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();
        let id = registry
            .register(ConnectionEntry::new(
                ConnectionId::generate(),
                None,
                tx,
                shutdown.clone(),
            ))
            .await
            .unwrap();
        Peer { id, rx, shutdown }
    }

    fn text(msg: Message) -> String {
        msg.to_text().unwrap().to_string()
    }

    fn setup() -> (RegistryHandle, HubHandle) {
        let registry = spawn_registry(64);
        let hub = spawn_hub(registry.clone(), TEST_WRITE_TIMEOUT, 16);
        (registry, hub)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_peer_including_sender() {
        let (registry, hub) = setup();
        let mut c1 = add_peer(&registry, 8).await;
        let mut c2 = add_peer(&registry, 8).await;

        let report = hub
            .broadcast_and_wait(Notification::from_connection(c1.id, "ping"))
            .await
            .unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert!(report.failed.is_empty());
        assert_eq!(text(c1.rx.recv().await.unwrap()), "ping");
        assert_eq!(text(c2.rx.recv().await.unwrap()), "ping");
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let (_registry, hub) = setup();
        let report = hub
            .broadcast_and_wait(Notification::external("test", "players updated"))
            .await
            .unwrap();
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_per_connection_order() {
        let (registry, hub) = setup();
        let mut peer = add_peer(&registry, 64).await;

        for i in 0..20 {
            hub.broadcast(Notification::external("test", format!("msg-{i}")))
                .await
                .unwrap();
        }
        let _ = hub
            .broadcast_and_wait(Notification::external("test", "done"))
            .await
            .unwrap();

        for i in 0..20 {
            assert_eq!(text(peer.rx.recv().await.unwrap()), format!("msg-{i}"));
        }
        assert_eq!(text(peer.rx.recv().await.unwrap()), "done");
    }

    #[tokio::test]
    async fn test_closed_peer_is_removed_and_others_still_receive() {
        let (registry, hub) = setup();
        let dead = add_peer(&registry, 8).await;
        let mut live = add_peer(&registry, 8).await;
        let dead_id = dead.id;
        let dead_shutdown = dead.shutdown.clone();
        drop(dead.rx);

        let report = hub
            .broadcast_and_wait(Notification::external("test", "refresh"))
            .await
            .unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![dead_id]);
        assert!(!registry.contains(dead_id).await);
        assert!(dead_shutdown.is_cancelled());
        assert_eq!(text(live.rx.recv().await.unwrap()), "refresh");
    }

    #[tokio::test]
    async fn test_stalled_peer_times_out_and_is_excluded_afterwards() {
        let (registry, hub) = setup();
        let stalled = add_peer(&registry, 1).await;
        let mut live = add_peer(&registry, 8).await;

        // Fill the stalled peer's queue so the next send has to wait.
        let first = hub
            .broadcast_and_wait(Notification::external("test", "a"))
            .await
            .unwrap();
        assert_eq!(first.delivered, 2);

        let second = hub
            .broadcast_and_wait(Notification::external("test", "b"))
            .await
            .unwrap();
        assert_eq!(second.attempted, 2);
        assert_eq!(second.failed, vec![stalled.id]);
        assert!(stalled.shutdown.is_cancelled());

        let third = hub
            .broadcast_and_wait(Notification::external("test", "c"))
            .await
            .unwrap();
        assert_eq!(third.attempted, 1);
        assert_eq!(third.delivered, 1);

        for expected in ["a", "b", "c"] {
            assert_eq!(text(live.rx.recv().await.unwrap()), expected);
        }
    }

    #[tokio::test]
    async fn test_k_registered_means_k_attempts() {
        let (registry, hub) = setup();
        let mut peers = Vec::new();
        for _ in 0..7 {
            peers.push(add_peer(&registry, 4).await);
        }

        let report = hub
            .broadcast_and_wait(Notification::external("test", "x"))
            .await
            .unwrap();

        assert_eq!(report.attempted, 7);
        assert_eq!(report.delivered, 7);
    }

    #[test]
    fn test_send_failure_display() {
        assert_eq!(SendFailure::Closed.to_string(), "outbound queue closed");
        assert!(SendFailure::Timeout(TEST_WRITE_TIMEOUT)
            .to_string()
            .contains("100ms"));
    }
}
