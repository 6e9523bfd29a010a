//! The hub's single dispatch task.
//!
//! Every notification passes through one FIFO queue and is fully dispatched
//! before the next one is taken, which is what gives each connection its
//! in-order delivery guarantee.

use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use hoops_core::{ConnectionId, Notification};

use crate::registry::{ConnectionEntry, RegistryHandle, RemovalReason};

/// A queued broadcast, optionally with a completion receipt.
pub(crate) struct DispatchRequest {
    pub(crate) notification: Notification,
    pub(crate) respond_to: Option<oneshot::Sender<BroadcastReport>>,
}

/// Outcome of dispatching one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot (one send attempt each)
    pub attempted: usize,

    /// Sends that were accepted by the connection's outbound queue
    pub delivered: usize,

    /// Connections removed because their send failed
    pub failed: Vec<ConnectionId>,
}

/// Per-connection delivery failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendFailure {
    /// The connection's writer has already gone away
    #[error("outbound queue closed")]
    Closed,

    /// The outbound queue stayed full for the whole write timeout
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

pub(crate) struct Dispatcher {
    receiver: mpsc::Receiver<DispatchRequest>,
    registry: RegistryHandle,
    write_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        receiver: mpsc::Receiver<DispatchRequest>,
        registry: RegistryHandle,
        write_timeout: Duration,
    ) -> Self {
        Self {
            receiver,
            registry,
            write_timeout,
        }
    }

    /// Processes notifications until every `HubHandle` is dropped.
    pub(crate) async fn run(mut self) {
        info!(write_timeout = ?self.write_timeout, "Broadcast hub starting");

        while let Some(request) = self.receiver.recv().await {
            let report = self.dispatch(&request.notification).await;
            if let Some(respond_to) = request.respond_to {
                let _ = respond_to.send(report);
            }
        }

        info!("Broadcast hub stopped");
    }

    /// Sends one notification to every connection in a fresh snapshot.
    ///
    /// Sends run concurrently so a stalled peer costs at most one write
    /// timeout. Failed connections are unregistered before this returns.
    async fn dispatch(&self, notification: &Notification) -> BroadcastReport {
        let entries = self.registry.snapshot().await;
        let frame = Message::text(notification.payload().to_string());

        let results = join_all(
            entries
                .iter()
                .map(|entry| deliver(entry, frame.clone(), self.write_timeout)),
        )
        .await;

        let mut report = BroadcastReport {
            attempted: entries.len(),
            ..Default::default()
        };

        for (entry, result) in entries.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    warn!(
                        connection_id = %entry.id,
                        error = %failure,
                        "Broadcast send failed, dropping connection"
                    );
                    self.registry
                        .unregister(entry.id, RemovalReason::SendFailed)
                        .await;
                    entry.shutdown.cancel();
                    report.failed.push(entry.id);
                }
            }
        }

        debug!(
            origin = %notification.origin(),
            created_at = %notification.created_at(),
            queued_ms = notification.age().as_millis() as u64,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Broadcast dispatched"
        );

        report
    }
}

/// Queues one frame on a connection, bounded by `write_timeout`.
async fn deliver(
    entry: &ConnectionEntry,
    frame: Message,
    write_timeout: Duration,
) -> Result<(), SendFailure> {
    match timeout(write_timeout, entry.outbound.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(SendFailure::Closed),
        Err(_) => Err(SendFailure::Timeout(write_timeout)),
    }
}
