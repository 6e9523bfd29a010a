//! Integration tests for the Registry Actor.
//!
//! These tests verify the registry works correctly as a complete system,
//! testing the spawn_registry() function and RegistryHandle interface.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::collections::HashSet;

use hoops_core::{ConnectionId, ScreenId};
use hoopsd::registry::{
    spawn_registry, ConnectionEntry, RegistryError, RemovalReason, DEFAULT_MAX_CONNECTIONS,
};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Helper to create an entry whose outbound receiver is returned to the caller.
fn create_entry(screen: Option<&str>) -> (ConnectionEntry, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(8);
    let entry = ConnectionEntry::new(
        ConnectionId::generate(),
        screen.map(ScreenId::new),
        tx,
        CancellationToken::new(),
    );
    (entry, rx)
}

// ============================================================================
// Basic Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_basic_lifecycle() {
    let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);

    let (entry, _rx) = create_entry(Some("scoreboard"));
    let id = handle.register(entry).await.expect("registration should succeed");

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, id);
    assert_eq!(
        snapshot[0].screen_id.as_ref().map(ScreenId::as_str),
        Some("scoreboard")
    );

    assert!(handle.unregister(id, RemovalReason::Closed).await);
    assert!(handle.is_empty().await);
}

#[tokio::test]
async fn test_duplicate_registration_fails() {
    let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);

    let (entry, _rx) = create_entry(None);
    let duplicate = entry.clone();
    handle.register(entry).await.expect("first should succeed");

    let result = handle.register(duplicate).await;
    assert!(
        matches!(result, Err(RegistryError::DuplicateId(_))),
        "expected DuplicateId error, got: {result:?}"
    );
    assert_eq!(handle.len().await, 1);
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
    let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);
    let (entry, _rx) = create_entry(None);
    let id = handle.register(entry).await.unwrap();

    // Hub and connection handler may both remove the same id.
    assert!(handle.unregister(id, RemovalReason::SendFailed).await);
    assert!(!handle.unregister(id, RemovalReason::Closed).await);
    assert!(handle.is_empty().await);
}

#[tokio::test]
async fn test_unregister_unknown_id_is_noop() {
    let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);
    let (entry, _rx) = create_entry(None);
    handle.register(entry).await.unwrap();

    assert!(!handle
        .unregister(ConnectionId::generate(), RemovalReason::Closed)
        .await);
    assert_eq!(handle.len().await, 1);
}

// ============================================================================
// Capacity Tests
// ============================================================================

#[tokio::test]
async fn test_capacity_limit() {
    let handle = spawn_registry(3);
    let mut receivers = Vec::new();

    for _ in 0..3 {
        let (entry, rx) = create_entry(None);
        handle.register(entry).await.unwrap();
        receivers.push(rx);
    }

    let (entry, _rx) = create_entry(None);
    assert_eq!(
        handle.register(entry).await,
        Err(RegistryError::RegistryFull { max: 3 })
    );
}

#[tokio::test]
async fn test_capacity_after_removal() {
    let handle = spawn_registry(1);

    let (first, _rx1) = create_entry(None);
    let id = handle.register(first).await.unwrap();

    handle.unregister(id, RemovalReason::Closed).await;

    let (second, _rx2) = create_entry(None);
    assert!(handle.register(second).await.is_ok());
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_registration() {
    let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let (entry, rx) = create_entry(None);
            let id = handle.register(entry).await.unwrap();
            (id, rx)
        }));
    }

    let mut ids = HashSet::new();
    let mut receivers = Vec::new();
    for task in tasks {
        let (id, rx) = task.await.unwrap();
        ids.insert(id.to_string());
        receivers.push(rx);
    }

    assert_eq!(ids.len(), 50);
    assert_eq!(handle.len().await, 50);
}

#[tokio::test]
async fn test_snapshot_while_mutating() {
    let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);

    let mut kept = Vec::new();
    for _ in 0..10 {
        let (entry, rx) = create_entry(None);
        let id = handle.register(entry).await.unwrap();
        kept.push((id, rx));
    }

    let writer = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let (entry, _rx) = create_entry(None);
                let id = handle.register(entry).await.unwrap();
                handle.unregister(id, RemovalReason::Closed).await;
            }
        })
    };

    // Each snapshot is consistent: the 10 stable entries are always present,
    // and at most one transient entry is in flight.
    for _ in 0..50 {
        let snapshot = handle.snapshot().await;
        assert!(snapshot.len() == 10 || snapshot.len() == 11);
        for (id, _) in &kept {
            assert!(snapshot.iter().any(|e| e.id == *id));
        }
    }

    writer.await.unwrap();
    assert_eq!(handle.len().await, 10);
}

#[tokio::test]
async fn test_snapshot_is_detached_from_registry() {
    let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);
    let (entry, mut rx) = create_entry(None);
    let id = handle.register(entry).await.unwrap();

    let snapshot = handle.snapshot().await;
    handle.unregister(id, RemovalReason::Closed).await;

    // A stale entry can still attempt a send; it never refers to anything invalid.
    snapshot[0].outbound.send(Message::text("late")).await.unwrap();
    assert_eq!(rx.recv().await.unwrap().to_text().unwrap(), "late");
    assert!(handle.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_handle_cloning() {
    let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);
    let clone = handle.clone();

    let (entry, _rx) = create_entry(None);
    let id = handle.register(entry).await.unwrap();

    assert!(clone.contains(id).await);
}
