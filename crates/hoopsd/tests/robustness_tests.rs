//! Robustness tests for the relay.
//!
//! These tests verify the relay handles edge cases and error conditions gracefully:
//! - Abrupt disconnects without a close frame
//! - Binary and invalid UTF-8 frames
//! - Message size limits
//! - Rapid connect/disconnect
//! - Interleaved senders
//! - Peers that stop reading
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hoopsd::config::RelayConfig;
use hoops_core::Notification;
use hoopsd::hub::{spawn_hub, HubHandle};
use hoopsd::registry::{spawn_registry, RegistryHandle};
use hoopsd::server::RelayServer;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const REGISTRY_WAIT_TIMEOUT: Duration = Duration::from_secs(2);
const REGISTRY_POLL_INTERVAL: Duration = Duration::from_millis(10);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Inbound size limit used by these tests
const TEST_MAX_MESSAGE_SIZE: usize = 64;

/// Enough data to fill the kernel socket buffers of a peer that never reads
const STALL_BROADCASTS: usize = 400;
const STALL_PAYLOAD_SIZE: usize = 128 * 1024;

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    hub: HubHandle,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = RelayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            write_timeout_ms: 500,
            shutdown_timeout_ms: 1000,
            max_message_size: TEST_MAX_MESSAGE_SIZE,
            ..Default::default()
        };

        let registry = spawn_registry(config.max_connections);
        let hub = spawn_hub(registry.clone(), config.write_timeout(), config.dispatch_buffer);
        let cancel_token = CancellationToken::new();

        let server = RelayServer::bind(&config, registry.clone(), hub.clone(), cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            registry,
            hub,
            cancel_token,
        }
    }

    async fn connect(&self) -> TestClient {
        let (ws, _) = connect_async(format!("ws://{}", self.addr))
            .await
            .expect("connect to relay");
        let mut client = TestClient { ws };
        let _greeting = client.recv_text().await;
        client
    }

    async fn wait_for_registry(&self, expected: usize) {
        let start = tokio::time::Instant::now();
        while start.elapsed() < REGISTRY_WAIT_TIMEOUT {
            if self.registry.len().await == expected {
                return;
            }
            sleep(REGISTRY_POLL_INTERVAL).await;
        }
        panic!(
            "registry size {} did not reach {expected} within {REGISTRY_WAIT_TIMEOUT:?}",
            self.registry.len().await
        );
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn send(&mut self, msg: Message) {
        self.ws.send(msg).await.unwrap();
    }

    async fn recv_text(&mut self) -> String {
        loop {
            let msg = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("read error");
            if let Message::Text(text) = msg {
                return text.as_str().to_string();
            }
        }
    }

    async fn recv_n(&mut self, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.recv_text().await);
        }
        out
    }
}

// ============================================================================
// Disconnect Tests
// ============================================================================

#[tokio::test]
async fn test_abrupt_drop_is_removed_and_others_still_receive() {
    let server = TestServer::spawn().await;
    let dropped = server.connect().await;
    let mut c2 = server.connect().await;
    let mut c3 = server.connect().await;
    server.wait_for_registry(3).await;

    // No close frame: the TCP stream just goes away.
    drop(dropped);
    server.wait_for_registry(2).await;

    c2.send(Message::text("after drop")).await;
    assert_eq!(c2.recv_text().await, "after drop");
    assert_eq!(c3.recv_text().await, "after drop");

    server.shutdown().await;
}

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let server = TestServer::spawn().await;

    for _ in 0..25 {
        let (ws, _) = connect_async(format!("ws://{}", server.addr)).await.unwrap();
        drop(ws);
    }

    server.wait_for_registry(0).await;

    // Server remains usable.
    let mut client = server.connect().await;
    client.send(Message::text("still here")).await;
    assert_eq!(client.recv_text().await, "still here");

    server.shutdown().await;
}

// ============================================================================
// Framing Tests
// ============================================================================

#[tokio::test]
async fn test_valid_utf8_binary_relayed_as_text() {
    let server = TestServer::spawn().await;
    let mut sender = server.connect().await;
    let mut peer = server.connect().await;
    server.wait_for_registry(2).await;

    sender.send(Message::binary(b"refresh".to_vec())).await;

    assert_eq!(sender.recv_text().await, "refresh");
    assert_eq!(peer.recv_text().await, "refresh");

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_utf8_binary_relayed_as_hex() {
    let server = TestServer::spawn().await;
    let mut sender = server.connect().await;
    let mut peer = server.connect().await;
    server.wait_for_registry(2).await;

    sender.send(Message::binary(vec![0xff, 0xfe, 0x41])).await;

    assert_eq!(peer.recv_text().await, "0xfffe41");
    assert_eq!(sender.recv_text().await, "0xfffe41");

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_message_dropped_connection_survives() {
    let server = TestServer::spawn().await;
    let mut sender = server.connect().await;
    let mut peer = server.connect().await;
    server.wait_for_registry(2).await;

    sender
        .send(Message::text("x".repeat(TEST_MAX_MESSAGE_SIZE + 1)))
        .await;
    sender.send(Message::text("small")).await;

    // Only the small frame is relayed, and both clients stay registered.
    assert_eq!(peer.recv_text().await, "small");
    assert_eq!(sender.recv_text().await, "small");
    assert_eq!(server.registry.len().await, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_ping_frames_are_not_relayed() {
    let server = TestServer::spawn().await;
    let mut sender = server.connect().await;
    let mut peer = server.connect().await;
    server.wait_for_registry(2).await;

    sender.send(Message::Ping(vec![1, 2, 3].into())).await;
    sender.send(Message::text("after ping")).await;

    assert_eq!(peer.recv_text().await, "after ping");

    server.shutdown().await;
}

// ============================================================================
// Ordering Tests
// ============================================================================

#[tokio::test]
async fn test_interleaved_senders_keep_per_sender_order() {
    const PER_SENDER: usize = 10;

    let server = TestServer::spawn().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    server.wait_for_registry(2).await;

    for i in 0..PER_SENDER {
        a.send(Message::text(format!("a{i}"))).await;
        b.send(Message::text(format!("b{i}"))).await;
    }

    let seen_by_a = a.recv_n(PER_SENDER * 2).await;
    let seen_by_b = b.recv_n(PER_SENDER * 2).await;

    // One dispatcher means one global order, seen identically by everyone.
    assert_eq!(seen_by_a, seen_by_b);

    for prefix in ["a", "b"] {
        let from_sender: Vec<_> = seen_by_a
            .iter()
            .filter(|m| m.starts_with(prefix))
            .cloned()
            .collect();
        let expected: Vec<_> = (0..PER_SENDER).map(|i| format!("{prefix}{i}")).collect();
        assert_eq!(from_sender, expected);
    }

    server.shutdown().await;
}

// ============================================================================
// Slow Consumer Tests
// ============================================================================

#[tokio::test]
async fn test_stalled_reader_dropped_after_write_timeout() {
    let server = TestServer::spawn().await;
    let stalled = server.connect().await;
    let mut live = server.connect().await;
    server.wait_for_registry(2).await;

    let reader = tokio::spawn(async move {
        let mut seen = Vec::with_capacity(STALL_BROADCASTS);
        for _ in 0..STALL_BROADCASTS {
            let text = live.recv_text().await;
            let (index, filler) = text.split_once(':').expect("indexed payload");
            assert_eq!(filler.len(), STALL_PAYLOAD_SIZE);
            seen.push(index.parse::<usize>().unwrap());
        }
        seen
    });

    // `stalled` is never read again, so its socket fills and the relay's
    // write to it eventually times out.
    let filler = "x".repeat(STALL_PAYLOAD_SIZE);
    for i in 0..STALL_BROADCASTS {
        server
            .hub
            .broadcast_and_wait(Notification::external("test", format!("{i}:{filler}")))
            .await
            .unwrap();
    }

    server.wait_for_registry(1).await;

    let seen = timeout(Duration::from_secs(10), reader)
        .await
        .expect("live reader timed out")
        .unwrap();
    assert_eq!(seen, (0..STALL_BROADCASTS).collect::<Vec<_>>());

    drop(stalled);
    server.shutdown().await;
}
