//! Robustness tests for the chat server.
//!
//! These tests verify the server handles edge cases and error conditions:
//! - Capacity limits queue connections instead of rejecting them
//! - Oversized and non-UTF-8 lines end only the offending session
//! - Rapid connect/disconnect leaves the registry clean
//! - Shutdown stops accepting and drains sessions
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::net::SocketAddr;
use std::time::Duration;

use parleyd::config::ServerConfig;
use parleyd::registry::RegistryHandle;
use parleyd::server::ChatServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(200);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn spawn_with(config: ServerConfig) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_grace_secs: 1,
            ..config
        };
        let cancel_token = CancellationToken::new();

        let server = ChatServer::bind(config, cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr();
        let registry = server.registry();

        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        TestServer {
            addr,
            registry,
            cancel_token,
            task,
        }
    }

    async fn spawn() -> Self {
        Self::spawn_with(ServerConfig::default()).await
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    async fn join(&self, name: &str) -> TestClient {
        let mut client = self.connect().await;
        client.expect_line("SUBMITNAME").await;
        client.send(name).await;
        client
            .expect_line(&format!("SERVER: {name} has joined the chat."))
            .await;
        client
    }

    async fn wait_for_participants(&self, expected: usize) {
        let start = tokio::time::Instant::now();
        while start.elapsed() < RECV_TIMEOUT {
            if self.registry.len().await == expected {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!(
            "registry has {} participants, expected {expected}",
            self.registry.len().await
        );
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.send_raw(line.as_bytes()).await;
        self.send_raw(b"\n").await;
    }

    async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn expect_line(&mut self, expected: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(expected));
    }

    /// Returns true if a line (or EOF) arrives within the quiet period.
    async fn hears_within_quiet_period(&mut self) -> bool {
        let mut line = String::new();
        timeout(QUIET_PERIOD, self.reader.read_line(&mut line))
            .await
            .is_ok()
    }
}

// ============================================================================
// Capacity Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connections_beyond_capacity_wait_at_accept() {
    let server = TestServer::spawn_with(ServerConfig {
        max_participants: 2,
        ..ServerConfig::default()
    })
    .await;

    let _alice = server.join("alice").await;
    let mut bob = server.join("bob").await;

    // The kernel completes the TCP handshake, but no session starts.
    let mut carol = server.connect().await;
    assert!(
        !carol.hears_within_quiet_period().await,
        "third client should not be prompted while at capacity"
    );

    bob.send("QUIT").await;

    carol.expect_line("SUBMITNAME").await;
    carol.send("carol").await;
    carol.expect_line("SERVER: carol has joined the chat.").await;
    server.wait_for_participants(2).await;

    server.cancel_token.cancel();
}

// ============================================================================
// Malformed Input Tests
// ============================================================================

#[tokio::test]
async fn test_oversized_line_ends_only_that_session() {
    let server = TestServer::spawn_with(ServerConfig {
        max_line_length: 64,
        ..ServerConfig::default()
    })
    .await;

    let mut alice = server.join("alice").await;
    let mut mallory = server.join("mallory").await;
    alice.expect_line("SERVER: mallory has joined the chat.").await;

    mallory.send(&"x".repeat(1000)).await;

    alice.expect_line("SERVER: mallory has left the chat.").await;
    server.wait_for_participants(1).await;

    alice.send("still here").await;
    alice.expect_line("alice: still here").await;

    server.cancel_token.cancel();
}

#[tokio::test]
async fn test_invalid_utf8_ends_session() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("alice").await;
    let mut mallory = server.join("mallory").await;
    alice.expect_line("SERVER: mallory has joined the chat.").await;

    mallory.send_raw(&[0xc3, 0x28, b'\n']).await;

    alice.expect_line("SERVER: mallory has left the chat.").await;
    server.wait_for_participants(1).await;

    server.cancel_token.cancel();
}

#[tokio::test]
async fn test_crlf_terminated_lines() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.expect_line("SUBMITNAME").await;
    client.send_raw(b"dos\r\n").await;
    client.expect_line("SERVER: dos has joined the chat.").await;

    client.send_raw(b"hi\r\nQUIT\r\n").await;
    client.expect_line("dos: hi").await;
    assert_eq!(client.recv().await, None);

    server.cancel_token.cancel();
}

// ============================================================================
// Churn Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_connect_disconnect() {
    let server = TestServer::spawn().await;

    for i in 0..30 {
        let mut client = server.connect().await;
        if i % 3 == 0 {
            // Leave before the prompt is read
            drop(client);
            continue;
        }
        client.expect_line("SUBMITNAME").await;
        if i % 3 == 1 {
            client.send(&format!("user{i}")).await;
        }
        drop(client);
    }

    server.wait_for_participants(0).await;
    assert!(server.registry.names().await.is_empty());

    server.cancel_token.cancel();
}

#[tokio::test]
async fn test_registry_size_matches_non_empty_names() {
    let server = TestServer::spawn().await;
    let names = ["a", "", "b", "   ", "c", "\t"];

    let mut kept = Vec::new();
    for name in names {
        let mut client = server.connect().await;
        client.expect_line("SUBMITNAME").await;
        client.send(name).await;
        if name.trim().is_empty() {
            assert_eq!(client.recv().await, None);
        } else {
            client
                .expect_line(&format!("SERVER: {name} has joined the chat."))
                .await;
            kept.push(client);
        }
    }

    server.wait_for_participants(3).await;
    let mut registered = server.registry.names().await;
    registered.sort();
    assert_eq!(registered, vec!["a", "b", "c"]);

    server.cancel_token.cancel();
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = TestServer::spawn().await;
    let addr = server.addr;

    server.cancel_token.cancel();
    timeout(RECV_TIMEOUT, server.task)
        .await
        .expect("server did not stop")
        .unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_waits_for_sessions_within_grace() {
    let server = TestServer::spawn().await;
    let mut alice = server.join("alice").await;

    server.cancel_token.cancel();

    // Finish the session inside the grace period; the server then exits.
    alice.send("QUIT").await;
    assert_eq!(alice.recv().await, None);

    timeout(RECV_TIMEOUT, server.task)
        .await
        .expect("server did not drain")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_gives_up_after_grace() {
    let server = TestServer::spawn().await;
    let _idle = server.join("idle").await;

    server.cancel_token.cancel();

    // The idle session never ends; run() still returns after the grace period.
    timeout(Duration::from_secs(3), server.task)
        .await
        .expect("server ignored its grace period")
        .unwrap();
}
