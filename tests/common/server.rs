//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own connection registry, bound
//! to a random port.

use super::constants::*;
use position_relay::{make_app, ConnectionId, ConnectionRegistry, RequestsLoggingLevel, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Test server instance
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL for HTTP requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// WebSocket URL of the root upgrade endpoint (e.g., "ws://127.0.0.1:12345/")
    pub ws_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// The registry used by the server, for direct inspection in tests
    pub registry: Arc<ConnectionRegistry>,

    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        })
        .await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if port binding fails or the server doesn't become ready within
    /// the timeout.
    pub async fn spawn_with_config(mut config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        config.port = port;

        let base_url = format!("http://127.0.0.1:{}", port);
        let ws_url = format!("ws://127.0.0.1:{}/", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let registry = Arc::new(ConnectionRegistry::new());
        let app = make_app(config, registry.clone());

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            ws_url,
            port,
            registry,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Polls until the registry holds exactly `expected` connections.
    ///
    /// Registration happens on the server task after the handshake completes,
    /// so a freshly connected client may not be visible yet.
    pub async fn wait_for_connections(&self, expected: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(MESSAGE_TIMEOUT_MS);
        loop {
            let count = self.registry.len().await;
            if count == expected {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Expected {} connections, registry has {}", expected, count);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Polls until `id` is no longer registered.
    pub async fn wait_for_unregistered(&self, id: ConnectionId) {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(MESSAGE_TIMEOUT_MS);
        while self.registry.contains(id).await {
            if tokio::time::Instant::now() > deadline {
                panic!("Connection {} was never unregistered", id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Waits for the server to become ready by polling the liveness endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
