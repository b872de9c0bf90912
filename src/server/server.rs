use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;

use axum::{
    extract::{ws::rejection::WebSocketUpgradeRejection, State, WebSocketUpgrade},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use super::metrics::metrics_handler;
use super::state::{GuardedConnectionRegistry, ServerState};
use super::websocket::{upgrade, ws_handler};
use super::{log_requests, ServerConfig};

pub const LIVENESS_MESSAGE: &str = "WebSocket server is running.";

/// Root route: upgrade requests become WebSocket sessions, anything else gets
/// the plain-text liveness message.
async fn home(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<ServerState>,
) -> Response {
    match ws {
        Ok(ws) => upgrade(ws, &state.config, state.connection_registry.clone()),
        Err(_) => LIVENESS_MESSAGE.into_response(),
    }
}

pub fn make_app(config: ServerConfig, connection_registry: GuardedConnectionRegistry) -> Router {
    let state = ServerState {
        config,
        connection_registry,
    };

    Router::new()
        .route("/", get(home))
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve the relay until `shutdown` resolves.
///
/// A `metrics_port` of 0 disables the metrics listener.
pub async fn run_server<F>(
    config: ServerConfig,
    connection_registry: GuardedConnectionRegistry,
    metrics_port: u16,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    if metrics_port > 0 {
        let metrics_address = format!("{}:{}", config.bind_address, metrics_port);
        let metrics_listener = TcpListener::bind(&metrics_address)
            .await
            .with_context(|| format!("Failed to bind metrics listener {}", metrics_address))?;
        info!("Metrics available at {}", metrics_address);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, make_metrics_app()).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        });
    }

    let app = make_app(config, connection_registry);
    info!("Ready to serve at {}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
