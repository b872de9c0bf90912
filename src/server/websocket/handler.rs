//! WebSocket route handler.
//!
//! Handles WebSocket upgrade, the receive loop, fan-out and cleanup.

use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    connection::{ConnectionHandle, ConnectionId, ConnectionRegistry, OutgoingFrame},
    messages::{decode_player_message, encode_broadcast, PositionUpdate},
    session::{Session, SessionError, SessionState},
};
use crate::server::metrics;
use crate::server::state::GuardedConnectionRegistry;
use crate::server::ServerConfig;

/// How long a cleanly closing session waits for its writer to flush.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler for the dedicated `/ws` route.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(config): State<ServerConfig>,
    State(registry): State<GuardedConnectionRegistry>,
) -> Response {
    upgrade(ws, &config, registry)
}

/// Complete the upgrade and hand the socket to a new session.
pub fn upgrade(
    ws: WebSocketUpgrade,
    config: &ServerConfig,
    registry: GuardedConnectionRegistry,
) -> Response {
    let queue_size = config.outgoing_queue_size;
    ws.max_message_size(config.max_message_size)
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| handle_socket(socket, registry, queue_size))
}

/// Handle an established WebSocket connection until it closes.
async fn handle_socket(socket: WebSocket, registry: GuardedConnectionRegistry, queue_size: usize) {
    let mut session = Session::new(ConnectionId::generate());
    let id = session.id();

    let (handle, outgoing_rx) = ConnectionHandle::new(id, queue_size);
    if let Err(e) = registry.register(handle.clone()).await {
        // Ids are random v4 UUIDs, this is a bug rather than a runtime condition.
        error!("Refusing WebSocket connection: {}", e);
        metrics::record_session_error(SessionError::from(e).kind());
        session.transition(SessionState::Closed);
        return;
    }
    session.transition(SessionState::Open);
    metrics::record_connection_opened();
    info!("WebSocket connected: {}", id);

    let (ws_sink, ws_stream) = socket.split();
    let mut outgoing_task = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx));

    let outcome = process_incoming(ws_stream, id, &registry).await;
    session.transition(SessionState::Closing);

    match outcome {
        Ok(frame) => {
            debug!(
                "Echoing close {} ({:?}) to {}",
                frame.code,
                frame.reason.as_str(),
                id
            );
            // Once the peer sees the echo it is no longer a broadcast target.
            registry.unregister(id).await;
            let echo = OutgoingFrame::Close {
                code: frame.code,
                reason: frame.reason,
            };
            // Full queue here means the peer stopped reading.
            match handle.try_send(echo) {
                Ok(()) => {
                    drop(handle);
                    if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, &mut outgoing_task)
                        .await
                        .is_err()
                    {
                        warn!("Timed out flushing close handshake to {}", id);
                        outgoing_task.abort();
                    }
                }
                Err(e) => {
                    warn!("Close echo to {} not queued ({}), dropping connection", id, e);
                    outgoing_task.abort();
                }
            }
        }
        Err(e) => {
            match &e {
                SessionError::MissingCloseStatus => warn!("Protocol error on {}: {}", id, e),
                _ => debug!("WebSocket {} torn down: {}", id, e),
            }
            metrics::record_session_error(e.kind());
            registry.unregister(id).await;
            outgoing_task.abort();
        }
    }

    session.transition(SessionState::Closed);
    metrics::record_connection_closed();
    info!("WebSocket disconnected: {}", id);
}

/// Forward queued frames to the WebSocket, in order, until a close frame has
/// been written, the queue is dropped, or a write fails.
async fn forward_outgoing(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<OutgoingFrame>,
) {
    while let Some(frame) = outgoing_rx.recv().await {
        let (message, is_close) = match frame {
            OutgoingFrame::Text(text) => (Message::Text(text), false),
            OutgoingFrame::Close { code, reason } => {
                (Message::Close(Some(CloseFrame { code, reason })), true)
            }
        };
        if let Err(e) = ws_sink.send(message).await {
            debug!("WebSocket write failed: {}", e);
            break;
        }
        if is_close {
            break;
        }
    }
    // Flushes a pending close reply even when a data frame raced the peer's close.
    if let Err(e) = ws_sink.close().await {
        debug!("WebSocket close flush failed: {}", e);
    }
}

/// Run the receive loop.
///
/// Returns the peer's close frame on a clean close handshake, or the error
/// that ended the session.
async fn process_incoming(
    mut ws_stream: SplitStream<WebSocket>,
    id: ConnectionId,
    registry: &ConnectionRegistry,
) -> Result<CloseFrame, SessionError> {
    while let Some(result) = ws_stream.next().await {
        match result? {
            Message::Text(text) => {
                handle_position_message(id, text.as_str(), registry).await;
            }
            Message::Binary(_) => {
                debug!("Received binary message on {}, ignoring", id);
                metrics::record_message_received("ignored");
            }
            // Answered by the WebSocket layer
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(Some(frame)) => {
                debug!("Received close frame on {}", id);
                return Ok(frame);
            }
            Message::Close(None) => return Err(SessionError::MissingCloseStatus),
        }
    }
    Err(SessionError::ConnectionReset)
}

/// Decode one inbound text frame and fan it out to every connection.
///
/// Malformed frames are dropped without telling the sender.
async fn handle_position_message(origin: ConnectionId, text: &str, registry: &ConnectionRegistry) {
    let message = match decode_player_message(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Dropping message from {}: {}", origin, e);
            metrics::record_message_received("malformed");
            return;
        }
    };

    let update = PositionUpdate {
        origin,
        position: message.position,
    };
    let json = match encode_broadcast(&update.envelope()) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize broadcast from {}: {}", origin, e);
            return;
        }
    };

    let report = registry.broadcast(OutgoingFrame::Text(json.into())).await;
    metrics::record_message_received("broadcast");
    metrics::record_broadcast(&report);

    if !report.full.is_empty() {
        warn!(
            "Broadcast from {} dropped for {} slow connection(s)",
            origin,
            report.full.len()
        );
    }
    debug!(
        "Broadcast from {} delivered to {} connection(s), {} failed ({} closed)",
        origin,
        report.delivered,
        report.failed_count(),
        report.closed.len()
    );
}
