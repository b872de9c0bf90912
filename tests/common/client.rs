//! WebSocket test client
//!
//! Thin wrapper around a tokio-tungstenite stream that speaks the relay's
//! JSON protocol.

use super::constants::*;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// A decoded broadcast envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub player_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Envelope {
    fn from_json(value: &Value) -> Option<Self> {
        let position = value.get("position")?;
        Some(Self {
            player_id: value.get("playerId")?.as_str()?.to_string(),
            x: position.get("X")?.as_f64()?,
            y: position.get("Y")?.as_f64()?,
            z: position.get("Z")?.as_f64()?,
        })
    }

    pub fn position(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }
}

pub struct WsTestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTestClient {
    pub async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url)
            .await
            .expect("Failed to connect to WebSocket");
        Self { ws }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::text(text))
            .await
            .expect("Failed to send text frame");
    }

    pub async fn send_position(&mut self, x: f64, y: f64, z: f64) {
        let payload = json!({ "Position": { "X": x, "Y": y, "Z": z } });
        self.send_text(&payload.to_string()).await;
    }

    pub async fn send_binary(&mut self, data: Vec<u8>) {
        self.ws
            .send(Message::binary(data))
            .await
            .expect("Failed to send binary frame");
    }

    /// Sends `count` position updates, buffering them and flushing once.
    pub async fn flood_positions(&mut self, count: usize) {
        for i in 0..count {
            let payload = json!({ "Position": { "X": i as f64, "Y": 0.0, "Z": 0.0 } });
            self.ws
                .feed(Message::text(payload.to_string()))
                .await
                .expect("Failed to queue text frame");
        }
        self.ws.flush().await.expect("Failed to flush text frames");
    }

    /// Next text frame as JSON, or None on timeout or end of stream.
    pub async fn next_json(&mut self, timeout_duration: Duration) -> Option<Value> {
        let result = timeout(timeout_duration, async {
            while let Some(Ok(msg)) = self.ws.next().await {
                if let Message::Text(text) = msg {
                    return serde_json::from_str::<Value>(&text).ok();
                }
            }
            None
        })
        .await;

        result.ok().flatten()
    }

    /// Waits for the next broadcast envelope, panicking if none arrives.
    pub async fn expect_envelope(&mut self) -> Envelope {
        let value = self
            .next_json(Duration::from_millis(MESSAGE_TIMEOUT_MS))
            .await
            .expect("Expected a broadcast envelope");
        Envelope::from_json(&value)
            .unwrap_or_else(|| panic!("Not a broadcast envelope: {}", value))
    }

    /// Asserts that nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        if let Some(value) = self
            .next_json(Duration::from_millis(SILENCE_TIMEOUT_MS))
            .await
        {
            panic!("Expected no message, got {}", value);
        }
    }

    /// Sends a close frame with a status code and returns the server's reply.
    pub async fn close_with(&mut self, code: CloseCode, reason: &str) -> Option<CloseFrame> {
        self.send_close(code, reason).await;
        self.wait_for_close_reply().await
    }

    /// Sends a close frame without reading anything back.
    pub async fn send_close(&mut self, code: CloseCode, reason: &str) {
        self.ws
            .close(Some(CloseFrame {
                code,
                reason: reason.into(),
            }))
            .await
            .expect("Failed to send close frame");
    }

    /// Sends a close frame with an empty payload (no status code).
    pub async fn close_without_status(&mut self) {
        self.ws
            .close(None)
            .await
            .expect("Failed to send close frame");
    }

    /// Reads until the server's close frame arrives, skipping any data frames
    /// still in flight.
    async fn wait_for_close_reply(&mut self) -> Option<CloseFrame> {
        let result = timeout(Duration::from_millis(MESSAGE_TIMEOUT_MS), async {
            while let Some(Ok(msg)) = self.ws.next().await {
                if let Message::Close(frame) = msg {
                    return frame;
                }
            }
            None
        })
        .await;

        result.ok().flatten()
    }

    /// Waits until the server ends the stream. Returns false on timeout.
    pub async fn wait_for_disconnect(&mut self) -> bool {
        timeout(Duration::from_millis(MESSAGE_TIMEOUT_MS), async {
            while let Some(Ok(_)) = self.ws.next().await {}
        })
        .await
        .is_ok()
    }
}
