//! WebSocket message types.
//!
//! Inbound messages use PascalCase field names (`PlayerId`, `Position`), outbound
//! envelopes use camelCase (`playerId`, `position`). Coordinates are `X`/`Y`/`Z`
//! in both directions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::connection::ConnectionId;

/// A point in world space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    #[serde(rename = "X", alias = "x")]
    pub x: f32,
    #[serde(rename = "Y", alias = "y")]
    pub y: f32,
    #[serde(rename = "Z", alias = "z")]
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Client -> Server position report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerMessage {
    /// Client-side notion of who is moving. Ignored for routing: broadcasts
    /// are always tagged with the server-assigned connection id.
    #[serde(
        rename = "PlayerId",
        alias = "playerId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub player_id: Option<String>,
    #[serde(rename = "Position", alias = "position")]
    pub position: Position,
}

/// A decoded position bound to the connection it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    pub origin: ConnectionId,
    pub position: Position,
}

impl PositionUpdate {
    pub fn envelope(&self) -> BroadcastEnvelope {
        BroadcastEnvelope {
            player_id: self.origin,
            position: self.position,
        }
    }
}

/// Server -> Client broadcast of a single position update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastEnvelope {
    #[serde(rename = "playerId")]
    pub player_id: ConnectionId,
    pub position: Position,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid player message: {0}")]
    Json(#[from] serde_json::Error),
    /// A coordinate overflowed `f32` and would be written out as `null`.
    #[error("position coordinate out of range")]
    NonFiniteCoordinate,
}

/// Decode an inbound text frame into a [`PlayerMessage`].
///
/// Fails on malformed JSON, a missing `Position`, or a coordinate that is not
/// a finite `f32`.
pub fn decode_player_message(text: &str) -> Result<PlayerMessage, DecodeError> {
    let message: PlayerMessage = serde_json::from_str(text)?;
    if !message.position.is_finite() {
        return Err(DecodeError::NonFiniteCoordinate);
    }
    Ok(message)
}

/// Encode a broadcast envelope as the JSON text sent to every peer.
pub fn encode_broadcast(envelope: &BroadcastEnvelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}
