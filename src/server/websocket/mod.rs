//! WebSocket infrastructure for real-time position relay.
//!
//! Every connection registers in a shared [`ConnectionRegistry`]; each
//! position update received on one connection is broadcast to all of them.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod session;

pub use connection::{
    BroadcastReport, ConnectionHandle, ConnectionId, ConnectionRegistry, OutgoingFrame,
    RegistryError, SendError,
};
pub use handler::{upgrade, ws_handler};
pub use messages::{BroadcastEnvelope, PlayerMessage, Position, PositionUpdate};
pub use session::{Session, SessionError, SessionState};
