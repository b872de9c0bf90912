//! Per-connection session lifecycle.

use thiserror::Error;
use tracing::{debug, warn};

use super::connection::{ConnectionId, RegistryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closed) | (Open, Closing) | (Closing, Closed)
        )
    }
}

/// Reasons a session ends other than a clean close handshake.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer sent a close frame with no status code.
    #[error("close frame without status code")]
    MissingCloseStatus,
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
    /// The stream ended before any close frame was received.
    #[error("connection ended without close handshake")]
    ConnectionReset,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SessionError {
    /// Label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::MissingCloseStatus => "protocol",
            SessionError::Transport(_) | SessionError::ConnectionReset => "transport",
            SessionError::Registry(_) => "registry",
        }
    }
}

/// Tracks where a single connection is in its lifecycle.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    state: SessionState,
}

impl Session {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`. Returns false, leaving the state unchanged, if the
    /// transition is not allowed.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                "Ignoring session transition {:?} -> {:?} for {}",
                self.state, next, self.id
            );
            return false;
        }
        debug!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        true
    }
}
