//! WebSocket connection registry.
//!
//! Tracks every live WebSocket connection by its server-assigned id and fans
//! outgoing frames out to all of them. Each connection is represented by the
//! sending half of its outbound queue; the queue is drained by a single writer
//! task, so frames coming from different broadcasters never interleave on the
//! wire.

use std::collections::HashMap;
use std::fmt;

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Server-assigned connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A frame queued for delivery on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingFrame {
    Text(Utf8Bytes),
    /// Close handshake reply. The writer stops after sending it.
    Close { code: u16, reason: Utf8Bytes },
}

/// Handle to a live connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<OutgoingFrame>,
}

impl ConnectionHandle {
    /// Create a handle with a queue of `capacity` frames.
    ///
    /// Returns the receiver the connection's writer task should drain.
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<OutgoingFrame>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { id, sender }, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The stream is open as long as its writer still holds the receiver.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a frame without waiting for room.
    pub fn try_send(&self, frame: OutgoingFrame) -> Result<(), SendError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Disconnected,
        })
    }
}

/// Error type for send operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection's outbound queue is full (slow reader).
    #[error("outbound queue full")]
    QueueFull,
    /// The connection's writer is gone.
    #[error("connection closed")]
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),
}

/// Outcome of a single fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Peers whose stream was already closed when the snapshot was walked.
    pub closed: Vec<ConnectionId>,
    /// Peers that missed this frame because their queue was full.
    pub full: Vec<ConnectionId>,
}

impl BroadcastReport {
    pub fn failed_count(&self) -> usize {
        self.closed.len() + self.full.len()
    }
}

/// Registry of live connections, shared by all session handlers.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Ids are random and never reused, so a duplicate means something is
    /// broken. The existing entry is left untouched.
    pub async fn register(&self, handle: ConnectionHandle) -> Result<(), RegistryError> {
        let mut conns = self.connections.write().await;
        let id = handle.id();
        if conns.contains_key(&id) {
            return Err(RegistryError::DuplicateConnection(id));
        }
        conns.insert(id, handle);
        Ok(())
    }

    /// Unregister a connection. Safe to call more than once.
    ///
    /// Returns true if an entry was removed.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut conns = self.connections.write().await;
        conns.remove(&id).is_some()
    }

    /// Point-in-time copy of every registered connection.
    ///
    /// The lock is released before this returns, so callers can iterate and
    /// send while other sessions register or unregister.
    pub async fn snapshot(&self) -> Vec<ConnectionHandle> {
        let conns = self.connections.read().await;
        conns.values().cloned().collect()
    }

    /// Queue `frame` on every open connection, the originator included.
    ///
    /// Each peer is independent: a full or closed queue is recorded in the
    /// report and the walk carries on with the next peer.
    pub async fn broadcast(&self, frame: OutgoingFrame) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for handle in self.snapshot().await {
            if !handle.is_open() {
                report.closed.push(handle.id());
                continue;
            }
            match handle.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(SendError::QueueFull) => report.full.push(handle.id()),
                Err(SendError::Disconnected) => report.closed.push(handle.id()),
            }
        }

        report
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        let conns = self.connections.read().await;
        conns.contains_key(&id)
    }

    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        let conns = self.connections.read().await;
        conns.keys().copied().collect()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        let conns = self.connections.read().await;
        conns.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
