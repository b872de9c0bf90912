//! Position Relay Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod server;

// Re-export commonly used types for convenience
pub use server::websocket::{ConnectionId, ConnectionRegistry};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
