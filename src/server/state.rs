use axum::extract::FromRef;
use std::sync::Arc;

use super::websocket::ConnectionRegistry;
use super::ServerConfig;

pub type GuardedConnectionRegistry = Arc<ConnectionRegistry>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub connection_registry: GuardedConnectionRegistry,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedConnectionRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.connection_registry.clone()
    }
}
