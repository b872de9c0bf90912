use super::RequestsLoggingLevel;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub bind_address: String,
    pub port: u16,
    /// Capacity of each connection's outbound frame queue.
    pub outgoing_queue_size: usize,
    /// Largest inbound WebSocket message accepted, after reassembly.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
            outgoing_queue_size: 64,
            max_message_size: 64 * 1024,
        }
    }
}
