mod file_config;

pub use file_config::{FileConfig, WebSocketConfig};

use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;

/// Smallest `max_message_size` that still fits a position update.
const MIN_MAX_MESSAGE_SIZE: usize = 128;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub bind_address: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub outgoing_queue_size: usize,
    pub max_message_size: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            bind_address: server.bind_address,
            port: server.port,
            metrics_port: 9092,
            logging_level: server.requests_logging_level,
            outgoing_queue_size: server.outgoing_queue_size,
            max_message_size: server.max_message_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub port: u16,
    /// 0 disables the metrics listener.
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub websocket: WebSocketSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketSettings {
    pub outgoing_queue_size: usize,
    pub max_message_size: usize,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let bind_address = file
            .bind_address
            .unwrap_or_else(|| cli.bind_address.clone());
        if bind_address.trim().is_empty() {
            bail!("bind_address must not be empty");
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if metrics_port != 0 && metrics_port == port {
            bail!("metrics_port must differ from port ({})", port);
        }

        let logging_level = match file.logging_level {
            Some(s) => match parse_logging_level(&s) {
                Some(level) => level,
                None => bail!("Invalid logging_level in config file: {}", s),
            },
            None => cli.logging_level.clone(),
        };

        let ws_file = file.websocket.unwrap_or_default();
        let websocket = WebSocketSettings {
            outgoing_queue_size: ws_file
                .outgoing_queue_size
                .unwrap_or(cli.outgoing_queue_size),
            max_message_size: ws_file.max_message_size.unwrap_or(cli.max_message_size),
        };
        if websocket.outgoing_queue_size == 0 {
            bail!("outgoing_queue_size must be greater than 0");
        }
        if websocket.max_message_size < MIN_MAX_MESSAGE_SIZE {
            bail!(
                "max_message_size must be at least {} bytes",
                MIN_MAX_MESSAGE_SIZE
            );
        }

        Ok(Self {
            bind_address,
            port,
            metrics_port,
            logging_level,
            websocket,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            bind_address: self.bind_address.clone(),
            port: self.port,
            outgoing_queue_size: self.websocket.outgoing_queue_size,
            max_message_size: self.websocket.max_message_size,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
