//! Server configuration.

use std::time::Duration;

use lspbridge_settings::ServerSettings;

/// Configuration for the WebSocket server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind; `0` auto-assigns.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a client silent for longer than this many seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-client outbound queue length.
    pub send_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.heartbeat_timeout_secs,
            max_message_size: settings.max_message_size,
            send_queue_capacity: settings.send_queue_capacity,
        }
    }
}

impl ServerConfig {
    /// Per-connection parameters for WebSocket sessions.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
            send_queue_capacity: self.send_queue_capacity.max(1),
        }
    }
}

/// Per-connection parameters.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Time between pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is dropped.
    pub heartbeat_timeout: Duration,
    /// Outbound queue length.
    pub send_queue_capacity: usize,
}
