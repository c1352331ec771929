//! Settings structures and their compiled defaults.
//!
//! Field names are camelCase on disk; every section is `#[serde(default)]`
//! so a settings file only needs the keys it changes.

use lspbridge_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// WebSocket server.
    pub server: ServerSettings,
    /// Child process.
    pub process: ProcessSettings,
    /// Diagnostic logging.
    pub logging: LoggingSettings,
}

/// WebSocket server settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum concurrently connected WebSocket clients.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a client is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Outbound messages buffered per client before it is considered stuck.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5007,
            max_connections: 64,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 16 * 1024 * 1024,
            send_queue_capacity: 1024,
        }
    }
}

/// How the language server is launched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessSettings {
    /// Launcher program; the server path is appended to `command args...`.
    /// Empty runs the server path directly.
    pub command: String,
    /// Arguments placed between `command` and the server path.
    pub args: Vec<String>,
    /// Milliseconds to wait for a voluntary exit before killing.
    pub terminate_grace_ms: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            command: "java".to_string(),
            args: vec!["-Xmx2G".to_string(), "-jar".to_string()],
            terminate_grace_ms: 2000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `info` or `lspbridge_server=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl BridgeSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.host.trim().is_empty() {
            return Err(invalid("server.host must not be empty"));
        }
        if server.max_connections == 0 {
            return Err(invalid("server.maxConnections must be at least 1"));
        }
        if server.send_queue_capacity == 0 {
            return Err(invalid("server.sendQueueCapacity must be at least 1"));
        }
        if server.heartbeat_interval_secs == 0 {
            return Err(invalid("server.heartbeatIntervalSecs must be at least 1"));
        }
        if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
            return Err(invalid(
                "server.heartbeatTimeoutSecs must not be shorter than the interval",
            ));
        }
        if server.max_message_size < 1024 {
            return Err(invalid("server.maxMessageSize must be at least 1024 bytes"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> SettingsError {
    SettingsError::InvalidValue(message.to_string())
}
