//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// WebSocket upgrades refused, labelled by `reason` (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Currently connected clients (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Clients dropped during broadcast after a failed send (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Messages decoded from the language server (counter).
pub const PROCESS_MESSAGES_TOTAL: &str = "bridge_process_messages_total";
/// Frames from the language server with an unusable body (counter).
pub const PROCESS_DECODE_ERRORS_TOTAL: &str = "bridge_process_decode_errors_total";
/// Client messages written to the language server (counter).
pub const CLIENT_MESSAGES_TOTAL: &str = "bridge_client_messages_total";
/// Client messages dropped as malformed or undeliverable, labelled by `reason` (counter).
pub const CLIENT_MESSAGE_ERRORS_TOTAL: &str = "bridge_client_message_errors_total";
