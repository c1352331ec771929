//! `/health` endpoint.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bridge::BridgeState;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the language server is being relayed, else `"degraded"`.
    pub status: &'static str,
    /// Coordinator state.
    pub bridge: BridgeState,
    /// When the server started (RFC 3339).
    pub started_at: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
}

/// Build a health response from live values.
pub fn health_check(
    start_time: Instant,
    started_at: DateTime<Utc>,
    bridge: BridgeState,
    connections: usize,
) -> HealthResponse {
    HealthResponse {
        status: if bridge == BridgeState::Running {
            "ok"
        } else {
            "degraded"
        },
        bridge,
        started_at: started_at.to_rfc3339(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}
