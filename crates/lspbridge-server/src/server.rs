//! `BridgeServer`: axum HTTP + WebSocket front end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use lspbridge_core::ConnectionId;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::bridge::Bridge;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The bridge coordinator.
    pub bridge: Arc<Bridge>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
}

/// The WebSocket bridge server.
pub struct BridgeServer {
    config: Arc<ServerConfig>,
    bridge: Arc<Bridge>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl BridgeServer {
    /// Create a server in front of `bridge`.
    pub fn new(config: ServerConfig, bridge: Arc<Bridge>) -> Self {
        Self {
            config: Arc::new(config),
            bridge,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: Arc::clone(&self.bridge),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::clone(&self.config),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            started_at: self.started_at,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "websocket server listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(err) = serve.await {
                error!(error = %err, "server terminated with error");
            }
        });
        Ok((addr, handle))
    }

    /// The bridge coordinator.
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL, "reason" => "shutting_down").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "bridge is shutting down").into_response();
    }

    let registry = state.bridge.registry();
    let Some(slot) = registry.try_reserve(state.config.max_connections) else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        warn!(
            active = registry.connection_count(),
            pending = registry.pending_count(),
            max = state.config.max_connections,
            "rejecting client: connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let conn_id = ConnectionId::new();
    let bridge = Arc::clone(&state.bridge);
    let session = state.config.session();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, conn_id, bridge, session, slot))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.started_at,
        state.bridge.state(),
        state.bridge.registry().connection_count(),
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
