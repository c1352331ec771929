//! One WebSocket client from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use lspbridge_core::{ConnectionId, Message};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::bridge::Bridge;
use crate::config::SessionConfig;
use crate::metrics::{
    CLIENT_MESSAGE_ERRORS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::websocket::connection::ClientConnection;
use crate::websocket::registry::SlotReservation;

/// How long the writer task gets to flush after the session ends.
const OUTBOUND_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run a session for a connected client.
///
/// Registers the client, relays inbound frames to the language server in
/// arrival order, and drains the outbound queue to the socket with periodic
/// pings. `slot` is released once the client is registered. Unregisters the
/// client on exit.
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn_id: ConnectionId,
    bridge: Arc<Bridge>,
    config: SessionConfig,
    slot: SlotReservation,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));

    bridge.registry().add(&connection);
    drop(slot);
    info!(state = %bridge.state(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let outbound_conn = Arc::clone(&connection);
    let mut outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(config.heartbeat_interval);
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                () = outbound_conn.closed() => {
                    let frame = CloseFrame {
                        code: close_code::AWAY,
                        reason: "connection closed by bridge".into(),
                    };
                    let _ = ws_tx.send(WsMessage::Close(Some(frame))).await;
                    break;
                }
                queued = send_rx.recv() => {
                    let Some(text) = queued else { break };
                    if ws_tx.send(WsMessage::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > config.heartbeat_timeout
                    {
                        warn!(
                            silent_secs = outbound_conn.last_pong_elapsed().as_secs(),
                            "client unresponsive, disconnecting"
                        );
                        break;
                    }
                    if ws_tx.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        outbound_conn.close();
    });

    loop {
        let frame = tokio::select! {
            () = connection.closed() => break,
            frame = ws_rx.next() => frame,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                debug!(error = %err, "websocket read failed");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        let open = tokio::select! {
            () = connection.closed() => false,
            open = relay_frame(&bridge, frame) => open,
        };
        if !open {
            break;
        }
    }

    connection.close();
    if tokio::time::timeout(OUTBOUND_DRAIN_TIMEOUT, &mut outbound)
        .await
        .is_err()
    {
        outbound.abort();
    }
    let _ = bridge.registry().remove(&conn_id);

    let age = connection.age();
    info!(
        duration_secs = age.as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
}

/// Handle one inbound frame. Returns `false` once the client has closed.
async fn relay_frame(bridge: &Bridge, frame: WsMessage) -> bool {
    match frame {
        WsMessage::Text(text) => forward_client_text(bridge, text.as_str()).await,
        WsMessage::Binary(data) => match std::str::from_utf8(&data) {
            Ok(text) => forward_client_text(bridge, text).await,
            Err(_) => {
                counter!(CLIENT_MESSAGE_ERRORS_TOTAL, "reason" => "binary").increment(1);
                warn!(bytes = data.len(), "dropping non-UTF-8 binary frame");
            }
        },
        WsMessage::Close(_) => {
            debug!("client sent close frame");
            return false;
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => {}
    }
    true
}

/// Parse one client payload and hand it to the language server.
///
/// Failures are local to the message: the session continues.
async fn forward_client_text(bridge: &Bridge, text: &str) {
    let message = match Message::parse(text) {
        Ok(message) => message,
        Err(err) => {
            counter!(CLIENT_MESSAGE_ERRORS_TOTAL, "reason" => "malformed").increment(1);
            warn!(error = %err, bytes = text.len(), "dropping malformed client message");
            return;
        }
    };

    if let Err(err) = bridge.forward(&message).await {
        counter!(CLIENT_MESSAGE_ERRORS_TOTAL, "reason" => "undeliverable").increment(1);
        warn!(error = %err, "dropping client message");
    }
}
