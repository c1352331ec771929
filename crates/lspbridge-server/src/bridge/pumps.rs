//! Tasks that drain the language server's output streams.

use std::sync::Arc;

use futures::StreamExt;
use lspbridge_core::LspCodec;
use lspbridge_core::logging::CHILD_TARGET;
use lspbridge_process::ProcessOutput;
use metrics::counter;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::BridgeState;
use crate::metrics::{PROCESS_DECODE_ERRORS_TOTAL, PROCESS_MESSAGES_TOTAL};
use crate::websocket::registry::ClientRegistry;

const PREVIEW_CHARS: usize = 200;

/// Decode framed messages from stdout and broadcast each to every client.
///
/// Ends on end of stream, on a framing error, or on cancellation. The first
/// two move the bridge from `Running` to `Draining`.
pub(crate) async fn run_output_pump(
    stdout: ProcessOutput,
    registry: Arc<ClientRegistry>,
    state: Arc<watch::Sender<BridgeState>>,
    cancel: CancellationToken,
) {
    let mut frames = FramedRead::new(stdout, LspCodec::new());

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!("output pump cancelled");
                return;
            }
            next = frames.next() => next,
        };

        match next {
            Some(Ok(Ok(message))) => {
                counter!(PROCESS_MESSAGES_TOTAL).increment(1);
                let delivered = registry.broadcast(&message);
                debug!(
                    clients = delivered,
                    message = %message.preview(PREVIEW_CHARS),
                    "language server -> clients"
                );
            }
            Some(Ok(Err(err))) => {
                counter!(PROCESS_DECODE_ERRORS_TOTAL).increment(1);
                warn!(error = %err, "discarding undecodable message from language server");
            }
            Some(Err(err)) => {
                error!(error = %err, "language server output is corrupt");
                break;
            }
            None => {
                info!("language server closed its output");
                break;
            }
        }
    }

    let drained = state.send_if_modified(|current| {
        if *current == BridgeState::Running {
            *current = BridgeState::Draining;
            true
        } else {
            false
        }
    });
    if drained {
        warn!(state = %BridgeState::Draining, "no further messages will be relayed to clients");
    }
}

/// Re-emit each stderr line as a diagnostic event.
pub(crate) async fn run_error_pump(stderr: ProcessOutput, cancel: CancellationToken) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            () = cancel.cancelled() => return,
            read = reader.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => {
                debug!("language server closed its error stream");
                return;
            }
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                if !text.is_empty() {
                    info!(target: CHILD_TARGET, "{text}");
                }
            }
            Err(err) => {
                debug!(error = %err, "error stream read failed");
                return;
            }
        }
    }
}
