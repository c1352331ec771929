//! Bridge coordinator.
//!
//! Owns the language server process, the single stdin writer, and the pumps
//! that relay its output. Lifecycle is published on a `watch` channel so the
//! server and tests can observe `Running → Draining` without polling.

mod pumps;
mod state;

pub use state::BridgeState;

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use lspbridge_core::{LspCodec, Message};
use lspbridge_process::{ChildProcess, ProcessInput, ProcessLauncher, ProcessOutput, ProcessSpec};
use metrics::counter;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, info, warn};

use crate::errors::BridgeError;
use crate::metrics::CLIENT_MESSAGES_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::ClientRegistry;

const PREVIEW_CHARS: usize = 200;

/// Bridge coordinator settings.
#[derive(Clone, Copy, Debug)]
pub struct BridgeConfig {
    /// How long the child may take to exit after stdin closes before it is killed.
    pub terminate_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            terminate_grace: Duration::from_secs(2),
        }
    }
}

/// Relays framed messages between one language server and many clients.
pub struct Bridge {
    config: BridgeConfig,
    registry: Arc<ClientRegistry>,
    state: Arc<watch::Sender<BridgeState>>,
    stdin: Mutex<Option<FramedWrite<ProcessInput, LspCodec>>>,
    process: Mutex<Option<Box<dyn ChildProcess>>>,
    pumps: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    lifecycle: ShutdownCoordinator,
}

impl Bridge {
    /// Create a coordinator in `Starting` with an empty registry.
    pub fn new(config: BridgeConfig) -> Self {
        let (state, _) = watch::channel(BridgeState::Starting);
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            state: Arc::new(state),
            stdin: Mutex::new(None),
            process: Mutex::new(None),
            pumps: parking_lot::Mutex::new(Vec::new()),
            lifecycle: ShutdownCoordinator::new(),
        }
    }

    /// Launch the language server and start relaying its output.
    pub async fn start(
        &self,
        launcher: &dyn ProcessLauncher,
        spec: &ProcessSpec,
    ) -> Result<(), BridgeError> {
        let mut slot = self.process.lock().await;
        let current = self.state();
        if current != BridgeState::Starting || slot.is_some() {
            return Err(BridgeError::AlreadyStarted(current));
        }

        info!(command = %spec.command_line(), "launching language server");
        let mut child = match launcher.launch(spec).await {
            Ok(child) => child,
            Err(err) => {
                error!(error = %err, "failed to launch language server");
                let _ = self.state.send_replace(BridgeState::Stopped);
                return Err(err.into());
            }
        };

        let (stdin, stdout, stderr) = match take_pipes(child.as_mut()) {
            Ok(pipes) => pipes,
            Err(missing) => {
                error!(pipe = missing, "language server is missing a stdio pipe");
                self.terminate_child(child.as_mut()).await;
                let _ = self.state.send_replace(BridgeState::Stopped);
                return Err(BridgeError::MissingPipe(missing));
            }
        };

        let promoted = self.state.send_if_modified(|state| {
            if *state == BridgeState::Starting {
                *state = BridgeState::Running;
                true
            } else {
                false
            }
        });
        if !promoted {
            self.terminate_child(child.as_mut()).await;
            return Err(BridgeError::NotRunning(self.state()));
        }

        *self.stdin.lock().await = Some(FramedWrite::new(stdin, LspCodec::new()));
        info!(pid = ?child.id(), state = %BridgeState::Running, "language server started");
        *slot = Some(child);

        let output = tokio::spawn(pumps::run_output_pump(
            stdout,
            Arc::clone(&self.registry),
            Arc::clone(&self.state),
            self.lifecycle.token(),
        ));
        let errors = tokio::spawn(pumps::run_error_pump(stderr, self.lifecycle.token()));
        self.pumps.lock().extend([output, errors]);
        Ok(())
    }

    /// Write one message to the language server's stdin as a single frame.
    ///
    /// Concurrent callers are serialized, so frames never interleave. A
    /// caller waiting on the lock or blocked on a full pipe is released with
    /// [`BridgeError::NotRunning`] as soon as shutdown begins.
    pub async fn forward(&self, message: &Message) -> Result<(), BridgeError> {
        let state = self.state();
        if state != BridgeState::Running {
            return Err(BridgeError::NotRunning(state));
        }

        let stopping = self.lifecycle.token();
        let mut stdin = tokio::select! {
            () = stopping.cancelled() => return Err(BridgeError::NotRunning(self.state())),
            guard = self.stdin.lock() => guard,
        };
        let Some(writer) = stdin.as_mut() else {
            return Err(BridgeError::NotRunning(self.state()));
        };
        tokio::select! {
            () = stopping.cancelled() => return Err(BridgeError::NotRunning(self.state())),
            result = writer.send(message) => result.map_err(BridgeError::Write)?,
        }
        drop(stdin);

        counter!(CLIENT_MESSAGES_TOTAL).increment(1);
        debug!(message = %message.preview(PREVIEW_CHARS), "client -> language server");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle changes.
    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Wait until the bridge reaches `target`, or `Stopped`. Returns the state reached.
    pub async fn wait_for_state(&self, target: BridgeState) -> BridgeState {
        let mut rx = self.state.subscribe();
        match rx
            .wait_for(|state| *state == target || state.is_terminal())
            .await
        {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Connected clients.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Stop the language server and disconnect every client. Idempotent.
    ///
    /// Pending [`forward`](Self::forward) calls are cancelled before the stdin
    /// writer is taken, so a child that stopped reading cannot stall this.
    pub async fn shutdown(&self) {
        if self.lifecycle.is_shutting_down() {
            return;
        }
        let previous = self.state.send_replace(BridgeState::Stopped);
        info!(from = %previous, "shutting down bridge");
        self.lifecycle.shutdown();

        drop(self.stdin.lock().await.take());
        if let Some(mut child) = self.process.lock().await.take() {
            self.terminate_child(child.as_mut()).await;
        }

        self.registry.close_all();

        let pumps = std::mem::take(&mut *self.pumps.lock());
        self.lifecycle
            .graceful_shutdown(pumps, self.config.terminate_grace)
            .await;
        info!(state = %BridgeState::Stopped, "bridge stopped");
    }

    async fn terminate_child(&self, child: &mut dyn ChildProcess) {
        match child.terminate(self.config.terminate_grace).await {
            Ok(outcome) => info!(?outcome, "language server terminated"),
            Err(err) => warn!(error = %err, "failed to terminate language server"),
        }
    }
}

fn take_pipes(
    child: &mut dyn ChildProcess,
) -> Result<(ProcessInput, ProcessOutput, ProcessOutput), &'static str> {
    let stdin = child.take_stdin().ok_or("stdin")?;
    let stdout = child.take_stdout().ok_or("stdout")?;
    let stderr = child.take_stderr().ok_or("stderr")?;
    Ok((stdin, stdout, stderr))
}
