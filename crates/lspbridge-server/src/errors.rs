//! Bridge and client error types.

use lspbridge_core::FramingError;
use lspbridge_process::LaunchError;

use crate::bridge::BridgeState;

/// Errors from the bridge coordinator.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The language server could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// `start` was called after the bridge left `Starting`.
    #[error("bridge already started (state: {0})")]
    AlreadyStarted(BridgeState),

    /// The bridge is not accepting input for the language server.
    #[error("bridge is not running (state: {0})")]
    NotRunning(BridgeState),

    /// The launched process did not expose one of its stdio pipes.
    #[error("child process has no {0} pipe")]
    MissingPipe(&'static str),

    /// Writing a frame to the language server's stdin failed.
    #[error("failed to write to language server: {0}")]
    Write(#[source] FramingError),
}

/// A message could not be queued for one client.
///
/// Local to that client: the registry drops it and carries on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientSendError {
    /// The connection has been closed.
    #[error("client connection is closed")]
    Closed,
    /// The client's outbound queue is full.
    #[error("client send queue is full")]
    Full,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_running_names_state() {
        let err = BridgeError::NotRunning(BridgeState::Draining);
        assert_eq!(err.to_string(), "bridge is not running (state: draining)");
    }

    #[test]
    fn launch_error_is_transparent() {
        let err: BridgeError = LaunchError::NotFound {
            program: "java".into(),
        }
        .into();
        assert_eq!(err.to_string(), "executable not found: java");
    }

    #[test]
    fn client_send_error_display() {
        assert_eq!(ClientSendError::Full.to_string(), "client send queue is full");
        assert_eq!(ClientSendError::Closed.to_string(), "client connection is closed");
    }
}
