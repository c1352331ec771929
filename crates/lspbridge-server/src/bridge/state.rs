//! Coordinator lifecycle states.

use std::fmt;

use serde::Serialize;

/// Lifecycle of the bridge coordinator.
///
/// `Starting → Running → Draining → Stopped`, with `Starting → Stopped` on
/// launch failure and any state `→ Stopped` on shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    /// Launching the language server.
    Starting,
    /// All pumps active.
    Running,
    /// The language server's output has ended; nothing more will be relayed.
    Draining,
    /// Terminal.
    Stopped,
}

impl BridgeState {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
