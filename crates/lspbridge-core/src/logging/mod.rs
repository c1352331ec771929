//! Structured logging with `tracing`.
//!
//! All diagnostics go to **stderr**. Standard output belongs to the binary's
//! readiness line and must stay free of log noise.
//!
//! - [`LogFormat`] selects human-readable or JSON lines
//! - [`init_subscriber`] installs the global subscriber
//! - [`capture_logs`] records events in memory for test assertions

pub mod test_utils;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Target used when re-emitting the child process's stderr.
pub const CHILD_TARGET: &str = "lspbridge::child";

/// Output format for the stderr log sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line human-readable output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact => f.write_str("compact"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Initialize the global tracing subscriber writing to stderr.
///
/// Call once at startup; later calls are no-ops. `RUST_LOG` takes precedence
/// over `level` when set.
pub fn init_subscriber(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
