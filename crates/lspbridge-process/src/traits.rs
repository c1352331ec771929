//! Process supervision capability.
//!
//! The bridge only ever talks to a child through these traits, so the real
//! [`TokioLauncher`](crate::TokioLauncher) and the in-memory
//! [`MemoryLauncher`](crate::MemoryLauncher) are interchangeable.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::LaunchError;
use crate::spec::ProcessSpec;

/// Writable end of the child's stdin.
pub type ProcessInput = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable end of the child's stdout or stderr.
pub type ProcessOutput = Box<dyn AsyncRead + Send + Unpin>;

/// How a [`ChildProcess::terminate`] call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The process exited on its own within the grace period.
    Exited {
        /// Exit code, if the process was not ended by a signal.
        code: Option<i32>,
    },
    /// The grace period elapsed and the process was killed.
    Killed,
    /// A previous call already stopped the process.
    AlreadyStopped,
}

/// Starts child processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `spec` with stdin, stdout and stderr attached to pipes.
    async fn launch(&self, spec: &ProcessSpec) -> Result<Box<dyn ChildProcess>, LaunchError>;
}

/// A running child process with piped stdio.
///
/// Each pipe can be taken once; later calls return `None`.
#[async_trait]
pub trait ChildProcess: Send + Sync {
    /// OS process ID, if there is one.
    fn id(&self) -> Option<u32>;

    /// Take the child's stdin writer.
    fn take_stdin(&mut self) -> Option<ProcessInput>;

    /// Take the child's stdout reader.
    fn take_stdout(&mut self) -> Option<ProcessOutput>;

    /// Take the child's stderr reader.
    fn take_stderr(&mut self) -> Option<ProcessOutput>;

    /// Stop the process.
    ///
    /// Closes stdin if still held, waits up to `grace` for a voluntary exit,
    /// then kills. Idempotent: later calls return
    /// [`TerminateOutcome::AlreadyStopped`].
    async fn terminate(&mut self, grace: Duration) -> io::Result<TerminateOutcome>;
}
