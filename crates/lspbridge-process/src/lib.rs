//! # lspbridge-process
//!
//! Child Process Supervisor for the LSP WebSocket bridge.
//!
//! - [`ProcessSpec`]: what to run
//! - [`ProcessLauncher`] / [`ChildProcess`]: the capability the bridge
//!   consumes, so it can run against a real or an in-memory process
//! - [`TokioLauncher`]: spawns real subprocesses with all three stdio pipes
//! - [`MemoryLauncher`]: in-memory fake for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod spec;
pub mod tokio_launcher;
pub mod traits;

pub use errors::LaunchError;
pub use memory::{MemoryLauncher, MemoryProcess, MemoryProcessHandle};
pub use spec::ProcessSpec;
pub use tokio_launcher::{TokioChildProcess, TokioLauncher};
pub use traits::{ChildProcess, ProcessInput, ProcessLauncher, ProcessOutput, TerminateOutcome};
