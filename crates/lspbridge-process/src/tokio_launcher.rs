//! Real subprocesses backed by `tokio::process::Command`.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::LaunchError;
use crate::spec::ProcessSpec;
use crate::traits::{ChildProcess, ProcessInput, ProcessLauncher, ProcessOutput, TerminateOutcome};

/// Spawns real OS processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioLauncher;

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> Result<Box<dyn ChildProcess>, LaunchError> {
        let mut cmd = Command::new(&spec.program);
        let _ = cmd
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            let _ = cmd.current_dir(dir);
        }

        debug!(command = %spec.command_line(), "spawning child process");
        let child = cmd
            .spawn()
            .map_err(|e| LaunchError::from_io(&spec.program, e))?;
        info!(pid = child.id(), command = %spec.command_line(), "child process started");

        Ok(Box::new(TokioChildProcess {
            child,
            stopped: false,
        }))
    }
}

/// A subprocess spawned by [`TokioLauncher`].
#[derive(Debug)]
pub struct TokioChildProcess {
    child: Child,
    stopped: bool,
}

#[async_trait]
impl ChildProcess for TokioChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stdin(&mut self) -> Option<ProcessInput> {
        self.child
            .stdin
            .take()
            .map(|s| Box::new(s) as ProcessInput)
    }

    fn take_stdout(&mut self) -> Option<ProcessOutput> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as ProcessOutput)
    }

    fn take_stderr(&mut self) -> Option<ProcessOutput> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as ProcessOutput)
    }

    async fn terminate(&mut self, grace: Duration) -> io::Result<TerminateOutcome> {
        if self.stopped {
            return Ok(TerminateOutcome::AlreadyStopped);
        }
        self.stopped = true;

        // EOF on stdin asks a language server to exit.
        drop(self.child.stdin.take());

        if let Ok(waited) = tokio::time::timeout(grace, self.child.wait()).await {
            let status = waited?;
            debug!(code = status.code(), "child process exited");
            return Ok(TerminateOutcome::Exited {
                code: status.code(),
            });
        }

        warn!(
            pid = self.child.id(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "child process did not exit in time, killing"
        );
        self.child.kill().await?;
        Ok(TerminateOutcome::Killed)
    }
}
