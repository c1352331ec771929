//! In-memory child process for tests.
//!
//! [`MemoryProcess::pair`] returns the process (handed to the bridge through
//! [`MemoryLauncher`]) and a [`MemoryProcessHandle`] that plays the part of
//! the language server: it writes to the fake stdout/stderr and reads what
//! the bridge wrote to stdin.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use lspbridge_core::{FramingError, LspCodec, Message, MessageError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

use crate::errors::LaunchError;
use crate::spec::ProcessSpec;
use crate::traits::{ChildProcess, ProcessInput, ProcessLauncher, ProcessOutput, TerminateOutcome};

const PIPE_CAPACITY: usize = 64 * 1024;

static NEXT_PID: AtomicU32 = AtomicU32::new(10_000);

type SharedWriter = Arc<Mutex<Option<DuplexStream>>>;

/// Bridge-side half of an in-memory process.
pub struct MemoryProcess {
    pid: u32,
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    stdout_writer: SharedWriter,
    stderr_writer: SharedWriter,
    terminated: CancellationToken,
    stopped: bool,
}

/// Server-side half of an in-memory process.
pub struct MemoryProcessHandle {
    pid: u32,
    stdin: DuplexStream,
    stdin_buf: BytesMut,
    stdin_codec: LspCodec,
    stdout: SharedWriter,
    stderr: SharedWriter,
    terminated: CancellationToken,
}

impl MemoryProcess {
    /// Create a connected process/handle pair.
    pub fn pair() -> (Self, MemoryProcessHandle) {
        let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
        let (stdin_bridge, stdin_server) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdout_bridge, stdout_server) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_bridge, stderr_server) = tokio::io::duplex(PIPE_CAPACITY);
        let stdout_writer = Arc::new(Mutex::new(Some(stdout_server)));
        let stderr_writer = Arc::new(Mutex::new(Some(stderr_server)));
        let terminated = CancellationToken::new();

        let process = Self {
            pid,
            stdin: Some(stdin_bridge),
            stdout: Some(stdout_bridge),
            stderr: Some(stderr_bridge),
            stdout_writer: Arc::clone(&stdout_writer),
            stderr_writer: Arc::clone(&stderr_writer),
            terminated: terminated.clone(),
            stopped: false,
        };
        let handle = MemoryProcessHandle {
            pid,
            stdin: stdin_server,
            stdin_buf: BytesMut::new(),
            stdin_codec: LspCodec::new(),
            stdout: stdout_writer,
            stderr: stderr_writer,
            terminated,
        };
        (process, handle)
    }
}

#[async_trait]
impl ChildProcess for MemoryProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn take_stdin(&mut self) -> Option<ProcessInput> {
        self.stdin.take().map(|s| Box::new(s) as ProcessInput)
    }

    fn take_stdout(&mut self) -> Option<ProcessOutput> {
        self.stdout.take().map(|s| Box::new(s) as ProcessOutput)
    }

    fn take_stderr(&mut self) -> Option<ProcessOutput> {
        self.stderr.take().map(|s| Box::new(s) as ProcessOutput)
    }

    async fn terminate(&mut self, _grace: Duration) -> io::Result<TerminateOutcome> {
        if self.stopped {
            return Ok(TerminateOutcome::AlreadyStopped);
        }
        self.stopped = true;
        drop(self.stdin.take());
        drop(self.stdout_writer.lock().await.take());
        drop(self.stderr_writer.lock().await.take());
        self.terminated.cancel();
        Ok(TerminateOutcome::Exited { code: Some(0) })
    }
}

fn closed_pipe(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, format!("{name} is closed"))
}

async fn write_shared(pipe: &SharedWriter, name: &str, bytes: &[u8]) -> io::Result<()> {
    let mut guard = pipe.lock().await;
    let writer = guard.as_mut().ok_or_else(|| closed_pipe(name))?;
    writer.write_all(bytes).await?;
    writer.flush().await
}

impl MemoryProcessHandle {
    /// Fake process ID shared with the [`MemoryProcess`].
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Write raw bytes to the process's stdout.
    pub async fn write_stdout(&self, bytes: &[u8]) -> io::Result<()> {
        write_shared(&self.stdout, "stdout", bytes).await
    }

    /// Write one framed message to the process's stdout.
    pub async fn send(&self, message: &Message) -> io::Result<()> {
        let mut buf = BytesMut::new();
        LspCodec::new()
            .encode(message, &mut buf)
            .map_err(io::Error::other)?;
        self.write_stdout(&buf).await
    }

    /// Close stdout, as a process does when it exits.
    pub async fn close_stdout(&self) {
        drop(self.stdout.lock().await.take());
    }

    /// Write raw bytes to the process's stderr.
    pub async fn write_stderr(&self, bytes: &[u8]) -> io::Result<()> {
        write_shared(&self.stderr, "stderr", bytes).await
    }

    /// Close stderr.
    pub async fn close_stderr(&self) {
        drop(self.stderr.lock().await.take());
    }

    /// Read exactly `n` raw bytes the bridge wrote to stdin.
    pub async fn read_stdin_exact(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let buffered = self.stdin_buf.len().min(n);
        let mut out = self.stdin_buf.split_to(buffered).to_vec();
        if out.len() < n {
            let start = out.len();
            out.resize(n, 0);
            let _ = self.stdin.read_exact(&mut out[start..]).await?;
        }
        Ok(out)
    }

    /// Decode the next framed message the bridge wrote to stdin.
    ///
    /// `Ok(None)` once the bridge has closed stdin.
    pub async fn next_stdin_message(
        &mut self,
    ) -> Result<Option<Result<Message, MessageError>>, FramingError> {
        loop {
            if let Some(item) = self.stdin_codec.decode(&mut self.stdin_buf)? {
                return Ok(Some(item));
            }
            if self.stdin.read_buf(&mut self.stdin_buf).await? == 0 {
                return self.stdin_codec.decode_eof(&mut self.stdin_buf);
            }
        }
    }

    /// Whether [`ChildProcess::terminate`] has been called.
    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Wait until [`ChildProcess::terminate`] is called.
    pub async fn terminated(&self) {
        self.terminated.cancelled().await;
    }
}

enum Queued {
    Process(MemoryProcess),
    Fail(io::ErrorKind),
}

/// Launcher that hands out pre-built [`MemoryProcess`]es in order.
///
/// Records every spec it was asked to launch.
#[derive(Default)]
pub struct MemoryLauncher {
    queue: parking_lot::Mutex<VecDeque<Queued>>,
    launched: parking_lot::Mutex<Vec<ProcessSpec>>,
}

impl MemoryLauncher {
    /// Launcher that will hand out `process` on the first launch.
    pub fn new(process: MemoryProcess) -> Self {
        let launcher = Self::default();
        launcher.push(process);
        launcher
    }

    /// Launcher whose next launch fails with an error of `kind`.
    pub fn failing(kind: io::ErrorKind) -> Self {
        let launcher = Self::default();
        launcher.queue.lock().push_back(Queued::Fail(kind));
        launcher
    }

    /// Queue another process for a later launch.
    pub fn push(&self, process: MemoryProcess) {
        self.queue.lock().push_back(Queued::Process(process));
    }

    /// Specs launched so far, in order.
    pub fn launched(&self) -> Vec<ProcessSpec> {
        self.launched.lock().clone()
    }
}

#[async_trait]
impl ProcessLauncher for MemoryLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> Result<Box<dyn ChildProcess>, LaunchError> {
        self.launched.lock().push(spec.clone());
        let next = self.queue.lock().pop_front();
        match next {
            Some(Queued::Process(process)) => Ok(Box::new(process)),
            Some(Queued::Fail(kind)) => Err(LaunchError::from_io(&spec.program, kind.into())),
            None => Err(LaunchError::Spawn {
                program: spec.program.clone(),
                source: io::Error::other("no in-memory process queued"),
            }),
        }
    }
}
