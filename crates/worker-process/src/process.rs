//! Spawning and controlling the worker process

use async_channel::{Receiver, Sender};
use async_io::Timer;
use async_process::{Child, ChildStderr, ChildStdout};
use futures::future::{self, Either};
use futures::io::AsyncRead;
use futures::stream::{FusedStream, Stream};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::event::{WorkerEvent, WorkerEventKind};
use crate::stdin::StdinHandle;

/// Size of a single read from stdout or stderr
const READ_CHUNK: usize = 4096;

/// How long pipes are still drained once the exit status is known
pub const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (always `None` off Unix)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Entry point for launching workers
#[derive(Debug, Clone, Copy)]
pub struct WorkerProcess;

impl WorkerProcess {
    /// Launch `command`, returning its event stream and control handle
    ///
    /// A launch failure is reported here, once, and no stream is created.
    pub fn spawn(command: &Command) -> Result<(WorkerEventStream, WorkerHandle)> {
        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .prepare()
            .spawn()
            .map_err(|e| Error::spawn_failed(program.clone(), e))?;

        let pid = child.id();
        debug!(pid, %command, "worker spawned");

        let stdin = StdinHandle::new(child.stdin.take());
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (kill_tx, kill_rx) = async_channel::bounded(1);
        let exited = Arc::new(AtomicBool::new(false));

        let events = WorkerEventStream {
            pid,
            started_sent: false,
            stdout,
            stderr,
            exit: Some(Box::pin(wait_or_kill(child, kill_rx))),
            status: None,
            drain_deadline: None,
            exited: exited.clone(),
            done: false,
            buf: vec![0; READ_CHUNK],
        };

        let handle = WorkerHandle {
            pid,
            stdin,
            kill_tx,
            exited,
        };

        Ok((events, handle))
    }
}

/// Wait for the child to exit, killing it first if asked to
///
/// The request arrives over `kill_rx`; a closed channel (the handle was
/// dropped) counts as a request.
async fn wait_or_kill(mut child: Child, kill_rx: Receiver<()>) -> io::Result<std::process::ExitStatus> {
    {
        let status = child.status();
        let kill = kill_rx.recv();
        futures::pin_mut!(status, kill);
        if let Either::Left((status, _)) = future::select(status, kill).await {
            return status;
        }
    }

    if let Err(e) = child.kill() {
        // Usually means it exited on its own in the meantime.
        debug!(pid = child.id(), error = %e, "kill request failed");
    }
    child.status().await
}

/// Control handle for a running worker
pub struct WorkerHandle {
    pid: u32,
    stdin: StdinHandle,
    kill_tx: Sender<()>,
    exited: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// OS process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the event stream already delivered the exit event
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Append `text` plus a newline to the worker's stdin
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        if self.has_exited() {
            return Err(Error::ProcessExited);
        }
        self.stdin.write_line(text).await
    }

    /// Request immediate termination
    ///
    /// Idempotent, and harmless once the worker is gone. The exit itself is
    /// still reported through the event stream.
    pub fn kill(&self) {
        if self.has_exited() {
            return;
        }
        match self.kill_tx.try_send(()) {
            Ok(()) => debug!(pid = self.pid, "kill requested"),
            Err(_) => debug!(pid = self.pid, "kill already requested"),
        }
    }
}

/// Ordered stream of everything the worker does
///
/// Yields `Started`, then output and diagnostic chunks as they arrive, then
/// exactly one `Exited`, then ends. Chunks of one stream keep their order;
/// there is no ordering between stdout and stderr.
pub struct WorkerEventStream {
    pid: u32,
    started_sent: bool,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit: Option<Pin<Box<dyn Future<Output = io::Result<std::process::ExitStatus>> + Send>>>,
    status: Option<ExitStatus>,
    /// Armed when the status arrives while a pipe still has no EOF
    drain_deadline: Option<Timer>,
    exited: Arc<AtomicBool>,
    done: bool,
    buf: Vec<u8>,
}

impl WorkerEventStream {
    /// OS process id of the worker this stream belongs to
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Read one chunk from a pipe, closing it on EOF or error
fn poll_pipe<R: AsyncRead + Unpin>(
    pipe: &mut Option<R>,
    buf: &mut [u8],
    cx: &mut Context<'_>,
    name: &str,
) -> Poll<Option<Vec<u8>>> {
    let Some(reader) = pipe else {
        return Poll::Ready(None);
    };
    match Pin::new(reader).poll_read(cx, buf) {
        Poll::Ready(Ok(0)) => {
            *pipe = None;
            Poll::Ready(None)
        }
        Poll::Ready(Ok(n)) => Poll::Ready(Some(buf[..n].to_vec())),
        Poll::Ready(Err(e)) => {
            debug!(error = %e, "worker {name} closed with error");
            *pipe = None;
            Poll::Ready(None)
        }
        Poll::Pending => Poll::Pending,
    }
}

impl Stream for WorkerEventStream {
    type Item = WorkerEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        if !this.started_sent {
            this.started_sent = true;
            return Poll::Ready(Some(WorkerEvent::new(WorkerEventKind::Started { pid: this.pid })));
        }

        // Learn about the exit as early as possible; the event itself is held
        // back until the pipes have been drained.
        if let Some(exit) = &mut this.exit {
            if let Poll::Ready(result) = exit.as_mut().poll(cx) {
                this.exit = None;
                this.status = Some(match result {
                    Ok(status) => status.into(),
                    Err(e) => {
                        warn!(pid = this.pid, error = %e, "failed to collect worker exit status");
                        ExitStatus::default()
                    }
                });
            }
        }

        let stdout_pending = match poll_pipe(&mut this.stdout, &mut this.buf, cx, "stdout") {
            Poll::Ready(Some(chunk)) => {
                return Poll::Ready(Some(WorkerEvent::new(WorkerEventKind::Output(chunk))));
            }
            Poll::Ready(None) => false,
            Poll::Pending => true,
        };

        let stderr_pending = match poll_pipe(&mut this.stderr, &mut this.buf, cx, "stderr") {
            Poll::Ready(Some(chunk)) => {
                return Poll::Ready(Some(WorkerEvent::new(WorkerEventKind::Diagnostic(chunk))));
            }
            Poll::Ready(None) => false,
            Poll::Pending => true,
        };

        // After the exit, keep reading until both pipes reach EOF. Output
        // still in flight is delivered; a grandchild that inherited a pipe
        // only holds the stream open for `DRAIN_GRACE`.
        if let Some(status) = this.status {
            if stdout_pending || stderr_pending {
                let deadline = this.drain_deadline.get_or_insert_with(|| Timer::after(DRAIN_GRACE));
                if Pin::new(deadline).poll(cx).is_pending() {
                    return Poll::Pending;
                }
                debug!(pid = this.pid, "worker exited with pipes still open");
            }
            this.stdout = None;
            this.stderr = None;
            this.done = true;
            this.exited.store(true, Ordering::Release);
            return Poll::Ready(Some(WorkerEvent::new(WorkerEventKind::Exited(status))));
        }

        Poll::Pending
    }
}

impl FusedStream for WorkerEventStream {
    fn is_terminated(&self) -> bool {
        self.done
    }
}
