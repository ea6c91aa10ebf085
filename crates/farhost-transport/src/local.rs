//! Loop-back transport: runs commands on the local machine.
//!
//! Commands go through `sh -c` on POSIX and `cmd.exe /C` on Windows, the
//! same single-command-string contract remote transports implement.

use std::io::Read;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{ProcessInput, StreamSink, Transport, TransportError, Waiter};

#[derive(Debug, Default, Clone)]
pub struct LocalTransport {
    _private: (),
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn is_windows(&self) -> bool {
        cfg!(windows)
    }

    fn describe(&self) -> String {
        "localhost".to_string()
    }

    async fn start_process(
        &self,
        ctx: CancellationToken,
        cmd: &str,
        stdin: Option<ProcessInput>,
        stdout: StreamSink,
        stderr: StreamSink,
    ) -> Result<Box<dyn Waiter>, TransportError> {
        log::trace!("starting local process: {cmd}");
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd.exe");
            c.arg("/C").arg(cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(cmd);
            c
        };
        command
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(TransportError::Start)?;

        let stdin_task = match stdin {
            Some(input) => {
                let pipe = child.stdin.take().ok_or_else(|| {
                    TransportError::Io(std::io::Error::other("child stdin unavailable"))
                })?;
                Some(spawn_stdin_pump(input.into_reader(), pipe))
            }
            None => None,
        };
        let child_stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::other("child stdout unavailable"))
        })?;
        let child_stderr = child.stderr.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::other("child stderr unavailable"))
        })?;

        Ok(Box::new(LocalWaiter {
            child,
            ctx,
            stdin_task,
            stdout_task: spawn_output_pump(child_stdout, stdout),
            stderr_task: spawn_output_pump(child_stderr, stderr),
        }))
    }
}

/// Forwards one output stream into its sink; the sink is dropped (and with
/// it flushed) when the stream ends.
fn spawn_output_pump(
    mut stream: impl AsyncRead + Unpin + Send + 'static,
    mut sink: StreamSink,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        let mut buf = [0u8; 32 * 1024];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])?;
        }
        sink.flush()?;
        Ok(())
    })
}

/// Pumps a blocking reader into the child's stdin. The reader runs on the
/// blocking pool; chunks cross into async over a small channel.
fn spawn_stdin_pump(
    reader: Box<dyn Read + Send>,
    mut pipe: ChildStdin,
) -> JoinHandle<std::io::Result<()>> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<u8>>(8);
    tokio::task::spawn_blocking(move || {
        let mut reader = reader;
        let mut buf = [0u8; 32 * 1024];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            pipe.write_all(&chunk).await?;
        }
        pipe.shutdown().await?;
        Ok(())
    })
}

struct LocalWaiter {
    child: Child,
    ctx: CancellationToken,
    stdin_task: Option<JoinHandle<std::io::Result<()>>>,
    stdout_task: JoinHandle<std::io::Result<()>>,
    stderr_task: JoinHandle<std::io::Result<()>>,
}

#[async_trait]
impl Waiter for LocalWaiter {
    async fn wait(mut self: Box<Self>) -> Result<(), TransportError> {
        let status = tokio::select! {
            status = self.child.wait() => status?,
            _ = self.ctx.cancelled() => {
                let _ = self.child.kill().await;
                self.stdout_task.abort();
                self.stderr_task.abort();
                if let Some(task) = self.stdin_task.take() {
                    task.abort();
                }
                return Err(TransportError::Cancelled);
            }
        };
        // Stdin may still be blocked on a reader that never ends; its
        // purpose is gone once the process exited.
        if let Some(task) = self.stdin_task.take() {
            task.abort();
        }
        // Join the forwarders so sinks are complete before classification.
        self.stdout_task.await??;
        self.stderr_task.await??;

        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(TransportError::ExitStatus(code)),
                None => Err(TransportError::Terminated),
            }
        }
    }
}
