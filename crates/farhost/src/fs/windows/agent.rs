//! The long-running PowerShell filesystem agent and its protocol client.
//!
//! The agent reads single-line ASCII commands from stdin and answers with
//! NUL-terminated JSON frames on stdout; raw byte payloads follow `r`
//! replies and `w` requests. One operation is in flight at a time, guarded
//! by the filesystem's mutex.

use std::collections::VecDeque;
use std::io::Write;

use farhost_streams::SharedBuffer;
use farhost_transport::ProcessInput;
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::Error;
use crate::exec::options::ExecOpts;
use crate::exec::runner::Runner;

/// The script executed by the co-process. It must not contain `#`
/// comments; compressed shipping strips comment lines.
pub(crate) const AGENT_SCRIPT: &str = r#"$ErrorActionPreference = 'Stop'
$stdin = [Console]::OpenStandardInput()
$stdout = [Console]::OpenStandardOutput()
$utf8 = New-Object System.Text.UTF8Encoding($false)
$stream = $null
function Read-CommandLine {
    $sb = New-Object System.Text.StringBuilder
    while ($true) {
        $b = $stdin.ReadByte()
        if ($b -lt 0) {
            if ($sb.Length -eq 0) { return $null }
            return $sb.ToString()
        }
        if ($b -eq 10) { return $sb.ToString() }
        if ($b -ne 13) { [void]$sb.Append([char]$b) }
    }
}
function Send-Reply([string]$json) {
    $bytes = $utf8.GetBytes($json)
    $stdout.Write($bytes, 0, $bytes.Length)
    $stdout.WriteByte(0)
    $stdout.Flush()
}
function Send-Error([string]$message) {
    Send-Reply ('{"error":' + (ConvertTo-Json -Compress $message) + '}')
}
while ($true) {
    $line = Read-CommandLine
    if ($null -eq $line) { break }
    $line = $line.Trim()
    if ($line -eq '') { continue }
    $op = $line.Substring(0, 1)
    try {
        switch ($op) {
            'o' {
                $parts = $line.Split(' ', 4)
                if ($null -ne $stream) {
                    Send-Error 'file already open'
                } else {
                    $stream = [System.IO.File]::Open($parts[3], [System.IO.FileMode]$parts[1], [System.IO.FileAccess]$parts[2], [System.IO.FileShare]::ReadWrite)
                    Send-Reply ('{"pos":' + $stream.Position + '}')
                }
            }
            's' {
                $parts = $line.Split(' ', 3)
                $pos = $stream.Seek([int64]$parts[1], [System.IO.SeekOrigin]$parts[2])
                Send-Reply ('{"pos":' + $pos + '}')
            }
            'r' {
                $n = [int64]($line.Split(' ', 2)[1])
                if ($n -lt 0) { $n = $stream.Length - $stream.Position }
                $buf = New-Object byte[] $n
                $read = 0
                while ($read -lt $n) {
                    $got = $stream.Read($buf, $read, [int]($n - $read))
                    if ($got -eq 0) { break }
                    $read += $got
                }
                if ($read -eq 0 -and $n -gt 0) {
                    Send-Error 'eof'
                } else {
                    Send-Reply ('{"n":' + $read + '}')
                    if ($read -gt 0) {
                        $stdout.Write($buf, 0, $read)
                        $stdout.Flush()
                    }
                }
            }
            'w' {
                $n = [int64]($line.Split(' ', 2)[1])
                Send-Reply ('{"n":' + $n + '}')
                $buf = New-Object byte[] 65536
                $left = $n
                while ($left -gt 0) {
                    $want = [int][Math]::Min($left, $buf.Length)
                    $got = $stdin.Read($buf, 0, $want)
                    if ($got -le 0) { break }
                    $stream.Write($buf, 0, $got)
                    $left -= $got
                }
                $stream.Flush()
            }
            'c' {
                if ($null -ne $stream) {
                    $stream.Close()
                    $stream = $null
                }
                Send-Reply '{"pos":-1}'
            }
            'q' {
                if ($null -ne $stream) { $stream.Close() }
                exit 0
            }
            default { Send-Error ('unknown command: ' + $op) }
        }
    } catch {
        Send-Error $_.Exception.Message
    }
}
"#;

/// A decoded JSON reply frame.
#[derive(Debug, Deserialize)]
pub(crate) struct Reply {
    pub pos: Option<i64>,
    pub n: Option<i64>,
    pub error: Option<String>,
}

/// Maps an agent error message onto the uniform sentinels. `"eof"` is
/// handled by the read paths before this.
pub(crate) fn map_agent_error(path: &str, message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("does not exist") || lower.contains("could not find") {
        Error::NotExist(path.to_string())
    } else if lower.contains("already exists") {
        Error::Exists(path.to_string())
    } else {
        Error::Io(std::io::Error::other(message.to_string()))
    }
}

/// Client side of the agent's stdin. Writes never block; the transport's
/// stdin pump drains the channel from the blocking pool.
pub(crate) struct AgentStdin {
    tx: Option<std::sync::mpsc::Sender<Vec<u8>>>,
}

impl AgentStdin {
    pub(crate) fn send(&mut self, data: &[u8]) -> crate::Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::AgentEnded)?;
        tx.send(data.to_vec()).map_err(|_| Error::AgentEnded)
    }

    /// Drops the sender; the pump sees EOF and closes the agent's stdin.
    pub(crate) fn close(&mut self) {
        self.tx = None;
    }
}

/// Blocking reader handed to the transport as the agent's stdin source.
pub(crate) struct AgentStdinPump {
    rx: std::sync::mpsc::Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

impl std::io::Read for AgentStdinPump {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.pos >= self.buf.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = (self.buf.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

pub(crate) fn stdin_pipe() -> (AgentStdin, AgentStdinPump) {
    let (tx, rx) = std::sync::mpsc::channel();
    (
        AgentStdin { tx: Some(tx) },
        AgentStdinPump {
            rx,
            buf: Vec::new(),
            pos: 0,
        },
    )
}

/// Stream sink handed to the transport for the agent's stdout.
pub(crate) struct AgentStdoutSink {
    tx: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
}

impl Write for AgentStdoutSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "agent reader gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Buffered async reader over the agent's stdout chunks: JSON frames up
/// to a NUL byte, then any announced raw payload.
pub(crate) struct AgentStdoutReader {
    rx: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    buf: VecDeque<u8>,
}

impl AgentStdoutReader {
    async fn fill(&mut self) -> crate::Result<()> {
        match self.rx.recv().await {
            Some(chunk) => {
                self.buf.extend(chunk);
                Ok(())
            }
            None => Err(Error::AgentEnded),
        }
    }

    /// Reads up to and including the next NUL; returns the frame without
    /// the terminator.
    pub(crate) async fn read_frame(&mut self) -> crate::Result<Vec<u8>> {
        loop {
            if let Some(nul) = self.buf.iter().position(|&b| b == 0) {
                let mut frame: Vec<u8> = self.buf.drain(..=nul).collect();
                frame.pop();
                return Ok(frame);
            }
            self.fill().await?;
        }
    }

    pub(crate) async fn read_exact(&mut self, n: usize) -> crate::Result<Vec<u8>> {
        while self.buf.len() < n {
            self.fill().await?;
        }
        Ok(self.buf.drain(..n).collect())
    }

    /// Streams `n` payload bytes into `writer` without collecting them.
    pub(crate) async fn read_into(
        &mut self,
        writer: &mut (dyn Write + Send),
        n: u64,
    ) -> crate::Result<()> {
        let mut left = n as usize;
        while left > 0 {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let take = self.buf.len().min(left);
            let chunk: Vec<u8> = self.buf.drain(..take).collect();
            writer.write_all(&chunk)?;
            left -= take;
        }
        Ok(())
    }
}

fn stdout_pipe() -> (AgentStdoutSink, AgentStdoutReader) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (
        AgentStdoutSink { tx },
        AgentStdoutReader {
            rx,
            buf: VecDeque::new(),
        },
    )
}

/// The channel state guarded by the per-filesystem mutex.
pub(crate) struct AgentIo {
    stdin: AgentStdin,
    stdout: AgentStdoutReader,
    ended: CancellationToken,
}

impl AgentIo {
    /// One command/reply exchange. Payload bytes announced by the reply
    /// are read separately, before the mutex is released.
    pub(crate) async fn request(&mut self, line: &str) -> crate::Result<Reply> {
        if self.ended.is_cancelled() {
            return Err(Error::AgentEnded);
        }
        log::trace!("agent request: {line}");
        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');
        self.stdin.send(&framed)?;
        let frame = tokio::select! {
            frame = self.stdout.read_frame() => frame?,
            _ = self.ended.cancelled() => return Err(Error::AgentEnded),
        };
        Ok(serde_json::from_slice(&frame)?)
    }

    pub(crate) async fn read_payload(&mut self, n: usize) -> crate::Result<Vec<u8>> {
        tokio::select! {
            payload = self.stdout.read_exact(n) => payload,
            _ = self.ended.cancelled() => Err(Error::AgentEnded),
        }
    }

    pub(crate) async fn read_payload_into(
        &mut self,
        writer: &mut (dyn Write + Send),
        n: u64,
    ) -> crate::Result<()> {
        tokio::select! {
            result = self.stdout.read_into(writer, n) => result,
            _ = self.ended.cancelled() => Err(Error::AgentEnded),
        }
    }

    pub(crate) fn write_payload(&mut self, data: &[u8]) -> crate::Result<()> {
        self.stdin.send(data)
    }

    fn quit(&mut self) {
        let _ = self.stdin.send(b"q\n");
        self.stdin.close();
    }
}

/// One running agent process per filesystem, started lazily.
pub(crate) struct Agent {
    io: Mutex<AgentIo>,
    ended: CancellationToken,
}

impl Agent {
    /// Starts the agent and verifies it did not exit immediately.
    pub(crate) async fn start(runner: &Runner) -> crate::Result<Agent> {
        let (stdin, pump) = stdin_pipe();
        let (stdout_sink, stdout) = stdout_pipe();
        let stderr = SharedBuffer::new();

        let opts = ExecOpts::builder()
            .stdin(ProcessInput::reader(Box::new(pump)))
            .stdout(Box::new(stdout_sink))
            .stderr(Box::new(stderr.clone()))
            .hide_output()
            .allow_win_stderr()
            .ps_compressed()
            .build();
        let waiter = runner.start_background(AGENT_SCRIPT, opts).await?;

        let ended = CancellationToken::new();
        let done = ended.clone();
        let host = runner.describe();
        tokio::spawn(async move {
            match waiter.wait().await {
                Ok(()) => log::debug!("[{host}] filesystem agent exited"),
                Err(err) => {
                    let stderr = String::from_utf8_lossy(&stderr.take()).into_owned();
                    log::debug!("[{host}] filesystem agent failed: {err}; stderr: {stderr}");
                }
            }
            done.cancel();
        });

        // An immediate exit means the script never came up (bad
        // powershell, ancient host); give it a moment to prove itself.
        if tokio::time::timeout(std::time::Duration::from_secs(1), ended.cancelled())
            .await
            .is_ok()
        {
            return Err(Error::AgentStart);
        }

        Ok(Agent {
            io: Mutex::new(AgentIo {
                stdin,
                stdout,
                ended: ended.clone(),
            }),
            ended,
        })
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, AgentIo> {
        self.io.lock().await
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.ended.is_cancelled()
    }

    /// Sends `q` and closes stdin.
    pub(crate) async fn shutdown(&self) {
        let mut io = self.io.lock().await;
        io.quit();
    }
}
