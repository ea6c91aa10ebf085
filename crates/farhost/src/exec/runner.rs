//! The command runner: formats, decorates, dispatches and awaits one
//! command at a time on a borrowed transport.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use farhost_shell::ps;
use farhost_streams::{
    LineWriter, MultiWriter, NullWriter, RedactWriter, Redactor, SharedBuffer, TeeReader,
    TripwireWriter,
};
use farhost_transport::{ProcessInput, Transport, Waiter};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::Error;
use crate::exec::decorate::{Decorator, PsCompressedDecorator, PsDecorator, SudoDecorator};
use crate::exec::fmt::{FmtArg, format_command};
use crate::exec::options::{ExecOpts, PsMode, RedactPattern};
use crate::sudo::SudoProviders;

/// A runner binds a transport to a chain of command decorators.
///
/// Runners are immutable and cheap to clone;
/// [`with_decorator`](Runner::with_decorator) and [`sudo`](Runner::sudo)
/// return new runners instead of mutating.
#[derive(Clone)]
pub struct Runner {
    transport: Arc<dyn Transport>,
    decorators: Vec<Arc<dyn Decorator>>,
    poisoned: Option<Arc<Error>>,
}

impl Runner {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            decorators: Vec::new(),
            poisoned: None,
        }
    }

    /// A runner that fails every dispatch with the stored error. This is
    /// the "null" implementation handed out when a lazy service probe
    /// failed, so service accessors can return a runner unconditionally.
    pub(crate) fn poisoned(transport: Arc<dyn Transport>, err: Arc<Error>) -> Self {
        Self {
            transport,
            decorators: Vec::new(),
            poisoned: Some(err),
        }
    }

    /// Returns a new runner with `decorator` appended to the chain.
    pub fn with_decorator(&self, decorator: Arc<dyn Decorator>) -> Self {
        let mut runner = self.clone();
        runner.decorators.push(decorator);
        runner
    }

    /// Resolves a privilege-escalation method for this host and returns a
    /// runner that wraps every command with it.
    pub async fn sudo(&self) -> crate::Result<Runner> {
        let decorator = SudoProviders::default().resolve(self).await?;
        Ok(self.with_decorator(decorator))
    }

    pub fn is_windows(&self) -> bool {
        self.transport.is_windows()
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// The final command string: registered decorators applied in order,
    /// then per-command sudo and PowerShell wrapping from the options.
    pub fn command(&self, cmd: &str, opts: &ExecOpts) -> String {
        let mut cmd = cmd.to_string();
        for decorator in &self.decorators {
            cmd = decorator.decorate(&cmd);
        }
        if opts.sudo {
            cmd = SudoDecorator::sudo().decorate(&cmd);
        }
        match opts.ps {
            Some(PsMode::Plain) => cmd = PsDecorator.decorate(&cmd),
            Some(PsMode::Compressed) => cmd = PsCompressedDecorator.decorate(&cmd),
            None => {}
        }
        cmd
    }

    /// Formats a command template at runtime; see
    /// [`format_command`](crate::exec::fmt::format_command).
    pub fn commandf(&self, fmt: &str, args: &[FmtArg]) -> crate::Result<String> {
        format_command(fmt, args)
    }

    /// Starts the command with the stream pipeline described by `opts` and
    /// returns a waiter. Cancelling `ctx` kills the remote process.
    pub async fn start(
        &self,
        ctx: CancellationToken,
        cmd: &str,
        opts: ExecOpts,
    ) -> crate::Result<ExecWaiter> {
        self.start_with_extra(ctx, cmd, opts, None).await
    }

    /// Starts with an unbounded background context; the caller owns the
    /// waiter's lifetime.
    pub async fn start_background(&self, cmd: &str, opts: ExecOpts) -> crate::Result<ExecWaiter> {
        self.start(CancellationToken::new(), cmd, opts).await
    }

    pub async fn exec_ctx(
        &self,
        ctx: CancellationToken,
        cmd: &str,
        opts: ExecOpts,
    ) -> crate::Result<()> {
        self.start(ctx, cmd, opts).await?.wait().await
    }

    pub async fn exec(&self, cmd: &str, opts: ExecOpts) -> crate::Result<()> {
        self.exec_ctx(CancellationToken::new(), cmd, opts).await
    }

    /// Runs the command and returns captured stdout, whitespace-trimmed
    /// unless the options disabled trimming.
    pub async fn exec_output_ctx(
        &self,
        ctx: CancellationToken,
        cmd: &str,
        opts: ExecOpts,
    ) -> crate::Result<String> {
        let trim = opts.trim_output();
        let buf = SharedBuffer::new();
        let waiter = self
            .start_with_extra(ctx, cmd, opts, Some(Box::new(buf.clone())))
            .await?;
        waiter.wait().await?;
        let bytes = buf.take();
        let out = String::from_utf8_lossy(&bytes);
        Ok(if trim {
            out.trim().to_string()
        } else {
            out.into_owned()
        })
    }

    pub async fn exec_output(&self, cmd: &str, opts: ExecOpts) -> crate::Result<String> {
        self.exec_output_ctx(CancellationToken::new(), cmd, opts).await
    }

    /// Formats, then executes. A formatting error surfaces as
    /// [`Error::InvalidCommand`] without dispatching anything.
    pub async fn exec_fmt(&self, fmt: &str, args: &[FmtArg], opts: ExecOpts) -> crate::Result<()> {
        let cmd = format_command(fmt, args)?;
        self.exec(&cmd, opts).await
    }

    pub async fn exec_output_fmt(
        &self,
        fmt: &str,
        args: &[FmtArg],
        opts: ExecOpts,
    ) -> crate::Result<String> {
        let cmd = format_command(fmt, args)?;
        self.exec_output(&cmd, opts).await
    }

    async fn start_with_extra(
        &self,
        ctx: CancellationToken,
        cmd: &str,
        mut opts: ExecOpts,
        extra_stdout: Option<Box<dyn Write + Send>>,
    ) -> crate::Result<ExecWaiter> {
        if let Some(err) = &self.poisoned {
            return Err(Error::SudoNotConfigured(err.to_string()));
        }

        let host = self.describe();
        let final_cmd = self.command(cmd, &opts);
        let scrubber = LineScrubber::from_opts(&opts);
        let redactor = opts.redactor();

        if !opts.hide_command && !opts.sensitive {
            // Decode any -EncodedCommand payload so the log stays readable.
            let display = ps::decode_encoded_command(&final_cmd)
                .unwrap_or_else(|| final_cmd.clone());
            log::debug!("[{host}] executing `{}`", scrubber.scrub(&display));
        }

        let stdin = opts.stdin.take().map(|input| {
            if opts.log_input && !opts.sensitive {
                if let Some(size) = input.size() {
                    log::debug!("[{host}] writing {size} bytes to command stdin");
                }
                let scrub = scrubber.clone();
                let host = host.clone();
                let mirror =
                    LineWriter::new(move |line: &str| log::debug!("[{host}] stdin: {}", scrub.scrub(line)));
                ProcessInput::reader(Box::new(TeeReader::new(input.into_reader(), mirror)))
            } else {
                input
            }
        });

        let mut stdout_sinks: Vec<Box<dyn Write + Send>> = Vec::new();
        if let Some(writer) = opts.stdout.take() {
            stdout_sinks.push(wrap_redacting(writer, &redactor));
        }
        if let Some(writer) = extra_stdout {
            stdout_sinks.push(wrap_redacting(writer, &redactor));
        }
        if !opts.sensitive && !opts.hide_output {
            let scrub = scrubber.clone();
            let host = host.clone();
            if opts.stream_output {
                stdout_sinks.push(Box::new(LineWriter::new(move |line: &str| {
                    log::info!("[{host}] {}", scrub.scrub(line))
                })));
            } else {
                stdout_sinks.push(Box::new(LineWriter::new(move |line: &str| {
                    log::debug!("[{host}] stdout: {}", scrub.scrub(line))
                })));
            }
        }

        let mut stderr_sinks: Vec<Box<dyn Write + Send>> = Vec::new();
        if let Some(writer) = opts.stderr.take() {
            stderr_sinks.push(wrap_redacting(writer, &redactor));
        }
        if !opts.sensitive && !opts.hide_output {
            let scrub = scrubber.clone();
            let host = host.clone();
            if opts.stream_output || opts.log_error {
                stderr_sinks.push(Box::new(LineWriter::new(move |line: &str| {
                    log::error!("[{host}] {}", scrub.scrub(line))
                })));
            } else {
                stderr_sinks.push(Box::new(LineWriter::new(move |line: &str| {
                    log::debug!("[{host}] stderr: {}", scrub.scrub(line))
                })));
            }
        }
        let tripwire = if self.is_windows() && !opts.allow_win_stderr {
            let writer = TripwireWriter::new();
            let flag = writer.flag();
            stderr_sinks.push(Box::new(writer));
            Some(flag)
        } else {
            None
        };

        let waiter = self
            .transport
            .start_process(
                ctx,
                &final_cmd,
                stdin,
                collapse(stdout_sinks),
                collapse(stderr_sinks),
            )
            .await
            .map_err(Error::from)?;

        Ok(ExecWaiter { inner: waiter, tripwire })
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("transport", &self.transport.describe())
            .field("decorators", &self.decorators.len())
            .finish()
    }
}

fn wrap_redacting(writer: Box<dyn Write + Send>, redactor: &Redactor) -> Box<dyn Write + Send> {
    if redactor.is_empty() {
        writer
    } else {
        Box::new(RedactWriter::new(writer, redactor.clone()))
    }
}

fn collapse(mut sinks: Vec<Box<dyn Write + Send>>) -> Box<dyn Write + Send> {
    match sinks.len() {
        0 => Box::new(NullWriter),
        1 => match sinks.pop() {
            Some(sink) => sink,
            None => Box::new(NullWriter),
        },
        _ => Box::new(MultiWriter::new(sinks)),
    }
}

/// Applies literal and regex redaction to one complete log line.
#[derive(Clone)]
struct LineScrubber {
    redactor: Redactor,
    regexes: Vec<Regex>,
}

impl LineScrubber {
    fn from_opts(opts: &ExecOpts) -> Self {
        let mut redactor = Redactor::new(super::options::REDACT_MASK);
        let mut regexes = Vec::new();
        for pattern in &opts.redact {
            match pattern {
                RedactPattern::Literal(s) => redactor.add_pattern(s.as_bytes()),
                RedactPattern::Regex(re) => regexes.push(re.clone()),
            }
        }
        Self { redactor, regexes }
    }

    fn scrub(&self, line: &str) -> String {
        let mut line = self.redactor.redact_str(line);
        for re in &self.regexes {
            line = re
                .replace_all(&line, super::options::REDACT_MASK)
                .into_owned();
        }
        line
    }
}

/// The handle returned by [`Runner::start`].
///
/// On Windows hosts (unless `allow_win_stderr` was set) a successful wait
/// is demoted to [`Error::WroteToStderr`] when the stderr pipe saw any
/// non-whitespace byte, since Windows exit codes are unreliable.
pub struct ExecWaiter {
    inner: Box<dyn Waiter>,
    tripwire: Option<Arc<AtomicBool>>,
}

impl ExecWaiter {
    pub async fn wait(self) -> crate::Result<()> {
        match self.inner.wait().await {
            Ok(()) => {
                if let Some(flag) = &self.tripwire {
                    if flag.load(Ordering::Relaxed) {
                        return Err(Error::WroteToStderr);
                    }
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
