//! Per-command execution options.
//!
//! An [`ExecOpts`] value configures exactly one command run: stream
//! endpoints, logging behavior, redaction, and per-command decoration
//! (sudo, PowerShell wrapping). The value is built once and never mutated
//! afterwards.

use std::io::Write;

use farhost_streams::Redactor;
use farhost_transport::ProcessInput;
use regex::Regex;

/// The replacement every redacted secret collapses to.
pub const REDACT_MASK: &str = "[REDACTED]";

#[derive(Debug, Clone)]
pub(crate) enum RedactPattern {
    Literal(String),
    Regex(Regex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PsMode {
    Plain,
    Compressed,
}

/// Frozen options for one command run. Construct via
/// [`ExecOpts::builder`]; [`ExecOpts::default`] is a plain run with output
/// captured to the debug log and trimming enabled.
#[derive(Default)]
pub struct ExecOpts {
    pub(crate) stdin: Option<ProcessInput>,
    pub(crate) stdout: Option<Box<dyn Write + Send>>,
    pub(crate) stderr: Option<Box<dyn Write + Send>>,
    pub(crate) stream_output: bool,
    pub(crate) log_error: bool,
    pub(crate) hide_command: bool,
    pub(crate) hide_output: bool,
    pub(crate) sensitive: bool,
    pub(crate) log_input: bool,
    pub(crate) no_trim_output: bool,
    pub(crate) redact: Vec<RedactPattern>,
    pub(crate) allow_win_stderr: bool,
    pub(crate) ps: Option<PsMode>,
    pub(crate) sudo: bool,
}

impl ExecOpts {
    pub fn builder() -> ExecOptsBuilder {
        ExecOptsBuilder {
            opts: ExecOpts::default(),
        }
    }

    /// Whether captured output should be whitespace-trimmed (the default).
    pub(crate) fn trim_output(&self) -> bool {
        !self.no_trim_output
    }

    /// The streaming redactor over the literal patterns.
    pub(crate) fn redactor(&self) -> Redactor {
        let mut redactor = Redactor::new(REDACT_MASK);
        for pattern in &self.redact {
            if let RedactPattern::Literal(s) = pattern {
                redactor.add_pattern(s.as_bytes());
            }
        }
        redactor
    }
}

/// Fluent builder for [`ExecOpts`].
pub struct ExecOptsBuilder {
    opts: ExecOpts,
}

impl ExecOptsBuilder {
    /// Supplies stdin from a reader of unknown size.
    pub fn stdin(mut self, input: ProcessInput) -> Self {
        self.opts.stdin = Some(input);
        self
    }

    pub fn stdin_string(self, s: impl Into<String>) -> Self {
        self.stdin(ProcessInput::string(s))
    }

    pub fn stdin_bytes(self, data: Vec<u8>) -> Self {
        self.stdin(ProcessInput::bytes(data))
    }

    /// Forwards stdout to a writer (in addition to any logging sinks).
    pub fn stdout(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.opts.stdout = Some(writer);
        self
    }

    /// Forwards stderr to a writer (in addition to any logging sinks).
    pub fn stderr(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.opts.stderr = Some(writer);
        self
    }

    /// Tees stdout to the info log and stderr to the error log, line by
    /// line, as the command runs.
    pub fn stream_output(mut self) -> Self {
        self.opts.stream_output = true;
        self
    }

    /// Logs stderr lines at error level instead of debug.
    pub fn log_error(mut self, enabled: bool) -> Self {
        self.opts.log_error = enabled;
        self
    }

    /// Suppresses logging of the command string.
    pub fn hide_command(mut self) -> Self {
        self.opts.hide_command = true;
        self
    }

    /// Suppresses logging of output lines.
    pub fn hide_output(mut self) -> Self {
        self.opts.hide_output = true;
        self
    }

    /// Disables all stream logging for this command.
    pub fn sensitive(mut self) -> Self {
        self.opts.sensitive = true;
        self
    }

    /// Mirrors stdin into the debug log.
    pub fn log_input(mut self, enabled: bool) -> Self {
        self.opts.log_input = enabled;
        self
    }

    /// Controls whitespace-trimming of captured output. Defaults to true.
    pub fn trim_output(mut self, enabled: bool) -> Self {
        self.opts.no_trim_output = !enabled;
        self
    }

    /// Redacts every match of the regex in logged lines.
    pub fn redact(mut self, pattern: Regex) -> Self {
        self.opts.redact.push(RedactPattern::Regex(pattern));
        self
    }

    /// Redacts every occurrence of the literal string in output streams
    /// and logged lines, including occurrences split across chunks.
    pub fn redact_string(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if !pattern.is_empty() {
            self.opts.redact.push(RedactPattern::Literal(pattern));
        }
        self
    }

    /// Accepts stderr output on Windows hosts instead of treating it as
    /// failure.
    pub fn allow_win_stderr(mut self) -> Self {
        self.opts.allow_win_stderr = true;
        self
    }

    /// Wraps the command in `powershell.exe -EncodedCommand`.
    pub fn ps(mut self) -> Self {
        self.opts.ps = Some(PsMode::Plain);
        self
    }

    /// Like [`ps`](Self::ps), with the script gzip-compressed first.
    pub fn ps_compressed(mut self) -> Self {
        self.opts.ps = Some(PsMode::Compressed);
        self
    }

    /// Wraps the command for privilege escalation with `sudo`.
    pub fn sudo(mut self) -> Self {
        self.opts.sudo = true;
        self
    }

    pub fn build(self) -> ExecOpts {
        self.opts
    }
}
